mod pinger;
pub use pinger::*;

use crate::parse::parse_addr;
use crate::sys::{self, Platform};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Outcome of one echo probe
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EchoReply {
    /// Echo reply
    Echo { from: IpAddr, rtt_ms: Option<f64> },
    /// A router dropped the probe when its TTL ran out
    TtlExceeded { from: IpAddr },
    /// The destination was reported unreachable
    Unreachable { from: Option<IpAddr> },
    /// Nothing came back in time
    NoReply,
}

/// Program and arguments sending one echo with `ttl` to `dst_ip`.
pub(crate) fn ping_command(
    platform: &Platform,
    dst_ip: IpAddr,
    ttl: u8,
    timeout: Duration,
) -> (&'static str, Vec<String>) {
    let timeout_ms = timeout.as_millis().max(1).to_string();
    let mut args: Vec<String> = vec![];
    let program = match (platform, dst_ip) {
        (Platform::Windows, _) => {
            args.extend(["-n", "1", "-i"].map(String::from));
            args.push(ttl.to_string());
            args.push(String::from("-w"));
            args.push(timeout_ms);
            "ping"
        }
        (Platform::MacOs, IpAddr::V6(_)) => {
            args.extend(["-n", "-c", "1", "-h"].map(String::from));
            args.push(ttl.to_string());
            "ping6"
        }
        (Platform::MacOs, IpAddr::V4(_)) => {
            args.extend(["-n", "-c", "1", "-m"].map(String::from));
            args.push(ttl.to_string());
            args.push(String::from("-W"));
            args.push(timeout_ms);
            "ping"
        }
        _ => {
            args.extend(["-n", "-c", "1", "-t"].map(String::from));
            args.push(ttl.to_string());
            args.push(String::from("-W"));
            args.push(sys::whole_secs(timeout).to_string());
            "ping"
        }
    };
    args.push(dst_ip.to_string());
    (program, args)
}

/// Classifies one line of `ping` output.
///
/// Understands the Linux, macOS and Windows wordings; summary and banner
/// lines yield `None`.
pub(crate) fn parse_reply_line(line: &str) -> Option<EchoReply> {
    let lower = line.to_ascii_lowercase();
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let from = responder(&tokens);
    if lower.contains("time to live exceeded")
        || lower.contains("ttl expired")
        || lower.contains("time exceeded")
    {
        return from.map(|from| EchoReply::TtlExceeded { from });
    }
    if lower.contains("unreachable") {
        return Some(EchoReply::Unreachable { from });
    }
    let from = from?;
    if lower.contains("bytes from") || lower.trim_start().starts_with("reply from") {
        return Some(EchoReply::Echo {
            from,
            rtt_ms: echo_time(&tokens),
        });
    }
    None
}

// Address after `from`, skipping a host name printed before `(addr)`.
fn responder(tokens: &[&str]) -> Option<IpAddr> {
    let at = tokens.iter().position(|t| t.eq_ignore_ascii_case("from"))?;
    tokens[at + 1..].iter().take(2).find_map(|t| parse_addr(t))
}

fn echo_time(tokens: &[&str]) -> Option<f64> {
    for (i, token) in tokens.iter().enumerate() {
        let lower = token.to_ascii_lowercase();
        let value = match lower.strip_prefix("time=").or_else(|| lower.strip_prefix("time<")) {
            Some(value) => value.trim_end_matches("ms").to_string(),
            None => continue,
        };
        let value = if value.is_empty() {
            tokens.get(i + 1).map(|t| t.to_string()).unwrap_or_default()
        } else {
            value
        };
        return value.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_linux_lines() {
        assert_eq!(
            parse_reply_line("64 bytes from 93.184.216.34: icmp_seq=1 ttl=56 time=20.1 ms"),
            Some(EchoReply::Echo { from: ip(93, 184, 216, 34), rtt_ms: Some(20.1) })
        );
        assert_eq!(
            parse_reply_line("From 10.0.0.1 icmp_seq=1 Time to live exceeded"),
            Some(EchoReply::TtlExceeded { from: ip(10, 0, 0, 1) })
        );
        assert_eq!(
            parse_reply_line("From 192.168.1.5 icmp_seq=1 Destination Host Unreachable"),
            Some(EchoReply::Unreachable { from: Some(ip(192, 168, 1, 5)) })
        );
        assert_eq!(parse_reply_line("PING 93.184.216.34 (93.184.216.34) 56(84) bytes of data."), None);
        assert_eq!(
            parse_reply_line("1 packets transmitted, 0 received, 100% packet loss, time 0ms"),
            None
        );
    }

    #[test]
    fn test_macos_lines() {
        assert_eq!(
            parse_reply_line("36 bytes from 10.0.0.1: Time to live exceeded"),
            Some(EchoReply::TtlExceeded { from: ip(10, 0, 0, 1) })
        );
        assert_eq!(
            parse_reply_line("64 bytes from 93.184.216.34: icmp_seq=0 ttl=56 time=20.123 ms"),
            Some(EchoReply::Echo { from: ip(93, 184, 216, 34), rtt_ms: Some(20.123) })
        );
        assert_eq!(parse_reply_line("Request timeout for icmp_seq 0"), None);
    }

    #[test]
    fn test_windows_lines() {
        assert_eq!(
            parse_reply_line("Reply from 93.184.216.34: bytes=32 time=20ms TTL=56"),
            Some(EchoReply::Echo { from: ip(93, 184, 216, 34), rtt_ms: Some(20.0) })
        );
        assert_eq!(
            parse_reply_line("Reply from 93.184.216.34: bytes=32 time<1ms TTL=56"),
            Some(EchoReply::Echo { from: ip(93, 184, 216, 34), rtt_ms: Some(1.0) })
        );
        assert_eq!(
            parse_reply_line("Reply from 10.0.0.1: TTL expired in transit."),
            Some(EchoReply::TtlExceeded { from: ip(10, 0, 0, 1) })
        );
        assert_eq!(parse_reply_line("Request timed out."), None);
        assert_eq!(parse_reply_line("Ping statistics for 93.184.216.34:"), None);
    }

    #[test]
    fn test_named_responder() {
        assert_eq!(
            parse_reply_line("From gw.lan (10.0.0.1) icmp_seq=1 Time to live exceeded"),
            Some(EchoReply::TtlExceeded { from: ip(10, 0, 0, 1) })
        );
    }

    #[test]
    fn test_ping_command() {
        let dst = ip(93, 184, 216, 34);
        let timeout = Duration::from_millis(1500);
        let (program, args) = ping_command(&Platform::Linux, dst, 4, timeout);
        assert_eq!(program, "ping");
        assert_eq!(args, vec!["-n", "-c", "1", "-t", "4", "-W", "2", "93.184.216.34"]);
        let (_, args) = ping_command(&Platform::MacOs, dst, 4, timeout);
        assert_eq!(args, vec!["-n", "-c", "1", "-m", "4", "-W", "1500", "93.184.216.34"]);
        let (_, args) = ping_command(&Platform::Windows, dst, 4, timeout);
        assert_eq!(args, vec!["-n", "1", "-i", "4", "-w", "1500", "93.184.216.34"]);
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        let (program, _) = ping_command(&Platform::MacOs, v6, 4, timeout);
        assert_eq!(program, "ping6");
    }
}
