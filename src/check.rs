use crate::dns;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Why a port did not accept the connection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TimedOut,
    Refused,
    Unresolvable,
    Other(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::TimedOut => f.write_str("Connection timed out"),
            CloseReason::Refused => f.write_str("Connection refused"),
            CloseReason::Unresolvable => f.write_str("Could not resolve hostname"),
            CloseReason::Other(message) => f.write_str(message),
        }
    }
}

impl From<io::Error> for CloseReason {
    fn from(e: io::Error) -> CloseReason {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => CloseReason::TimedOut,
            io::ErrorKind::ConnectionRefused => CloseReason::Refused,
            _ => CloseReason::Other(e.to_string()),
        }
    }
}

/// Outcome of a connectivity check
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    Open,
    Closed(CloseReason),
}

impl PortStatus {
    pub fn is_open(&self) -> bool {
        *self == PortStatus::Open
    }
}

/// Parses a port number given as text.
pub fn validate_port(port: &str) -> Result<u16> {
    let port_num: i64 = port
        .trim()
        .parse()
        .map_err(|_| Error::InvalidPort(format!("Port must be a valid integer, got {}", port)))?;
    if (1..=65535).contains(&port_num) {
        Ok(port_num as u16)
    } else {
        Err(Error::InvalidPort(format!(
            "Port must be between 1 and 65535, got {}",
            port_num
        )))
    }
}

/// Tries a TCP connection to `host:port` within `timeout`.
///
/// The connection is closed right after it is established.
pub fn check_port(host: &str, port: u16, timeout: Duration) -> Result<PortStatus> {
    if port == 0 {
        return Err(Error::InvalidPort(String::from(
            "Port must be between 1 and 65535, got 0",
        )));
    }
    let ip_addr = match dns::resolve_host(host) {
        Ok(ip_addr) => ip_addr,
        Err(e) => {
            debug!(host, error = %e, "check target did not resolve");
            return Ok(PortStatus::Closed(CloseReason::Unresolvable));
        }
    };
    let socket_addr = SocketAddr::new(ip_addr, port);
    let socket = Socket::new(Domain::for_address(socket_addr), Type::STREAM, Some(Protocol::TCP))?;
    let start_time = Instant::now();
    let status = match socket.connect_timeout(&SockAddr::from(socket_addr), timeout) {
        Ok(_) => PortStatus::Open,
        Err(e) => PortStatus::Closed(CloseReason::from(e)),
    };
    debug!(%socket_addr, ?status, elapsed = ?start_time.elapsed(), "port checked");
    Ok(status)
}

/// Runs [`check_port`] on the blocking pool.
pub async fn check_port_async(host: &str, port: u16, timeout: Duration) -> Result<PortStatus> {
    let host = host.to_string();
    tokio::task::spawn_blocking(move || check_port(&host, port, timeout))
        .await
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port("443").unwrap(), 443);
        assert_eq!(validate_port(" 1 ").unwrap(), 1);
        assert_eq!(validate_port("65535").unwrap(), 65535);
        assert_eq!(
            validate_port("0").unwrap_err().to_string(),
            "Port must be between 1 and 65535, got 0"
        );
        assert_eq!(
            validate_port("70000").unwrap_err().to_string(),
            "Port must be between 1 and 65535, got 70000"
        );
        assert_eq!(
            validate_port("http").unwrap_err().to_string(),
            "Port must be a valid integer, got http"
        );
    }

    #[test]
    fn test_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let status = check_port("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        assert_eq!(status, PortStatus::Open);
    }

    #[test]
    fn test_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let status = check_port("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        assert_eq!(status, PortStatus::Closed(CloseReason::Refused));
    }

    #[test]
    fn test_unresolvable_host() {
        let status = check_port("example.invalid", 80, Duration::from_secs(1)).unwrap();
        assert_eq!(status, PortStatus::Closed(CloseReason::Unresolvable));
    }

    #[test]
    fn test_reason_from_io_error() {
        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        assert_eq!(CloseReason::from(timed_out), CloseReason::TimedOut);
        let other = io::Error::new(io::ErrorKind::Other, "network is unreachable");
        assert_eq!(
            CloseReason::from(other),
            CloseReason::Other(String::from("network is unreachable"))
        );
        assert_eq!(CloseReason::Refused.to_string(), "Connection refused");
    }

    #[tokio::test]
    async fn test_check_async() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let status = check_port_async("127.0.0.1", port, Duration::from_secs(1)).await.unwrap();
        assert!(status.is_open());
    }
}
