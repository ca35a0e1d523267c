use super::native::{run_tool, HopGrammar};
use super::{RawTrace, TraceContext};
use crate::error::Result;
use crate::node::{mean_rtt, HopError, HopRecord};
use crate::parse::{first_address, latencies, leading_hop};
use crate::strategy::Strategy;
use std::net::IpAddr;
use std::time::Duration;

const TRACERT: &str = "tracert";
/// Banner lines skipped at most before hop parsing starts regardless.
const BANNER_LIMIT: usize = 5;

pub(crate) async fn trace_route(ctx: &TraceContext<'_>) -> Result<RawTrace> {
    let args = tracert_args(ctx.dst_ip, ctx.request.max_hops, ctx.request.timeout);
    run_tool(ctx, TRACERT, &args, TracertGrammar::new(), Strategy::WindowsNative).await
}

fn tracert_args(dst_ip: IpAddr, max_hops: u8, timeout: Duration) -> Vec<String> {
    let timeout_ms = timeout.as_millis().max(1);
    vec![
        String::from("-d"),
        String::from("-h"),
        max_hops.to_string(),
        String::from("-w"),
        timeout_ms.to_string(),
        dst_ip.to_string(),
    ]
}

/// Output grammar of `tracert -d`.
///
/// ```text
/// Tracing route to 93.184.216.34 over a maximum of 30 hops
///
///   1    <1 ms    <1 ms    <1 ms  192.168.1.1
///   2     *        *        *     Request timed out.
///   3    12 ms    11 ms    12 ms  10.0.0.2
/// ```
pub(crate) struct TracertGrammar {
    in_banner: bool,
    skipped: usize,
}

impl TracertGrammar {
    pub fn new() -> TracertGrammar {
        TracertGrammar {
            in_banner: true,
            skipped: 0,
        }
    }
}

impl HopGrammar for TracertGrammar {
    fn parse_line(&mut self, line: &str) -> Option<HopRecord> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if self.in_banner {
            if leading_hop(&tokens).is_none() {
                if is_trace_start(line) {
                    self.in_banner = false;
                } else {
                    self.skipped += 1;
                    self.in_banner = self.skipped < BANNER_LIMIT;
                }
                return None;
            }
            self.in_banner = false;
        }
        parse_hop_line(&tokens, line)
    }
}

fn is_trace_start(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("tracing route") || lower.contains("over a maximum of")
}

fn parse_hop_line(tokens: &[&str], line: &str) -> Option<HopRecord> {
    let hop_index = leading_hop(tokens)?;
    let lower = line.to_ascii_lowercase();
    if lower.contains("timed out") {
        return Some(HopRecord::missing(hop_index, HopError::TimedOut));
    }
    if lower.contains("unreachable") {
        return Some(HopRecord::missing(hop_index, HopError::UnreachableHost));
    }
    let rest = &tokens[1..];
    match first_address(rest) {
        Some(ip_addr) => Some(HopRecord::reply(hop_index, ip_addr, mean_rtt(&latencies(rest)))),
        None => Some(HopRecord::missing(hop_index, HopError::NoResponse)),
    }
}
