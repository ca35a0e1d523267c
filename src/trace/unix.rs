use super::native::{run_tool, HopGrammar};
use super::{RawTrace, TraceContext};
use crate::error::Result;
use crate::node::{mean_rtt, HopError, HopRecord};
use crate::parse::{first_address, latencies, leading_hop};
use crate::strategy::Strategy;
use crate::sys::{self, Platform};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

pub(crate) async fn trace_route(ctx: &TraceContext<'_>) -> Result<RawTrace> {
    let program = traceroute_program(&ctx.platform, ctx.dst_ip);
    let args = traceroute_args(ctx.dst_ip, ctx.request.max_hops, ctx.request.timeout);
    run_tool(ctx, program, &args, TracerouteGrammar::new(), Strategy::UnixNative).await
}

fn traceroute_program(platform: &Platform, dst_ip: IpAddr) -> &'static str {
    match (platform, dst_ip) {
        (Platform::MacOs, IpAddr::V6(_)) => "traceroute6",
        _ => "traceroute",
    }
}

fn traceroute_args(dst_ip: IpAddr, max_hops: u8, timeout: Duration) -> Vec<String> {
    vec![
        String::from("-n"),
        String::from("-q"),
        String::from("3"),
        String::from("-m"),
        max_hops.to_string(),
        String::from("-w"),
        sys::whole_secs(timeout).to_string(),
        dst_ip.to_string(),
    ]
}

/// Output grammar of `traceroute -n`.
///
/// ```text
/// traceroute to 93.184.216.34 (93.184.216.34), 30 hops max, 60 byte packets
///  1  10.0.0.1  0.512 ms  0.430 ms  0.401 ms
///  2  * * *
///  3  93.184.216.34  20.113 ms  19.870 ms  20.002 ms
/// ```
pub(crate) struct TracerouteGrammar {
    header_done: bool,
}

impl TracerouteGrammar {
    pub fn new() -> TracerouteGrammar {
        TracerouteGrammar { header_done: false }
    }
}

impl HopGrammar for TracerouteGrammar {
    fn parse_line(&mut self, line: &str) -> Option<HopRecord> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if !self.header_done {
            self.header_done = true;
            // macOS prints the header on stderr, so the first stdout line
            // may already be hop 1.
            if leading_hop(&tokens).is_none() {
                return None;
            }
        }
        parse_hop_line(&tokens)
    }
}

fn parse_hop_line(tokens: &[&str]) -> Option<HopRecord> {
    let hop_index = leading_hop(tokens)?;
    let rest = &tokens[1..];
    let unreachable = rest.iter().any(|t| t.len() > 1 && t.starts_with('!'));
    match first_address(rest) {
        Some(ip_addr) if unreachable => {
            debug!(hop_index, %ip_addr, "unreachable annotation");
            Some(HopRecord::missing(hop_index, HopError::UnreachableHost))
        }
        Some(ip_addr) => Some(HopRecord::reply(hop_index, ip_addr, mean_rtt(&latencies(rest)))),
        None => Some(HopRecord::missing(hop_index, HopError::NoResponse)),
    }
}
