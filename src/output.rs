use crate::check::PortStatus;
use crate::node::HopRecord;
use crate::trace::{FailureKind, TraceResult, TraceStatus};
use std::fmt::Write;

/// Renders a trace as text, one line per hop.
pub fn render_trace(result: &TraceResult) -> String {
    let mut out = String::new();
    let dst = result
        .dst_ip
        .map(|ip| format!(" ({})", ip))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "Route to {}{}, {} hops max",
        result.target, dst, result.max_hops
    );

    let sentinel = result.hops.first().filter(|hop| hop.is_whole_trace_failure());
    if result.is_failure() || sentinel.is_some() {
        let _ = writeln!(out, "{}", failure_line(result.failure_kind));
        if let Some(failure) = &result.failure {
            let _ = writeln!(out, "  {}", failure);
        }
        return out;
    }

    for hop in &result.hops {
        let _ = writeln!(out, "{}", hop_line(hop));
    }
    let strategy = result
        .strategy
        .map(|s| format!(" via {}", s))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "{}{} in {:.1}s",
        status_text(result.status),
        strategy,
        result.trace_time.as_secs_f64()
    );
    out
}

fn hop_line(hop: &HopRecord) -> String {
    let addr = match hop.ip_addr {
        Some(ip_addr) => ip_addr.to_string(),
        None => String::from("*"),
    };
    let name = hop
        .host_name
        .as_ref()
        .map(|name| format!(" ({})", name))
        .unwrap_or_default();
    let rtt = match hop.rtt_ms {
        Some(rtt) => format!("{:.3} ms", rtt),
        None => String::from("—"),
    };
    let note = hop
        .error
        .map(|error| format!("  [{}]", error))
        .unwrap_or_default();
    format!("{:>3}  {}{}  {}{}", hop.hop_index, addr, name, rtt, note)
}

fn failure_line(kind: Option<FailureKind>) -> &'static str {
    match kind {
        Some(FailureKind::Resolution) => {
            "Trace failed: the host name could not be resolved. Check the spelling of the host."
        }
        Some(FailureKind::UnsupportedPlatform) => {
            "Trace failed: route tracing is not supported on this platform."
        }
        Some(FailureKind::ToolMissing) => {
            "Trace failed: no tracing utility was found. Install traceroute (or ping) and retry."
        }
        Some(FailureKind::ToolFailed) => {
            "Trace failed: the tracing utility did not run correctly. Check its permissions or report the output below."
        }
        None => "Trace failed.",
    }
}

fn status_text(status: TraceStatus) -> &'static str {
    match status {
        TraceStatus::Done => "Destination reached",
        TraceStatus::MaxHops => "Hop limit reached before the destination",
        TraceStatus::Timeout => "Trace timed out, partial route",
        TraceStatus::Cancelled => "Trace cancelled, partial route",
        TraceStatus::Error => "Trace failed",
    }
}

/// Renders the outcome of a connectivity check.
pub fn render_check(host: &str, port: u16, status: &PortStatus) -> String {
    match status {
        PortStatus::Open => format!("OPEN: Port {} on {} is open and accepting connections", port, host),
        PortStatus::Closed(reason) => {
            format!("CLOSED: Port {} on {} is closed\nReason: {}", port, host, reason)
        }
    }
}
