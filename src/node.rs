use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Classification of a missing or failed hop.
///
/// The last three variants describe whole-trace failures and only ever appear
/// on the single sentinel record of a failed trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HopError {
    /// No probe returned before the per-hop timeout
    TimedOut,
    /// The hop was reported without any responder
    NoResponse,
    /// The path reported the destination as unreachable
    UnreachableHost,
    /// The target host could not be resolved
    ResolutionFailed,
    /// No tracing strategy exists for this platform
    UnsupportedPlatform,
    /// The external tracing tool could not be run
    ProcessFailed,
}

impl HopError {
    /// Returns true for errors that abort the whole trace.
    pub fn is_whole_trace(&self) -> bool {
        matches!(
            self,
            HopError::ResolutionFailed | HopError::UnsupportedPlatform | HopError::ProcessFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HopError::TimedOut => "timed_out",
            HopError::NoResponse => "no_response",
            HopError::UnreachableHost => "unreachable_host",
            HopError::ResolutionFailed => "resolution_failed",
            HopError::UnsupportedPlatform => "unsupported_platform",
            HopError::ProcessFailed => "process_failed",
        }
    }
}

impl fmt::Display for HopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a trace, discovered or missing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HopRecord {
    /// 1-based hop index. `0` marks a whole-trace failure
    pub hop_index: u8,
    /// Address of the responder
    pub ip_addr: Option<IpAddr>,
    /// Reverse DNS name of `ip_addr`, only set on a successful lookup
    pub host_name: Option<String>,
    /// Mean round-trip time in milliseconds
    pub rtt_ms: Option<f64>,
    /// Why this hop has no responder
    pub error: Option<HopError>,
}

impl HopRecord {
    /// A hop answered by `ip_addr`.
    pub fn reply(hop_index: u8, ip_addr: IpAddr, rtt_ms: Option<f64>) -> HopRecord {
        HopRecord {
            hop_index,
            ip_addr: Some(ip_addr),
            host_name: None,
            rtt_ms: rtt_ms.filter(|rtt| rtt.is_finite() && *rtt >= 0.0),
            error: None,
        }
    }

    /// A hop without a responder.
    pub fn missing(hop_index: u8, error: HopError) -> HopRecord {
        HopRecord {
            hop_index,
            ip_addr: None,
            host_name: None,
            rtt_ms: None,
            error: Some(error),
        }
    }

    /// The sentinel record of a trace that never started.
    pub fn failure(error: HopError) -> HopRecord {
        HopRecord::missing(0, error)
    }

    pub fn is_whole_trace_failure(&self) -> bool {
        self.hop_index == 0 && self.error.map_or(false, |e| e.is_whole_trace())
    }
}

/// Arithmetic mean of the reported latencies.
pub(crate) fn mean_rtt(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}
