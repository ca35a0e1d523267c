mod native;
pub(crate) mod normalize;
pub(crate) mod sweep;
mod unix;
mod windows;

mod tracer;
pub use tracer::*;

use crate::error::{Error, Result};
use crate::node::HopRecord;
use crate::strategy::Strategy;
use crate::sys::Platform;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Exit status of a trace
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    /// The destination answered
    Done,
    /// The hop limit was used up before the destination answered
    MaxHops,
    /// The overall deadline or an output stall stopped the trace
    Timeout,
    /// The caller cancelled the trace
    Cancelled,
    /// The trace could not run at all
    Error,
}

/// Why a trace never started
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The target host did not resolve
    Resolution,
    /// No strategy exists for this platform
    UnsupportedPlatform,
    /// The tracing utility is not installed
    ToolMissing,
    /// The tracing utility could not be launched or failed while running
    ToolFailed,
}

impl FailureKind {
    pub fn of(error: &Error) -> FailureKind {
        match error {
            Error::Resolution { .. } => FailureKind::Resolution,
            Error::UnsupportedPlatform(_) => FailureKind::UnsupportedPlatform,
            Error::ToolNotFound { .. } => FailureKind::ToolMissing,
            _ => FailureKind::ToolFailed,
        }
    }
}

/// Result of a trace
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceResult {
    /// Host as given by the caller
    pub target: String,
    /// Resolved destination address
    pub dst_ip: Option<IpAddr>,
    /// Strategy that produced the hops
    pub strategy: Option<Strategy>,
    /// Hop limit of the request
    pub max_hops: u8,
    /// Ordered hops, or the single sentinel record of a failed trace
    pub hops: Vec<HopRecord>,
    pub status: TraceStatus,
    /// Why a failed trace never started
    pub failure: Option<String>,
    /// Classification of `failure`
    pub failure_kind: Option<FailureKind>,
    /// Wall time of the whole trace
    pub trace_time: Duration,
}

impl TraceResult {
    pub(crate) fn failed(
        request: &TraceRequest,
        dst_ip: Option<IpAddr>,
        strategy: Option<Strategy>,
        error: Error,
        trace_time: Duration,
    ) -> TraceResult {
        warn!(host = %request.host, error = %error, "trace failed");
        TraceResult {
            target: request.host.clone(),
            dst_ip,
            strategy,
            max_hops: request.max_hops,
            hops: vec![HopRecord::failure(error.hop_error())],
            status: TraceStatus::Error,
            failure: Some(error.to_string()),
            failure_kind: Some(FailureKind::of(&error)),
            trace_time,
        }
    }

    /// Returns true when the trace never started.
    pub fn is_failure(&self) -> bool {
        self.status == TraceStatus::Error
    }

    /// Returns true when the last hop is the destination.
    pub fn reached_destination(&self) -> bool {
        match (self.hops.last(), self.dst_ip) {
            (Some(last), Some(dst_ip)) => reached(last, dst_ip),
            _ => false,
        }
    }
}

/// Hops collected by one strategy, before normalization.
#[derive(Debug)]
pub(crate) struct RawTrace {
    pub hops: Vec<HopRecord>,
    /// Set when the trace was stopped before the tool or sweep finished
    pub interrupted: Option<TraceStatus>,
    pub strategy: Strategy,
}

/// Everything an adapter needs for one trace.
pub(crate) struct TraceContext<'a> {
    pub request: &'a TraceRequest,
    pub dst_ip: IpAddr,
    pub platform: Platform,
    pub cancel: CancellationToken,
    pub deadline: Instant,
    pub progress_tx: &'a broadcast::Sender<HopRecord>,
}

impl TraceContext<'_> {
    /// Runs `fut` unless the trace is cancelled or its deadline passes first.
    pub async fn guard<F: Future>(&self, fut: F) -> std::result::Result<F::Output, TraceStatus> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TraceStatus::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(TraceStatus::Timeout),
            out = fut => Ok(out),
        }
    }

    pub fn report(&self, hop: &HopRecord) {
        let _ = self.progress_tx.send(hop.clone());
    }
}

pub(crate) async fn trace_route(ctx: &TraceContext<'_>, strategy: Strategy) -> Result<RawTrace> {
    match strategy {
        Strategy::WindowsNative => windows::trace_route(ctx).await,
        Strategy::UnixNative => match unix::trace_route(ctx).await {
            Err(Error::ToolNotFound { program }) => {
                warn!(%program, "native tracer not installed, sweeping TTLs with ping");
                sweep::trace_route(ctx).await
            }
            other => other,
        },
        Strategy::TtlSweep => sweep::trace_route(ctx).await,
    }
}

/// Orders the raw hops and derives the final status.
pub(crate) fn conclude(raw: RawTrace, dst_ip: IpAddr) -> (Vec<HopRecord>, TraceStatus) {
    let hops = normalize::assemble(raw.hops);
    let status = match raw.interrupted {
        Some(status) => status,
        None => match hops.last() {
            Some(last) if reached(last, dst_ip) => TraceStatus::Done,
            _ => TraceStatus::MaxHops,
        },
    };
    (hops, status)
}

fn reached(hop: &HopRecord, dst_ip: IpAddr) -> bool {
    hop.error.is_none() && hop.ip_addr == Some(dst_ip)
}


/// Owns what a [`TraceContext`] borrows, for adapter tests.
#[cfg(test)]
pub(crate) struct TestTrace {
    pub request: TraceRequest,
    pub dst_ip: IpAddr,
    pub cancel: CancellationToken,
    pub progress_tx: broadcast::Sender<HopRecord>,
}

#[cfg(test)]
impl TestTrace {
    pub fn new(dst_ip: IpAddr, max_hops: u8) -> TestTrace {
        let mut request = TraceRequest::new(&dst_ip.to_string());
        request.max_hops = max_hops;
        let (progress_tx, _) = broadcast::channel(256);
        TestTrace {
            request,
            dst_ip,
            cancel: CancellationToken::new(),
            progress_tx,
        }
    }

    pub fn context(&self) -> TraceContext<'_> {
        TraceContext {
            request: &self.request,
            dst_ip: self.dst_ip,
            platform: Platform::Linux,
            cancel: self.cancel.clone(),
            deadline: Instant::now() + Duration::from_secs(60),
            progress_tx: &self.progress_tx,
        }
    }
}
