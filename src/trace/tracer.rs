use super::{normalize, TraceContext, TraceResult, TraceStatus};
use crate::dns;
use crate::error::{Error, Result};
use crate::node::HopRecord;
use crate::strategy::Strategy;
use crate::sys::Platform;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DEFAULT_MAX_HOPS: u8 = 30;
pub const DEFAULT_HOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Validated input of one trace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRequest {
    /// Target host name or address
    pub host: String,
    /// Hop limit, at least 1
    pub max_hops: u8,
    /// Timeout of each hop's probes
    pub timeout: Duration,
}

impl TraceRequest {
    pub fn new(host: &str) -> TraceRequest {
        TraceRequest {
            host: host.trim().to_string(),
            max_hops: DEFAULT_MAX_HOPS,
            timeout: DEFAULT_HOP_TIMEOUT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::InvalidRequest(String::from("host must not be empty")));
        }
        if self.max_hops == 0 {
            return Err(Error::InvalidRequest(String::from("max hops must be at least 1")));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidRequest(String::from("hop timeout must be positive")));
        }
        Ok(())
    }
}

/// Configuration and execution context for a trace.
#[derive(Clone, Debug)]
pub struct Tracer {
    /// Target host name or address.
    pub host: String,
    /// Hop limit. Default is `30`.
    pub max_hops: u8,
    /// Per-hop probe timeout. Default is 1 second.
    pub receive_timeout: Duration,
    /// Overall deadline for a full trace.
    pub trace_timeout: Duration,
    /// Whether hop addresses get reverse DNS names.
    pub resolve_names: bool,
    /// Timeout of each reverse lookup.
    pub lookup_timeout: Duration,
    /// Reverse lookups allowed in flight at once.
    pub lookup_workers: usize,
    /// Forced strategy. `None` selects one for the platform.
    pub strategy: Option<Strategy>,
    /// Platform the strategy is selected for.
    pub platform: Platform,
    /// Broadcast sender for per-hop progress events.
    pub progress_tx: broadcast::Sender<HopRecord>,
    /// Stops a running trace; completed hops are still returned.
    pub cancel: CancellationToken,
}

impl Tracer {
    /// Creates a new `Tracer` for `host` with default settings.
    pub fn new(host: &str) -> Tracer {
        let (progress_tx, _) = broadcast::channel(256);
        Tracer {
            host: host.trim().to_string(),
            max_hops: DEFAULT_MAX_HOPS,
            receive_timeout: DEFAULT_HOP_TIMEOUT,
            trace_timeout: Duration::from_secs(300),
            resolve_names: true,
            lookup_timeout: Duration::from_secs(2),
            lookup_workers: 8,
            strategy: None,
            platform: Platform::current(),
            progress_tx,
            cancel: CancellationToken::new(),
        }
    }
    /// Runs the trace synchronously.
    pub fn trace(&self) -> Result<TraceResult> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let result = runtime.block_on(self.trace_async());
        // Timed-out reverse lookups may still sit on the blocking pool.
        runtime.shutdown_timeout(Duration::from_millis(100));
        result
    }
    /// Runs the trace asynchronously.
    ///
    /// Returns `Err` only for an invalid request. Whole-trace failures come
    /// back as a result holding one sentinel hop with index `0`.
    pub async fn trace_async(&self) -> Result<TraceResult> {
        let request = self.request()?;
        let start_time = Instant::now();
        info!(host = %request.host, max_hops = request.max_hops, "starting trace");

        let dst_ip = match dns::resolve_host_async(&request.host).await {
            Ok(ip) => ip,
            Err(e) => {
                return Ok(TraceResult::failed(&request, None, None, e, start_time.elapsed()));
            }
        };
        let strategy = match self.strategy {
            Some(strategy) => strategy,
            None => match Strategy::select(&self.platform) {
                Ok(strategy) => strategy,
                Err(e) => {
                    return Ok(TraceResult::failed(&request, Some(dst_ip), None, e, start_time.elapsed()));
                }
            },
        };

        let ctx = TraceContext {
            request: &request,
            dst_ip,
            platform: self.platform.clone(),
            cancel: self.cancel.clone(),
            deadline: tokio::time::Instant::now() + self.trace_timeout,
            progress_tx: &self.progress_tx,
        };
        let raw = match super::trace_route(&ctx, strategy).await {
            Ok(raw) => raw,
            Err(e) => {
                return Ok(TraceResult::failed(
                    &request,
                    Some(dst_ip),
                    Some(strategy),
                    e,
                    start_time.elapsed(),
                ));
            }
        };
        let strategy = raw.strategy;
        let (mut hops, status) = super::conclude(raw, dst_ip);
        if self.resolve_names && status != TraceStatus::Cancelled {
            normalize::resolve_names(&mut hops, self.lookup_timeout, self.lookup_workers).await;
        }

        let trace_time = start_time.elapsed();
        info!(host = %request.host, %strategy, ?status, hops = hops.len(), ?trace_time, "trace finished");
        Ok(TraceResult {
            target: request.host.clone(),
            dst_ip: Some(dst_ip),
            strategy: Some(strategy),
            max_hops: request.max_hops,
            hops,
            status,
            failure: None,
            failure_kind: None,
            trace_time,
        })
    }
    /// Returns the validated request for the current settings.
    pub fn request(&self) -> Result<TraceRequest> {
        let request = TraceRequest {
            host: self.host.clone(),
            max_hops: self.max_hops,
            timeout: self.receive_timeout,
        };
        request.validate()?;
        Ok(request)
    }
    /// Sets the target host.
    pub fn set_host(&mut self, host: &str) {
        self.host = host.trim().to_string();
    }
    /// Returns the target host.
    pub fn get_host(&self) -> &str {
        &self.host
    }
    /// Sets the hop limit.
    pub fn set_max_hops(&mut self, max_hops: u8) {
        self.max_hops = max_hops;
    }
    /// Returns the hop limit.
    pub fn get_max_hops(&self) -> u8 {
        self.max_hops
    }
    /// Sets the per-hop probe timeout.
    pub fn set_receive_timeout(&mut self, receive_timeout: Duration) {
        self.receive_timeout = receive_timeout;
    }
    /// Returns the per-hop probe timeout.
    pub fn get_receive_timeout(&self) -> Duration {
        self.receive_timeout
    }
    /// Sets the overall trace deadline.
    pub fn set_trace_timeout(&mut self, trace_timeout: Duration) {
        self.trace_timeout = trace_timeout;
    }
    /// Returns the overall trace deadline.
    pub fn get_trace_timeout(&self) -> Duration {
        self.trace_timeout
    }
    /// Enables or disables reverse DNS lookups.
    pub fn set_resolve_names(&mut self, resolve_names: bool) {
        self.resolve_names = resolve_names;
    }
    /// Sets the reverse lookup timeout.
    pub fn set_lookup_timeout(&mut self, lookup_timeout: Duration) {
        self.lookup_timeout = lookup_timeout;
    }
    /// Sets how many reverse lookups may run at once.
    pub fn set_lookup_workers(&mut self, lookup_workers: usize) {
        self.lookup_workers = lookup_workers;
    }
    /// Forces a strategy instead of selecting one for the platform.
    pub fn set_strategy(&mut self, strategy: Option<Strategy>) {
        self.strategy = strategy;
    }
    /// Returns the forced strategy, if any.
    pub fn get_strategy(&self) -> Option<Strategy> {
        self.strategy
    }
    /// Overrides the detected platform.
    pub fn set_platform(&mut self, platform: Platform) {
        self.platform = platform;
    }
    /// Returns a receiver for per-hop progress events.
    pub fn get_progress_receiver(&self) -> broadcast::Receiver<HopRecord> {
        self.progress_tx.subscribe()
    }
    /// Returns a token that cancels traces run by this tracer.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
