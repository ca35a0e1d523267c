use super::{RawTrace, TraceContext};
use crate::error::Result;
use crate::node::{HopError, HopRecord};
use crate::ping::{EchoReply, Pinger};
use crate::strategy::Strategy;
use tracing::debug;

/// Sends one echo limited to a TTL.
pub(crate) trait EchoProbe {
    async fn probe(&self, ttl: u8) -> Result<EchoReply>;
}

/// Discovers the path by pinging with TTL 1, 2, ... up to the hop limit.
pub(crate) async fn trace_route(ctx: &TraceContext<'_>) -> Result<RawTrace> {
    let pinger = Pinger {
        platform: ctx.platform.clone(),
        dst_ip: ctx.dst_ip,
        receive_timeout: ctx.request.timeout,
    };
    sweep(&pinger, ctx).await
}

pub(crate) async fn sweep<P: EchoProbe>(prober: &P, ctx: &TraceContext<'_>) -> Result<RawTrace> {
    let mut hops: Vec<HopRecord> = vec![];
    for ttl in 1..=ctx.request.max_hops {
        let reply = match ctx.guard(prober.probe(ttl)).await {
            Ok(reply) => reply?,
            Err(status) => {
                return Ok(RawTrace {
                    hops,
                    interrupted: Some(status),
                    strategy: Strategy::TtlSweep,
                });
            }
        };
        debug!(ttl, ?reply, "sweep probe");
        let (hop, last) = match reply {
            EchoReply::Echo { from, rtt_ms } => {
                (HopRecord::reply(ttl, from, rtt_ms), from == ctx.dst_ip)
            }
            EchoReply::TtlExceeded { from } => {
                (HopRecord::reply(ttl, from, None), from == ctx.dst_ip)
            }
            EchoReply::Unreachable { .. } => {
                (HopRecord::missing(ttl, HopError::UnreachableHost), false)
            }
            EchoReply::NoReply => (HopRecord::missing(ttl, HopError::TimedOut), false),
        };
        ctx.report(&hop);
        hops.push(hop);
        if last {
            break;
        }
    }
    Ok(RawTrace {
        hops,
        interrupted: None,
        strategy: Strategy::TtlSweep,
    })
}
