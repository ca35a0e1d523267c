use super::{RawTrace, TraceContext, TraceStatus};
use crate::error::{Error, Result};
use crate::node::HopRecord;
use crate::parse::leading_hop;
use crate::process::{read_line, ToolProcess};
use crate::strategy::Strategy;
use crate::sys;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tracing::{debug, warn};

/// Line grammar of one native tracing utility.
pub(crate) trait HopGrammar {
    /// Parses one output line. Lines that carry no hop yield `None`.
    fn parse_line(&mut self, line: &str) -> Option<HopRecord>;
}

/// Hops read from a tool's output.
#[derive(Debug)]
pub(crate) struct Collected {
    pub hops: Vec<HopRecord>,
    pub interrupted: Option<TraceStatus>,
}

/// Launches `program`, parses its output with `grammar` and reaps it.
pub(crate) async fn run_tool<G: HopGrammar>(
    ctx: &TraceContext<'_>,
    program: &str,
    args: &[String],
    mut grammar: G,
    strategy: Strategy,
) -> Result<RawTrace> {
    let mut tool = ToolProcess::spawn(program, args)?;
    let collected = match read_hops(tool.stdout(), &mut grammar, ctx).await {
        Ok(collected) => collected,
        Err(e) => {
            tool.kill().await;
            return Err(Error::ProcessFailed {
                program: program.to_string(),
                detail: e.to_string(),
            });
        }
    };
    if collected.interrupted.is_some() {
        tool.kill().await;
        return Ok(RawTrace {
            hops: collected.hops,
            interrupted: collected.interrupted,
            strategy,
        });
    }

    let program = tool.program().to_string();
    let (status, stderr) = match ctx.guard(tool.finish()).await {
        Ok(Ok(finished)) => finished,
        Ok(Err(e)) if collected.hops.is_empty() => {
            return Err(Error::ProcessFailed {
                program,
                detail: e.to_string(),
            });
        }
        Ok(Err(e)) => {
            warn!(%program, error = %e, "could not reap tool, keeping parsed hops");
            return Ok(RawTrace {
                hops: collected.hops,
                interrupted: None,
                strategy,
            });
        }
        Err(status) => {
            debug!(%program, ?status, "stopped while waiting for tool exit");
            return Ok(RawTrace {
                hops: collected.hops,
                interrupted: Some(status),
                strategy,
            });
        }
    };
    finish_trace(program, status, stderr, collected.hops, strategy)
}

// Applies the exit status: a failing tool that printed no hop fails the trace.
fn finish_trace(
    program: String,
    status: ExitStatus,
    stderr: String,
    hops: Vec<HopRecord>,
    strategy: Strategy,
) -> Result<RawTrace> {
    if !status.success() {
        if hops.is_empty() {
            let detail = if stderr.is_empty() {
                status.to_string()
            } else {
                format!("{} ({})", stderr, status)
            };
            return Err(Error::ProcessFailed { program, detail });
        }
        debug!(%program, %status, %stderr, "tool exited unsuccessfully after reporting hops");
    }
    Ok(RawTrace {
        hops,
        interrupted: None,
        strategy,
    })
}

/// Reads hop lines until end of output, cancellation, the trace deadline, or
/// a stall longer than the tool could legitimately take for one hop.
pub(crate) async fn read_hops<R, G>(
    reader: &mut R,
    grammar: &mut G,
    ctx: &TraceContext<'_>,
) -> io::Result<Collected>
where
    R: AsyncBufRead + Unpin,
    G: HopGrammar,
{
    let stall = stall_timeout(ctx.request.timeout);
    let mut hops: Vec<HopRecord> = vec![];
    let mut buf: Vec<u8> = vec![];
    loop {
        let line = match ctx.guard(tokio::time::timeout(stall, read_line(reader, &mut buf))).await {
            Ok(Ok(line)) => line?,
            Ok(Err(_)) => {
                warn!(?stall, "tracing tool stalled, stopping");
                return Ok(Collected {
                    hops,
                    interrupted: Some(TraceStatus::Timeout),
                });
            }
            Err(status) => {
                return Ok(Collected {
                    hops,
                    interrupted: Some(status),
                });
            }
        };
        let Some(line) = line else { break };
        debug!(%line, "tool output");
        if let Some(hop) = grammar.parse_line(&line) {
            ctx.report(&hop);
            hops.push(hop);
        }
    }
    Ok(Collected {
        hops,
        interrupted: None,
    })
}

// Three probes per hop, plus slack for the tool's own start-up.
fn stall_timeout(timeout: Duration) -> Duration {
    Duration::from_secs(sys::whole_secs(timeout)) * 3 + Duration::from_secs(5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::HopError;
    use crate::trace::TestTrace;
    use std::net::{IpAddr, Ipv4Addr};

    struct EveryNumberedLine;

    impl HopGrammar for EveryNumberedLine {
        fn parse_line(&mut self, line: &str) -> Option<HopRecord> {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let hop = leading_hop(&tokens)?;
            Some(HopRecord::missing(hop, HopError::NoResponse))
        }
    }

    #[tokio::test]
    async fn test_read_hops_until_eof() {
        let fixture = TestTrace::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)), 30);
        let ctx = fixture.context();
        let mut progress = fixture.progress_tx.subscribe();
        let mut reader: &[u8] = b"header\n 1 *\n noise\n 2 *\n";
        let collected = read_hops(&mut reader, &mut EveryNumberedLine, &ctx).await.unwrap();
        assert!(collected.interrupted.is_none());
        let indices: Vec<u8> = collected.hops.iter().map(|h| h.hop_index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(progress.try_recv().unwrap().hop_index, 1);
        assert_eq!(progress.try_recv().unwrap().hop_index, 2);
    }

    #[tokio::test]
    async fn test_read_hops_cancelled_keeps_partial() {
        let fixture = TestTrace::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)), 30);
        let ctx = fixture.context();
        let (client, mut server) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut server, b" 1 *\n").await.unwrap();
        let cancel = fixture.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let mut reader = tokio::io::BufReader::new(client);
        let collected = read_hops(&mut reader, &mut EveryNumberedLine, &ctx).await.unwrap();
        assert_eq!(collected.interrupted, Some(TraceStatus::Cancelled));
        assert_eq!(collected.hops.len(), 1);
        drop(server);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_while_reaping_keeps_hops() {
        let fixture = TestTrace::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)), 30);
        let ctx = fixture.context();
        let cancel = fixture.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        });
        // Closes stdout, then keeps running.
        let args = vec![String::from("-c"), String::from("echo ' 1 *'; exec 1>&-; sleep 30")];
        let raw = run_tool(&ctx, "sh", &args, EveryNumberedLine, Strategy::UnixNative)
            .await
            .unwrap();
        assert_eq!(raw.interrupted, Some(TraceStatus::Cancelled));
        assert_eq!(raw.hops.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_exit_status() {
        use std::os::unix::process::ExitStatusExt;
        let failed = ExitStatus::from_raw(2 << 8);
        let err = finish_trace(
            String::from("traceroute"),
            failed,
            String::from("traceroute: unknown host"),
            vec![],
            Strategy::UnixNative,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ProcessFailed { ref detail, .. } if detail.contains("unknown host")));
        let hop = HopRecord::missing(1, HopError::NoResponse);
        let raw = finish_trace(
            String::from("traceroute"),
            failed,
            String::new(),
            vec![hop.clone()],
            Strategy::UnixNative,
        )
        .unwrap();
        assert_eq!(raw.hops, vec![hop]);
    }

    #[test]
    fn test_stall_timeout() {
        assert_eq!(stall_timeout(Duration::from_millis(300)), Duration::from_secs(8));
        assert_eq!(stall_timeout(Duration::from_secs(2)), Duration::from_secs(11));
    }
}
