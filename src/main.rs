use clap::{Parser, Subcommand};
use socketpeek::check::{self, PortStatus};
use socketpeek::output;
use socketpeek::strategy::Strategy;
use socketpeek::trace::{TraceResult, Tracer};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Port checks and route tracing with the operating system's own tools.
#[derive(Parser, Debug)]
#[command(name = "socketpeek")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// More log output on stderr (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether a TCP port accepts connections.
    Check {
        /// Target hostname or IP address.
        host: String,

        /// TCP port, 1-65535.
        port: String,

        /// Connect timeout in seconds.
        #[arg(short, long, default_value = "3.0")]
        timeout: f64,
    },
    /// Trace the route to a host.
    Trace {
        /// Target hostname or IP address.
        host: String,

        /// Maximum number of hops.
        #[arg(short = 'm', long = "max-hops", default_value = "30")]
        max_hops: u8,

        /// Per-hop timeout in seconds.
        #[arg(short = 'w', long = "wait", default_value = "1.0")]
        wait: f64,

        /// Strategy (auto, windows, unix, sweep).
        #[arg(long, default_value = "auto")]
        strategy: String,

        /// Skip reverse DNS lookups.
        #[arg(long = "no-dns")]
        no_dns: bool,

        /// Overall trace deadline in seconds.
        #[arg(long = "trace-timeout", default_value = "300")]
        trace_timeout: u64,
    },
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn seconds(value: f64, what: &str) -> Result<Duration, String> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(format!("{} must be a positive number of seconds, got {}", what, value)),
    }
}

fn usage_error(message: &str) -> ExitCode {
    eprintln!("Error: {}", message);
    ExitCode::from(2)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Check { host, port, timeout } => {
            let port = match check::validate_port(&port) {
                Ok(port) => port,
                Err(e) => return usage_error(&e.to_string()),
            };
            let timeout = match seconds(timeout, "timeout") {
                Ok(timeout) => timeout,
                Err(e) => return usage_error(&e),
            };
            if !args.json {
                println!("Checking {}:{} (timeout: {:?})...", host, port, timeout);
            }
            let status = match check::check_port_async(&host, port, timeout).await {
                Ok(status) => status,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            if args.json {
                print_json(&status);
            } else {
                println!("{}", output::render_check(&host, port, &status));
            }
            match status {
                PortStatus::Open => ExitCode::SUCCESS,
                PortStatus::Closed(_) => ExitCode::FAILURE,
            }
        }
        Command::Trace {
            host,
            max_hops,
            wait,
            strategy,
            no_dns,
            trace_timeout,
        } => {
            let mut tracer = Tracer::new(&host);
            tracer.set_max_hops(max_hops);
            match seconds(wait, "wait") {
                Ok(wait) => tracer.set_receive_timeout(wait),
                Err(e) => return usage_error(&e),
            }
            if strategy != "auto" {
                match strategy.parse::<Strategy>() {
                    Ok(strategy) => tracer.set_strategy(Some(strategy)),
                    Err(e) => return usage_error(&e.to_string()),
                }
            }
            tracer.set_resolve_names(!no_dns);
            tracer.set_trace_timeout(Duration::from_secs(trace_timeout.max(1)));

            let cancel = tracer.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            if !args.json {
                let mut rx = tracer.get_progress_receiver();
                tokio::spawn(async move {
                    while let Ok(hop) = rx.recv().await {
                        tracing::info!(hop = hop.hop_index, ip = ?hop.ip_addr, rtt_ms = ?hop.rtt_ms, "hop");
                    }
                });
            }

            let result: TraceResult = match tracer.trace_async().await {
                Ok(result) => result,
                Err(e) => return usage_error(&e.to_string()),
            };
            if args.json {
                print_json(&result);
            } else {
                print!("{}", output::render_trace(&result));
            }
            if result.is_failure() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize results: {}", e),
    }
}
