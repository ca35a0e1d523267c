//! Cross-platform port checks and route tracing.
//!
//! Route discovery drives the operating system's own utilities: `tracert` on
//! Windows, `traceroute` on Linux and macOS, and a TTL sweep over `ping` when
//! `traceroute` is not installed. Every strategy yields the same ordered list
//! of [`HopRecord`]s.
//!
//! ```no_run
//! use socketpeek::trace::Tracer;
//!
//! let tracer = Tracer::new("example.com");
//! let result = tracer.trace().unwrap();
//! for hop in &result.hops {
//!     println!("{} {:?} {:?}", hop.hop_index, hop.ip_addr, hop.rtt_ms);
//! }
//! ```

pub mod check;
pub mod dns;
pub mod error;
pub mod node;
pub mod output;
pub(crate) mod parse;
pub mod ping;
pub(crate) mod process;
pub mod strategy;
pub mod sys;
pub mod trace;

pub use check::{CloseReason, PortStatus};
pub use error::{Error, Result};
pub use node::{HopError, HopRecord};
pub use strategy::Strategy;
pub use trace::{FailureKind, TraceResult, TraceStatus, Tracer};
