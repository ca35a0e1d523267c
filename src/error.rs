use crate::node::HopError;
use std::io;
use thiserror::Error;

/// Errors raised by the tracer and the connectivity check.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid trace request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidPort(String),

    #[error("could not resolve host {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("no route tracing strategy for platform `{0}`")]
    UnsupportedPlatform(String),

    #[error("`{program}` was not found on this system")]
    ToolNotFound { program: String },

    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` failed: {detail}")]
    ProcessFailed { program: String, detail: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Sentinel hop error used when this error aborts a whole trace.
    pub fn hop_error(&self) -> HopError {
        match self {
            Error::Resolution { .. } => HopError::ResolutionFailed,
            Error::UnsupportedPlatform(_) => HopError::UnsupportedPlatform,
            _ => HopError::ProcessFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
