use crate::error::{Error, Result};
use crate::sys::Platform;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported route discovery strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Windows `tracert`.
    WindowsNative,
    /// Unix `traceroute`, falling back to the TTL sweep when it is missing.
    UnixNative,
    /// One `ping` per TTL.
    TtlSweep,
}

impl Strategy {
    /// Picks the strategy for a platform.
    pub fn select(platform: &Platform) -> Result<Strategy> {
        match platform {
            Platform::Windows => Ok(Strategy::WindowsNative),
            Platform::Linux | Platform::MacOs => Ok(Strategy::UnixNative),
            Platform::Other(os) => Err(Error::UnsupportedPlatform(os.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::WindowsNative => "windows",
            Strategy::UnixNative => "unix",
            Strategy::TtlSweep => "sweep",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Strategy> {
        match s.to_ascii_lowercase().as_str() {
            "windows" | "tracert" => Ok(Strategy::WindowsNative),
            "unix" | "traceroute" => Ok(Strategy::UnixNative),
            "sweep" | "ping" => Ok(Strategy::TtlSweep),
            other => Err(Error::InvalidRequest(format!("unknown strategy `{}`", other))),
        }
    }
}
