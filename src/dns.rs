use crate::error::{Error, Result};
use std::io;
use std::net::IpAddr;
use std::time::Duration;

/// Resolves `host` to one address, preferring IPv4.
///
/// Literal addresses are returned as is without touching the resolver.
pub fn resolve_host(host: &str) -> Result<IpAddr> {
    let host = host.trim();
    if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        return Ok(ip);
    }
    if host.is_empty() {
        return Err(Error::Resolution {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty host name"),
        });
    }
    let addrs = dns_lookup::lookup_host(host).map_err(|e| Error::Resolution {
        host: host.to_string(),
        source: e,
    })?;
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Error::Resolution {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
        })
}

/// Async form of [`resolve_host`], run on the blocking pool.
pub async fn resolve_host_async(host: &str) -> Result<IpAddr> {
    let owned = host.to_string();
    tokio::task::spawn_blocking(move || resolve_host(&owned))
        .await
        .map_err(|e| Error::Resolution {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::Other, e.to_string()),
        })?
}

/// Outcome of a reverse lookup.
#[derive(Debug)]
pub enum ReverseLookup {
    /// The address has a name
    Name(String),
    /// The resolver answered but only echoed the address back
    NoName,
    /// The resolver reported an error
    Failed(io::Error),
    /// No answer within the lookup timeout
    TimedOut,
}

/// Reverse lookup of `ip_addr` bounded by `timeout`.
pub async fn reverse_lookup(ip_addr: IpAddr, timeout: Duration) -> ReverseLookup {
    bounded_lookup(ip_addr, timeout, |ip| dns_lookup::lookup_addr(ip)).await
}

// Runs a blocking resolver call on the blocking pool under `timeout`.
async fn bounded_lookup<F>(ip_addr: IpAddr, timeout: Duration, lookup: F) -> ReverseLookup
where
    F: FnOnce(&IpAddr) -> io::Result<String> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || lookup(&ip_addr));
    match tokio::time::timeout(timeout, task).await {
        Err(_) => ReverseLookup::TimedOut,
        Ok(Err(e)) => ReverseLookup::Failed(io::Error::new(io::ErrorKind::Other, e.to_string())),
        Ok(Ok(Err(e))) => ReverseLookup::Failed(e),
        Ok(Ok(Ok(name))) => classify_name(ip_addr, &name),
    }
}

// getnameinfo hands back the numeric form when there is no PTR record.
fn classify_name(ip_addr: IpAddr, name: &str) -> ReverseLookup {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() || name.parse::<IpAddr>().is_ok() || name == ip_addr.to_string() {
        ReverseLookup::NoName
    } else {
        ReverseLookup::Name(name.to_string())
    }
}
