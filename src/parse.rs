//! Token-level helpers shared by the tool output grammars.

use std::net::IpAddr;

/// Hop number leading a line's tokens.
pub(crate) fn leading_hop(tokens: &[&str]) -> Option<u8> {
    tokens
        .first()
        .and_then(|t| t.parse::<u8>().ok())
        .filter(|hop| *hop > 0)
}

/// Parses an address token, accepting `[addr]`, `(addr)` and a trailing `:`.
pub(crate) fn parse_addr(token: &str) -> Option<IpAddr> {
    let token = token.trim_matches(|c| matches!(c, '[' | ']' | '(' | ')' | ','));
    token
        .parse::<IpAddr>()
        .ok()
        .or_else(|| token.strip_suffix(':').and_then(|t| t.parse::<IpAddr>().ok()))
}

/// First address among `tokens`.
pub(crate) fn first_address(tokens: &[&str]) -> Option<IpAddr> {
    tokens.iter().find_map(|t| parse_addr(t))
}

/// Every latency reported as `12 ms`, `<1 ms`, `12ms` or `0.512 ms`.
pub(crate) fn latencies(tokens: &[&str]) -> Vec<f64> {
    let mut samples = vec![];
    for (i, token) in tokens.iter().enumerate() {
        let value = if token.eq_ignore_ascii_case("ms") {
            match i.checked_sub(1) {
                Some(prev) => parse_ms(tokens[prev]),
                None => None,
            }
        } else {
            token.strip_suffix("ms").and_then(parse_ms)
        };
        if let Some(value) = value {
            samples.push(value);
        }
    }
    samples
}

fn parse_ms(value: &str) -> Option<f64> {
    value
        .trim_start_matches('<')
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}
