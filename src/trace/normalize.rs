use crate::dns::{self, ReverseLookup};
use crate::node::{HopError, HopRecord};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Orders hops by index, keeps the first record per index, drops index `0`
/// and fills gaps below the highest index with `no_response` records.
pub(crate) fn assemble(hops: Vec<HopRecord>) -> Vec<HopRecord> {
    let mut by_index: BTreeMap<u8, HopRecord> = BTreeMap::new();
    for mut hop in hops {
        if hop.hop_index == 0 {
            debug!(?hop, "dropping hop without an index");
            continue;
        }
        if hop.error.is_some() {
            hop.ip_addr = None;
            hop.host_name = None;
            hop.rtt_ms = None;
        }
        by_index.entry(hop.hop_index).or_insert(hop);
    }
    let last = match by_index.keys().next_back() {
        Some(last) => *last,
        None => return vec![],
    };
    (1..=last)
        .map(|index| {
            by_index
                .remove(&index)
                .unwrap_or_else(|| HopRecord::missing(index, HopError::NoResponse))
        })
        .collect()
}

/// Fills `host_name` from reverse DNS, one lookup per distinct address and at
/// most `workers` in flight. Failed lookups leave the name unset.
pub(crate) async fn resolve_names(hops: &mut [HopRecord], timeout: Duration, workers: usize) {
    resolve_names_with(hops, workers, move |ip_addr| dns::reverse_lookup(ip_addr, timeout)).await
}

async fn resolve_names_with<L, F>(hops: &mut [HopRecord], workers: usize, lookup: L)
where
    L: Fn(IpAddr) -> F,
    F: Future<Output = ReverseLookup> + Send + 'static,
{
    let mut unique: Vec<IpAddr> = vec![];
    for ip_addr in hops.iter().filter_map(|h| h.ip_addr) {
        if !unique.contains(&ip_addr) {
            unique.push(ip_addr);
        }
    }
    if unique.is_empty() {
        return;
    }

    let limit = Arc::new(Semaphore::new(workers.max(1)));
    let mut lookups: JoinSet<(IpAddr, ReverseLookup)> = JoinSet::new();
    for ip_addr in unique {
        let limit = Arc::clone(&limit);
        let pending = lookup(ip_addr);
        lookups.spawn(async move {
            let _permit = limit.acquire_owned().await;
            (ip_addr, pending.await)
        });
    }

    let mut names: HashMap<IpAddr, String> = HashMap::new();
    while let Some(joined) = lookups.join_next().await {
        let (ip_addr, lookup) = match joined {
            Ok(done) => done,
            Err(e) => {
                warn!(error = %e, "reverse lookup task failed");
                continue;
            }
        };
        match lookup {
            ReverseLookup::Name(name) => {
                names.insert(ip_addr, name);
            }
            ReverseLookup::NoName => debug!(%ip_addr, "no reverse name"),
            ReverseLookup::TimedOut => debug!(%ip_addr, "reverse lookup timed out"),
            ReverseLookup::Failed(e) => warn!(%ip_addr, error = %e, "reverse lookup failed"),
        }
    }

    for hop in hops.iter_mut() {
        if let Some(ip_addr) = hop.ip_addr {
            hop.host_name = names.get(&ip_addr).cloned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_fills_gaps() {
        let hops = assemble(vec![
            HopRecord::reply(3, ip(10, 0, 0, 3), Some(3.0)),
            HopRecord::reply(1, ip(10, 0, 0, 1), Some(1.0)),
        ]);
        let indices: Vec<u8> = hops.iter().map(|h| h.hop_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(hops[1], HopRecord::missing(2, HopError::NoResponse));
    }

    #[test]
    fn test_first_record_wins() {
        let hops = assemble(vec![
            HopRecord::reply(1, ip(10, 0, 0, 1), Some(1.0)),
            HopRecord::reply(1, ip(10, 0, 0, 9), Some(9.0)),
        ]);
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].ip_addr, Some(ip(10, 0, 0, 1)));
    }

    #[test]
    fn test_drops_index_zero() {
        let hops = assemble(vec![
            HopRecord::failure(HopError::ProcessFailed),
            HopRecord::reply(1, ip(10, 0, 0, 1), None),
        ]);
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].hop_index, 1);
        assert!(assemble(vec![HopRecord::failure(HopError::TimedOut)]).is_empty());
    }

    #[test]
    fn test_error_clears_address() {
        let mut hop = HopRecord::reply(1, ip(10, 0, 0, 1), Some(2.0));
        hop.error = Some(HopError::UnreachableHost);
        let hops = assemble(vec![hop]);
        assert_eq!(hops[0], HopRecord::missing(1, HopError::UnreachableHost));
    }

    #[tokio::test]
    async fn test_resolve_names_keeps_other_fields() {
        let mut hops = vec![
            HopRecord::reply(1, ip(127, 0, 0, 1), Some(0.2)),
            HopRecord::missing(2, HopError::TimedOut),
            HopRecord::reply(3, ip(127, 0, 0, 1), Some(0.3)),
        ];
        let before = hops.clone();
        resolve_names(&mut hops, Duration::from_secs(2), 2).await;
        for (after, before) in hops.iter().zip(before.iter()) {
            assert_eq!(after.hop_index, before.hop_index);
            assert_eq!(after.ip_addr, before.ip_addr);
            assert_eq!(after.rtt_ms, before.rtt_ms);
            assert_eq!(after.error, before.error);
        }
        assert!(hops[1].host_name.is_none());
        assert_eq!(hops[0].host_name, hops[2].host_name);
    }

    #[tokio::test]
    async fn test_failed_lookups_keep_hops() {
        let hops = vec![
            HopRecord::reply(1, ip(192, 0, 2, 1), Some(1.5)),
            HopRecord::missing(2, HopError::TimedOut),
            HopRecord::reply(3, ip(192, 0, 2, 3), None),
        ];
        for outcome in ["timed_out", "failed", "no_name"] {
            let mut resolved = hops.clone();
            resolve_names_with(&mut resolved, 4, |_| async move {
                match outcome {
                    "timed_out" => ReverseLookup::TimedOut,
                    "failed" => ReverseLookup::Failed(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "server failure",
                    )),
                    _ => ReverseLookup::NoName,
                }
            })
            .await;
            assert_eq!(resolved, hops, "{}", outcome);
        }
    }

    #[tokio::test]
    async fn test_names_follow_addresses() {
        let mut hops = vec![
            HopRecord::reply(1, ip(192, 0, 2, 1), Some(1.5)),
            HopRecord::reply(2, ip(192, 0, 2, 2), Some(2.5)),
            HopRecord::reply(3, ip(192, 0, 2, 1), Some(3.5)),
        ];
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        resolve_names_with(&mut hops, 1, move |ip_addr| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if ip_addr == ip(192, 0, 2, 1) {
                    ReverseLookup::Name(String::from("edge.example.net"))
                } else {
                    ReverseLookup::TimedOut
                }
            }
        })
        .await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(hops[0].host_name.as_deref(), Some("edge.example.net"));
        assert_eq!(hops[1].host_name, None);
        assert_eq!(hops[2].host_name.as_deref(), Some("edge.example.net"));
        assert_eq!(hops[2].rtt_ms, Some(3.5));
    }

    #[tokio::test]
    async fn test_unanswerable_lookup_leaves_name_unset() {
        let mut hops = vec![HopRecord::reply(1, ip(192, 0, 2, 1), Some(0.7))];
        resolve_names(&mut hops, Duration::from_nanos(1), 1).await;
        assert_eq!(hops[0].host_name, None);
        assert_eq!(hops[0].ip_addr, Some(ip(192, 0, 2, 1)));
        assert_eq!(hops[0].rtt_ms, Some(0.7));
        assert_eq!(hops[0].error, None);
    }

    #[tokio::test]
    async fn test_resolve_names_without_addresses() {
        let mut hops = vec![HopRecord::missing(1, HopError::NoResponse)];
        resolve_names(&mut hops, Duration::from_millis(10), 0).await;
        assert_eq!(hops, vec![HopRecord::missing(1, HopError::NoResponse)]);
    }
}
