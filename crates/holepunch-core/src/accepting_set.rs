//! Concurrent dedup guard for in-flight SyncOpen attempts (I2) and the
//! single-admission-per-peer window described in §4.7.

use crate::peer::Peer;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct AcceptingSet {
    inner: Arc<DashMap<Peer, Instant>>,
}

impl AcceptingSet {
    pub fn new() -> Self {
        Self { inner: Arc::new(DashMap::new()) }
    }

    /// Atomically inserts `peer` with an expiry of `now + window` if it is
    /// absent. Returns `true` iff this call won admission — the only
    /// caller that should proceed to launch a SyncOpen attempt.
    pub fn try_admit(&self, peer: Peer, window: Duration) -> bool {
        match self.inner.entry(peer) {
            Entry::Vacant(slot) => {
                slot.insert(Instant::now() + window);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Removes `peer` regardless of whether its window has elapsed —
    /// called once a SyncOpen attempt for it has concluded (success,
    /// timeout, or error) so a later sighting can be admitted again.
    pub fn release(&self, peer: &Peer) {
        self.inner.remove(peer);
    }
}

impl Default for AcceptingSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn second_sighting_within_window_is_rejected(/* P4 */) {
        let set = AcceptingSet::new();
        let peer = Peer::new(Ipv4Addr::new(203, 0, 113, 7));
        assert!(set.try_admit(peer, Duration::from_secs(60)));
        assert!(!set.try_admit(peer, Duration::from_secs(60)));
    }

    #[test]
    fn release_allows_a_later_sighting_to_be_readmitted() {
        let set = AcceptingSet::new();
        let peer = Peer::new(Ipv4Addr::new(203, 0, 113, 7));
        assert!(set.try_admit(peer, Duration::from_secs(60)));
        set.release(&peer);
        assert!(set.try_admit(peer, Duration::from_secs(60)));
    }

    #[test]
    fn distinct_peers_are_independent() {
        let set = AcceptingSet::new();
        let a = Peer::new(Ipv4Addr::new(203, 0, 113, 7));
        let b = Peer::new(Ipv4Addr::new(203, 0, 113, 8));
        assert!(set.try_admit(a, Duration::from_secs(60)));
        assert!(set.try_admit(b, Duration::from_secs(60)));
    }
}
