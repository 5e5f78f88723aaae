//! Per-protocol service slots.

use std::collections::HashMap;

use libp2p::{PeerId, StreamProtocol};
use parking_lot::Mutex;
use relaymesh_relay_primitives::RELAY_PROTOCOL;

/// Protocol to peers known to serve it, in registration order.
///
/// Removed peers leave a tombstone so positions stay stable. Selection
/// prefers the most recently registered live peer.
#[derive(Debug, Default)]
pub struct ServiceSlots {
    slots: Mutex<HashMap<StreamProtocol, Vec<Option<PeerId>>>>,
}

impl ServiceSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `peer_id` to the slot of `protocol`. The relay protocol is
    /// never slotted; returns `false` in that case.
    pub fn add(&self, protocol: &StreamProtocol, peer_id: PeerId) -> bool {
        if *protocol == RELAY_PROTOCOL {
            return false;
        }
        self.slots
            .lock()
            .entry(protocol.clone())
            .or_default()
            .push(Some(peer_id));
        true
    }

    /// Tombstone every entry of `peer_id`. Returns how many were blanked.
    pub fn remove_peer(&self, peer_id: &PeerId) -> usize {
        let mut removed = 0;
        for entries in self.slots.lock().values_mut() {
            for entry in entries.iter_mut().filter(|e| **e == Some(*peer_id)) {
                *entry = None;
                removed += 1;
            }
        }
        removed
    }

    /// Most recently registered live peer for `protocol`.
    pub fn preferred(&self, protocol: &StreamProtocol) -> Option<PeerId> {
        self.slots
            .lock()
            .get(protocol)
            .and_then(|entries| entries.iter().rev().flatten().next().copied())
    }

    /// Live peers for `protocol` in registration order.
    pub fn peers(&self, protocol: &StreamProtocol) -> Vec<PeerId> {
        self.slots
            .lock()
            .get(protocol)
            .map(|entries| entries.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    pub fn protocols(&self) -> Vec<StreamProtocol> {
        self.slots.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: StreamProtocol = StreamProtocol::new("/vac/waku/store/2.0.0-beta4");
    const LIGHTPUSH: StreamProtocol = StreamProtocol::new("/vac/waku/lightpush/2.0.0-beta1");

    #[test]
    fn test_relay_never_slotted() {
        let slots = ServiceSlots::new();
        assert!(!slots.add(&RELAY_PROTOCOL, PeerId::random()));
        assert!(slots.protocols().is_empty());
        assert_eq!(slots.preferred(&RELAY_PROTOCOL), None);
    }

    #[test]
    fn test_latest_registration_preferred() {
        let slots = ServiceSlots::new();
        let (a, b) = (PeerId::random(), PeerId::random());

        assert!(slots.add(&STORE, a));
        assert!(slots.add(&STORE, b));
        assert_eq!(slots.preferred(&STORE), Some(b));
        assert_eq!(slots.peers(&STORE), vec![a, b]);
        assert_eq!(slots.preferred(&LIGHTPUSH), None);
    }

    #[test]
    fn test_tombstones_skipped() {
        let slots = ServiceSlots::new();
        let (a, b) = (PeerId::random(), PeerId::random());

        slots.add(&STORE, a);
        slots.add(&STORE, b);
        slots.add(&LIGHTPUSH, b);

        assert_eq!(slots.remove_peer(&b), 2);
        assert_eq!(slots.preferred(&STORE), Some(a));
        assert_eq!(slots.preferred(&LIGHTPUSH), None);
        assert_eq!(slots.peers(&STORE), vec![a]);

        // Removing again finds nothing
        assert_eq!(slots.remove_peer(&b), 0);

        // The protocol key survives with only tombstones
        assert_eq!(slots.protocols().len(), 2);
    }

    #[test]
    fn test_readded_peer_is_live_again() {
        let slots = ServiceSlots::new();
        let a = PeerId::random();

        slots.add(&STORE, a);
        slots.remove_peer(&a);
        slots.add(&STORE, a);
        assert_eq!(slots.preferred(&STORE), Some(a));
    }
}
