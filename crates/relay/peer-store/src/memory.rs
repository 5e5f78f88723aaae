//! In-memory peer store (does not persist across restarts).

use std::collections::HashMap;
use std::time::Duration;

use libp2p::{Multiaddr, PeerId, StreamProtocol};
use parking_lot::RwLock;
use relaymesh_relay_primitives::{ExtendedRecord, Origin};
use tracing::trace;
use web_time::Instant;

use crate::{AddressEntry, PeerRecord, PeerRecordStore, PeerStoreError};

#[derive(Debug, Default)]
pub struct MemoryPeerStore {
    peers: RwLock<HashMap<PeerId, PeerRecord>>,
}

impl MemoryPeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    fn upsert<R>(&self, peer_id: PeerId, f: impl FnOnce(&mut PeerRecord) -> R) -> R {
        let mut peers = self.peers.write();
        let record = peers
            .entry(peer_id)
            .or_insert_with(|| PeerRecord::new(peer_id));
        f(record)
    }

    fn read<R>(&self, peer_id: &PeerId, f: impl FnOnce(&PeerRecord) -> R) -> Option<R> {
        self.peers.read().get(peer_id).map(f)
    }
}

impl PeerRecordStore for MemoryPeerStore {
    fn add_addrs(
        &self,
        peer_id: PeerId,
        addrs: &[Multiaddr],
        ttl: Duration,
    ) -> Result<(), PeerStoreError> {
        let expires_at = Instant::now() + ttl;
        self.upsert(peer_id, |record| {
            for addr in addrs {
                match record.addrs.iter_mut().find(|entry| &entry.addr == addr) {
                    Some(entry) => entry.expires_at = entry.expires_at.max(expires_at),
                    None => record.addrs.push(AddressEntry {
                        addr: addr.clone(),
                        expires_at,
                    }),
                }
            }
        });
        Ok(())
    }

    fn addrs(&self, peer_id: &PeerId) -> Result<Vec<Multiaddr>, PeerStoreError> {
        let now = Instant::now();
        Ok(self
            .read(peer_id, |record| record.live_addrs(now).cloned().collect())
            .unwrap_or_default())
    }

    fn remove_peer(&self, peer_id: &PeerId) -> Result<(), PeerStoreError> {
        if self.peers.write().remove(peer_id).is_some() {
            trace!(%peer_id, "peer record removed");
        }
        Ok(())
    }

    fn add_protocols(
        &self,
        peer_id: PeerId,
        protocols: &[StreamProtocol],
    ) -> Result<(), PeerStoreError> {
        self.upsert(peer_id, |record| {
            for protocol in protocols {
                if !record.protocols.contains(protocol) {
                    record.protocols.push(protocol.clone());
                }
            }
        });
        Ok(())
    }

    fn protocols(&self, peer_id: &PeerId) -> Result<Vec<StreamProtocol>, PeerStoreError> {
        Ok(self
            .read(peer_id, |record| record.protocols.clone())
            .unwrap_or_default())
    }

    fn set_origin(&self, peer_id: PeerId, origin: Origin) -> Result<(), PeerStoreError> {
        self.upsert(peer_id, |record| record.origin = origin);
        Ok(())
    }

    fn origin(&self, peer_id: &PeerId) -> Result<Origin, PeerStoreError> {
        Ok(self.read(peer_id, |record| record.origin).unwrap_or_default())
    }

    fn set_extended_record(
        &self,
        peer_id: PeerId,
        record: ExtendedRecord,
    ) -> Result<(), PeerStoreError> {
        self.upsert(peer_id, |stored| match &stored.extended_record {
            Some(current) if current.seq() > record.seq() => {
                trace!(%peer_id, current = current.seq(), stale = record.seq(), "ignoring stale record");
            }
            _ => stored.extended_record = Some(record),
        });
        Ok(())
    }

    fn extended_record(&self, peer_id: &PeerId) -> Result<Option<ExtendedRecord>, PeerStoreError> {
        Ok(self
            .read(peer_id, |record| record.extended_record.clone())
            .flatten())
    }

    fn peers(&self) -> Result<Vec<PeerId>, PeerStoreError> {
        Ok(self.peers.read().keys().copied().collect())
    }

    fn get(&self, peer_id: &PeerId) -> Result<Option<PeerRecord>, PeerStoreError> {
        Ok(self.peers.read().get(peer_id).cloned())
    }
}
