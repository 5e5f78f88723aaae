//! Peer record storage.
//!
//! A [`PeerRecordStore`] is the address book of a relay node: where a peer can
//! be reached, how it was learned, which protocols it speaks and the last
//! extended record it published. Connection state is not stored here; that
//! belongs to the connection host.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod memory;

pub use memory::MemoryPeerStore;

use std::time::Duration;

use auto_impl::auto_impl;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use relaymesh_relay_primitives::{ExtendedRecord, Origin};
use thiserror::Error;
use web_time::Instant;

#[derive(Debug, Error)]
pub enum PeerStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// An address together with the instant it stops being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub addr: Multiaddr,
    pub expires_at: Instant,
}

/// Everything the store knows about one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub addrs: Vec<AddressEntry>,
    pub origin: Origin,
    pub protocols: Vec<StreamProtocol>,
    pub extended_record: Option<ExtendedRecord>,
}

impl PeerRecord {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            addrs: Vec::new(),
            origin: Origin::Unknown,
            protocols: Vec::new(),
            extended_record: None,
        }
    }

    /// Addresses that have not expired at `now`.
    pub fn live_addrs(&self, now: Instant) -> impl Iterator<Item = &Multiaddr> + '_ {
        self.addrs
            .iter()
            .filter(move |entry| entry.expires_at > now)
            .map(|entry| &entry.addr)
    }

    pub fn supports(&self, protocol: &StreamProtocol) -> bool {
        self.protocols.contains(protocol)
    }
}

/// Peer address book with auto-impl for &, Box, Arc.
///
/// Every write is an upsert: the first write for an unknown peer creates its
/// record. Removing an unknown peer is a no-op.
#[auto_impl(&, Box, Arc)]
pub trait PeerRecordStore: Send + Sync {
    /// Add addresses valid for `ttl`. Re-adding a known address extends its
    /// expiry, never shortens it.
    fn add_addrs(
        &self,
        peer_id: PeerId,
        addrs: &[Multiaddr],
        ttl: Duration,
    ) -> Result<(), PeerStoreError>;

    /// Unexpired addresses.
    fn addrs(&self, peer_id: &PeerId) -> Result<Vec<Multiaddr>, PeerStoreError>;

    fn remove_peer(&self, peer_id: &PeerId) -> Result<(), PeerStoreError>;

    fn add_protocols(
        &self,
        peer_id: PeerId,
        protocols: &[StreamProtocol],
    ) -> Result<(), PeerStoreError>;

    fn protocols(&self, peer_id: &PeerId) -> Result<Vec<StreamProtocol>, PeerStoreError>;

    fn supports_protocol(
        &self,
        peer_id: &PeerId,
        protocol: &StreamProtocol,
    ) -> Result<bool, PeerStoreError> {
        Ok(self.protocols(peer_id)?.contains(protocol))
    }

    /// Last write wins.
    fn set_origin(&self, peer_id: PeerId, origin: Origin) -> Result<(), PeerStoreError>;

    /// [`Origin::Unknown`] for peers never seen.
    fn origin(&self, peer_id: &PeerId) -> Result<Origin, PeerStoreError>;

    /// Store a peer's extended record unless a newer one (higher `seq`) is
    /// already stored.
    fn set_extended_record(
        &self,
        peer_id: PeerId,
        record: ExtendedRecord,
    ) -> Result<(), PeerStoreError>;

    fn extended_record(&self, peer_id: &PeerId) -> Result<Option<ExtendedRecord>, PeerStoreError>;

    fn peers(&self) -> Result<Vec<PeerId>, PeerStoreError>;

    fn get(&self, peer_id: &PeerId) -> Result<Option<PeerRecord>, PeerStoreError>;

    fn contains(&self, peer_id: &PeerId) -> Result<bool, PeerStoreError> {
        Ok(self.get(peer_id)?.is_some())
    }
}
