use libp2p::{Multiaddr, StreamProtocol};
use relaymesh_relay_peer_store::PeerStoreError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address {0} does not end with a /p2p/<peer id> component")]
    MissingPeerId(Multiaddr),
}

#[derive(Debug, thiserror::Error)]
pub enum PeerManagerError {
    #[error("max_connections must be positive")]
    InvalidMaxConnections,
    #[error("invalid peer address: {0}")]
    Address(#[from] AddressError),
    #[error("peer store error: {0}")]
    Store(#[from] PeerStoreError),
    #[error("no peer found supporting {0}")]
    NotFound(StreamProtocol),
}
