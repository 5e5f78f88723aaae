use libp2p::{PeerId, StreamProtocol};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("peer {0} is unknown to the host")]
    UnknownPeer(PeerId),
    #[error("not connected to peer {0}")]
    NotConnected(PeerId),
    #[error("peer {peer_id} does not support protocol {protocol}")]
    UnsupportedProtocol {
        peer_id: PeerId,
        protocol: StreamProtocol,
    },
    #[error("protocol {0} already has a registered handler")]
    ProtocolAlreadyRegistered(StreamProtocol),
    #[error("cannot dial the local peer")]
    DialSelf,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// The remote is reachable but never registered the requested protocol.
    pub fn is_unsupported_protocol(&self) -> bool {
        matches!(self, Self::UnsupportedProtocol { .. })
    }
}
