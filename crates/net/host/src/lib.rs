//! Connection host abstraction.
//!
//! The host owns transport-level connections. Protocol crates and the peer
//! manager only ever see it through [`ConnectionHost`]: which peers are
//! connected and in which [`Direction`], how to close them, and how to open or
//! accept byte streams under a named protocol.
//!
//! [`MemoryNetwork`] provides an in-process implementation where every host
//! can reach every other host registered on the same network.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
pub mod memory;

pub use error::HostError;
pub use memory::{MemoryHost, MemoryNetwork};

use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite};
use libp2p::{PeerId, StreamProtocol};
use tokio::sync::{broadcast, mpsc};
use web_time::Instant;

/// A negotiated, bidirectional byte stream.
pub trait ProtocolStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ProtocolStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedStream = Box<dyn ProtocolStream>;

/// Which side initiated a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The remote dialed us.
    Inbound,
    /// We dialed the remote.
    Outbound,
}

/// An active connection as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub peer_id: PeerId,
    /// Fixed for the lifetime of the connection.
    pub direction: Direction,
    pub established_at: Instant,
}

/// Active connections split by [`Direction`].
///
/// Order within each group is the order the host reported them in.
#[derive(Debug, Clone, Default)]
pub struct PeersByDirection {
    pub inbound: Vec<ConnectionInfo>,
    pub outbound: Vec<ConnectionInfo>,
}

impl PeersByDirection {
    pub fn from_connections(connections: impl IntoIterator<Item = ConnectionInfo>) -> Self {
        let (inbound, outbound) = connections
            .into_iter()
            .partition(|c| c.direction == Direction::Inbound);
        Self { inbound, outbound }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Established {
        peer_id: PeerId,
        direction: Direction,
    },
    Closed {
        peer_id: PeerId,
    },
}

/// Streams opened by remote peers under a protocol registered with
/// [`ConnectionHost::accept`].
///
/// Dropping this unregisters the protocol: later `open_stream` calls from
/// remotes fail with [`HostError::UnsupportedProtocol`].
#[derive(Debug)]
pub struct IncomingStreams {
    rx: mpsc::Receiver<(PeerId, BoxedStream)>,
}

impl IncomingStreams {
    pub fn new(rx: mpsc::Receiver<(PeerId, BoxedStream)>) -> Self {
        Self { rx }
    }

    /// Next inbound stream, or `None` once the host is gone.
    pub async fn next(&mut self) -> Option<(PeerId, BoxedStream)> {
        self.rx.recv().await
    }
}

/// Capabilities consumed from the transport layer.
///
/// Implementations are shared between concurrently running tasks. Closing a
/// peer that is not connected is a no-op, never an error.
#[async_trait]
pub trait ConnectionHost: Send + Sync {
    fn local_peer_id(&self) -> PeerId;

    /// All active connections.
    fn connections(&self) -> Vec<ConnectionInfo>;

    fn peers_by_direction(&self) -> PeersByDirection {
        PeersByDirection::from_connections(self.connections())
    }

    fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.connections().iter().any(|c| &c.peer_id == peer_id)
    }

    /// Protocols a connected peer advertises. Empty for unknown or
    /// disconnected peers.
    fn peer_protocols(&self, peer_id: &PeerId) -> Vec<StreamProtocol>;

    /// Connect to a peer. Dialing an already connected peer succeeds.
    async fn dial(&self, peer_id: PeerId) -> Result<(), HostError>;

    async fn close_peer(&self, peer_id: &PeerId) -> Result<(), HostError>;

    async fn open_stream(
        &self,
        peer_id: PeerId,
        protocol: StreamProtocol,
    ) -> Result<BoxedStream, HostError>;

    /// Register a handler for inbound streams of `protocol`.
    fn accept(&self, protocol: StreamProtocol) -> Result<IncomingStreams, HostError>;

    /// Subscribe to connection lifecycle events from this point on.
    fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent>;
}
