//! In-process connection host.
//!
//! Every [`MemoryHost`] created from the same [`MemoryNetwork`] can dial every
//! other one. Streams are in-memory duplex pipes, so protocol code runs exactly
//! as it would over a real transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId, StreamProtocol, identity::Keypair};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{debug, trace};
use web_time::Instant;

use crate::{
    BoxedStream, ConnectionEvent, ConnectionHost, ConnectionInfo, Direction, HostError,
    IncomingStreams,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const INCOMING_STREAM_CAPACITY: usize = 32;
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

type StreamSender = mpsc::Sender<(PeerId, BoxedStream)>;

/// Registry of in-memory hosts that can reach each other.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

#[derive(Default)]
struct NetworkInner {
    hosts: RwLock<HashMap<PeerId, Arc<HostState>>>,
    /// Serializes changes that touch both ends of a connection.
    topology: Mutex<()>,
    next_port: AtomicU64,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host with a fresh ed25519 identity.
    pub fn add_host(&self) -> MemoryHost {
        self.add_host_with_keypair(&Keypair::generate_ed25519())
    }

    pub fn add_host_with_keypair(&self, keypair: &Keypair) -> MemoryHost {
        let peer_id = keypair.public().to_peer_id();
        let port = self.inner.next_port.fetch_add(1, Ordering::Relaxed) + 1;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let state = Arc::new(HostState {
            peer_id,
            listen_addr: Multiaddr::empty().with(Protocol::Memory(port)),
            connections: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            events,
        });
        self.inner.hosts.write().insert(peer_id, Arc::clone(&state));
        debug!(%peer_id, port, "memory host added");

        MemoryHost {
            state,
            network: self.clone(),
        }
    }

    fn host(&self, peer_id: &PeerId) -> Option<Arc<HostState>> {
        self.inner.hosts.read().get(peer_id).map(Arc::clone)
    }
}

struct HostState {
    peer_id: PeerId,
    listen_addr: Multiaddr,
    connections: Mutex<HashMap<PeerId, ConnectionInfo>>,
    handlers: Mutex<HashMap<StreamProtocol, StreamSender>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl HostState {
    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn protocols(&self) -> Vec<StreamProtocol> {
        self.handlers
            .lock()
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(protocol, _)| protocol.clone())
            .collect()
    }

    fn handler(&self, protocol: &StreamProtocol) -> Option<StreamSender> {
        self.handlers
            .lock()
            .get(protocol)
            .filter(|tx| !tx.is_closed())
            .cloned()
    }
}

/// A host on a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryHost {
    state: Arc<HostState>,
    network: MemoryNetwork,
}

impl MemoryHost {
    /// Full dialable address including the `/p2p/` suffix.
    pub fn listen_addr(&self) -> Multiaddr {
        self.state
            .listen_addr
            .clone()
            .with(Protocol::P2p(self.state.peer_id))
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.state.connections.lock().keys().copied().collect()
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("peer_id", &self.state.peer_id)
            .field("listen_addr", &self.state.listen_addr)
            .finish()
    }
}

#[async_trait]
impl ConnectionHost for MemoryHost {
    fn local_peer_id(&self) -> PeerId {
        self.state.peer_id
    }

    fn connections(&self) -> Vec<ConnectionInfo> {
        self.state.connections.lock().values().cloned().collect()
    }

    fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.state.connections.lock().contains_key(peer_id)
    }

    fn peer_protocols(&self, peer_id: &PeerId) -> Vec<StreamProtocol> {
        if !self.is_connected(peer_id) {
            return Vec::new();
        }
        self.network
            .host(peer_id)
            .map(|remote| remote.protocols())
            .unwrap_or_default()
    }

    async fn dial(&self, peer_id: PeerId) -> Result<(), HostError> {
        let local = self.state.peer_id;
        if peer_id == local {
            return Err(HostError::DialSelf);
        }
        let remote = self
            .network
            .host(&peer_id)
            .ok_or(HostError::UnknownPeer(peer_id))?;

        {
            let _topology = self.network.inner.topology.lock();
            if self.state.connections.lock().contains_key(&peer_id) {
                trace!(%peer_id, "already connected");
                return Ok(());
            }

            let established_at = Instant::now();
            self.state.connections.lock().insert(
                peer_id,
                ConnectionInfo {
                    peer_id,
                    direction: Direction::Outbound,
                    established_at,
                },
            );
            remote.connections.lock().insert(
                local,
                ConnectionInfo {
                    peer_id: local,
                    direction: Direction::Inbound,
                    established_at,
                },
            );
        }

        debug!(%local, %peer_id, "connection established");
        self.state.emit(ConnectionEvent::Established {
            peer_id,
            direction: Direction::Outbound,
        });
        remote.emit(ConnectionEvent::Established {
            peer_id: local,
            direction: Direction::Inbound,
        });
        Ok(())
    }

    async fn close_peer(&self, peer_id: &PeerId) -> Result<(), HostError> {
        let local = self.state.peer_id;
        let remote = self.network.host(peer_id);

        let (closed_local, closed_remote) = {
            let _topology = self.network.inner.topology.lock();
            let closed_local = self.state.connections.lock().remove(peer_id).is_some();
            let closed_remote = remote
                .as_ref()
                .is_some_and(|r| r.connections.lock().remove(&local).is_some());
            (closed_local, closed_remote)
        };

        if closed_local {
            debug!(%local, %peer_id, "connection closed");
            self.state.emit(ConnectionEvent::Closed { peer_id: *peer_id });
        }
        if let (true, Some(remote)) = (closed_remote, remote) {
            remote.emit(ConnectionEvent::Closed { peer_id: local });
        }
        Ok(())
    }

    async fn open_stream(
        &self,
        peer_id: PeerId,
        protocol: StreamProtocol,
    ) -> Result<BoxedStream, HostError> {
        if !self.is_connected(&peer_id) {
            return Err(HostError::NotConnected(peer_id));
        }
        let remote = self
            .network
            .host(&peer_id)
            .ok_or(HostError::UnknownPeer(peer_id))?;
        let unsupported = || HostError::UnsupportedProtocol {
            peer_id,
            protocol: protocol.clone(),
        };
        let handler = remote.handler(&protocol).ok_or_else(unsupported)?;

        let (ours, theirs) = tokio::io::duplex(STREAM_BUFFER_SIZE);
        handler
            .send((self.state.peer_id, Box::new(theirs.compat())))
            .await
            .map_err(|_| unsupported())?;

        trace!(%peer_id, %protocol, "stream opened");
        Ok(Box::new(ours.compat()))
    }

    fn accept(&self, protocol: StreamProtocol) -> Result<IncomingStreams, HostError> {
        let mut handlers = self.state.handlers.lock();
        if handlers.get(&protocol).is_some_and(|tx| !tx.is_closed()) {
            return Err(HostError::ProtocolAlreadyRegistered(protocol));
        }
        let (tx, rx) = mpsc::channel(INCOMING_STREAM_CAPACITY);
        handlers.insert(protocol, tx);
        Ok(IncomingStreams::new(rx))
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.state.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use futures::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    const TEST_PROTOCOL: StreamProtocol = StreamProtocol::new("/test/echo/1.0.0");

    #[tokio::test]
    async fn test_dial_assigns_directions() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();

        a.dial(b.local_peer_id()).await.unwrap();

        let a_view = a.peers_by_direction();
        assert_eq!(a_view.outbound.len(), 1);
        assert!(a_view.inbound.is_empty());
        assert_eq!(a_view.outbound[0].peer_id, b.local_peer_id());

        let b_view = b.peers_by_direction();
        assert_eq!(b_view.inbound.len(), 1);
        assert!(b_view.outbound.is_empty());
        assert_eq!(b_view.inbound[0].peer_id, a.local_peer_id());

        // Redial is a no-op and keeps the original direction
        b.dial(a.local_peer_id()).await.unwrap();
        assert_eq!(b.peers_by_direction().inbound.len(), 1);
        assert!(b.peers_by_direction().outbound.is_empty());
    }

    #[tokio::test]
    async fn test_dial_errors() {
        let network = MemoryNetwork::new();
        let a = network.add_host();

        assert_matches!(a.dial(a.local_peer_id()).await, Err(HostError::DialSelf));
        let stranger = PeerId::random();
        assert_matches!(a.dial(stranger).await, Err(HostError::UnknownPeer(p)) if p == stranger);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_emits_events() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let mut b_events = b.connection_events();

        a.dial(b.local_peer_id()).await.unwrap();
        assert_eq!(
            b_events.recv().await.unwrap(),
            ConnectionEvent::Established {
                peer_id: a.local_peer_id(),
                direction: Direction::Inbound,
            }
        );

        a.close_peer(&b.local_peer_id()).await.unwrap();
        a.close_peer(&b.local_peer_id()).await.unwrap();
        b.close_peer(&a.local_peer_id()).await.unwrap();

        assert!(a.connected_peers().is_empty());
        assert!(b.connected_peers().is_empty());
        assert_eq!(
            b_events.recv().await.unwrap(),
            ConnectionEvent::Closed {
                peer_id: a.local_peer_id()
            }
        );
        assert!(b_events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stream_roundtrip() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let mut incoming = b.accept(TEST_PROTOCOL).unwrap();

        a.dial(b.local_peer_id()).await.unwrap();
        assert_eq!(a.peer_protocols(&b.local_peer_id()), vec![TEST_PROTOCOL]);

        let mut stream = a
            .open_stream(b.local_peer_id(), TEST_PROTOCOL)
            .await
            .unwrap();
        stream.write_all(b"hello").await.unwrap();
        stream.close().await.unwrap();

        let (from, mut inbound) = incoming.next().await.unwrap();
        assert_eq!(from, a.local_peer_id());
        let mut buf = Vec::new();
        inbound.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
    }

    #[tokio::test]
    async fn test_open_stream_errors() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();

        assert_matches!(
            a.open_stream(b.local_peer_id(), TEST_PROTOCOL).await.err(),
            Some(HostError::NotConnected(_))
        );

        a.dial(b.local_peer_id()).await.unwrap();
        let err = a
            .open_stream(b.local_peer_id(), TEST_PROTOCOL)
            .await
            .err()
            .unwrap();
        assert!(err.is_unsupported_protocol());

        // Dropping the handler unregisters the protocol
        let incoming = b.accept(TEST_PROTOCOL).unwrap();
        assert_matches!(
            b.accept(TEST_PROTOCOL),
            Err(HostError::ProtocolAlreadyRegistered(_))
        );
        drop(incoming);
        assert!(a.peer_protocols(&b.local_peer_id()).is_empty());
        assert!(b.accept(TEST_PROTOCOL).is_ok());
    }

    #[test]
    fn test_listen_addr_carries_peer_id() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let addr = a.listen_addr();
        assert_eq!(addr.iter().last(), Some(Protocol::P2p(a.local_peer_id())));
    }
}
