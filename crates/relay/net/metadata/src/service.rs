//! Metadata service: answers inbound requests and enforces cluster
//! compatibility on every new connection.

use std::sync::Arc;

use libp2p::PeerId;
use relaymesh_net_host::{BoxedStream, ConnectionEvent, ConnectionHost, HostError, IncomingStreams};
use relaymesh_relay_primitives::{ClusterShardInfo, LocalNode, METADATA_PROTOCOL};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{MetadataConfig, MetadataError, metrics::MetadataMetrics, protocol};

/// Handles for the long-lived tasks spawned by [`Metadata::start`].
#[derive(Debug)]
pub struct MetadataTasks {
    pub inbound: JoinHandle<()>,
    pub connections: JoinHandle<()>,
}

impl MetadataTasks {
    /// Wait for both tasks to finish.
    pub async fn join(self) {
        let (inbound, connections) = tokio::join!(self.inbound, self.connections);
        if let Err(e) = inbound {
            warn!(%e, "metadata inbound task failed");
        }
        if let Err(e) = connections {
            warn!(%e, "metadata connection task failed");
        }
    }
}

/// The shard compatibility protocol bound to a host and the local record.
pub struct Metadata {
    host: Arc<dyn ConnectionHost>,
    local: LocalNode,
    config: MetadataConfig,
    metrics: MetadataMetrics,
}

impl Metadata {
    pub fn new(host: Arc<dyn ConnectionHost>, local: LocalNode, config: MetadataConfig) -> Self {
        Self {
            host,
            local,
            config,
            metrics: MetadataMetrics::default(),
        }
    }

    pub fn local_node(&self) -> &LocalNode {
        &self.local
    }

    /// Ask `peer_id` for its cluster/shard membership.
    ///
    /// Opens one stream, which is released when the exchange finishes, fails
    /// or this future is dropped.
    pub async fn request(&self, peer_id: PeerId) -> Result<ClusterShardInfo, MetadataError> {
        self.metrics.requests_total.increment(1);
        let timeout = self.config.request_timeout();

        let result = match tokio::time::timeout(timeout, self.exchange(peer_id)).await {
            Ok(result) => result,
            Err(_) => Err(MetadataError::Timeout { peer_id, timeout }),
        };
        if result.is_err() {
            self.metrics.request_failures_total.increment(1);
        }
        result
    }

    async fn exchange(&self, peer_id: PeerId) -> Result<ClusterShardInfo, MetadataError> {
        let stream = self.host.open_stream(peer_id, METADATA_PROTOCOL).await?;
        let local = self.local.cluster_shard_info();
        Ok(protocol::request(stream, local).await?)
    }

    /// Register the protocol handler and start watching new connections.
    ///
    /// Both tasks stop when `shutdown` is cancelled.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> Result<MetadataTasks, HostError> {
        let incoming = self.host.accept(METADATA_PROTOCOL)?;
        let events = self.host.connection_events();

        let inbound = tokio::spawn(Arc::clone(self).run_inbound(incoming, shutdown.clone()));
        let connections = tokio::spawn(Arc::clone(self).run_connection_events(events, shutdown));
        debug!(protocol = %METADATA_PROTOCOL, "metadata service started");

        Ok(MetadataTasks {
            inbound,
            connections,
        })
    }

    async fn run_inbound(self: Arc<Self>, mut incoming: IncomingStreams, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = incoming.next() => {
                    let Some((peer_id, stream)) = next else { break };
                    let this = Arc::clone(&self);
                    tokio::spawn(async move { this.handle_inbound(peer_id, stream).await });
                }
            }
        }
        debug!("metadata inbound task stopped");
    }

    async fn handle_inbound(&self, peer_id: PeerId, stream: BoxedStream) {
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, protocol::respond(stream, &self.local)).await {
            Ok(Ok(remote)) => {
                self.metrics.responses_total.increment(1);
                debug!(%peer_id, cluster = remote.cluster, shards = ?remote.shards, "answered metadata request");
            }
            Ok(Err(e)) => debug!(%peer_id, %e, "failed to answer metadata request"),
            Err(_) => debug!(%peer_id, ?timeout, "metadata request from peer timed out"),
        }
    }

    async fn run_connection_events(
        self: Arc<Self>,
        mut events: broadcast::Receiver<ConnectionEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(ConnectionEvent::Established { peer_id, .. }) => self.spawn_check(peer_id),
                    Ok(ConnectionEvent::Closed { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        // Skipped events may hide new connections
                        let connections = self.host.connections();
                        warn!(
                            skipped,
                            connections = connections.len(),
                            "connection events lagged, re-checking all connections"
                        );
                        for conn in connections {
                            self.spawn_check(conn.peer_id);
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("metadata connection task stopped");
    }

    fn spawn_check(self: &Arc<Self>, peer_id: PeerId) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.check_connection(peer_id).await });
    }

    /// Close the connection when the peer declares a different non-zero
    /// cluster. Any request failure leaves the connection up.
    pub async fn check_connection(&self, peer_id: PeerId) {
        let remote = match self.request(peer_id).await {
            Ok(remote) => remote,
            Err(e) => {
                debug!(%peer_id, %e, "metadata request failed, keeping connection");
                return;
            }
        };

        let local = self.local.cluster_shard_info();
        if !local.is_incompatible_with(&remote) {
            debug!(%peer_id, cluster = remote.cluster, shards = ?remote.shards, "peer cluster compatible");
            return;
        }

        info!(
            %peer_id,
            local_cluster = local.cluster,
            remote_cluster = remote.cluster,
            "disconnecting peer on a different cluster"
        );
        self.metrics.cluster_mismatch_disconnects_total.increment(1);
        if let Err(e) = self.host.close_peer(&peer_id).await {
            warn!(%peer_id, %e, "failed to close incompatible peer");
        }
    }
}
