//! Relay node composition.

use std::sync::Arc;

use eyre::WrapErr;
use relaymesh_net_host::ConnectionHost;
use relaymesh_relay_metadata::{Metadata, MetadataTasks};
use relaymesh_relay_peer_store::PeerRecordStore;
use relaymesh_relay_peermanager::PeerManager;
use relaymesh_relay_primitives::LocalNode;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::NodeConfig;

/// Peer manager and metadata service sharing one host, store and local
/// record.
pub struct RelayNode {
    host: Arc<dyn ConnectionHost>,
    local: LocalNode,
    peer_manager: Arc<PeerManager>,
    metadata: Arc<Metadata>,
}

impl RelayNode {
    pub fn new(
        config: &NodeConfig,
        host: Arc<dyn ConnectionHost>,
        store: Arc<dyn PeerRecordStore>,
    ) -> eyre::Result<Self> {
        let local = config.local_node()?;
        let peer_manager = PeerManager::new(config.peer_manager.clone(), Arc::clone(&host), store)
            .wrap_err("failed to create peer manager")?;
        let metadata = Metadata::new(Arc::clone(&host), local.clone(), config.metadata.clone());

        Ok(Self {
            host,
            local,
            peer_manager: Arc::new(peer_manager),
            metadata: Arc::new(metadata),
        })
    }

    pub fn host(&self) -> &Arc<dyn ConnectionHost> {
        &self.host
    }

    /// Shared handle to the local record; changes are visible to the
    /// metadata service immediately.
    pub fn local_node(&self) -> &LocalNode {
        &self.local
    }

    pub fn peer_manager(&self) -> &Arc<PeerManager> {
        &self.peer_manager
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    /// Start the metadata service and the connectivity loop. Everything stops
    /// when `shutdown` is cancelled.
    pub fn start(&self, shutdown: CancellationToken) -> eyre::Result<RelayNodeHandle> {
        let metadata = self
            .metadata
            .start(shutdown.child_token())
            .wrap_err("failed to start metadata service")?;
        let connectivity = self.peer_manager.start(shutdown.child_token());

        let info = self.local.cluster_shard_info();
        info!(
            peer_id = %self.host.local_peer_id(),
            cluster = info.cluster,
            shards = ?info.shards,
            "relay node started"
        );

        Ok(RelayNodeHandle {
            shutdown,
            connectivity,
            metadata,
        })
    }
}

/// Install logging from the `[log]` section, then build and start a relay
/// node. Fails if a global subscriber is already installed.
pub fn launch(
    config: &NodeConfig,
    host: Arc<dyn ConnectionHost>,
    store: Arc<dyn PeerRecordStore>,
    shutdown: CancellationToken,
) -> eyre::Result<(RelayNode, RelayNodeHandle)> {
    relaymesh_observability::init_logging(&config.log)?;
    info!(level = %config.log.level, json = config.log.json, "logging initialized");

    let node = RelayNode::new(config, host, store)?;
    let handle = node.start(shutdown)?;
    Ok((node, handle))
}

/// Running node tasks.
#[derive(Debug)]
pub struct RelayNodeHandle {
    shutdown: CancellationToken,
    connectivity: JoinHandle<()>,
    metadata: MetadataTasks,
}

impl RelayNodeHandle {
    /// Cancel all node tasks and wait for them to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.stopped().await;
    }

    /// Wait for all node tasks to finish.
    pub async fn stopped(self) {
        if let Err(e) = self.connectivity.await {
            warn!(%e, "connectivity loop failed");
        }
        self.metadata.join().await;
    }
}
