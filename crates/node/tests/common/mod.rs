#![allow(dead_code, unreachable_pub)]

use std::{sync::Arc, time::Duration};

use relaymesh_net_host::{MemoryHost, MemoryNetwork};
use relaymesh_node::{NodeConfig, RelayNode, RelayNodeHandle, ShardConfig};
use relaymesh_relay_peer_store::MemoryPeerStore;
use tokio_util::sync::CancellationToken;

pub struct TestNode {
    pub host: MemoryHost,
    pub store: Arc<MemoryPeerStore>,
    pub node: RelayNode,
    pub handle: RelayNodeHandle,
}

pub fn config(shards: Option<(u16, &[u16])>) -> NodeConfig {
    NodeConfig {
        shards: shards.map(|(cluster, indices)| ShardConfig {
            cluster,
            indices: indices.to_vec(),
        }),
        ..Default::default()
    }
}

/// Add a host to `network` and run a relay node on it.
pub fn spawn_node(network: &MemoryNetwork, config: &NodeConfig, shutdown: &CancellationToken) -> TestNode {
    let host = network.add_host();
    let store = Arc::new(MemoryPeerStore::new());
    let node = RelayNode::new(config, Arc::new(host.clone()), store.clone()).unwrap();
    let handle = node.start(shutdown.child_token()).unwrap();
    TestNode {
        host,
        store,
        node,
        handle,
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
