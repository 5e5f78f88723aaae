//! Extended self-description record and the shared local handle over it.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::shards::{ClusterShardInfo, RelayShards};

/// A peer's self-published, versioned metadata.
///
/// Every change bumps `seq`, so two records for the same peer can be ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedRecord {
    seq: u64,
    relay_shards: Option<RelayShards>,
}

impl ExtendedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relay_shards(mut self, shards: RelayShards) -> Self {
        self.set_relay_shards(shards);
        self
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn relay_shards(&self) -> Option<&RelayShards> {
        self.relay_shards.as_ref()
    }

    pub fn set_relay_shards(&mut self, shards: RelayShards) {
        self.relay_shards = Some(shards);
        self.seq += 1;
    }

    pub fn clear_relay_shards(&mut self) {
        if self.relay_shards.take().is_some() {
            self.seq += 1;
        }
    }

    /// Cluster/shard info as announced to peers; unpartitioned when no shards
    /// are declared.
    pub fn cluster_shard_info(&self) -> ClusterShardInfo {
        self.relay_shards
            .as_ref()
            .map(ClusterShardInfo::from)
            .unwrap_or_else(ClusterShardInfo::unpartitioned)
    }
}

/// Shared handle to the local node's [`ExtendedRecord`].
///
/// Clones observe the same record. Readers always see the latest subscription
/// state; nothing is cached at connection time.
#[derive(Debug, Clone, Default)]
pub struct LocalNode {
    record: Arc<RwLock<ExtendedRecord>>,
}

impl LocalNode {
    pub fn new(record: ExtendedRecord) -> Self {
        Self {
            record: Arc::new(RwLock::new(record)),
        }
    }

    pub fn with_relay_shards(shards: RelayShards) -> Self {
        Self::new(ExtendedRecord::new().with_relay_shards(shards))
    }

    /// Snapshot of the current record.
    pub fn record(&self) -> ExtendedRecord {
        self.record.read().clone()
    }

    pub fn cluster_shard_info(&self) -> ClusterShardInfo {
        self.record.read().cluster_shard_info()
    }

    pub fn cluster(&self) -> u16 {
        self.record
            .read()
            .relay_shards()
            .map(RelayShards::cluster)
            .unwrap_or(0)
    }

    pub fn set_relay_shards(&self, shards: RelayShards) {
        self.record.write().set_relay_shards(shards);
    }

    pub fn clear_relay_shards(&self) {
        self.record.write().clear_relay_shards();
    }
}
