//! Cluster and shard membership.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Highest shard index a cluster may declare.
pub const MAX_SHARD_INDEX: u16 = 1023;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShardError {
    #[error("shard index {index} exceeds maximum {max}", max = MAX_SHARD_INDEX)]
    IndexOutOfRange { index: u16 },
    #[error("at least one shard index is required")]
    NoIndices,
}

/// Cluster/shard membership as exchanged with remote peers.
///
/// A cluster of `0` means no partition is declared. Shard order carries no
/// meaning; use [`ClusterShardInfo::same_shards`] to compare.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterShardInfo {
    pub cluster: u16,
    pub shards: Vec<u16>,
}

impl ClusterShardInfo {
    pub fn new(cluster: u16, shards: impl IntoIterator<Item = u16>) -> Self {
        Self {
            cluster,
            shards: shards.into_iter().collect(),
        }
    }

    /// Info for a node that declares no partition.
    pub const fn unpartitioned() -> Self {
        Self {
            cluster: 0,
            shards: Vec::new(),
        }
    }

    pub fn is_partitioned(&self) -> bool {
        self.cluster != 0
    }

    /// Order-insensitive shard comparison.
    pub fn same_shards(&self, other: &Self) -> bool {
        let ours: BTreeSet<_> = self.shards.iter().collect();
        let theirs: BTreeSet<_> = other.shards.iter().collect();
        ours == theirs
    }

    /// Whether a connection between `self` and `remote` crosses partitions.
    ///
    /// Only two declared, different clusters are incompatible. A side that
    /// declares no cluster is compatible with everyone.
    pub fn is_incompatible_with(&self, remote: &Self) -> bool {
        self.is_partitioned() && remote.is_partitioned() && self.cluster != remote.cluster
    }
}

impl From<&RelayShards> for ClusterShardInfo {
    fn from(shards: &RelayShards) -> Self {
        Self {
            cluster: shards.cluster(),
            shards: shards.indices().collect(),
        }
    }
}

/// Validated shard subscription of a node: a cluster plus a non-empty,
/// deduplicated set of shard indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayShards {
    cluster: u16,
    indices: BTreeSet<u16>,
}

impl RelayShards {
    pub fn new(cluster: u16, indices: impl IntoIterator<Item = u16>) -> Result<Self, ShardError> {
        let mut shards = Self {
            cluster,
            indices: BTreeSet::new(),
        };
        shards.add_indices(indices)?;
        if shards.indices.is_empty() {
            return Err(ShardError::NoIndices);
        }
        Ok(shards)
    }

    pub fn cluster(&self) -> u16 {
        self.cluster
    }

    /// Shard indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.indices.iter().copied()
    }

    pub fn contains(&self, index: u16) -> bool {
        self.indices.contains(&index)
    }

    /// Subscribe to more shards. Nothing is added if any index is invalid.
    pub fn add_indices(&mut self, indices: impl IntoIterator<Item = u16>) -> Result<(), ShardError> {
        let indices: Vec<u16> = indices.into_iter().collect();
        if let Some(&index) = indices.iter().find(|&&i| i > MAX_SHARD_INDEX) {
            return Err(ShardError::IndexOutOfRange { index });
        }
        self.indices.extend(indices);
        Ok(())
    }
}
