//! Node configuration for TOML persistence.

use std::path::Path;

use eyre::WrapErr;
use relaymesh_observability::LogConfig;
use relaymesh_relay_metadata::MetadataConfig;
use relaymesh_relay_peermanager::PeerManagerConfig;
use relaymesh_relay_primitives::{LocalNode, RelayShards, ShardError};
use serde::{Deserialize, Serialize};

/// The local node's declared partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub cluster: u16,
    pub indices: Vec<u16>,
}

impl ShardConfig {
    pub fn relay_shards(&self) -> Result<RelayShards, ShardError> {
        RelayShards::new(self.cluster, self.indices.iter().copied())
    }
}

/// Relay node configuration (TOML-serializable).
///
/// Every section is optional. A missing `[shards]` section means the node
/// declares no partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub peer_manager: PeerManagerConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub shards: Option<ShardConfig>,
}

impl NodeConfig {
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .wrap_err_with(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> eyre::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml_string(&self) -> eyre::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Local record seeded from the `[shards]` section.
    pub fn local_node(&self) -> eyre::Result<LocalNode> {
        match &self.shards {
            Some(shards) => {
                let shards = shards
                    .relay_shards()
                    .wrap_err("invalid [shards] configuration")?;
                Ok(LocalNode::with_relay_shards(shards))
            }
            None => Ok(LocalNode::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use relaymesh_relay_primitives::ClusterShardInfo;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = NodeConfig::from_toml_str("").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.peer_manager.max_connections, 50);
        assert_eq!(config.peer_manager.connectivity_interval_secs, 15);
        assert_eq!(config.metadata.request_timeout_secs, 10);
        assert_eq!(
            config.local_node().unwrap().cluster_shard_info(),
            ClusterShardInfo::unpartitioned()
        );
    }

    #[test]
    fn test_full_config() {
        let config = NodeConfig::from_toml_str(
            r#"
            [log]
            level = "debug"

            [peer_manager]
            max_connections = 20

            [metadata]
            request_timeout_secs = 3

            [shards]
            cluster = 16
            indices = [3, 1, 2]
            "#,
        )
        .unwrap();

        assert_eq!(config.peer_manager.max_connections, 20);
        assert_eq!(config.peer_manager.connectivity_interval_secs, 15);
        assert_eq!(config.metadata.request_timeout_secs, 3);
        assert_eq!(
            config.local_node().unwrap().cluster_shard_info(),
            ClusterShardInfo::new(16, [1, 2, 3])
        );
    }

    #[test]
    fn test_invalid_shards_rejected() {
        let config = NodeConfig::from_toml_str(
            r#"
            [shards]
            cluster = 1
            indices = [2048]
            "#,
        )
        .unwrap();
        assert!(config.local_node().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let config = NodeConfig {
            shards: Some(ShardConfig {
                cluster: 1,
                indices: vec![0],
            }),
            ..Default::default()
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();

        assert_eq!(NodeConfig::load(file.path()).unwrap(), config);
        assert!(NodeConfig::load(file.path().with_extension("missing")).is_err());
    }
}
