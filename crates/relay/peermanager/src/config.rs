//! Peer manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default connection budget.
pub const DEFAULT_MAX_CONNECTIONS: usize = 50;

/// Default period of the connectivity loop.
pub const DEFAULT_CONNECTIVITY_INTERVAL_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerManagerConfig {
    /// Total connection budget; relay targets are derived from it
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Seconds between two pruning passes
    #[serde(default = "default_connectivity_interval_secs")]
    pub connectivity_interval_secs: u64,
}

impl Default for PeerManagerConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connectivity_interval_secs: default_connectivity_interval_secs(),
        }
    }
}

impl PeerManagerConfig {
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_connectivity_interval_secs(mut self, secs: u64) -> Self {
        self.connectivity_interval_secs = secs;
        self
    }

    /// Loop period. Never shorter than one second.
    pub fn connectivity_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity_interval_secs.max(1))
    }
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_connectivity_interval_secs() -> u64 {
    DEFAULT_CONNECTIVITY_INTERVAL_SECS
}
