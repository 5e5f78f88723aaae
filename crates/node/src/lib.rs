//! Relay node: wires the peer manager and the shard compatibility protocol to
//! a connection host and a peer record store.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod config;
mod node;

pub use config::{NodeConfig, ShardConfig};
pub use node::{RelayNode, RelayNodeHandle, launch};
