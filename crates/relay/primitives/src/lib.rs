//! Shared types for relay nodes: cluster/shard membership, the local extended
//! record, peer origins and the protocol identifiers the peer manager reasons
//! about.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod origin;
mod record;
mod shards;

pub use origin::Origin;
pub use record::{ExtendedRecord, LocalNode};
pub use shards::{ClusterShardInfo, MAX_SHARD_INDEX, RelayShards, ShardError};

use libp2p::StreamProtocol;

/// Publish-subscribe relay protocol.
///
/// Relay peers are fungible: they are governed by the connection budget, never
/// by per-protocol service slots.
pub const RELAY_PROTOCOL: StreamProtocol = StreamProtocol::new("/vac/waku/relay/2.0.0");

/// Shard compatibility (metadata) handshake protocol.
pub const METADATA_PROTOCOL: StreamProtocol = StreamProtocol::new("/vac/waku/metadata/1.0.0");
