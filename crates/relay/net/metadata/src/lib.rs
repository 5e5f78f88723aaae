//! Shard compatibility ("metadata") protocol.
//!
//! Two relay nodes exchange their cluster/shard membership over a dedicated
//! stream so each side can drop connections that cross network partitions.
//!
//! # Protocol
//!
//! - Path: `/vac/waku/metadata/1.0.0`
//! - Request: `MetadataRequest { cluster_id, shards }` with the requester's info
//! - Response: `MetadataResponse { cluster_id, shards }` with the responder's
//!   current info, independent of the request
//!
//! # Enforcement
//!
//! Every newly established connection triggers a request. Two different
//! non-zero clusters close the connection. A failed request leaves it open.

mod codec;
mod config;
mod error;
mod metrics;
mod protocol;
mod service;

// Include generated protobuf code
#[allow(unreachable_pub)]
mod proto {
    include!(concat!(env!("OUT_DIR"), "/proto/mod.rs"));
}

pub use codec::{
    MetadataCodecError, MetadataRequest, MetadataRequestCodec, MetadataResponse,
    MetadataResponseCodec,
};
pub use config::{DEFAULT_REQUEST_TIMEOUT_SECS, MetadataConfig};
pub use error::MetadataError;
pub use service::{Metadata, MetadataTasks};
