use std::time::Duration;

use libp2p::PeerId;
use relaymesh_net_host::HostError;

use crate::codec::MetadataCodecError;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata request to {peer_id} timed out after {timeout:?}")]
    Timeout { peer_id: PeerId, timeout: Duration },
    /// The peer is unreachable, reset the stream or does not speak the
    /// protocol.
    #[error("stream error: {0}")]
    Stream(#[from] HostError),
    #[error("codec error: {0}")]
    Codec(#[from] MetadataCodecError),
}
