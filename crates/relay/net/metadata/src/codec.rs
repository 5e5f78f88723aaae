//! Codec for metadata protocol messages.

use relaymesh_net_codec::ProtocolCodec;
use relaymesh_relay_primitives::ClusterShardInfo;

use crate::proto::metadata as pb;

/// Codec for metadata requests.
pub type MetadataRequestCodec =
    ProtocolCodec<pb::MetadataRequest, MetadataRequest, MetadataCodecError>;

/// Codec for metadata responses.
pub type MetadataResponseCodec =
    ProtocolCodec<pb::MetadataResponse, MetadataResponse, MetadataCodecError>;

#[derive(Debug, thiserror::Error)]
pub enum MetadataCodecError {
    #[error("cluster id {0} exceeds u16 range")]
    ClusterOutOfRange(u32),
    #[error("shard index {0} exceeds u16 range")]
    ShardOutOfRange(u32),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_protobuf_codec::Error> for MetadataCodecError {
    fn from(error: quick_protobuf_codec::Error) -> Self {
        MetadataCodecError::Protocol(error.to_string())
    }
}

/// Absent `cluster_id` decodes as cluster 0.
fn decode_info(cluster_id: Option<u32>, shards: Vec<u32>) -> Result<ClusterShardInfo, MetadataCodecError> {
    let raw_cluster = cluster_id.unwrap_or_default();
    let cluster =
        u16::try_from(raw_cluster).map_err(|_| MetadataCodecError::ClusterOutOfRange(raw_cluster))?;
    let shards = shards
        .into_iter()
        .map(|s| u16::try_from(s).map_err(|_| MetadataCodecError::ShardOutOfRange(s)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ClusterShardInfo { cluster, shards })
}

fn encode_info(info: ClusterShardInfo) -> (Option<u32>, Vec<u32>) {
    (
        Some(u32::from(info.cluster)),
        info.shards.into_iter().map(u32::from).collect(),
    )
}

/// Sent by the dialing side: the requester's own cluster/shard info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRequest {
    pub info: ClusterShardInfo,
}

impl MetadataRequest {
    pub fn new(info: ClusterShardInfo) -> Self {
        Self { info }
    }
}

impl TryFrom<pb::MetadataRequest> for MetadataRequest {
    type Error = MetadataCodecError;

    fn try_from(value: pb::MetadataRequest) -> Result<Self, Self::Error> {
        decode_info(value.cluster_id, value.shards).map(Self::new)
    }
}

impl From<MetadataRequest> for pb::MetadataRequest {
    fn from(value: MetadataRequest) -> Self {
        let (cluster_id, shards) = encode_info(value.info);
        pb::MetadataRequest { cluster_id, shards }
    }
}

/// The responder's current cluster/shard info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponse {
    pub info: ClusterShardInfo,
}

impl MetadataResponse {
    pub fn new(info: ClusterShardInfo) -> Self {
        Self { info }
    }
}

impl TryFrom<pb::MetadataResponse> for MetadataResponse {
    type Error = MetadataCodecError;

    fn try_from(value: pb::MetadataResponse) -> Result<Self, Self::Error> {
        decode_info(value.cluster_id, value.shards).map(Self::new)
    }
}

impl From<MetadataResponse> for pb::MetadataResponse {
    fn from(value: MetadataResponse) -> Self {
        let (cluster_id, shards) = encode_info(value.info);
        pb::MetadataResponse { cluster_id, shards }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use asynchronous_codec::{Decoder, Encoder};
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn test_wire_roundtrip_through_codec() {
        let mut buf = BytesMut::new();
        let request = MetadataRequest::new(ClusterShardInfo::new(16, [2, 3, 4]));
        MetadataRequestCodec::new(1024)
            .encode(request.clone(), &mut buf)
            .unwrap();

        let decoded = MetadataRequestCodec::new(1024)
            .decode(&mut buf)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, request);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_missing_cluster_is_unpartitioned() {
        let response = MetadataResponse::try_from(pb::MetadataResponse {
            cluster_id: None,
            shards: vec![],
        })
        .unwrap();
        assert_eq!(response.info, ClusterShardInfo::unpartitioned());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert_matches!(
            MetadataResponse::try_from(pb::MetadataResponse {
                cluster_id: Some(70_000),
                shards: vec![1],
            }),
            Err(MetadataCodecError::ClusterOutOfRange(70_000))
        );
        assert_matches!(
            MetadataRequest::try_from(pb::MetadataRequest {
                cluster_id: Some(1),
                shards: vec![1, 65_536],
            }),
            Err(MetadataCodecError::ShardOutOfRange(65_536))
        );
    }

    #[test]
    fn test_out_of_range_rejected_by_decoder() {
        let mut buf = BytesMut::new();
        let mut raw: quick_protobuf_codec::Codec<pb::MetadataResponse> =
            quick_protobuf_codec::Codec::new(1024);
        raw.encode(
            pb::MetadataResponse {
                cluster_id: Some(u32::MAX),
                shards: vec![],
            },
            &mut buf,
        )
        .unwrap();

        assert_matches!(
            MetadataResponseCodec::new(1024).decode(&mut buf),
            Err(MetadataCodecError::ClusterOutOfRange(u32::MAX))
        );
    }
}
