//! Stream-level exchange for the metadata protocol.
//!
//! # Protocol Flow
//!
//! One request and one response per stream:
//! - **Outbound (requester)**: send `MetadataRequest` with our info, read
//!   `MetadataResponse`, close
//! - **Inbound (responder)**: read `MetadataRequest`, send `MetadataResponse`
//!   with our current info, close

use asynchronous_codec::Framed;
use futures::{AsyncRead, AsyncWrite, SinkExt};
use relaymesh_net_codec::{recv, switch_codec};
use relaymesh_relay_primitives::{ClusterShardInfo, LocalNode};
use tracing::trace;

use crate::codec::{
    MetadataCodecError, MetadataRequest, MetadataRequestCodec, MetadataResponse,
    MetadataResponseCodec,
};

/// Upper bound for a single message. A full shard list of 1024 indices fits
/// with room to spare.
pub(crate) const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Send `local` and return the remote's info.
pub(crate) async fn request<S>(stream: S, local: ClusterShardInfo) -> Result<ClusterShardInfo, MetadataCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, MetadataRequestCodec::new(MAX_MESSAGE_SIZE));
    trace!(cluster = local.cluster, shards = ?local.shards, "sending metadata request");
    framed.send(MetadataRequest::new(local)).await?;

    let mut framed = switch_codec(framed, MetadataResponseCodec::new(MAX_MESSAGE_SIZE));
    let response = recv(&mut framed).await?;
    framed.close().await?;

    Ok(response.info)
}

/// Answer one request with the local node's info as of now, returning what
/// the requester declared.
pub(crate) async fn respond<S>(stream: S, local: &LocalNode) -> Result<ClusterShardInfo, MetadataCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, MetadataRequestCodec::new(MAX_MESSAGE_SIZE));
    let request = recv(&mut framed).await?;
    trace!(cluster = request.info.cluster, "received metadata request");

    let mut framed = switch_codec(framed, MetadataResponseCodec::new(MAX_MESSAGE_SIZE));
    framed
        .send(MetadataResponse::new(local.cluster_shard_info()))
        .await?;
    framed.close().await?;

    Ok(request.info)
}
