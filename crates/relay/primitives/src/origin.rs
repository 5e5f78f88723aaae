//! How a peer identity was learned.

use serde::{Deserialize, Serialize};

/// Source a peer record was learned from.
///
/// Set once per peer and overwritten by a later add.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Origin {
    #[default]
    Unknown,
    /// Statically configured (bootstrap list, config file, explicit dial).
    Static,
    /// Discovered through the discv5 DHT.
    Discv5,
    /// Received from a peer exchange response.
    PeerExchange,
    /// Resolved from a DNS discovery tree.
    DnsDiscovery,
    /// Discovered through a rendezvous point advertisement.
    Rendezvous,
}
