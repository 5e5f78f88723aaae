//! Peer manager for relay nodes.
//!
//! Splits the connection budget into inbound and outbound relay targets,
//! keeps per-protocol service slots for non-relay protocols, selects peers for
//! a protocol and periodically prunes inbound relay connections above target.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod config;
mod error;
mod manager;
mod metrics;
mod slots;
mod targets;

pub use config::{DEFAULT_CONNECTIVITY_INTERVAL_SECS, DEFAULT_MAX_CONNECTIONS, PeerManagerConfig};
pub use error::{AddressError, PeerManagerError};
pub use manager::{ADDRESS_TTL, PeerData, PeerManager, split_peer_addr};
pub use slots::ServiceSlots;
pub use targets::RelayPeerTargets;
