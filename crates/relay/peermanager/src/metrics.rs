//! Peer manager metrics

use metrics::{Counter, Gauge};

#[derive(Clone, Debug)]
pub(crate) struct PeerManagerMetrics {
    /// Inbound relay peers disconnected by pruning
    pub(crate) pruned_inbound_total: Counter,
    /// Inbound relay peers seen by the last pruning pass
    pub(crate) inbound_relay_peers: Gauge,
    /// Outbound relay peers seen by the last pruning pass
    pub(crate) outbound_relay_peers: Gauge,
}

impl Default for PeerManagerMetrics {
    fn default() -> Self {
        Self {
            pruned_inbound_total: metrics::counter!("relay.peermanager.pruned_inbound_total"),
            inbound_relay_peers: metrics::gauge!("relay.peermanager.inbound_relay_peers"),
            outbound_relay_peers: metrics::gauge!("relay.peermanager.outbound_relay_peers"),
        }
    }
}
