//! Metadata protocol metrics

use metrics::Counter;

#[derive(Clone, Debug)]
pub(crate) struct MetadataMetrics {
    /// Outbound metadata requests started
    pub(crate) requests_total: Counter,
    /// Outbound requests that timed out or failed
    pub(crate) request_failures_total: Counter,
    /// Inbound requests answered
    pub(crate) responses_total: Counter,
    /// Connections closed because the peer is on another cluster
    pub(crate) cluster_mismatch_disconnects_total: Counter,
}

impl Default for MetadataMetrics {
    fn default() -> Self {
        Self {
            requests_total: metrics::counter!("relay.metadata.requests_total"),
            request_failures_total: metrics::counter!("relay.metadata.request_failures_total"),
            responses_total: metrics::counter!("relay.metadata.responses_total"),
            cluster_mismatch_disconnects_total: metrics::counter!(
                "relay.metadata.cluster_mismatch_disconnects_total"
            ),
        }
    }
}
