//! Relay connection budget.

use crate::PeerManagerError;

/// One in this many connections is kept free of relay peers.
const MAX_RELAY_PEERS_SHARE: usize = 5;

/// One in this many relay peers should be outbound.
const OUT_RELAY_PEERS_SHARE: usize = 3;

/// Relay connection targets derived from the total connection budget.
///
/// `inbound + outbound == max_relay_peers <= max_connections` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPeerTargets {
    pub max_connections: usize,
    pub max_relay_peers: usize,
    pub inbound: usize,
    pub outbound: usize,
}

impl RelayPeerTargets {
    pub fn new(max_connections: usize) -> Result<Self, PeerManagerError> {
        if max_connections == 0 {
            return Err(PeerManagerError::InvalidMaxConnections);
        }

        let max_relay_peers = max_connections - max_connections / MAX_RELAY_PEERS_SHARE;
        let outbound = max_relay_peers / OUT_RELAY_PEERS_SHARE;
        Ok(Self {
            max_connections,
            max_relay_peers,
            inbound: max_relay_peers - outbound,
            outbound,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_default_budget() {
        let targets = RelayPeerTargets::new(50).unwrap();
        assert_eq!(targets.max_relay_peers, 40);
        assert_eq!(targets.outbound, 13);
        assert_eq!(targets.inbound, 27);
    }

    #[test]
    fn test_small_budgets() {
        let one = RelayPeerTargets::new(1).unwrap();
        assert_eq!((one.max_relay_peers, one.inbound, one.outbound), (1, 1, 0));

        let five = RelayPeerTargets::new(5).unwrap();
        assert_eq!((five.max_relay_peers, five.inbound, five.outbound), (4, 3, 1));
    }

    #[test]
    fn test_zero_rejected() {
        assert_matches!(
            RelayPeerTargets::new(0),
            Err(PeerManagerError::InvalidMaxConnections)
        );
    }

    proptest! {
        #[test]
        fn targets_partition_the_relay_budget(max_connections in 1usize..1_000_000) {
            let targets = RelayPeerTargets::new(max_connections).unwrap();
            prop_assert_eq!(targets.inbound + targets.outbound, targets.max_relay_peers);
            prop_assert!(targets.max_relay_peers <= max_connections);
            if max_connections >= 5 {
                prop_assert!(targets.outbound >= 1);
                prop_assert!(targets.inbound >= targets.outbound);
            }
        }
    }
}
