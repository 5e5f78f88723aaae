//! The peer manager: relay budgets, service slots, peer selection and the
//! connectivity loop that prunes excess inbound relay connections.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use libp2p::{Multiaddr, PeerId, StreamProtocol, multiaddr::Protocol};
use rand::seq::IndexedRandom;
use relaymesh_net_host::{ConnectionHost, ConnectionInfo, PeersByDirection};
use relaymesh_relay_peer_store::{PeerRecordStore, PeerStoreError};
use relaymesh_relay_primitives::{ExtendedRecord, Origin, RELAY_PROTOCOL};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    AddressError, PeerManagerConfig, PeerManagerError, RelayPeerTargets, ServiceSlots,
    metrics::PeerManagerMetrics,
};

/// How long addresses registered through the peer manager stay valid.
pub const ADDRESS_TTL: Duration = Duration::from_secs(60 * 60);

/// A peer reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerData {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
    pub origin: Origin,
    pub extended_record: Option<ExtendedRecord>,
}

/// Split a full peer address into its identity and transport part.
///
/// `/ip4/1.2.3.4/tcp/60000/p2p/<id>` becomes `(<id>, /ip4/1.2.3.4/tcp/60000)`.
pub fn split_peer_addr(address: &Multiaddr) -> Result<(PeerId, Multiaddr), AddressError> {
    let mut transport = address.clone();
    match transport.pop() {
        Some(Protocol::P2p(peer_id)) => Ok((peer_id, transport)),
        _ => Err(AddressError::MissingPeerId(address.clone())),
    }
}

pub struct PeerManager {
    config: PeerManagerConfig,
    targets: RelayPeerTargets,
    host: Arc<dyn ConnectionHost>,
    store: Arc<dyn PeerRecordStore>,
    slots: ServiceSlots,
    metrics: PeerManagerMetrics,
}

impl std::fmt::Debug for PeerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerManager")
            .field("local_peer_id", &self.host.local_peer_id())
            .field("config", &self.config)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

impl PeerManager {
    pub fn new(
        config: PeerManagerConfig,
        host: Arc<dyn ConnectionHost>,
        store: Arc<dyn PeerRecordStore>,
    ) -> Result<Self, PeerManagerError> {
        let targets = RelayPeerTargets::new(config.max_connections)?;
        info!(
            max_connections = targets.max_connections,
            max_relay_peers = targets.max_relay_peers,
            in_relay_target = targets.inbound,
            out_relay_target = targets.outbound,
            "peer manager initialized"
        );

        Ok(Self {
            config,
            targets,
            host,
            store,
            slots: ServiceSlots::new(),
            metrics: PeerManagerMetrics::default(),
        })
    }

    pub fn targets(&self) -> RelayPeerTargets {
        self.targets
    }

    /// Live service slot entries for `protocol`, oldest first.
    pub fn service_slot_peers(&self, protocol: &StreamProtocol) -> Vec<PeerId> {
        self.slots.peers(protocol)
    }

    /// Spawn the connectivity loop. It prunes once per interval, first after
    /// one full interval, and exits when `shutdown` is cancelled.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run_connectivity_loop(shutdown))
    }

    async fn run_connectivity_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let period = self.config.connectivity_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(?period, "connectivity loop started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("connectivity loop shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    self.prune_in_relay_conns().await;
                }
            }
        }
    }

    /// Register a peer from a full `/p2p/` address and slot it for every
    /// non-relay protocol it serves.
    pub fn add_peer(
        &self,
        address: &Multiaddr,
        origin: Origin,
        protocols: &[StreamProtocol],
    ) -> Result<PeerId, PeerManagerError> {
        let (peer_id, transport) = split_peer_addr(address)?;

        for protocol in protocols {
            self.add_peer_to_service_slot(protocol, peer_id, origin);
        }

        self.upsert_peer(peer_id, std::slice::from_ref(&transport), origin)?;
        if !protocols.is_empty() {
            self.store.add_protocols(peer_id, protocols)?;
        }
        Ok(peer_id)
    }

    /// Record a discovered peer. Service slots are left alone and failures
    /// are only logged.
    pub fn add_discovered_peer(&self, peer: PeerData) {
        let PeerData {
            peer_id,
            addrs,
            origin,
            extended_record,
        } = peer;

        if let Err(e) = self.upsert_peer(peer_id, &addrs, origin) {
            error!(%peer_id, %e, "could not add discovered peer");
        }

        if let Some(record) = extended_record {
            let seq = record.seq();
            if let Err(e) = self.store.set_extended_record(peer_id, record) {
                error!(%peer_id, seq, %e, "could not store extended record");
            }
        }
    }

    fn upsert_peer(
        &self,
        peer_id: PeerId,
        addrs: &[Multiaddr],
        origin: Origin,
    ) -> Result<(), PeerStoreError> {
        debug!(%peer_id, %origin, addrs = addrs.len(), "adding peer to peer store");
        let addrs: Vec<Multiaddr> = addrs.iter().filter(|a| !a.is_empty()).cloned().collect();
        if !addrs.is_empty() {
            self.store.add_addrs(peer_id, &addrs, ADDRESS_TTL)?;
        }
        self.store.set_origin(peer_id, origin)
    }

    /// Forget a peer: drop its record and tombstone its service slot entries.
    pub fn remove_peer(&self, peer_id: &PeerId) {
        if let Err(e) = self.store.remove_peer(peer_id) {
            warn!(%peer_id, %e, "failed to remove peer record");
        }
        let blanked = self.slots.remove_peer(peer_id);
        debug!(%peer_id, blanked, "peer removed");
    }

    /// Append a peer to the service slot of `protocol`. The relay protocol is
    /// managed by the connection budget and is refused.
    pub fn add_peer_to_service_slot(&self, protocol: &StreamProtocol, peer_id: PeerId, origin: Origin) {
        if self.slots.add(protocol, peer_id) {
            debug!(%peer_id, %protocol, %origin, "peer added to service slot");
        } else {
            warn!(%peer_id, %protocol, "relay peers cannot be added to service slots");
        }
    }

    /// Pick a peer for `protocol`.
    ///
    /// Candidates (all known peers when empty) are narrowed to those that
    /// support `protocol`. Relay picks uniformly among them. Other protocols
    /// prefer the most recently slotted live peer and fall back to a uniform
    /// pick.
    pub fn select_peer(
        &self,
        protocol: &StreamProtocol,
        candidates: &[PeerId],
    ) -> Result<PeerId, PeerManagerError> {
        let filtered = self.filter_by_protocol(protocol, candidates)?;

        if *protocol != RELAY_PROTOCOL
            && let Some(peer_id) = self.slots.preferred(protocol)
        {
            trace!(%peer_id, %protocol, "selected peer from service slot");
            return Ok(peer_id);
        }

        filtered
            .choose(&mut rand::rng())
            .copied()
            .ok_or_else(|| PeerManagerError::NotFound(protocol.clone()))
    }

    fn filter_by_protocol(
        &self,
        protocol: &StreamProtocol,
        candidates: &[PeerId],
    ) -> Result<Vec<PeerId>, PeerStoreError> {
        let pool: BTreeSet<PeerId> = if candidates.is_empty() {
            let mut known: BTreeSet<PeerId> = self.store.peers()?.into_iter().collect();
            known.extend(self.host.connections().into_iter().map(|c| c.peer_id));
            known
        } else {
            candidates.iter().copied().collect()
        };

        let mut filtered = Vec::with_capacity(pool.len());
        for peer_id in pool {
            if self.supports(&peer_id, protocol)? {
                filtered.push(peer_id);
            }
        }
        Ok(filtered)
    }

    /// A peer supports a protocol if it advertises it on a live connection or
    /// the store has it tagged.
    fn supports(&self, peer_id: &PeerId, protocol: &StreamProtocol) -> Result<bool, PeerStoreError> {
        if self.host.peer_protocols(peer_id).contains(protocol) {
            return Ok(true);
        }
        self.store.supports_protocol(peer_id, protocol)
    }

    fn supports_relay(&self, peer_id: &PeerId) -> bool {
        self.supports(peer_id, &RELAY_PROTOCOL).unwrap_or_else(|e| {
            warn!(%peer_id, %e, "could not read peer protocols");
            false
        })
    }

    /// Disconnect the most recently connected inbound relay peers above the
    /// inbound target. Returns how many were pruned.
    ///
    /// Outbound peers and inbound peers without relay are never touched.
    pub async fn prune_in_relay_conns(&self) -> usize {
        let PeersByDirection { inbound, outbound } = self.host.peers_by_direction();

        let mut in_relay: Vec<ConnectionInfo> = inbound
            .iter()
            .filter(|c| self.supports_relay(&c.peer_id))
            .cloned()
            .collect();
        let out_relay = outbound
            .iter()
            .filter(|c| self.supports_relay(&c.peer_id))
            .count();

        self.metrics.inbound_relay_peers.set(in_relay.len() as f64);
        self.metrics.outbound_relay_peers.set(out_relay as f64);
        debug!(
            in_peers = inbound.len(),
            out_peers = outbound.len(),
            in_relay_peers = in_relay.len(),
            out_relay_peers = out_relay,
            "connected peers"
        );

        let target = self.targets.inbound;
        if in_relay.len() <= target {
            return 0;
        }

        info!(
            in_relay_peers = in_relay.len(),
            in_relay_target = target,
            "inbound relay peers exceed target, pruning most recent"
        );

        in_relay.sort_by(|a, b| {
            a.established_at
                .cmp(&b.established_at)
                .then_with(|| a.peer_id.cmp(&b.peer_id))
        });
        let excess = in_relay.split_off(target);

        for conn in &excess {
            let peer_id = conn.peer_id;
            match self.host.close_peer(&peer_id).await {
                Ok(()) => info!(%peer_id, "disconnected inbound relay peer"),
                Err(e) => warn!(%peer_id, %e, "failed to disconnect inbound relay peer"),
            }
            if let Err(e) = self.store.remove_peer(&peer_id) {
                warn!(%peer_id, %e, "failed to remove pruned peer record");
            }
        }

        self.metrics.pruned_inbound_total.increment(excess.len() as u64);
        excess.len()
    }
}
