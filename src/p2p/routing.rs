//! Capability-based routing table for the P2P network.

use crate::p2p::types::{Capability, CapabilitySet, PeerState, PeerStatus};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use std::collections::HashMap;

/// Compile-time method→capability table, part of the wire contract
/// (replicated at both caller and callee, so neither needs to ask the
/// other what a method requires).
pub fn method_capabilities(method: &str) -> CapabilitySet {
    let caps: &[Capability] = match method {
        "observe" | "claim" | "remember" => &[Capability::Store, Capability::Llm],
        "infer" => &[Capability::Llm],
        "flag_contradiction"
        | "get_recent_observations"
        | "get_recent_statements"
        | "get_unresolved_contradictions"
        | "get_concepts"
        | "clear"
        | "get_schema"
        | "update_schema" => &[Capability::Store],
        _ => &[],
    };
    caps.iter().copied().collect()
}

/// A remapped `(http_url, stream_url)` pair for a peer reachable only via a
/// translated address.
#[derive(Debug, Clone)]
pub struct UrlOverride {
    pub http_url: String,
    pub stream_url: String,
}

/// Maps `node_id → PeerState`, the local view of the network.
///
/// Backed by `DashMap`, which gives fine-grained per-entry locking without
/// a crate-wide mutex.
pub struct RoutingTable {
    peers: DashMap<String, PeerState>,
    url_overrides: DashMap<String, UrlOverride>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            url_overrides: DashMap::new(),
        }
    }

    /// Register a URL override, re-applied to the peer's stored `PeerInfo`
    /// on every subsequent `update_peer` for that id.
    pub fn set_url_override(&self, node_id: impl Into<String>, http_url: String, stream_url: String) {
        self.url_overrides
            .insert(node_id.into(), UrlOverride { http_url, stream_url });
    }

    fn apply_override(&self, state: &mut PeerState) {
        if let Some(ov) = self.url_overrides.get(&state.info.node_id) {
            state.info.http_url = ov.http_url.clone();
            state.info.stream_url = ov.stream_url.clone();
        }
    }

    /// Insert if new; replace when `heartbeat_seq` is strictly higher;
    /// otherwise refresh `last_seen`/`status` if evidence is newer.
    /// Returns `true` iff a stored field actually changed.
    pub fn update_peer(&self, mut state: PeerState) -> bool {
        self.apply_override(&mut state);
        let node_id = state.info.node_id.clone();

        match self.peers.get_mut(&node_id) {
            None => {
                self.peers.insert(node_id, state);
                true
            }
            Some(mut existing) => {
                if state.heartbeat_seq > existing.heartbeat_seq {
                    *existing = state;
                    self.apply_override(&mut existing);
                    true
                } else if state.last_seen > existing.last_seen {
                    existing.last_seen = state.last_seen;
                    existing.status = PeerStatus::Alive;
                    false
                } else {
                    false
                }
            }
        }
    }

    /// Idempotent removal.
    pub fn remove_peer(&self, node_id: &str) {
        self.peers.remove(node_id);
    }

    pub fn find_peers_with_capability(&self, cap: Capability, exclude: &str) -> Vec<PeerState> {
        self.peers
            .iter()
            .filter(|e| {
                e.value().status == PeerStatus::Alive
                    && e.value().info.capabilities.contains(&cap)
                    && e.key() != exclude
            })
            .map(|e| e.value().clone())
            .collect()
    }

    /// Resolve `method` to its required capability set, then uniformly-at-
    /// random pick one alive peer whose capability set is a superset.
    pub fn route_method(&self, method: &str, exclude: &str) -> Option<PeerState> {
        let required = method_capabilities(method);
        let candidates: Vec<PeerState> = self
            .peers
            .iter()
            .filter(|e| {
                e.value().status == PeerStatus::Alive
                    && e.key() != exclude
                    && required.is_subset(&e.value().info.capabilities)
            })
            .map(|e| e.value().clone())
            .collect();
        candidates.choose(&mut rand::thread_rng()).cloned()
    }

    pub fn get_alive_peers(&self, exclude: &str) -> Vec<PeerState> {
        self.peers
            .iter()
            .filter(|e| e.value().status == PeerStatus::Alive && e.key() != exclude)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn get_all_peers(&self) -> Vec<PeerState> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get_peer(&self, node_id: &str) -> Option<PeerState> {
        self.peers.get(node_id).map(|e| e.value().clone())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Mark a peer's status in place without altering `heartbeat_seq`.
    pub fn set_status(&self, node_id: &str, status: PeerStatus) {
        if let Some(mut e) = self.peers.get_mut(node_id) {
            e.status = status;
        }
    }

    /// Refresh `last_seen`/`status=alive` after a successful liveness probe.
    pub fn mark_alive(&self, node_id: &str, last_seen: f64) {
        if let Some(mut e) = self.peers.get_mut(node_id) {
            e.status = PeerStatus::Alive;
            e.last_seen = last_seen;
        }
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot helper for gossip/health-check callers that want a stable
/// `node_id → elapsed` view without holding the table locked.
pub fn elapsed_since(peers: &[PeerState], now: f64) -> HashMap<String, f64> {
    peers
        .iter()
        .map(|p| (p.info.node_id.clone(), now - p.last_seen))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p2p::types::PeerInfo;

    fn peer(id: &str, caps: &[Capability], seq: u64) -> PeerState {
        let mut set = CapabilitySet::new();
        set.extend(caps.iter().copied());
        let info = PeerInfo::new(id, set, format!("http://{id}"), format!("ws://{id}/p2p/ws"));
        PeerState::alive_now(info, seq)
    }

    #[test]
    fn update_peer_inserts_new() {
        let rt = RoutingTable::new();
        assert!(rt.update_peer(peer("node-a", &[Capability::Store], 0)));
        assert_eq!(rt.peer_count(), 1);
    }

    #[test]
    fn update_peer_replaces_on_higher_seq() {
        let rt = RoutingTable::new();
        rt.update_peer(peer("node-a", &[Capability::Store], 1));
        assert!(rt.update_peer(peer("node-a", &[Capability::Store], 2)));
        assert_eq!(rt.get_peer("node-a").unwrap().heartbeat_seq, 2);
    }

    #[test]
    fn update_peer_ignores_lower_or_equal_seq() {
        let rt = RoutingTable::new();
        rt.update_peer(peer("node-a", &[Capability::Store], 5));
        assert!(!rt.update_peer(peer("node-a", &[Capability::Store], 5)));
        assert!(!rt.update_peer(peer("node-a", &[Capability::Store], 3)));
        assert_eq!(rt.get_peer("node-a").unwrap().heartbeat_seq, 5);
    }

    #[test]
    fn route_method_requires_full_capability_superset() {
        let rt = RoutingTable::new();
        rt.update_peer(peer("node-a", &[Capability::Store], 0));
        rt.update_peer(peer("node-b", &[Capability::Store, Capability::Llm], 0));
        let routed = rt.route_method("observe", "");
        assert_eq!(routed.unwrap().info.node_id, "node-b");
    }

    #[test]
    fn route_method_none_when_no_candidate() {
        let rt = RoutingTable::new();
        rt.update_peer(peer("node-a", &[Capability::Store], 0));
        assert!(rt.route_method("observe", "").is_none());
    }

    #[test]
    fn url_override_survives_gossip_update() {
        let rt = RoutingTable::new();
        rt.set_url_override("node-a", "http://real".into(), "ws://real/p2p/ws".into());
        rt.update_peer(peer("node-a", &[Capability::Store], 1));
        let p = rt.get_peer("node-a").unwrap();
        assert_eq!(p.info.http_url, "http://real");
    }

    #[test]
    fn remove_peer_is_idempotent() {
        let rt = RoutingTable::new();
        rt.remove_peer("node-a");
        rt.update_peer(peer("node-a", &[Capability::Store], 0));
        rt.remove_peer("node-a");
        rt.remove_peer("node-a");
        assert_eq!(rt.peer_count(), 0);
    }
}
