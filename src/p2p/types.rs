//! Core P2P types: node identity, capabilities, and peer state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Services a node can provide to the network.
///
/// Closed enum. Serializes as its lowercase string form so wire payloads
/// match the `store`/`llm`/`inference`/`validation`/`cli` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Store,
    Llm,
    Inference,
    Validation,
    Cli,
}

impl Capability {
    /// All capability variants, used for arg parsing and tests.
    pub const ALL: [Capability; 5] = [
        Capability::Store,
        Capability::Llm,
        Capability::Inference,
        Capability::Validation,
        Capability::Cli,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Store => "store",
            Capability::Llm => "llm",
            Capability::Inference => "inference",
            Capability::Validation => "validation",
            Capability::Cli => "cli",
        }
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "store" => Ok(Capability::Store),
            "llm" => Ok(Capability::Llm),
            "inference" => Ok(Capability::Inference),
            "validation" => Ok(Capability::Validation),
            "cli" => Ok(Capability::Cli),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A set of capabilities, kept sorted so gossip/serialization is deterministic.
pub type CapabilitySet = BTreeSet<Capability>;

/// Generate a stable, opaque node id: `node-<8 hex chars>`.
pub fn generate_node_id() -> String {
    format!("node-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Immutable identity of a node, gossiped verbatim.
///
/// Two `PeerInfo`s are equal iff all fields match. `capabilities` is a
/// `BTreeSet` so `Serialize` already produces a sorted sequence —
/// deterministic hashing falls out of that for free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub node_id: String,
    pub capabilities: CapabilitySet,
    pub http_url: String,
    pub stream_url: String,
    pub started_at: f64,
    pub version: String,
}

impl PeerInfo {
    pub fn new(
        node_id: impl Into<String>,
        capabilities: CapabilitySet,
        http_url: impl Into<String>,
        stream_url: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            capabilities,
            http_url: http_url.into(),
            stream_url: stream_url.into(),
            started_at: crate::util::unix_time_now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Local liveness classification for a known peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Alive,
    Suspect,
    Dead,
}

/// Mutable, locally maintained state about a known peer.
///
/// Invariants: `heartbeat_seq` never decreases for a given `node_id`;
/// `status == Alive` implies `last_seen` within `DEAD_TIMEOUT` of now.
/// Both are enforced by `RoutingTable::update_peer`, not here — this
/// type is a plain data holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerState {
    pub info: PeerInfo,
    pub status: PeerStatus,
    /// Local monotonic/wall timestamp (unix seconds) of last evidence of life.
    pub last_seen: f64,
    /// Monotonic counter, advanced only by the owning node.
    pub heartbeat_seq: u64,
    /// Free-form diagnostic map (e.g. peer_count, neighbor_count).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PeerState {
    pub fn alive_now(info: PeerInfo, heartbeat_seq: u64) -> Self {
        Self {
            info,
            status: PeerStatus::Alive,
            last_seen: crate::util::unix_time_now(),
            heartbeat_seq,
            metadata: serde_json::Map::new(),
        }
    }
}
