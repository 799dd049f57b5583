//! `PeerNode`: the runtime for a single node in the P2P network.
//!
//! Owns the routing table and both transport halves, runs the
//! gossip/health-check/heartbeat loops, and is the single dispatch point
//! every inbound envelope passes through.

use crate::memory::api::MemoryApi;
use crate::p2p::envelope::{Envelope, MsgType};
use crate::p2p::routing::{method_capabilities, RoutingTable};
use crate::p2p::transport::{TransportClient, TransportServer};
use crate::p2p::types::{generate_node_id, Capability, CapabilitySet, PeerInfo, PeerState, PeerStatus};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

pub const MAX_NEIGHBORS: usize = 8;
pub const GOSSIP_INTERVAL_SECS: u64 = 5;
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 10;
pub const SUSPECT_TIMEOUT_SECS: f64 = 15.0;
pub const DEAD_TIMEOUT_SECS: f64 = 30.0;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 5;
pub const SEEN_MSG_MAX: usize = 10_000;

/// An async callback invoked on every locally observed or network-relayed
/// event, keyed by `(event_type, data)`. Boxed because Rust has no native
/// type for "a `Vec` of distinct async closures".
pub type EventListener = Arc<dyn Fn(String, Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Bounded FIFO set used for flood-dedup; evicts the oldest half once full
/// rather than one at a time, to keep eviction from running every insert
/// once the set is saturated.
#[derive(Default)]
struct SeenMsgs {
    order: VecDeque<String>,
    set: std::collections::HashSet<String>,
}

impl SeenMsgs {
    /// Returns `true` if this id was already seen (and thus should be dropped).
    fn mark_and_check(&mut self, msg_id: &str) -> bool {
        if self.set.contains(msg_id) {
            return true;
        }
        self.set.insert(msg_id.to_string());
        self.order.push_back(msg_id.to_string());
        if self.order.len() > SEEN_MSG_MAX {
            for _ in 0..(SEEN_MSG_MAX / 2) {
                if let Some(oldest) = self.order.pop_front() {
                    self.set.remove(&oldest);
                } else {
                    break;
                }
            }
        }
        false
    }
}

pub struct PeerNode {
    pub node_id: String,
    pub capabilities: CapabilitySet,
    pub info: PeerInfo,
    pub listen_host: String,
    pub listen_port: u16,
    pub bootstrap_peers: Vec<String>,

    pub routing: RoutingTable,
    pub transport_server: TransportServer,
    pub transport_client: TransportClient,

    heartbeat_seq: AtomicU64,
    running: AtomicBool,
    seen_msgs: std::sync::Mutex<SeenMsgs>,
    tasks: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,

    memory: RwLock<Option<Arc<dyn MemoryApi>>>,
    event_listeners: RwLock<Vec<EventListener>>,
}

impl PeerNode {
    pub fn new(
        capabilities: CapabilitySet,
        listen_host: String,
        listen_port: u16,
        bootstrap_peers: Vec<String>,
        node_id: Option<String>,
        advertise_host: Option<String>,
    ) -> Arc<Self> {
        let node_id = node_id.unwrap_or_else(generate_node_id);
        let advertise_host = advertise_host.unwrap_or_else(|| listen_host.clone());
        let http_url = format!("http://{advertise_host}:{listen_port}");
        let stream_url = format!("ws://{advertise_host}:{listen_port}/p2p/ws");
        let info = PeerInfo {
            node_id: node_id.clone(),
            capabilities: capabilities.clone(),
            http_url,
            stream_url,
            started_at: crate::util::unix_time_now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        Arc::new(Self {
            node_id,
            capabilities,
            info,
            listen_host,
            listen_port,
            bootstrap_peers,
            routing: RoutingTable::new(),
            transport_server: TransportServer::new(),
            transport_client: TransportClient::new(),
            heartbeat_seq: AtomicU64::new(0),
            running: AtomicBool::new(false),
            seen_msgs: std::sync::Mutex::new(SeenMsgs::default()),
            tasks: std::sync::Mutex::new(Vec::new()),
            memory: RwLock::new(None),
            event_listeners: RwLock::new(Vec::new()),
        })
    }

    pub async fn register_memory_service(&self, service: Arc<dyn MemoryApi>) {
        *self.memory.write().await = Some(service);
    }

    pub async fn memory_service(&self) -> Option<Arc<dyn MemoryApi>> {
        self.memory.read().await.clone()
    }

    pub async fn add_event_listener(&self, listener: EventListener) {
        self.event_listeners.write().await.push(listener);
    }

    pub fn heartbeat_seq(&self) -> u64 {
        self.heartbeat_seq.load(Ordering::Relaxed)
    }

    pub fn own_peer_state(&self) -> PeerState {
        PeerState {
            info: self.info.clone(),
            status: PeerStatus::Alive,
            last_seen: crate::util::unix_time_now(),
            heartbeat_seq: self.heartbeat_seq(),
            metadata: self.build_metadata(),
        }
    }

    fn build_metadata(&self) -> serde_json::Map<String, Value> {
        let mut m = serde_json::Map::new();
        m.insert("peer_count".into(), json!(self.routing.peer_count()));
        let neighbor_count =
            self.transport_client.connected_peer_ids().len() + self.transport_server.inbound_peer_ids().len();
        m.insert("neighbor_count".into(), json!(neighbor_count));
        m
    }

    // ── Lifecycle ────────────────────────────────────────────────

    pub async fn start(self: &Arc<Self>) -> std::io::Result<()> {
        self.running.store(true, Ordering::SeqCst);

        self.transport_server
            .start(&self.listen_host, self.listen_port, Arc::downgrade(self))
            .await?;
        info!(
            "node {} listening on {}:{} capabilities={:?}",
            self.node_id, self.listen_host, self.listen_port, self.capabilities
        );

        for peer_url in self.bootstrap_peers.clone() {
            let learned = self.join_peer(&peer_url).await;
            for ps in &learned {
                self.routing.update_peer(ps.clone());
            }
            if !learned.is_empty() {
                info!("bootstrapped via {peer_url}, learned {} peer(s)", learned.len());
            } else {
                warn!("failed to bootstrap with {peer_url}");
            }
        }

        self.connect_to_neighbors().await;

        let gossip_task = {
            let node = self.clone();
            tokio::spawn(async move {
                while node.running.load(Ordering::SeqCst) {
                    sleep(Duration::from_secs(GOSSIP_INTERVAL_SECS)).await;
                    if !node.running.load(Ordering::SeqCst) {
                        break;
                    }
                    crate::p2p::gossip::gossip_round(&node).await;
                }
            })
        };
        let health_task = {
            let node = self.clone();
            tokio::spawn(async move { node.health_check_loop().await })
        };
        let heartbeat_task = {
            let node = self.clone();
            tokio::spawn(async move { node.heartbeat_loop().await })
        };

        *self.tasks.lock().unwrap() = vec![gossip_task, health_task, heartbeat_task];

        info!("node {} started, knows {} peer(s)", self.node_id, self.routing.peer_count());
        Ok(())
    }

    pub async fn stop(self: &Arc<Self>) {
        self.running.store(false, Ordering::SeqCst);

        let leave = Envelope::new(MsgType::Leave, self.node_id.clone());
        let data = serde_json::to_value(&leave).unwrap_or(json!({}));
        self.transport_client.broadcast_stream(&data);
        self.transport_server.broadcast_inbound(&data);

        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }

        self.transport_client.close_all();
        info!("node {} stopped", self.node_id);
    }

    // ── Bootstrap ────────────────────────────────────────────────

    async fn join_peer(&self, peer_url: &str) -> Vec<PeerState> {
        let envelope = Envelope::new(MsgType::Join, self.node_id.clone())
            .with_payload(json!({"peer_info": self.info}));
        let url = format!("{peer_url}/p2p/message");
        let Some(response) = self.transport_client.http_post(&url, &serde_json::to_value(&envelope).unwrap_or_default()).await else {
            return Vec::new();
        };
        let Some(reply): Option<Envelope> = serde_json::from_value(response).ok() else {
            return Vec::new();
        };
        if reply.msg_type != MsgType::Welcome {
            return Vec::new();
        }
        reply
            .payload
            .get("peers")
            .and_then(|p| p.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Neighbor management ──────────────────────────────────────

    async fn connect_to_neighbors(self: &Arc<Self>) {
        let connected = self.transport_client.connected_peer_ids();
        let needed = MAX_NEIGHBORS.saturating_sub(connected.len());
        if needed == 0 {
            return;
        }

        let mut peers = self.routing.get_alive_peers(&self.node_id);
        peers.sort_by_key(|p| {
            let complementary = p.info.capabilities.difference(&self.capabilities).count();
            std::cmp::Reverse(complementary)
        });

        for ps in peers.into_iter().take(needed) {
            if connected.contains(&ps.info.node_id) {
                continue;
            }
            let node_weak = Arc::downgrade(self);
            let node_id = ps.info.node_id.clone();
            self.transport_client
                .stream_connect(&node_id, &ps.info.stream_url, move |data| {
                    let node_weak = node_weak.clone();
                    async move {
                        if let Some(node) = node_weak.upgrade() {
                            node.on_stream_message(data).await;
                        }
                    }
                })
                .await;
        }
    }

    async fn on_stream_message(self: &Arc<Self>, data: Value) {
        let Ok(envelope) = serde_json::from_value::<Envelope>(data) else {
            return;
        };
        let sender = envelope.sender_id.clone();
        if let Some(reply) = self.handle_envelope(envelope).await {
            let payload = serde_json::to_value(&reply).unwrap_or(json!({}));
            self.transport_client.stream_send(&sender, &payload);
        }
    }

    // ── Background loops ─────────────────────────────────────────

    async fn heartbeat_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            sleep(Duration::from_secs(HEARTBEAT_INTERVAL_SECS)).await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.heartbeat_seq.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn health_check_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            sleep(Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS)).await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let now = crate::util::unix_time_now();
            let mut to_remove = Vec::new();

            for ps in self.routing.get_all_peers() {
                let elapsed = now - ps.last_seen;
                if elapsed > DEAD_TIMEOUT_SECS {
                    to_remove.push(ps.info.node_id.clone());
                } else if elapsed > SUSPECT_TIMEOUT_SECS && ps.status != PeerStatus::Suspect {
                    self.routing.set_status(&ps.info.node_id, PeerStatus::Suspect);
                    let health_url = format!("{}/p2p/health", ps.info.http_url);
                    if self.transport_client.http_post(&health_url, &json!({})).await.is_some() {
                        self.routing.mark_alive(&ps.info.node_id, now);
                    }
                }
            }

            for node_id in &to_remove {
                self.routing.remove_peer(node_id);
                self.transport_client.close(node_id);
                info!("removed dead peer {node_id}");
            }

            self.connect_to_neighbors().await;
        }
    }

    // ── Message dispatch ──────────────────────────────────────────

    /// Central dispatch for every incoming envelope: flood-dedup, then route
    /// by `msg_type`. Returns `Some(reply)` only for request/response-shaped
    /// message types; gossip/event/leave never reply.
    pub async fn handle_envelope(self: &Arc<Self>, envelope: Envelope) -> Option<Envelope> {
        {
            let mut seen = self.seen_msgs.lock().unwrap();
            if seen.mark_and_check(&envelope.msg_id) {
                return None;
            }
        }

        match envelope.msg_type {
            MsgType::Join => Some(self.handle_join(envelope).await),
            MsgType::Gossip => {
                crate::p2p::gossip::handle_gossip(self, &envelope);
                None
            }
            MsgType::Ping => Some(Envelope::new(MsgType::Pong, self.node_id.clone()).with_reply_to(envelope.msg_id)),
            MsgType::Request => Some(self.handle_request(envelope).await),
            MsgType::Event => {
                self.handle_event(envelope).await;
                None
            }
            MsgType::Leave => {
                self.handle_leave(&envelope);
                None
            }
            MsgType::Welcome | MsgType::Response | MsgType::Pong => None,
        }
    }

    async fn handle_join(self: &Arc<Self>, envelope: Envelope) -> Envelope {
        if let Some(peer_info) = envelope
            .payload
            .get("peer_info")
            .and_then(|v| serde_json::from_value::<PeerInfo>(v.clone()).ok())
        {
            self.routing.update_peer(PeerState::alive_now(peer_info, 0));
        }

        let own_state = self.own_peer_state();
        let mut all_peers = vec![own_state];
        all_peers.extend(self.routing.get_all_peers());
        all_peers.retain(|ps| ps.info.node_id != envelope.sender_id);

        Envelope::new(MsgType::Welcome, self.node_id.clone())
            .with_reply_to(envelope.msg_id)
            .with_payload(json!({"peers": all_peers}))
    }

    async fn handle_request(self: &Arc<Self>, envelope: Envelope) -> Envelope {
        let method = envelope.payload.get("method").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let args = envelope.payload.get("args").cloned().unwrap_or(json!({}));

        let required = method_capabilities(&method);
        if !required.is_subset(&self.capabilities) {
            return Envelope::new(MsgType::Response, self.node_id.clone())
                .with_reply_to(envelope.msg_id)
                .with_payload(json!({
                    "result": null,
                    "error": format!("node {} lacks capabilities for '{method}'", self.node_id),
                }));
        }

        let outcome = async {
            let memory = self
                .memory_service()
                .await
                .ok_or_else(|| crate::error::MeshError::ServiceUnavailable("memory".to_string()))?;
            crate::memory::api::dispatch(memory.as_ref(), &method, &args).await
        }
        .await;

        match outcome {
            Ok(result) => {
                match method.as_str() {
                    "observe" | "claim" => {
                        let data = json!({
                            "id": result,
                            "source": args.get("source").cloned().unwrap_or(json!("")),
                            "text": args.get("text").cloned().unwrap_or(json!("")),
                        });
                        self.broadcast_event(&method, data).await;
                    }
                    "flag_contradiction" => {
                        let data = json!({
                            "id1": args.get("id1").cloned().unwrap_or(json!("")),
                            "id2": args.get("id2").cloned().unwrap_or(json!("")),
                            "reason": args.get("reason").cloned().unwrap_or(json!("")),
                        });
                        self.broadcast_event("flag_contradiction", data).await;
                    }
                    "update_schema" => {
                        self.broadcast_event("schema_updated", result.clone()).await;
                    }
                    _ => {}
                }
                Envelope::new(MsgType::Response, self.node_id.clone())
                    .with_reply_to(envelope.msg_id)
                    .with_payload(json!({"result": result, "error": null}))
            }
            Err(e) => {
                warn!("error handling request '{method}': {e}");
                Envelope::new(MsgType::Response, self.node_id.clone())
                    .with_reply_to(envelope.msg_id)
                    .with_payload(json!({"result": null, "error": e.to_string()}))
            }
        }
    }

    async fn handle_event(self: &Arc<Self>, envelope: Envelope) {
        let event_type = envelope.payload.get("event_type").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let data = envelope.payload.get("data").cloned().unwrap_or(json!({}));

        let listeners = self.event_listeners.read().await.clone();
        for listener in &listeners {
            listener(event_type.clone(), data.clone()).await;
        }

        if envelope.ttl > 1 {
            let forwarded = Envelope {
                msg_type: MsgType::Event,
                msg_id: envelope.msg_id.clone(),
                sender_id: envelope.sender_id.clone(),
                recipient_id: String::new(),
                timestamp: envelope.timestamp,
                ttl: envelope.ttl - 1,
                reply_to: String::new(),
                payload: envelope.payload.clone(),
            };
            let data = serde_json::to_value(&forwarded).unwrap_or(json!({}));
            self.transport_client.broadcast_stream(&data);
            self.transport_server.broadcast_inbound(&data);
        }
    }

    fn handle_leave(&self, envelope: &Envelope) {
        self.routing.remove_peer(&envelope.sender_id);
        self.transport_client.close(&envelope.sender_id);
        info!("peer {} left the network", envelope.sender_id);
    }

    /// Flood a locally originated event to the network with the default
    /// three-hop TTL budget. Marks its own `msg_id` seen first so the echo
    /// that floods back doesn't get reprocessed.
    pub async fn broadcast_event(self: &Arc<Self>, event_type: &str, data: Value) {
        let envelope = Envelope::new(MsgType::Event, self.node_id.clone())
            .with_ttl(3)
            .with_payload(json!({"event_type": event_type, "data": data}));
        {
            let mut seen = self.seen_msgs.lock().unwrap();
            seen.mark_and_check(&envelope.msg_id);
        }
        let payload = serde_json::to_value(&envelope).unwrap_or(json!({}));
        self.transport_client.broadcast_stream(&payload);
        self.transport_server.broadcast_inbound(&payload);
    }

    /// Peers currently reachable with the given capability, for the router.
    pub fn find_peers_with_capability(&self, cap: Capability) -> Vec<PeerState> {
        self.routing.find_peers_with_capability(cap, &self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(caps: &[Capability]) -> Arc<PeerNode> {
        let mut set = CapabilitySet::new();
        set.extend(caps.iter().copied());
        PeerNode::new(set, "127.0.0.1".to_string(), 0, Vec::new(), Some(generate_node_id()), None)
    }

    #[test]
    fn seen_msgs_dedups_and_evicts_oldest_half() {
        let mut seen = SeenMsgs::default();
        assert!(!seen.mark_and_check("a"));
        assert!(seen.mark_and_check("a"));
        for i in 0..SEEN_MSG_MAX {
            seen.mark_and_check(&format!("m{i}"));
        }
        assert!(seen.order.len() <= SEEN_MSG_MAX + 1);
    }

    #[tokio::test]
    async fn own_peer_state_reflects_heartbeat_seq() {
        let n = node(&[Capability::Store]);
        n.heartbeat_seq.fetch_add(4, Ordering::Relaxed);
        let state = n.own_peer_state();
        assert_eq!(state.heartbeat_seq, 4);
        assert_eq!(state.info.node_id, n.node_id);
    }

    #[tokio::test]
    async fn handle_envelope_drops_duplicate_msg_id() {
        let n = node(&[Capability::Store]);
        let env = Envelope::new(MsgType::Ping, "peer-x".to_string());
        let first = n.handle_envelope(env.clone()).await;
        let second = n.handle_envelope(env).await;
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn request_without_capability_returns_error_response() {
        let n = node(&[Capability::Cli]);
        let env = Envelope::new(MsgType::Request, "peer-x".to_string())
            .with_payload(json!({"method": "observe", "args": {"text": "x", "source": "y"}}));
        let reply = n.handle_envelope(env).await.unwrap();
        assert_eq!(reply.msg_type, MsgType::Response);
        assert!(reply.payload.get("error").unwrap().as_str().unwrap().contains("lacks capabilities"));
    }
}
