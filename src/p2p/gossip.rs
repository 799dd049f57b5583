//! Push-based gossip protocol for propagating peer state.
//!
//! Push-only: there is no anti-entropy pull. Local receive time always
//! overwrites the sender's claimed `last_seen`, so clock skew between
//! nodes can't corrupt liveness tracking.

use crate::p2p::envelope::{Envelope, MsgType};
use crate::p2p::node::PeerNode;
use crate::p2p::types::PeerState;
use rand::seq::SliceRandom;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const GOSSIP_FANOUT: usize = 3;

/// Run one gossip round: push `[self] ++ known` to up to [`GOSSIP_FANOUT`]
/// neighbours chosen uniformly at random from the union of inbound and
/// outbound stream peers.
pub async fn gossip_round(node: &Arc<PeerNode>) {
    let inbound = node.transport_server.inbound_peer_ids();
    let outbound = node.transport_client.connected_peer_ids();
    let mut neighbor_ids: Vec<String> = inbound.union(&outbound).cloned().collect();
    if neighbor_ids.is_empty() {
        return;
    }
    neighbor_ids.sort();
    let fanout = GOSSIP_FANOUT.min(neighbor_ids.len());
    let targets: Vec<&String> = neighbor_ids
        .choose_multiple(&mut rand::thread_rng(), fanout)
        .collect();

    let own_state = node.own_peer_state();
    let mut all_states = vec![own_state];
    all_states.extend(node.routing.get_all_peers());

    let envelope = Envelope::new(MsgType::Gossip, node.node_id.clone()).with_payload(json!({
        "peer_states": all_states,
    }));
    let data = serde_json::to_value(&envelope).unwrap_or(json!({}));

    for target_id in targets {
        let sent = node.transport_client.stream_send(target_id, &data);
        if !sent {
            node.transport_server.send_to_inbound(target_id, &data);
        }
    }
}

/// Process an incoming `gossip` envelope: for each advertised peer state
/// other than self, stamp local receive time, re-apply URL overrides, then
/// merge into the routing table.
pub fn handle_gossip(node: &PeerNode, envelope: &Envelope) {
    let now = crate::util::unix_time_now();
    let Some(states) = envelope.payload.get("peer_states") else {
        return;
    };
    let Some(states) = states.as_array() else {
        return;
    };
    for raw in states {
        let Ok(mut state) = serde_json::from_value::<PeerState>(raw.clone()) else {
            continue;
        };
        if state.info.node_id == node.node_id {
            continue;
        }
        state.last_seen = now;
        let updated = node.routing.update_peer(state.clone());
        if updated {
            debug!(
                "gossip: updated peer {} (seq={}, caps={:?})",
                state.info.node_id, state.heartbeat_seq, state.info.capabilities
            );
        }
    }
}
