//! Property tests for core invariants — routing capability-superset,
//! envelope JSON round-tripping, and idempotency-state membership — run
//! over randomized inputs rather than the fixed examples the in-module
//! unit tests already cover.

use agentic_memory_mesh::agent::AgentState;
use agentic_memory_mesh::p2p::{method_capabilities, Capability, CapabilitySet, Envelope, MsgType, RoutingTable};
use proptest::prelude::*;

fn arb_capability() -> impl Strategy<Value = Capability> {
    prop_oneof![
        Just(Capability::Store),
        Just(Capability::Llm),
        Just(Capability::Inference),
        Just(Capability::Validation),
        Just(Capability::Cli),
    ]
}

fn arb_capability_set() -> impl Strategy<Value = CapabilitySet> {
    prop::collection::vec(arb_capability(), 0..5).prop_map(|v| v.into_iter().collect())
}

fn arb_method() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("observe"),
        Just("claim"),
        Just("remember"),
        Just("infer"),
        Just("flag_contradiction"),
        Just("get_recent_observations"),
        Just("get_schema"),
        Just("update_schema"),
        Just("nonexistent_method"),
    ]
}

proptest! {
    /// `route_method` only ever returns a peer whose capabilities are a
    /// superset of what the method requires.
    #[test]
    fn route_method_only_returns_capability_supersets(
        method in arb_method(),
        peer_caps in prop::collection::vec(arb_capability_set(), 1..6),
    ) {
        let table = RoutingTable::new();
        for (i, caps) in peer_caps.iter().enumerate() {
            let info = agentic_memory_mesh::p2p::PeerInfo::new(
                format!("node-{i:08}"),
                caps.clone(),
                format!("http://peer-{i}"),
                format!("ws://peer-{i}/p2p/ws"),
            );
            table.update_peer(agentic_memory_mesh::p2p::PeerState::alive_now(info, 0));
        }

        let required = method_capabilities(method);
        if let Some(chosen) = table.route_method(method, "caller") {
            prop_assert!(required.is_subset(&chosen.info.capabilities));
        }
    }

    /// Every `Envelope` round-trips through JSON as the identical value,
    /// for arbitrary ttl and payload shapes, not just the fixed example in
    /// `p2p::envelope`'s own unit tests.
    #[test]
    fn envelope_json_round_trip_is_identity(
        ttl in 0u32..10,
        sender in "[a-z0-9-]{1,16}",
        key in "[a-z]{1,8}",
        value in any::<i64>(),
    ) {
        let env = Envelope::new(MsgType::Event, sender)
            .with_ttl(ttl)
            .with_payload(serde_json::json!({ key.clone(): value }));
        let s = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&s).unwrap();
        prop_assert_eq!(back.msg_id, env.msg_id);
        prop_assert_eq!(back.ttl, env.ttl);
        prop_assert_eq!(back.payload, env.payload);
    }

    /// A key marked processed stays processed no matter how many more
    /// distinct members are marked afterward, and members never marked
    /// stay unprocessed.
    #[test]
    fn agent_state_membership_is_stable(
        marked in prop::collection::vec("[a-z0-9]{1,12}", 1..30),
        unmarked in prop::collection::vec("[a-z0-9]{1,12}", 0..30),
    ) {
        let state = AgentState::new();
        for m in &marked {
            state.mark_processed("k", m);
        }
        for m in &marked {
            prop_assert!(state.is_processed("k", m));
        }
        for u in &unmarked {
            if !marked.contains(u) {
                prop_assert!(!state.is_processed("k", u));
            }
        }
    }
}
