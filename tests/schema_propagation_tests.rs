//! Cross-node schema hot-reload: an `update_schema` call on the store node
//! must reach a remote validator node as a `schema_updated` event and take
//! effect on its very next `process()` tick, without a restart.

use agentic_memory_mesh::agent::{AgentState, ValidatorAgent, Worker};
use agentic_memory_mesh::memory::{
    InMemoryGraphStore, MemoryApi, MemoryRouter, MemoryService, MockLlmClient, PredicateChange, SchemaChanges,
};
use agentic_memory_mesh::p2p::{Capability, CapabilitySet, PeerNode};
use agentic_memory_mesh::schema::{Cardinality, SchemaStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn single_valued_predicate(name: &str) -> PredicateChange {
    PredicateChange {
        name: name.to_string(),
        cardinality: Some(Cardinality::Single),
        temporality: None,
        aliases: None,
        origin: Some("test".to_string()),
        reasoning: None,
        last_reviewed: None,
    }
}

fn caps(names: &[Capability]) -> CapabilitySet {
    names.iter().copied().collect()
}

#[tokio::test]
async fn tightening_a_predicate_to_single_valued_flags_existing_statements_on_the_remote_validator() {
    let schema_path = std::env::temp_dir().join(format!("schema-prop-{}.yaml", uuid::Uuid::new_v4()));
    let schema = Arc::new(SchemaStore::load(schema_path).await.unwrap());

    let store_node = PeerNode::new(
        caps(&[Capability::Store, Capability::Llm]),
        "127.0.0.1".to_string(),
        19501,
        Vec::new(),
        None,
        None,
    );
    store_node
        .register_memory_service(Arc::new(MemoryService::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(MockLlmClient::new()),
            schema,
        )))
        .await;
    store_node.start().await.unwrap();

    let validator_node = PeerNode::new(
        caps(&[Capability::Validation]),
        "127.0.0.1".to_string(),
        19502,
        vec!["http://127.0.0.1:19501".to_string()],
        None,
        None,
    );
    validator_node.start().await.unwrap();

    sleep(Duration::from_millis(300)).await;

    let store_router: Arc<dyn MemoryApi> = Arc::new(MemoryRouter::new(store_node.clone()));
    let validator_router: Arc<dyn MemoryApi> = Arc::new(MemoryRouter::new(validator_node.clone()));

    // `has_hobby` is multi-valued in the bootstrap schema, so two different
    // hobbies on the same subject don't conflict yet.
    store_router
        .claim("alice has hobby chess".to_string(), "test".to_string())
        .await
        .unwrap();
    store_router
        .claim("alice has hobby painting".to_string(), "test".to_string())
        .await
        .unwrap();

    let agent = ValidatorAgent::new(validator_router.clone(), Arc::new(AgentState::new()));
    agent.process().await.unwrap();
    assert!(
        validator_router.get_unresolved_contradictions().await.unwrap().is_empty(),
        "has_hobby is still multi-valued, nothing should be flagged"
    );

    store_router
        .update_schema(
            SchemaChanges {
                add_predicates: vec![single_valued_predicate("has_hobby")],
                add_exclusivity_groups: Vec::new(),
            },
            "test".to_string(),
        )
        .await
        .unwrap();

    sleep(Duration::from_millis(300)).await;

    agent.process().await.unwrap();
    assert_eq!(
        validator_router.get_unresolved_contradictions().await.unwrap().len(),
        1,
        "validator should pick up the schema change from the mesh event and flag the now-conflicting pair"
    );

    store_node.stop().await;
    validator_node.stop().await;
}
