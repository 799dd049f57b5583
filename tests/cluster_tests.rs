//! Multi-node integration tests for the P2P overlay: two real nodes bound to
//! localhost ports, actually joining and gossiping over HTTP/websocket, not
//! just exercising the in-process `RoutingTable`/`Envelope` unit paths the
//! `p2p` module's own `#[cfg(test)]` blocks already cover.

use agentic_memory_mesh::memory::{InMemoryGraphStore, MemoryApi, MemoryRouter, MemoryService, MockLlmClient};
use agentic_memory_mesh::p2p::{Capability, CapabilitySet, PeerNode};
use agentic_memory_mesh::schema::SchemaStore;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn caps(names: &[Capability]) -> CapabilitySet {
    names.iter().copied().collect()
}

async fn schema_store() -> Arc<SchemaStore> {
    let path = std::env::temp_dir().join(format!("cluster-test-schema-{}.yaml", uuid::Uuid::new_v4()));
    Arc::new(SchemaStore::load(path).await.unwrap())
}

#[tokio::test]
async fn two_nodes_join_and_see_each_other() {
    let store_node = PeerNode::new(
        caps(&[Capability::Store, Capability::Llm]),
        "127.0.0.1".to_string(),
        19401,
        Vec::new(),
        None,
        None,
    );
    store_node
        .register_memory_service(Arc::new(MemoryService::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(MockLlmClient::new()),
            schema_store().await,
        )))
        .await;
    store_node.start().await.unwrap();

    let client_node = PeerNode::new(
        caps(&[Capability::Cli]),
        "127.0.0.1".to_string(),
        19402,
        vec!["http://127.0.0.1:19401".to_string()],
        None,
        None,
    );
    client_node.start().await.unwrap();

    sleep(Duration::from_millis(300)).await;

    assert_eq!(client_node.routing.peer_count(), 1);
    let known = client_node.routing.get_peer(&store_node.node_id);
    assert!(known.is_some());

    store_node.stop().await;
    client_node.stop().await;
}

#[tokio::test]
async fn request_routes_to_the_capable_peer_over_rpc() {
    let store_node = PeerNode::new(
        caps(&[Capability::Store, Capability::Llm]),
        "127.0.0.1".to_string(),
        19403,
        Vec::new(),
        None,
        None,
    );
    store_node
        .register_memory_service(Arc::new(MemoryService::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(MockLlmClient::new()),
            schema_store().await,
        )))
        .await;
    store_node.start().await.unwrap();

    let caller_node = PeerNode::new(
        CapabilitySet::new(),
        "127.0.0.1".to_string(),
        19404,
        vec!["http://127.0.0.1:19403".to_string()],
        None,
        None,
    );
    caller_node.start().await.unwrap();

    sleep(Duration::from_millis(300)).await;

    let router: Arc<dyn MemoryApi> = Arc::new(MemoryRouter::new(caller_node.clone()));
    let id = router
        .observe("alice likes morning meetings".to_string(), "test".to_string())
        .await
        .expect("observe should route over rpc to the store node");
    assert!(!id.is_empty());

    let observations = router.get_recent_observations(10).await.unwrap();
    assert!(observations.iter().any(|o| o.id == id));

    store_node.stop().await;
    caller_node.stop().await;
}

#[tokio::test]
async fn event_emitted_after_local_claim_reaches_a_listening_neighbor() {
    let store_node = PeerNode::new(
        caps(&[Capability::Store, Capability::Llm]),
        "127.0.0.1".to_string(),
        19405,
        Vec::new(),
        None,
        None,
    );
    store_node
        .register_memory_service(Arc::new(MemoryService::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(MockLlmClient::new()),
            schema_store().await,
        )))
        .await;
    store_node.start().await.unwrap();

    let neighbor = PeerNode::new(
        caps(&[Capability::Validation]),
        "127.0.0.1".to_string(),
        19406,
        vec!["http://127.0.0.1:19405".to_string()],
        None,
        None,
    );

    let seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
    {
        let seen = seen.clone();
        neighbor
            .add_event_listener(Arc::new(move |event_type: String, _data: serde_json::Value| {
                let seen = seen.clone();
                async move {
                    if event_type == "claim" {
                        seen.store(true, std::sync::atomic::Ordering::SeqCst);
                    }
                }
                .boxed()
            }))
            .await;
    }
    neighbor.start().await.unwrap();

    sleep(Duration::from_millis(300)).await;

    let router: Arc<dyn MemoryApi> = Arc::new(MemoryRouter::new(store_node.clone()));
    router
        .claim("alice lives_in paris".to_string(), "test".to_string())
        .await
        .unwrap();

    sleep(Duration::from_millis(300)).await;

    assert!(seen.load(std::sync::atomic::Ordering::SeqCst), "neighbor never observed the claim event");

    store_node.stop().await;
    neighbor.stop().await;
}
