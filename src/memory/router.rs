//! `MemoryRouter`: the mesh-wide `MemoryApi`. Executes locally when the
//! owning node is capable, otherwise RPCs a capable peer over the same
//! call surface `MemoryService` implements.

use crate::error::{MeshError, MeshResult};
use crate::memory::api::{dispatch, MemoryApi, SchemaChanges};
use crate::memory::graph::{Concept, Observation, Statement};
use crate::p2p::envelope::{Envelope, MsgType};
use crate::p2p::node::PeerNode;
use crate::p2p::routing::method_capabilities;
use crate::p2p::types::Capability;
use crate::schema::store::SchemaSnapshot;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Implements the full `MemoryApi` for any node, regardless of its own
/// capabilities: local fast path when capable, RPC fan-out otherwise.
pub struct MemoryRouter {
    node: Arc<PeerNode>,
}

impl MemoryRouter {
    pub fn new(node: Arc<PeerNode>) -> Self {
        Self { node }
    }

    fn is_locally_capable(&self, method: &str) -> bool {
        method_capabilities(method).is_subset(&self.node.capabilities)
    }

    async fn call(&self, method: &str, args: Value) -> MeshResult<Value> {
        if self.is_locally_capable(method) {
            let memory = self
                .node
                .memory_service()
                .await
                .ok_or_else(|| MeshError::ServiceUnavailable("memory".to_string()))?;
            let result = dispatch(memory.as_ref(), method, &args).await?;
            match method {
                "observe" | "claim" | "flag_contradiction" => {
                    let data = json!({
                        "id": result,
                        "source": args.get("source").cloned().unwrap_or(Value::Null),
                    });
                    self.node.broadcast_event(method, data).await;
                }
                "update_schema" => {
                    self.node.broadcast_event("schema_updated", result.clone()).await;
                }
                _ => {}
            }
            return Ok(result);
        }

        let required: Vec<Capability> = method_capabilities(method).into_iter().collect();
        let Some(peer) = self.node.routing.route_method(method, &self.node.node_id) else {
            return Err(MeshError::NoCapablePeer {
                method: method.to_string(),
                capabilities: required.iter().map(|c| c.as_str().to_string()).collect(),
            });
        };

        let envelope = Envelope::new(MsgType::Request, self.node.node_id.clone())
            .with_payload(json!({"method": method, "args": args}));
        let url = format!("{}/p2p/message", peer.info.http_url);
        let body = serde_json::to_value(&envelope)?;

        let response = if method == "infer" || method == "observe" || method == "claim" {
            self.node.transport_client.http_post_long(&url, &body).await
        } else {
            self.node.transport_client.http_post(&url, &body).await
        };

        let Some(response) = response else {
            return Err(MeshError::Transport(format!(
                "peer {} unreachable for method '{method}'",
                peer.info.node_id
            )));
        };
        let reply: Envelope = serde_json::from_value(response)
            .map_err(|e| MeshError::ProtocolError(format!("malformed reply: {e}")))?;
        if reply.msg_type != MsgType::Response {
            return Err(MeshError::ProtocolError(format!(
                "unexpected reply type '{:?}'",
                reply.msg_type
            )));
        }
        if let Some(err) = reply.payload.get("error").and_then(Value::as_str) {
            return Err(MeshError::RemoteError(err.to_string()));
        }
        Ok(reply.payload.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl MemoryApi for MemoryRouter {
    async fn observe(&self, text: String, source: String) -> MeshResult<String> {
        let result = self.call("observe", json!({"text": text, "source": source})).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    async fn claim(&self, text: String, source: String) -> MeshResult<String> {
        let result = self.call("claim", json!({"text": text, "source": source})).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    async fn remember(&self, query: String) -> MeshResult<String> {
        let result = self.call("remember", json!({"query": query})).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    async fn infer(&self, observation_text: String) -> MeshResult<Option<String>> {
        let result = self.call("infer", json!({"observation_text": observation_text})).await?;
        Ok(result.as_str().map(|s| s.to_string()))
    }

    async fn flag_contradiction(&self, id1: String, id2: String, reason: String) -> MeshResult<()> {
        self.call("flag_contradiction", json!({"id1": id1, "id2": id2, "reason": reason}))
            .await?;
        Ok(())
    }

    async fn get_recent_observations(&self, limit: usize) -> MeshResult<Vec<Observation>> {
        let result = self.call("get_recent_observations", json!({"limit": limit})).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn get_recent_statements(&self, limit: usize) -> MeshResult<Vec<Statement>> {
        let result = self.call("get_recent_statements", json!({"limit": limit})).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn get_unresolved_contradictions(&self) -> MeshResult<Vec<(Statement, Statement)>> {
        let result = self.call("get_unresolved_contradictions", json!({})).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn get_concepts(&self) -> MeshResult<Vec<Concept>> {
        let result = self.call("get_concepts", json!({})).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn get_schema(&self) -> MeshResult<SchemaSnapshot> {
        let result = self.call("get_schema", json!({})).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn update_schema(&self, changes: SchemaChanges, source: String) -> MeshResult<SchemaSnapshot> {
        let result = self
            .call("update_schema", json!({"changes": changes, "source": source}))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn clear(&self) -> MeshResult<()> {
        self.call("clear", json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p2p::types::{generate_node_id, CapabilitySet};

    #[tokio::test]
    async fn routes_locally_when_capable_but_no_service_registered() {
        let mut caps = CapabilitySet::new();
        caps.insert(Capability::Store);
        caps.insert(Capability::Llm);
        let node = PeerNode::new(caps, "127.0.0.1".to_string(), 0, Vec::new(), Some(generate_node_id()), None);
        let router = MemoryRouter::new(node);
        let err = router.observe("hi".to_string(), "test".to_string()).await.unwrap_err();
        assert!(matches!(err, MeshError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn fails_fast_with_no_capable_peer() {
        let caps = CapabilitySet::new();
        let node = PeerNode::new(caps, "127.0.0.1".to_string(), 0, Vec::new(), Some(generate_node_id()), None);
        let router = MemoryRouter::new(node);
        let err = router.observe("hi".to_string(), "test".to_string()).await.unwrap_err();
        assert!(matches!(err, MeshError::NoCapablePeer { .. }));
    }
}
