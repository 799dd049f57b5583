//! `MemoryService`: the in-process `MemoryApi` implementation that composes
//! a [`GraphStore`] and an [`LlmClient`].
//!
//! Contradiction detection is deliberately absent here — that's the
//! validator agent's job via `flag_contradiction`.

use crate::error::MeshResult;
use crate::memory::api::{MemoryApi, SchemaChanges};
use crate::memory::graph::{Concept, GraphStore, Observation, Statement};
use crate::memory::llm::LlmClient;
use crate::schema::store::{SchemaSnapshot, SchemaStore};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "that", "this", "of", "in", "to", "for", "and",
    "or",
];

/// Check two strings for significant word overlap, stopwords removed.
/// The `2.min(words_a.len())` threshold lets a short basis description of
/// just one significant word still match.
fn text_overlap(a: &str, b: &str) -> bool {
    let stop: std::collections::HashSet<&str> = STOPWORDS.iter().copied().collect();
    let words_a: std::collections::HashSet<String> = a
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| !stop.contains(w.as_str()))
        .collect();
    let words_b: std::collections::HashSet<String> = b
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| !stop.contains(w.as_str()))
        .collect();
    if words_a.is_empty() || words_b.is_empty() {
        return false;
    }
    let overlap = words_a.intersection(&words_b).count();
    overlap >= 2.min(words_a.len())
}

/// Composes a graph store and an LLM translator into the full `MemoryApi`
/// contract. Owns the node's `SchemaStore` too, since
/// `get_schema`/`update_schema` are store-capability methods.
pub struct MemoryService {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LlmClient>,
    schema: Arc<SchemaStore>,
}

impl MemoryService {
    pub fn new(store: Arc<dyn GraphStore>, llm: Arc<dyn LlmClient>, schema: Arc<SchemaStore>) -> Self {
        Self { store, llm, schema }
    }

    async fn find_matching_node(&self, description_lower: &str) -> Option<Value> {
        for obs in self.store.find_recent_observations(20).await.ok()? {
            if text_overlap(description_lower, &obs.raw_content.to_lowercase()) {
                return Some(json!({"id": obs.id, "kind": "observation"}));
            }
        }
        for stmt in self.store.find_recent_statements(20).await.ok()? {
            let combined = format!("{} {} {}", stmt.subject_name, stmt.predicate, stmt.object_name).to_lowercase();
            if text_overlap(description_lower, &combined) {
                return Some(json!({"id": stmt.id, "kind": "statement"}));
            }
        }
        None
    }

    async fn broad_search(&self) -> MeshResult<Vec<Value>> {
        let obs = self.store.find_recent_observations(10).await?;
        let stmts = self.store.find_recent_statements(10).await?;
        let mut rows = Vec::with_capacity(obs.len() + stmts.len());
        for s in stmts {
            rows.push(json!({"node": serde_json::to_value(&s)?, "kind": "statement"}));
        }
        for o in obs {
            rows.push(json!({"node": serde_json::to_value(&o)?, "kind": "observation"}));
        }
        Ok(rows)
    }
}

#[async_trait]
impl MemoryApi for MemoryService {
    async fn observe(&self, text: String, source: String) -> MeshResult<String> {
        let obs_id = uuid::Uuid::new_v4().to_string();
        let extraction = self.llm.extract_observation(&text).await?;

        let source_id = self.store.get_or_create_source(&source, "user").await?;
        self.store.create_observation(&obs_id, &text, &extraction.topics).await?;
        self.store.create_edge(&obs_id, "RECORDED_BY", &source_id, None).await?;

        for concept in &extraction.concepts {
            let cid = self.store.get_or_create_concept(&concept.name, &concept.kind).await?;
            self.store.create_edge(&obs_id, "MENTIONS", &cid, None).await?;

            for component in &concept.components {
                let comp_id = self.store.get_or_create_concept(&component.name, "entity").await?;
                self.store
                    .create_edge(&cid, "RELATED_TO", &comp_id, Some(json!({"relation": component.relation})))
                    .await?;
            }
        }

        info!("observed '{}' ({obs_id})", text.chars().take(60).collect::<String>());
        Ok(obs_id)
    }

    async fn claim(&self, text: String, source: String) -> MeshResult<String> {
        let recent_statements = self.store.find_recent_statements(10).await?;
        let recent_obs = self.store.find_recent_observations(10).await?;
        let context: Vec<Value> = recent_statements
            .iter()
            .map(|s| serde_json::to_value(s).unwrap_or(Value::Null))
            .chain(recent_obs.iter().map(|o| serde_json::to_value(o).unwrap_or(Value::Null)))
            .collect();

        let parsed = self.llm.parse_claim(&text, &context).await?;

        let source_id = self.store.get_or_create_source(&source, "agent").await?;
        let stmt_id = uuid::Uuid::new_v4().to_string();
        self.store
            .create_statement(&stmt_id, &parsed.predicate, parsed.confidence, parsed.negated)
            .await?;

        let subj_id = self.store.get_or_create_concept(&parsed.subject, "entity").await?;
        let obj_id = self.store.get_or_create_concept(&parsed.object, "entity").await?;
        self.store.create_edge(&stmt_id, "ABOUT_SUBJECT", &subj_id, None).await?;
        self.store.create_edge(&stmt_id, "ABOUT_OBJECT", &obj_id, None).await?;
        self.store.create_edge(&stmt_id, "ASSERTED_BY", &source_id, None).await?;

        for basis in &parsed.basis_descriptions {
            if let Some(node) = self.find_matching_node(&basis.to_lowercase()).await {
                if let Some(id) = node.get("id").and_then(Value::as_str) {
                    self.store.create_edge(&stmt_id, "DERIVED_FROM", id, None).await?;
                }
            }
        }

        if let Some(desc) = &parsed.supersedes_description {
            if let Some(node) = self.find_matching_node(&desc.to_lowercase()).await {
                if let Some(id) = node.get("id").and_then(Value::as_str) {
                    self.store.create_edge(&stmt_id, "SUPERSEDES", id, None).await?;
                }
            }
        }

        info!("claimed '{} {} {}' ({stmt_id})", parsed.subject, parsed.predicate, parsed.object);
        Ok(stmt_id)
    }

    async fn flag_contradiction(&self, id1: String, id2: String, reason: String) -> MeshResult<()> {
        self.store
            .create_edge(&id1, "CONTRADICTS", &id2, Some(json!({"reason": reason.clone()})))
            .await?;
        info!("flagged contradiction {id1} <-> {id2} ({reason})");
        Ok(())
    }

    async fn remember(&self, query: String) -> MeshResult<String> {
        let cypher = self.llm.generate_query(&query).await.unwrap_or_default();
        let mut rows = if cypher.is_empty() {
            Vec::new()
        } else {
            self.store
                .raw_query(&cypher)
                .await
                .unwrap_or_default()
                .into_iter()
                .map(|row| serde_json::to_value(row).unwrap_or(Value::Null))
                .collect()
        };

        if rows.is_empty() {
            rows = self.broad_search().await?;
        }

        self.llm.synthesize_response(&query, &rows).await
    }

    async fn infer(&self, observation_text: String) -> MeshResult<Option<String>> {
        self.llm.infer(&observation_text).await
    }

    async fn get_recent_observations(&self, limit: usize) -> MeshResult<Vec<Observation>> {
        self.store.find_recent_observations(limit).await
    }

    async fn get_recent_statements(&self, limit: usize) -> MeshResult<Vec<Statement>> {
        self.store.find_recent_statements(limit).await
    }

    async fn get_unresolved_contradictions(&self) -> MeshResult<Vec<(Statement, Statement)>> {
        self.store.find_unresolved_contradictions().await
    }

    async fn get_concepts(&self) -> MeshResult<Vec<Concept>> {
        self.store.get_all_concepts().await
    }

    async fn get_schema(&self) -> MeshResult<SchemaSnapshot> {
        Ok(self.schema.snapshot().await)
    }

    async fn update_schema(&self, changes: SchemaChanges, source: String) -> MeshResult<SchemaSnapshot> {
        self.schema.update(changes, &source).await
    }

    async fn clear(&self) -> MeshResult<()> {
        self.store.clear_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::graph::InMemoryGraphStore;
    use crate::memory::llm::MockLlmClient;

    async fn service() -> MemoryService {
        let path = std::env::temp_dir().join(format!("memory-service-test-{}.yaml", uuid::Uuid::new_v4()));
        let schema = SchemaStore::load(path).await.unwrap();
        MemoryService::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(MockLlmClient::new()),
            Arc::new(schema),
        )
    }

    #[tokio::test]
    async fn observe_creates_no_statements() {
        let svc = service().await;
        svc.observe("I prefer morning meetings".to_string(), "cli_user".to_string())
            .await
            .unwrap();
        assert!(svc.get_recent_statements(10).await.unwrap().is_empty());
        assert_eq!(svc.get_recent_observations(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn claim_links_subject_and_object_concepts() {
        let svc = service().await;
        svc.claim("alice has hobby chess".to_string(), "inference_agent".to_string())
            .await
            .unwrap();
        let stmts = svc.get_recent_statements(10).await.unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].subject_name, "alice");
        assert_eq!(stmts[0].predicate, "has_hobby");
        assert_eq!(stmts[0].object_name, "chess");
    }

    #[tokio::test]
    async fn meeting_preference_scenario_resolves_to_afternoon() {
        let svc = service().await;
        svc.observe("I prefer morning meetings".to_string(), "cli_user".to_string())
            .await
            .unwrap();
        let claim1 = svc.infer("I prefer morning meetings".to_string()).await.unwrap().unwrap();
        svc.claim(claim1, "inference_agent".to_string()).await.unwrap();

        svc.observe(
            "actually I hate mornings, afternoon is better".to_string(),
            "cli_user".to_string(),
        )
        .await
        .unwrap();
        let claim2 = svc
            .infer("actually I hate mornings, afternoon is better".to_string())
            .await
            .unwrap()
            .unwrap();
        svc.claim(claim2, "inference_agent".to_string()).await.unwrap();

        let answer = svc.remember("what are my meeting preferences?".to_string()).await.unwrap();
        assert!(answer.contains("afternoon"));
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let svc = service().await;
        svc.observe("hello".to_string(), "cli_user".to_string()).await.unwrap();
        svc.clear().await.unwrap();
        assert!(svc.get_recent_observations(10).await.unwrap().is_empty());
    }
}
