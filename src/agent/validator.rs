//! `ValidatorAgent`: detects contradictions between statements and flags
//! them directly via `MemoryApi::flag_contradiction`.
//!
//! Statements are grouped by subject, then by predicate, and compared
//! pairwise. Detection is schema-aware: only single-valued predicates
//! conflict on differing objects, and predicates in the same exclusivity
//! group conflict regardless of name. A contradiction is a relationship
//! between two existing statements, not a new claim, so `process()`
//! always returns `[]`.

use crate::agent::base::Worker;
use crate::agent::state::AgentState;
use crate::error::MeshResult;
use crate::memory::graph::Statement;
use crate::memory::MemoryApi;
use crate::schema::store::SchemaSnapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const STATE_KEY: &str = "agent:validator:checked_pairs";

pub struct ValidatorAgent {
    memory: Arc<dyn MemoryApi>,
    state: Arc<AgentState>,
}

impl ValidatorAgent {
    pub fn new(memory: Arc<dyn MemoryApi>, state: Arc<AgentState>) -> Self {
        Self { memory, state }
    }

    fn is_single_valued(schema: &SchemaSnapshot, predicate: &str) -> bool {
        schema
            .predicates
            .iter()
            .find(|p| p.name == predicate)
            .map(|p| matches!(p.cardinality, crate::schema::loader::Cardinality::Single))
            .unwrap_or(matches!(schema.default_cardinality, crate::schema::loader::Cardinality::Single))
    }

    fn pair_key(a: &str, b: &str) -> String {
        let mut pair = [a, b];
        pair.sort_unstable();
        format!("{}:{}", pair[0], pair[1])
    }

    async fn flag_if_new(&self, id1: &str, id2: &str, reason: String) {
        let key = Self::pair_key(id1, id2);
        if self.state.is_processed(STATE_KEY, &key) {
            debug!("skipping already-checked pair {key}");
            return;
        }
        if let Err(e) = self
            .memory
            .flag_contradiction(id1.to_string(), id2.to_string(), reason.clone())
            .await
        {
            tracing::warn!("failed to flag contradiction {key}: {e}");
            return;
        }
        self.state.mark_processed(STATE_KEY, &key);
        info!("validator agent flagged contradiction: {reason}");
    }
}

#[async_trait]
impl Worker for ValidatorAgent {
    fn source_id(&self) -> &str {
        "validator_agent"
    }

    fn event_types(&self) -> &[&str] {
        &["claim", "schema_updated"]
    }

    async fn process(&self) -> MeshResult<Vec<String>> {
        let statements = self.memory.get_recent_statements(20).await?;
        debug!("fetched {} statements to validate", statements.len());
        let schema = self.memory.get_schema().await?;

        let mut by_subject: HashMap<String, Vec<&Statement>> = HashMap::new();
        for s in &statements {
            by_subject.entry(s.subject_name.clone()).or_default().push(s);
        }
        debug!("grouped into {} subjects", by_subject.len());

        for (subject, subject_statements) in &by_subject {
            self.check_same_predicate(subject, subject_statements, &schema).await;
            self.check_exclusivity_groups(subject, subject_statements, &schema).await;
        }

        Ok(Vec::new())
    }
}

impl ValidatorAgent {
    async fn check_same_predicate(&self, subject: &str, statements: &[&Statement], schema: &SchemaSnapshot) {
        let mut by_predicate: HashMap<&str, Vec<&Statement>> = HashMap::new();
        for s in statements {
            by_predicate.entry(s.predicate.as_str()).or_default().push(s);
        }

        for (predicate, pred_statements) in by_predicate {
            if pred_statements.len() < 2 || !Self::is_single_valued(schema, predicate) {
                continue;
            }
            for i in 0..pred_statements.len() {
                for s2 in &pred_statements[i + 1..] {
                    let s1 = pred_statements[i];
                    if s1.object_name == s2.object_name {
                        continue;
                    }
                    let reason = format!("{subject} {predicate}: '{}' vs '{}'", s1.object_name, s2.object_name);
                    self.flag_if_new(&s1.id, &s2.id, reason).await;
                }
            }
        }
    }

    async fn check_exclusivity_groups(&self, _subject: &str, statements: &[&Statement], schema: &SchemaSnapshot) {
        for group in &schema.exclusivity_groups {
            let members: Vec<&Statement> = statements
                .iter()
                .filter(|s| group.predicates.contains(&s.predicate) && !s.negated)
                .copied()
                .collect();
            if members.len() < 2 {
                continue;
            }
            for i in 0..members.len() {
                for s2 in &members[i + 1..] {
                    let s1 = members[i];
                    if s1.predicate == s2.predicate {
                        continue;
                    }
                    let reason = format!("Exclusivity group '{}': {} vs {}", group.name, s1.predicate, s2.predicate);
                    self.flag_if_new(&s1.id, &s2.id, reason).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::graph::InMemoryGraphStore;
    use crate::memory::llm::MockLlmClient;
    use crate::memory::service::MemoryService;
    use crate::schema::store::SchemaStore;

    async fn memory() -> Arc<dyn MemoryApi> {
        let path = std::env::temp_dir().join(format!("validator-test-{}.yaml", uuid::Uuid::new_v4()));
        let schema = SchemaStore::load(path).await.unwrap();
        Arc::new(MemoryService::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(MockLlmClient::new()),
            Arc::new(schema),
        ))
    }

    #[tokio::test]
    async fn flags_conflicting_single_valued_predicate() {
        let memory = memory().await;
        memory.claim("alice lives_in paris".to_string(), "test".to_string()).await.unwrap();
        memory.claim("alice lives_in berlin".to_string(), "test".to_string()).await.unwrap();

        let agent = ValidatorAgent::new(memory.clone(), Arc::new(AgentState::new()));
        let claims = agent.process().await.unwrap();
        assert!(claims.is_empty());
        assert_eq!(memory.get_unresolved_contradictions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn does_not_flag_multi_valued_predicate() {
        let memory = memory().await;
        memory.claim("alice has hobby chess".to_string(), "test".to_string()).await.unwrap();
        memory.claim("alice has hobby painting".to_string(), "test".to_string()).await.unwrap();

        let agent = ValidatorAgent::new(memory.clone(), Arc::new(AgentState::new()));
        agent.process().await.unwrap();
        assert!(memory.get_unresolved_contradictions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn flags_gender_exclusivity_violation() {
        let memory = memory().await;
        memory.claim("alice is_male".to_string(), "test".to_string()).await.unwrap();
        memory.claim("alice is_female".to_string(), "test".to_string()).await.unwrap();

        let agent = ValidatorAgent::new(memory.clone(), Arc::new(AgentState::new()));
        agent.process().await.unwrap();
        assert_eq!(memory.get_unresolved_contradictions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn does_not_reflag_an_already_checked_pair() {
        let memory = memory().await;
        memory.claim("alice lives_in paris".to_string(), "test".to_string()).await.unwrap();
        memory.claim("alice lives_in berlin".to_string(), "test".to_string()).await.unwrap();

        let agent = ValidatorAgent::new(memory.clone(), Arc::new(AgentState::new()));
        agent.process().await.unwrap();
        agent.process().await.unwrap();
        assert_eq!(memory.get_unresolved_contradictions().await.unwrap().len(), 1);
    }
}
