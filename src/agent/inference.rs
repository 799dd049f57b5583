//! `InferenceAgent`: watches new observations and infers claims from them
//! via the `LlmClient::infer` collaborator call.

use crate::agent::base::Worker;
use crate::agent::state::AgentState;
use crate::error::MeshResult;
use crate::memory::MemoryApi;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const STATE_KEY: &str = "agent:inference:processed_obs";
const LOCK_TTL: Duration = Duration::from_secs(300);

pub struct InferenceAgent {
    memory: Arc<dyn MemoryApi>,
    state: Arc<AgentState>,
    started_at: DateTime<Utc>,
}

impl InferenceAgent {
    pub fn new(memory: Arc<dyn MemoryApi>, state: Arc<AgentState>) -> Self {
        Self {
            memory,
            state,
            started_at: Utc::now(),
        }
    }
}

#[async_trait]
impl Worker for InferenceAgent {
    fn source_id(&self) -> &str {
        "inference_agent"
    }

    fn event_types(&self) -> &[&str] {
        &["observe"]
    }

    async fn process(&self) -> MeshResult<Vec<String>> {
        let observations = self.memory.get_recent_observations(10).await?;
        debug!("fetched {} observations to process", observations.len());

        let mut claims = Vec::new();
        for obs in observations {
            if obs.created_at < self.started_at {
                debug!(
                    "skipping stale observation {} (ts={} < started={})",
                    obs.id, obs.created_at, self.started_at
                );
                self.state.mark_processed(STATE_KEY, &obs.id);
                continue;
            }

            if self.state.is_processed(STATE_KEY, &obs.id) {
                debug!("skipping already-processed observation {}", obs.id);
                continue;
            }

            if obs.raw_content.is_empty() {
                debug!("skipping observation {} (empty raw_content)", obs.id);
                self.state.mark_processed(STATE_KEY, &obs.id);
                continue;
            }

            let lock_key = format!("inference:{}", obs.id);
            if !self.state.try_acquire(&lock_key, self.source_id(), LOCK_TTL) {
                debug!("lock not acquired for observation {}", obs.id);
                continue;
            }

            info!("inference agent processing observation: {}", obs.id);
            debug!("observation text: {}", obs.raw_content.chars().take(200).collect::<String>());

            match self.memory.infer(obs.raw_content.clone()).await {
                Ok(Some(claim_text)) => claims.push(claim_text),
                Ok(None) => info!("inference agent skipped observation (no meaningful inference)"),
                Err(e) => warn!("inference agent failed to infer from {}: {e}", obs.id),
            }

            self.state.mark_processed(STATE_KEY, &obs.id);
        }

        Ok(claims)
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
        let path = std::env::temp_dir().join(format!("inference-test-{}.yaml", uuid::Uuid::new_v4()));
        let schema = SchemaStore::load(path).await.unwrap();
        Arc::new(MemoryService::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(MockLlmClient::new()),
            Arc::new(schema),
        ))
    }

    #[tokio::test]
    async fn infers_a_claim_from_a_fresh_observation() {
        let memory = memory().await;
        let agent = InferenceAgent::new(memory.clone(), Arc::new(AgentState::new()));
        memory
            .observe("I prefer morning meetings".to_string(), "cli_user".to_string())
            .await
            .unwrap();

        let claims = agent.process().await.unwrap();
        assert_eq!(claims, vec!["user prefers morning meetings".to_string()]);
    }

    #[tokio::test]
    async fn skips_an_observation_with_no_inferrable_signal() {
        let memory = memory().await;
        let agent = InferenceAgent::new(memory.clone(), Arc::new(AgentState::new()));
        memory
            .observe("the weather today is cloudy".to_string(), "cli_user".to_string())
            .await
            .unwrap();

        assert!(agent.process().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn does_not_reprocess_the_same_observation_twice() {
        let memory = memory().await;
        let agent = InferenceAgent::new(memory.clone(), Arc::new(AgentState::new()));
        memory
            .observe("I prefer morning meetings".to_string(), "cli_user".to_string())
            .await
            .unwrap();

        assert_eq!(agent.process().await.unwrap().len(), 1);
        assert!(agent.process().await.unwrap().is_empty());
    }
}
