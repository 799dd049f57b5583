//! The duck-typed memory contract every store-or-llm-capable node serves,
//! either locally ([`crate::memory::service::MemoryService`]) or by routing
//! over the mesh ([`crate::memory::router::MemoryRouter`]).
//!
//! The contract is an `async_trait` implemented by two unrelated types,
//! giving the router and the local service the same call surface without
//! either depending on the other.

use crate::error::{MeshError, MeshResult};
use crate::memory::graph::{Concept, Observation, Statement};
use crate::schema::store::SchemaSnapshot;
use crate::schema::{Cardinality, Temporality};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Requested mutation to the predicate schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaChanges {
    #[serde(default)]
    pub add_predicates: Vec<PredicateChange>,
    #[serde(default)]
    pub add_exclusivity_groups: Vec<crate::schema::ExclusivityGroup>,
}

/// A partial update to one predicate's properties. Every field but `name`
/// is optional so a caller can name just the fields they mean to change —
/// `store::SchemaStore::update` merges `Some` fields in and leaves the
/// rest of the existing entry untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredicateChange {
    pub name: String,
    #[serde(default)]
    pub cardinality: Option<Cardinality>,
    #[serde(default)]
    pub temporality: Option<Temporality>,
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub last_reviewed: Option<String>,
}

#[async_trait]
pub trait MemoryApi: Send + Sync {
    /// Record a raw observation, extracting concepts/topics and optionally
    /// decomposing into constituent statements.
    async fn observe(&self, text: String, source: String) -> MeshResult<String>;

    /// Assert a predicate-schema-governed statement, resolving basis/supersedes
    /// via word-overlap against current statements for the same subject.
    async fn claim(&self, text: String, source: String) -> MeshResult<String>;

    /// Answer a free-text query against recorded observations/statements.
    async fn remember(&self, query: String) -> MeshResult<String>;

    /// Derive a higher-order statement from an observation via the LLM
    /// collaborator, or `None` if nothing confident was derived.
    async fn infer(&self, observation_text: String) -> MeshResult<Option<String>>;

    async fn flag_contradiction(&self, id1: String, id2: String, reason: String) -> MeshResult<()>;

    async fn get_recent_observations(&self, limit: usize) -> MeshResult<Vec<Observation>>;

    async fn get_recent_statements(&self, limit: usize) -> MeshResult<Vec<Statement>>;

    async fn get_unresolved_contradictions(&self) -> MeshResult<Vec<(Statement, Statement)>>;

    async fn get_concepts(&self) -> MeshResult<Vec<Concept>>;

    async fn get_schema(&self) -> MeshResult<SchemaSnapshot>;

    async fn update_schema(&self, changes: SchemaChanges, source: String) -> MeshResult<SchemaSnapshot>;

    async fn clear(&self) -> MeshResult<()>;
}

/// Invoke a [`MemoryApi`] method named dynamically off the wire — a
/// `request` envelope carries `{method, args}` and this turns that pair
/// back into a typed call. Rust has no runtime reflection, so this is a
/// hand-written match instead of generic dispatch.
pub async fn dispatch(
    memory: &dyn MemoryApi,
    method: &str,
    args: &serde_json::Value,
) -> MeshResult<serde_json::Value> {
    fn field(args: &serde_json::Value, name: &str) -> String {
        args.get(name).and_then(|v| v.as_str()).unwrap_or_default().to_string()
    }
    fn limit_field(args: &serde_json::Value) -> usize {
        args.get("limit").and_then(|v| v.as_u64()).unwrap_or(20) as usize
    }

    let result = match method {
        "observe" => serde_json::to_value(memory.observe(field(args, "text"), field(args, "source")).await?)?,
        "claim" => serde_json::to_value(memory.claim(field(args, "text"), field(args, "source")).await?)?,
        "remember" => serde_json::to_value(memory.remember(field(args, "query")).await?)?,
        "infer" => serde_json::to_value(memory.infer(field(args, "observation_text")).await?)?,
        "flag_contradiction" => {
            memory
                .flag_contradiction(field(args, "id1"), field(args, "id2"), field(args, "reason"))
                .await?;
            serde_json::Value::Null
        }
        "get_recent_observations" => serde_json::to_value(memory.get_recent_observations(limit_field(args)).await?)?,
        "get_recent_statements" => serde_json::to_value(memory.get_recent_statements(limit_field(args)).await?)?,
        "get_unresolved_contradictions" => serde_json::to_value(memory.get_unresolved_contradictions().await?)?,
        "get_concepts" => serde_json::to_value(memory.get_concepts().await?)?,
        "get_schema" => serde_json::to_value(memory.get_schema().await?)?,
        "update_schema" => {
            let changes: SchemaChanges = args
                .get("changes")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?
                .unwrap_or_default();
            serde_json::to_value(memory.update_schema(changes, field(args, "source")).await?)?
        }
        "clear" => {
            memory.clear().await?;
            serde_json::Value::Null
        }
        other => {
            return Err(MeshError::ProtocolError(format!("unknown method '{other}'")));
        }
    };
    Ok(result)
}
