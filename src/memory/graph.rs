//! Typed records for the labelled-property graph, and the `GraphStore`
//! trait it is accessed through.
//!
//! The graph database itself is an external collaborator — out of scope
//! for this crate. What *is* in scope is the interface the core consumes
//! from it, specified here as an `async_trait`, plus a small in-memory
//! reference implementation so the crate is runnable and testable without
//! a real store attached. The node/edge model is `Observation`/`Concept`/
//! `Statement`/`Source` with typed edges rather than one untyped node kind.

use crate::error::MeshResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Forward-compatible catch-all: fields present on a row we didn't model
/// explicitly.
pub type UnknownFields = HashMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub raw_content: String,
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub unknown: UnknownFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub unknown: UnknownFields,
}

/// A reified triple. Denormalised with `subject_name`/`object_name` so the
/// validator and inference agents don't need a join to read them back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub id: String,
    pub predicate: String,
    pub confidence: f64,
    pub negated: bool,
    pub created_at: DateTime<Utc>,
    pub subject_name: String,
    pub object_name: String,
    pub source: String,
    #[serde(flatten)]
    pub unknown: UnknownFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub kind: String,
}

/// A concept component used when decomposing compound concepts during
/// `observe()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptComponent {
    pub name: String,
    pub relation: String,
}

/// Minimal row shape returned by a raw graph-query escape hatch (used only
/// by `remember()`'s query-generation fallback path).
pub type GraphRow = HashMap<String, Value>;

/// The interface the core consumes from an external labelled-property store.
///
/// All methods asynchronous; implementations are not required to be
/// internally thread-safe beyond what `Send + Sync` already demands — the
/// router wraps shared state under `Arc`, not a crate-wide mutex.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn create_observation(
        &self,
        id: &str,
        raw_content: &str,
        topics: &[String],
    ) -> MeshResult<()>;

    async fn create_statement(
        &self,
        id: &str,
        predicate: &str,
        confidence: f64,
        negated: bool,
    ) -> MeshResult<()>;

    /// Get-or-create a `Source` node, deduplicated by `name`.
    async fn get_or_create_source(&self, name: &str, kind: &str) -> MeshResult<String>;

    /// Get-or-create a `Concept` node, deduplicated case-insensitively by
    /// `name` or alias.
    async fn get_or_create_concept(&self, name: &str, kind: &str) -> MeshResult<String>;

    /// Create a typed edge with optional properties.
    async fn create_edge(
        &self,
        from_id: &str,
        edge_type: &str,
        to_id: &str,
        properties: Option<Value>,
    ) -> MeshResult<()>;

    async fn find_recent_observations(&self, limit: usize) -> MeshResult<Vec<Observation>>;

    /// Current statements only: excludes any targeted by an incoming
    /// `SUPERSEDES` edge.
    async fn find_recent_statements(&self, limit: usize) -> MeshResult<Vec<Statement>>;

    async fn find_unresolved_contradictions(&self) -> MeshResult<Vec<(Statement, Statement)>>;

    async fn get_all_concepts(&self) -> MeshResult<Vec<Concept>>;

    /// Raw query escape hatch, used only for the `remember()` query-generation
    /// fallback path.
    async fn raw_query(&self, query: &str) -> MeshResult<Vec<GraphRow>>;

    async fn clear_all(&self) -> MeshResult<()>;
}

/// In-memory reference [`GraphStore`], append-only for observations and
/// statements, concepts deduplicated case-insensitively.
///
/// This is what a `store`-capability node without a real graph database
/// backend runs; it's also what the crate's own tests exercise against.
#[derive(Default)]
pub struct InMemoryGraphStore {
    inner: tokio::sync::RwLock<InMemoryGraphInner>,
}

#[derive(Default)]
struct InMemoryGraphInner {
    observations: Vec<Observation>,
    statements: Vec<Statement>,
    concepts: Vec<Concept>,
    sources: Vec<Source>,
    /// `to_id -> set of from_id` for edges of type `SUPERSEDES`, used by the
    /// "current" filter.
    superseded_targets: std::collections::HashSet<String>,
    contradictions: Vec<(String, String, String)>, // (id1, id2, reason)
    edges: Vec<(String, String, String, Option<Value>)>, // (from, type, to, props)
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn create_observation(
        &self,
        id: &str,
        raw_content: &str,
        topics: &[String],
    ) -> MeshResult<()> {
        let mut inner = self.inner.write().await;
        inner.observations.push(Observation {
            id: id.to_string(),
            raw_content: raw_content.to_string(),
            topics: topics.to_vec(),
            created_at: Utc::now(),
            unknown: UnknownFields::new(),
        });
        Ok(())
    }

    async fn create_statement(
        &self,
        id: &str,
        predicate: &str,
        confidence: f64,
        negated: bool,
    ) -> MeshResult<()> {
        let mut inner = self.inner.write().await;
        inner.statements.push(Statement {
            id: id.to_string(),
            predicate: predicate.to_string(),
            confidence,
            negated,
            created_at: Utc::now(),
            subject_name: String::new(),
            object_name: String::new(),
            source: String::new(),
            unknown: UnknownFields::new(),
        });
        Ok(())
    }

    async fn get_or_create_source(&self, name: &str, kind: &str) -> MeshResult<String> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.sources.iter().find(|s| s.name == name) {
            return Ok(existing.id.clone());
        }
        let id = uuid::Uuid::new_v4().to_string();
        inner.sources.push(Source {
            id: id.clone(),
            name: name.to_string(),
            kind: kind.to_string(),
        });
        Ok(id)
    }

    async fn get_or_create_concept(&self, name: &str, kind: &str) -> MeshResult<String> {
        let mut inner = self.inner.write().await;
        let lower = name.to_lowercase();
        if let Some(existing) = inner.concepts.iter().find(|c| {
            c.name.to_lowercase() == lower || c.aliases.iter().any(|a| a.to_lowercase() == lower)
        }) {
            return Ok(existing.id.clone());
        }
        let id = uuid::Uuid::new_v4().to_string();
        inner.concepts.push(Concept {
            id: id.clone(),
            name: name.to_string(),
            kind: kind.to_string(),
            aliases: Vec::new(),
            created_at: Utc::now(),
            unknown: UnknownFields::new(),
        });
        Ok(id)
    }

    async fn create_edge(
        &self,
        from_id: &str,
        edge_type: &str,
        to_id: &str,
        properties: Option<Value>,
    ) -> MeshResult<()> {
        let mut inner = self.inner.write().await;
        if edge_type == "SUPERSEDES" {
            inner.superseded_targets.insert(to_id.to_string());
        }
        if edge_type == "CONTRADICTS" {
            let reason = properties
                .as_ref()
                .and_then(|p| p.get("reason"))
                .and_then(|r| r.as_str())
                .unwrap_or("")
                .to_string();
            inner
                .contradictions
                .push((from_id.to_string(), to_id.to_string(), reason));
        }
        // ABOUT_SUBJECT / ABOUT_OBJECT denormalise onto the statement row so
        // the validator's subject/predicate grouping works without a join.
        if edge_type == "ABOUT_SUBJECT" || edge_type == "ABOUT_OBJECT" {
            let concept_name = inner
                .concepts
                .iter()
                .find(|c| c.id == to_id)
                .map(|c| c.name.clone());
            if let Some(name) = concept_name {
                if let Some(stmt) = inner.statements.iter_mut().find(|s| s.id == from_id) {
                    if edge_type == "ABOUT_SUBJECT" {
                        stmt.subject_name = name;
                    } else {
                        stmt.object_name = name;
                    }
                }
            }
        }
        if edge_type == "ASSERTED_BY" {
            let source_name = inner
                .sources
                .iter()
                .find(|s| s.id == to_id)
                .map(|s| s.name.clone());
            if let Some(name) = source_name {
                if let Some(stmt) = inner.statements.iter_mut().find(|s| s.id == from_id) {
                    stmt.source = name;
                }
            }
        }
        inner
            .edges
            .push((from_id.to_string(), edge_type.to_string(), to_id.to_string(), properties));
        Ok(())
    }

    async fn find_recent_observations(&self, limit: usize) -> MeshResult<Vec<Observation>> {
        let inner = self.inner.read().await;
        let mut obs = inner.observations.clone();
        obs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        obs.truncate(limit);
        Ok(obs)
    }

    async fn find_recent_statements(&self, limit: usize) -> MeshResult<Vec<Statement>> {
        let inner = self.inner.read().await;
        let mut stmts: Vec<Statement> = inner
            .statements
            .iter()
            .filter(|s| !inner.superseded_targets.contains(&s.id))
            .cloned()
            .collect();
        stmts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        stmts.truncate(limit);
        Ok(stmts)
    }

    async fn find_unresolved_contradictions(&self) -> MeshResult<Vec<(Statement, Statement)>> {
        let inner = self.inner.read().await;
        let by_id: HashMap<&str, &Statement> =
            inner.statements.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut out = Vec::new();
        for (id1, id2, _reason) in &inner.contradictions {
            let current = |id: &str| !inner.superseded_targets.contains(id);
            if current(id1) && current(id2) {
                if let (Some(s1), Some(s2)) = (by_id.get(id1.as_str()), by_id.get(id2.as_str())) {
                    out.push(((*s1).clone(), (*s2).clone()));
                }
            }
        }
        Ok(out)
    }

    async fn get_all_concepts(&self) -> MeshResult<Vec<Concept>> {
        Ok(self.inner.read().await.concepts.clone())
    }

    async fn raw_query(&self, _query: &str) -> MeshResult<Vec<GraphRow>> {
        // The in-memory reference store has no query engine; a real
        // collaborator (e.g. a Cypher-speaking graph DB) implements this.
        // `remember()` falls back to broad search when this returns empty,
        // so an empty result here is well-defined, not an error.
        Ok(Vec::new())
    }

    async fn clear_all(&self) -> MeshResult<()> {
        *self.inner.write().await = InMemoryGraphInner::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concepts_dedupe_case_insensitively() {
        let store = InMemoryGraphStore::new();
        let a = store.get_or_create_concept("Chess", "activity").await.unwrap();
        let b = store.get_or_create_concept("chess", "activity").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.get_all_concepts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sources_dedupe_by_name() {
        let store = InMemoryGraphStore::new();
        let a = store.get_or_create_source("cli_user", "user").await.unwrap();
        let b = store.get_or_create_source("cli_user", "user").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn superseded_statements_excluded_from_current() {
        let store = InMemoryGraphStore::new();
        store.create_statement("s1", "prefers", 0.9, false).await.unwrap();
        store.create_statement("s2", "prefers", 0.9, false).await.unwrap();
        store.create_edge("s2", "SUPERSEDES", "s1", None).await.unwrap();
        let current = store.find_recent_statements(10).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, "s2");
    }

    #[tokio::test]
    async fn clear_all_empties_everything() {
        let store = InMemoryGraphStore::new();
        store.create_observation("o1", "hi", &[]).await.unwrap();
        store.clear_all().await.unwrap();
        assert!(store.find_recent_observations(10).await.unwrap().is_empty());
    }
}
