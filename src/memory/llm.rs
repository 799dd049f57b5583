//! The `LlmClient` collaborator seam: the large-language-model provider is
//! explicitly an external collaborator, out of scope for this crate. What's
//! in scope is the interface the core consumes from it, plus a small
//! deterministic reference implementation so the mesh is runnable and its
//! end-to-end scenarios are testable without a real model attached.
//!
//! The surface (`extract_observation`, `parse_claim`, `generate_query`,
//! `synthesize_response`, `infer`) is what a production node would need
//! from a real provider — Claude via `anthropic`'s tool-use, say. A
//! production node would swap `MockLlmClient` for an `anthropic`-backed
//! client behind the same trait; `ANTHROPIC_API_KEY`/`LLM_MODEL` are read
//! by that real client's constructor, not by the core.

use crate::error::MeshResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// A single extracted concept, with optional decomposition components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptExtraction {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub components: Vec<crate::memory::graph::ConceptComponent>,
}

/// Result of `extract_observation`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationExtraction {
    pub concepts: Vec<ConceptExtraction>,
    pub topics: Vec<String>,
}

/// Result of `parse_claim`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimExtraction {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f64,
    pub negated: bool,
    pub basis_descriptions: Vec<String>,
    pub supersedes_description: Option<String>,
}

/// The external LLM collaborator's interface. Structured outputs are
/// schema-validated at the boundary — here, that's `serde` deserialization
/// of the trait's own return types rather than a JSON tool-call payload,
/// since there's no wire hop between this trait and its caller.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn extract_observation(&self, text: &str) -> MeshResult<ObservationExtraction>;

    async fn parse_claim(&self, text: &str, context: &[Value]) -> MeshResult<ClaimExtraction>;

    /// One-sentence factual claim derived from an observation, or `None` if
    /// the model judged nothing worth deriving.
    async fn infer(&self, observation: &str) -> MeshResult<Option<String>>;

    async fn generate_query(&self, nl: &str) -> MeshResult<String>;

    async fn synthesize_response(&self, query: &str, rows: &[Value]) -> MeshResult<String>;
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "that", "this", "of", "in", "to", "for", "and",
    "or", "i", "my", "me",
];

fn stopwords() -> HashSet<&'static str> {
    STOPWORDS.iter().copied().collect()
}

/// Deterministic, rule-based stand-in for the real LLM collaborator. Not a
/// general NLU engine — it recognises a handful of sentence shapes
/// (`"<subj> prefers <obj>"`, `"<subj> has <attr> <obj>"`,
/// `"<subj> is_<attr>"`), and falls back to a naive subject/predicate/object
/// split otherwise. A deployment swaps this for an `anthropic`-backed client
/// behind the same trait.
#[derive(Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn extract_observation(&self, text: &str) -> MeshResult<ObservationExtraction> {
        let stop = stopwords();
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 3 && !stop.contains(w.as_str()))
            .collect();

        let mut seen = HashSet::new();
        let mut concepts = Vec::new();
        for w in &words {
            if seen.insert(w.clone()) {
                concepts.push(ConceptExtraction {
                    name: w.clone(),
                    kind: "entity".to_string(),
                    components: Vec::new(),
                });
            }
            if concepts.len() >= 5 {
                break;
            }
        }
        let topics = concepts.iter().map(|c| c.name.clone()).take(3).collect();

        Ok(ObservationExtraction { concepts, topics })
    }

    async fn parse_claim(&self, text: &str, _context: &[Value]) -> MeshResult<ClaimExtraction> {
        let clean = text.trim().trim_end_matches('.').to_string();
        let lower = clean.to_lowercase();

        let (subject, predicate, object) = if let Some(idx) = lower.find(" is_") {
            let subject = clean[..idx].trim().to_lowercase();
            let rest = clean[idx + 1..].trim();
            let predicate = rest.split_whitespace().next().unwrap_or(rest).to_lowercase();
            let object = predicate
                .strip_prefix("is_")
                .unwrap_or(&predicate)
                .to_string();
            (subject, predicate, object)
        } else if let Some(idx) = lower.find(" has ") {
            let subject = clean[..idx].trim().to_lowercase();
            let remainder = clean[idx + " has ".len()..].trim();
            let mut parts = remainder.split_whitespace();
            let attr = parts.next().unwrap_or("attribute").to_lowercase();
            let object = parts.collect::<Vec<_>>().join(" ").to_lowercase();
            (subject, format!("has_{attr}"), object)
        } else if let Some(idx) = lower.find(" prefers ") {
            let subject = clean[..idx].trim().to_lowercase();
            let object = clean[idx + " prefers ".len()..].trim().to_lowercase();
            (subject, "prefers".to_string(), object)
        } else {
            let mut parts = clean.split_whitespace();
            let subject = parts.next().unwrap_or("unknown").to_lowercase();
            let predicate = parts.next().unwrap_or("relates_to").to_lowercase();
            let object = parts.collect::<Vec<_>>().join(" ").to_lowercase();
            (subject, predicate, object)
        };

        Ok(ClaimExtraction {
            subject,
            predicate,
            object,
            confidence: 0.9,
            negated: lower.contains("not ") || lower.contains("doesn't") || lower.contains("n't"),
            basis_descriptions: Vec::new(),
            supersedes_description: None,
        })
    }

    async fn infer(&self, observation: &str) -> MeshResult<Option<String>> {
        let lower = observation.to_lowercase();

        if let Some(idx) = lower.find(" is better") {
            let before = &lower[..idx];
            if let Some(word) = before.split(|c: char| c == ',' || c == ' ').filter(|w| !w.is_empty()).last() {
                return Ok(Some(format!("user prefers {word}")));
            }
        }
        if let Some(idx) = lower.find("prefer ") {
            let after = lower[idx + "prefer ".len()..]
                .trim_end_matches('.')
                .to_string();
            if !after.is_empty() {
                return Ok(Some(format!("user prefers {after}")));
            }
        }
        if let Some(idx) = lower.find("like ") {
            let after = lower[idx + "like ".len()..].trim_end_matches('.').to_string();
            if !after.is_empty() {
                return Ok(Some(format!("user prefers {after}")));
            }
        }
        Ok(None)
    }

    async fn generate_query(&self, _nl: &str) -> MeshResult<String> {
        // The in-memory reference store has no query engine to target; a
        // real collaborator generates Cypher (or equivalent) here. Returning
        // empty drives `remember()`'s broad-search fallback path instead of
        // a targeted one.
        Ok(String::new())
    }

    async fn synthesize_response(&self, _query: &str, rows: &[Value]) -> MeshResult<String> {
        if rows.is_empty() {
            return Ok("I don't have any recorded information about that yet.".to_string());
        }
        let mut sentences = Vec::new();
        for row in rows {
            let node = row.get("node").unwrap_or(row);
            if let (Some(subj), Some(pred), Some(obj)) = (
                node.get("subject_name").and_then(Value::as_str),
                node.get("predicate").and_then(Value::as_str),
                node.get("object_name").and_then(Value::as_str),
            ) {
                sentences.push(format!("{subj} {pred} {obj}"));
            } else if let Some(raw) = node.get("raw_content").and_then(Value::as_str) {
                sentences.push(raw.to_string());
            }
        }
        if sentences.is_empty() {
            return Ok("I don't have any recorded information about that yet.".to_string());
        }
        Ok(format!("Based on what I know: {}.", sentences.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_prefers_sentence() {
        let llm = MockLlmClient::new();
        let parsed = llm.parse_claim("user prefers morning meetings", &[]).await.unwrap();
        assert_eq!(parsed.subject, "user");
        assert_eq!(parsed.predicate, "prefers");
        assert_eq!(parsed.object, "morning meetings");
    }

    #[tokio::test]
    async fn parses_has_hobby_sentence() {
        let llm = MockLlmClient::new();
        let parsed = llm.parse_claim("alice has hobby chess", &[]).await.unwrap();
        assert_eq!(parsed.subject, "alice");
        assert_eq!(parsed.predicate, "has_hobby");
        assert_eq!(parsed.object, "chess");
    }

    #[tokio::test]
    async fn parses_is_predicate_sentence() {
        let llm = MockLlmClient::new();
        let parsed = llm.parse_claim("alice is_male", &[]).await.unwrap();
        assert_eq!(parsed.subject, "alice");
        assert_eq!(parsed.predicate, "is_male");
        assert_eq!(parsed.object, "male");
    }

    #[tokio::test]
    async fn infers_preference_from_comparison() {
        let llm = MockLlmClient::new();
        let claim = llm
            .infer("actually I hate mornings, afternoon is better")
            .await
            .unwrap();
        assert_eq!(claim.as_deref(), Some("user prefers afternoon"));
    }

    #[tokio::test]
    async fn infer_skips_observation_with_no_signal() {
        let llm = MockLlmClient::new();
        let claim = llm.infer("the weather today is cloudy").await.unwrap();
        assert!(claim.is_none());
    }
}
