//! Predicate schema types and the runtime lookup interface built from them.
//!
//! `PredicateSchema`'s alias/exclusivity indices are built once, at load
//! time, so every lookup afterward is a plain map access.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    Multi,
}

impl Default for Cardinality {
    fn default() -> Self {
        Cardinality::Single
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temporality {
    Permanent,
    Temporal,
    Unknown,
}

impl Default for Temporality {
    fn default() -> Self {
        Temporality::Unknown
    }
}

/// Properties of a single known predicate, API- and snapshot-facing (the
/// canonical name travels with the value here, unlike the on-disk YAML
/// where it's the map key — see [`crate::schema::store::SchemaFile`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredicateInfo {
    pub name: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub temporality: Temporality,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub last_reviewed: Option<String>,
}

fn default_origin() -> String {
    "bootstrap".to_string()
}

/// A group of predicates where at most one can hold true per subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusivityGroup {
    pub name: String,
    pub predicates: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Lookup interface the validator and `remember()` consult before deciding
/// whether two statements about the same subject conflict.
#[derive(Debug, Clone)]
pub struct PredicateSchema {
    predicates: HashMap<String, PredicateInfo>,
    alias_map: HashMap<String, String>,
    exclusivity_groups: Vec<ExclusivityGroup>,
    default_cardinality: Cardinality,
    default_temporality: Temporality,
}

impl PredicateSchema {
    pub fn new(
        predicates: HashMap<String, PredicateInfo>,
        exclusivity_groups: Vec<ExclusivityGroup>,
        default_cardinality: Cardinality,
        default_temporality: Temporality,
    ) -> Self {
        let mut alias_map = HashMap::new();
        for info in predicates.values() {
            for alias in &info.aliases {
                alias_map.insert(alias.clone(), info.name.clone());
            }
        }
        Self {
            predicates,
            alias_map,
            exclusivity_groups,
            default_cardinality,
            default_temporality,
        }
    }

    /// Resolve aliases to a canonical, lowercased, underscore-joined name.
    pub fn normalize_predicate(&self, predicate: &str) -> String {
        let normalized = predicate.trim().to_lowercase().replace(' ', "_");
        self.alias_map
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    pub fn get_info(&self, predicate: &str) -> Option<&PredicateInfo> {
        let canonical = self.normalize_predicate(predicate);
        self.predicates.get(&canonical)
    }

    pub fn is_multi_valued(&self, predicate: &str) -> bool {
        match self.get_info(predicate) {
            Some(info) => info.cardinality == Cardinality::Multi,
            None => self.default_cardinality == Cardinality::Multi,
        }
    }

    pub fn is_single_valued(&self, predicate: &str) -> bool {
        !self.is_multi_valued(predicate)
    }

    pub fn get_exclusivity_group(&self, predicate: &str) -> Option<&ExclusivityGroup> {
        let canonical = self.normalize_predicate(predicate);
        self.exclusivity_groups
            .iter()
            .find(|g| g.predicates.contains(&canonical))
    }

    pub fn known_predicates(&self) -> Vec<String> {
        self.predicates.keys().cloned().collect()
    }

    pub fn predicates(&self) -> impl Iterator<Item = &PredicateInfo> {
        self.predicates.values()
    }

    pub fn exclusivity_groups(&self) -> &[ExclusivityGroup] {
        &self.exclusivity_groups
    }

    pub fn default_cardinality(&self) -> Cardinality {
        self.default_cardinality
    }

    pub fn default_temporality(&self) -> Temporality {
        self.default_temporality
    }
}
