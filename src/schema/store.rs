//! Persistent, hot-reloadable predicate schema manager.
//!
//! Updates write to a sibling temp file, then `rename` over the target,
//! so a crash mid-write never leaves a torn `schema.yaml`.

use crate::error::{MeshError, MeshResult};
use crate::memory::api::{PredicateChange, SchemaChanges};
use crate::schema::loader::{Cardinality, ExclusivityGroup, PredicateInfo, PredicateSchema, Temporality};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

const BOOTSTRAP_YAML: &str = include_str!("bootstrap.yaml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Defaults {
    #[serde(default)]
    cardinality: Cardinality,
    #[serde(default)]
    temporality: Temporality,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PredicateFields {
    #[serde(default)]
    cardinality: Cardinality,
    #[serde(default)]
    temporality: Temporality,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    last_reviewed: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ExclusivityGroupFields {
    #[serde(default)]
    predicates: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// On-disk representation of `schema.yaml` (the predicate name lives as
/// the map key, not inside the value).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    schema_version: u64,
    #[serde(default)]
    updated_at: String,
    #[serde(default)]
    updated_by: String,
    #[serde(default)]
    defaults: Defaults,
    #[serde(default)]
    predicates: BTreeMap<String, PredicateFields>,
    #[serde(default)]
    exclusivity_groups: BTreeMap<String, ExclusivityGroupFields>,
}

impl SchemaFile {
    fn to_predicate_schema(&self) -> PredicateSchema {
        let mut predicates = std::collections::HashMap::new();
        for (name, fields) in &self.predicates {
            let canonical = name.trim().to_lowercase();
            predicates.insert(
                canonical.clone(),
                PredicateInfo {
                    name: canonical,
                    cardinality: fields.cardinality,
                    temporality: fields.temporality,
                    aliases: fields.aliases.iter().map(|a| a.trim().to_lowercase()).collect(),
                    origin: fields.origin.clone().unwrap_or_else(|| "bootstrap".to_string()),
                    reasoning: fields.reasoning.clone(),
                    last_reviewed: fields.last_reviewed.clone(),
                },
            );
        }
        let groups = self
            .exclusivity_groups
            .iter()
            .map(|(name, fields)| ExclusivityGroup {
                name: name.clone(),
                predicates: fields
                    .predicates
                    .iter()
                    .map(|p| p.trim().to_lowercase())
                    .collect(),
                description: fields.description.clone(),
                origin: fields.origin.clone().unwrap_or_else(|| "bootstrap".to_string()),
                reasoning: fields.reasoning.clone(),
            })
            .collect();
        PredicateSchema::new(predicates, groups, self.defaults.cardinality, self.defaults.temporality)
    }

    fn to_snapshot(&self) -> SchemaSnapshot {
        let mut predicates: Vec<PredicateInfo> = self
            .predicates
            .iter()
            .map(|(name, fields)| PredicateInfo {
                name: name.clone(),
                cardinality: fields.cardinality,
                temporality: fields.temporality,
                aliases: fields.aliases.clone(),
                origin: fields.origin.clone().unwrap_or_else(|| "bootstrap".to_string()),
                reasoning: fields.reasoning.clone(),
                last_reviewed: fields.last_reviewed.clone(),
            })
            .collect();
        predicates.sort_by(|a, b| a.name.cmp(&b.name));
        let mut groups: Vec<ExclusivityGroup> = self
            .exclusivity_groups
            .iter()
            .map(|(name, fields)| ExclusivityGroup {
                name: name.clone(),
                predicates: fields.predicates.iter().cloned().collect(),
                description: fields.description.clone(),
                origin: fields.origin.clone().unwrap_or_else(|| "bootstrap".to_string()),
                reasoning: fields.reasoning.clone(),
            })
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        SchemaSnapshot {
            schema_version: self.schema_version,
            updated_at: self.updated_at.clone(),
            updated_by: self.updated_by.clone(),
            default_cardinality: self.defaults.cardinality,
            default_temporality: self.defaults.temporality,
            predicates,
            exclusivity_groups: groups,
        }
    }
}

/// Wire/API-facing full schema dump, returned by `get_schema`/`update_schema`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub schema_version: u64,
    pub updated_at: String,
    pub updated_by: String,
    pub default_cardinality: Cardinality,
    pub default_temporality: Temporality,
    pub predicates: Vec<PredicateInfo>,
    pub exclusivity_groups: Vec<ExclusivityGroup>,
}

/// Persistent, hot-reloadable schema manager owned by every `store`-capable
/// node. Other nodes learn of updates only via the `schema_updated` event —
/// there is no cross-node read path for the schema file.
pub struct SchemaStore {
    path: PathBuf,
    state: RwLock<(SchemaFile, PredicateSchema)>,
}

impl SchemaStore {
    /// Load from `path`, seeding from the embedded bootstrap on first run.
    pub async fn load(path: PathBuf) -> MeshResult<Self> {
        let file = if path.exists() {
            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => match serde_yaml::from_str::<SchemaFile>(&raw) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("schema file at {path:?} is corrupt ({e}), reseeding from bootstrap");
                        Self::bootstrap_file()?
                    }
                },
                Err(e) => {
                    warn!("failed to read schema file at {path:?} ({e}), reseeding from bootstrap");
                    Self::bootstrap_file()?
                }
            }
        } else {
            Self::bootstrap_file()?
        };
        let schema = file.to_predicate_schema();
        info!(
            "loaded schema v{} ({} predicates)",
            file.schema_version,
            schema.known_predicates().len()
        );
        let store = Self {
            path,
            state: RwLock::new((file, schema)),
        };
        store.persist_locked().await?;
        Ok(store)
    }

    fn bootstrap_file() -> MeshResult<SchemaFile> {
        let mut file: SchemaFile =
            serde_yaml::from_str(BOOTSTRAP_YAML).map_err(MeshError::from)?;
        for fields in file.predicates.values_mut() {
            fields.origin.get_or_insert_with(|| "bootstrap".to_string());
        }
        for fields in file.exclusivity_groups.values_mut() {
            fields.origin.get_or_insert_with(|| "bootstrap".to_string());
        }
        file.schema_version = 0;
        file.updated_at = Utc::now().to_rfc3339();
        file.updated_by = "bootstrap".to_string();
        Ok(file)
    }

    /// Current lookup table, cloned out from behind the lock so callers
    /// (the validator, mid-`claim` resolution) don't hold it across `.await`.
    pub async fn schema(&self) -> PredicateSchema {
        self.state.read().await.1.clone()
    }

    pub async fn version(&self) -> u64 {
        self.state.read().await.0.schema_version
    }

    pub async fn snapshot(&self) -> SchemaSnapshot {
        self.state.read().await.0.to_snapshot()
    }

    /// Apply incremental changes, bump the version, persist, and rebuild the
    /// lookup table — all under one write-lock critical section so readers
    /// never see a torn intermediate state.
    pub async fn update(&self, changes: SchemaChanges, source: &str) -> MeshResult<SchemaSnapshot> {
        let mut guard = self.state.write().await;
        let file = &mut guard.0;

        for change in changes.add_predicates {
            let canonical = change.name.trim().to_lowercase();
            let entry = file.predicates.entry(canonical).or_default();
            // Merge field-by-field; a field left unset in the change is left
            // untouched on the existing entry.
            if let Some(cardinality) = change.cardinality {
                entry.cardinality = cardinality;
            }
            if let Some(temporality) = change.temporality {
                entry.temporality = temporality;
            }
            if let Some(aliases) = change.aliases {
                entry.aliases = aliases;
            }
            if let Some(origin) = change.origin {
                entry.origin = Some(origin);
            }
            if change.reasoning.is_some() {
                entry.reasoning = change.reasoning;
            }
            if change.last_reviewed.is_some() {
                entry.last_reviewed = change.last_reviewed;
            }
        }

        for group in changes.add_exclusivity_groups {
            file.exclusivity_groups.insert(
                group.name,
                ExclusivityGroupFields {
                    predicates: group.predicates.into_iter().collect(),
                    description: group.description,
                    origin: Some(group.origin),
                    reasoning: group.reasoning,
                },
            );
        }

        file.schema_version += 1;
        file.updated_at = Utc::now().to_rfc3339();
        file.updated_by = source.to_string();

        let rebuilt = file.to_predicate_schema();
        let snapshot = file.to_snapshot();
        guard.1 = rebuilt;
        drop(guard);
        self.persist_locked().await?;
        info!("schema updated to v{} by {source}", snapshot.schema_version);
        Ok(snapshot)
    }

    async fn persist_locked(&self) -> MeshResult<()> {
        let file = self.state.read().await.0.clone();
        self.write_atomic(&file).await
    }

    async fn write_atomic(&self, file: &SchemaFile) -> MeshResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let yaml = serde_yaml::to_string(file).map_err(MeshError::from)?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, yaml).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "schema.yaml".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Clone for SchemaFile {
    fn clone(&self) -> Self {
        SchemaFile {
            schema_version: self.schema_version,
            updated_at: self.updated_at.clone(),
            updated_by: self.updated_by.clone(),
            defaults: self.defaults.clone(),
            predicates: self.predicates.clone(),
            exclusivity_groups: self.exclusivity_groups.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn seeds_from_bootstrap_when_file_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        let store = SchemaStore::load(path.clone()).await.unwrap();
        assert_eq!(store.version().await, 0);
        assert!(path.exists());
        let schema = store.schema().await;
        assert!(schema.is_multi_valued("has_hobby"));
        assert!(schema.is_single_valued("has_name"));
        assert!(schema.get_exclusivity_group("is_male").is_some());
    }

    #[tokio::test]
    async fn update_increments_version_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        let store = SchemaStore::load(path.clone()).await.unwrap();
        let changes = SchemaChanges {
            add_predicates: vec![PredicateChange {
                name: "has_pet".to_string(),
                cardinality: Some(Cardinality::Multi),
                temporality: Some(Temporality::Unknown),
                aliases: None,
                origin: Some("learned".to_string()),
                reasoning: Some("observed repeatedly".to_string()),
                last_reviewed: None,
            }],
            add_exclusivity_groups: vec![],
        };
        let snapshot = store.update(changes, "schema_agent").await.unwrap();
        assert_eq!(snapshot.schema_version, 1);
        assert_eq!(snapshot.updated_by, "schema_agent");

        let reloaded = SchemaStore::load(path).await.unwrap();
        assert_eq!(reloaded.version().await, 1);
        assert!(reloaded.schema().await.is_multi_valued("has_pet"));
    }

    #[tokio::test]
    async fn update_preserves_fields_not_named_in_changes() {
        let dir = tempdir().unwrap();
        let store = SchemaStore::load(dir.path().join("schema.yaml")).await.unwrap();
        let before = store.schema().await.get_info("has_name").unwrap().aliases.clone();
        let changes = SchemaChanges {
            add_predicates: vec![PredicateChange {
                name: "has_name".to_string(),
                cardinality: None,
                temporality: None,
                aliases: None,
                origin: None,
                reasoning: Some("confirmed via direct user statement".to_string()),
                last_reviewed: None,
            }],
            add_exclusivity_groups: vec![],
        };
        store.update(changes, "schema_agent").await.unwrap();
        let after = store.schema().await.get_info("has_name").unwrap().aliases.clone();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn update_with_unset_cardinality_does_not_reset_an_existing_multi_valued_predicate() {
        let dir = tempdir().unwrap();
        let store = SchemaStore::load(dir.path().join("schema.yaml")).await.unwrap();
        assert!(store.schema().await.is_multi_valued("has_hobby"));

        let changes = SchemaChanges {
            add_predicates: vec![PredicateChange {
                name: "has_hobby".to_string(),
                cardinality: None,
                temporality: None,
                aliases: None,
                origin: None,
                reasoning: Some("reviewed, no change needed".to_string()),
                last_reviewed: None,
            }],
            add_exclusivity_groups: vec![],
        };
        store.update(changes, "schema_agent").await.unwrap();
        assert!(store.schema().await.is_multi_valued("has_hobby"));
    }
}
