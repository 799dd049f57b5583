//! Versioned predicate schema: cardinality/temporality/aliases/exclusivity
//! groups, persisted per store-capable node and hot-reloaded network-wide
//! via `schema_updated` events.

pub mod loader;
pub mod store;

pub use loader::{Cardinality, ExclusivityGroup, PredicateInfo, PredicateSchema, Temporality};
pub use store::{SchemaSnapshot, SchemaStore};
