//! The memory subsystem: the duck-typed `MemoryApi` contract, its
//! in-process implementation over a graph store + LLM collaborator, its
//! mesh-routed implementation, and the graph/LLM collaborator seams
//! themselves.

pub mod api;
pub mod graph;
pub mod llm;
pub mod router;
pub mod service;

pub use api::{dispatch, MemoryApi, PredicateChange, SchemaChanges};
pub use graph::{Concept, GraphStore, InMemoryGraphStore, Observation, Statement};
pub use llm::{ClaimExtraction, LlmClient, ObservationExtraction, MockLlmClient};
pub use router::MemoryRouter;
pub use service::MemoryService;
