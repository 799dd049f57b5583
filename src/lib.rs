//! # `agentic-memory-mesh`
//!
//! A distributed, agentic knowledge-memory substrate: a capability-routed
//! P2P overlay, an event-driven agent runtime, and a versioned predicate
//! schema that powers a network-wide contradiction engine.
//!
//! Any node — regardless of its own capabilities — can invoke the uniform
//! [`memory::MemoryApi`] (`observe`, `claim`, `remember`, `infer`,
//! `get_recent_*`, `flag_contradiction`, `update_schema`, `clear`); the
//! overlay in [`p2p`] routes each call to a peer that can actually serve it.
//! Background [`agent`] workers on `inference`/`validation` nodes consume
//! network events to turn raw observations into structured claims and flag
//! contradictions between them, using the schema in [`schema`].
//!
//! ## Layout
//!
//! - [`p2p`] — node identity, gossip, transport, routing table, and the
//!   [`p2p::PeerNode`] runtime that ties them together.
//! - [`agent`] — the generic [`agent::WorkerAgent`] run-loop plus the
//!   concrete [`agent::InferenceAgent`] and [`agent::ValidatorAgent`].
//! - [`memory`] — the duck-typed [`memory::MemoryApi`] contract, its local
//!   ([`memory::MemoryService`]) and mesh-routed ([`memory::MemoryRouter`])
//!   implementations, and the graph-store/LLM collaborator seams.
//! - [`schema`] — the versioned, hot-reloadable predicate schema.
//! - [`cli`] — the line-oriented REPL any node can expose over stdin/stdout.
//! - [`config`] — CLI flags and collaborator environment variables.
//! - [`error`] — the crate-wide error type and the infra/data propagation
//!   split described in the design notes.
//!
//! ## Quick start
//!
//! ```ignore
//! use agentic_memory_mesh::p2p::{Capability, CapabilitySet, PeerNode};
//! use agentic_memory_mesh::memory::{MemoryService, InMemoryGraphStore, MockLlmClient};
//! use agentic_memory_mesh::schema::SchemaStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let mut caps = CapabilitySet::new();
//!     caps.insert(Capability::Store);
//!     caps.insert(Capability::Llm);
//!
//!     let node = PeerNode::new(caps, "127.0.0.1".into(), 9000, Vec::new(), None, None);
//!     let schema = Arc::new(SchemaStore::load("schema.yaml".into()).await.unwrap());
//!     let service = MemoryService::new(
//!         Arc::new(InMemoryGraphStore::new()),
//!         Arc::new(MockLlmClient::new()),
//!         schema,
//!     );
//!     node.register_memory_service(Arc::new(service)).await;
//!     node.start().await?;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod memory;
pub mod p2p;
pub mod schema;
pub mod util;

pub use error::{MeshError, MeshResult};
pub use memory::{MemoryApi, MemoryRouter, MemoryService};
pub use p2p::{Envelope, PeerInfo, PeerNode, PeerState};
pub use schema::{PredicateSchema, SchemaStore};

/// Initialize the tracing subscriber once at process startup, reading the
/// level from `RUST_LOG` (default `info`). Every background loop (gossip,
/// health check, heartbeat, agent tick) logs through this subscriber at
/// `debug`/`info`/`warn`, the same granularity a node's background loops
/// use throughout [`p2p::node`] and [`agent::base`].
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
