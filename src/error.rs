//! Error types for the memory mesh.
//!
//! Mirrors the propagation rule in the spec: infrastructure failures
//! (transport, routing) surface to the caller; data failures (one bad
//! observation, one failed agent tick) stay local and are logged instead.
use thiserror::Error;

/// The unified error type for mesh operations.
#[derive(Error, Debug)]
pub enum MeshError {
    /// No peer in the routing table can serve the required capability set.
    #[error("no capable peer for method '{method}' (requires {capabilities:?})")]
    NoCapablePeer {
        method: String,
        capabilities: Vec<String>,
    },

    /// The local node lacks the capabilities required for a requested method.
    #[error("node {node_id} lacks capabilities for '{method}'")]
    CapabilityMismatch { node_id: String, method: String },

    /// A remote peer's RPC response carried a non-empty error string.
    #[error("remote error: {0}")]
    RemoteError(String),

    /// A reply envelope was of an unexpected `msg_type`.
    #[error("protocol error: unexpected reply type '{0}'")]
    ProtocolError(String),

    /// Transport-level failure (unreachable peer, closed stream, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// No local service of the requested kind is registered on this node.
    #[error("no local '{0}' service registered on this node")]
    ServiceUnavailable(String),

    /// The external graph store collaborator failed.
    #[error("store error: {0}")]
    Store(String),

    /// The external LLM collaborator failed.
    #[error("llm error: {0}")]
    Llm(String),

    /// Schema file was present but could not be parsed.
    #[error("schema corrupt: {0}")]
    SchemaCorrupt(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML (de)serialization failure, used only for the schema file.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Filesystem I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for invalid input that doesn't warrant its own variant.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result alias used throughout the crate.
pub type MeshResult<T> = Result<T, MeshError>;
