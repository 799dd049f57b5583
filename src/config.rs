//! Node launch configuration: CLI flags plus the env vars read at the
//! collaborator-construction boundary.

use clap::Parser;

/// Run a P2P agentic memory node.
#[derive(Parser, Debug)]
#[command(name = "memnode")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Comma-separated capabilities: store,llm,inference,validation,cli
    #[arg(long)]
    pub capabilities: String,

    /// Port to listen on
    #[arg(long, env = "NODE_PORT", default_value_t = 9000)]
    pub port: u16,

    /// Host to bind to
    #[arg(long, env = "NODE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Comma-separated bootstrap peer URLs
    #[arg(long, env = "BOOTSTRAP_PEERS", default_value = "")]
    pub bootstrap: String,

    /// Node ID (auto-generated if not provided)
    #[arg(long)]
    pub node_id: Option<String>,

    /// Hostname other nodes use to reach this node (default: same as --host)
    #[arg(long, env = "ADVERTISE_HOST", default_value = "")]
    pub advertise_host: String,

    /// Agent poll interval in seconds
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 30.0)]
    pub poll_interval: f64,

    /// Path to this node's persistent predicate-schema file (store-capable
    /// nodes only)
    #[arg(long, env = "SCHEMA_PATH", default_value = "schema.yaml")]
    pub schema_path: std::path::PathBuf,
}

impl Args {
    pub fn bootstrap_peers(&self) -> Vec<String> {
        self.bootstrap.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
    }

    pub fn advertise_host(&self) -> Option<String> {
        if self.advertise_host.is_empty() {
            None
        } else {
            Some(self.advertise_host.clone())
        }
    }
}

/// Neo4j connection settings for a real `GraphStore` collaborator — out of
/// scope to implement here, but the env surface a deployment wires a real
/// store through belongs here.
pub struct StoreConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            uri: std::env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".to_string()),
            username: std::env::var("NEO4J_USERNAME").unwrap_or_else(|_| "neo4j".to_string()),
            password: std::env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "memory-system".to_string()),
        }
    }
}

/// LLM provider settings for a real `LlmClient` collaborator.
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
        }
    }
}
