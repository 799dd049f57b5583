//! `memnode`: run a single P2P agentic memory node.
//!
//! Build a [`PeerNode`] from `--capabilities`, conditionally mount a
//! [`MemoryService`] (when `store`+`llm` are present), start the
//! `inference`/`validation` agents
//! the node is configured for, and — if `cli` is present — hand the
//! terminal to the interactive REPL. Otherwise the process just idles,
//! serving RPCs from peers, until `Ctrl-C`.

use agentic_memory_mesh::agent::{InferenceAgent, ValidatorAgent, WorkerAgent};
use agentic_memory_mesh::config::Args;
use agentic_memory_mesh::memory::{InMemoryGraphStore, MemoryApi, MemoryRouter, MemoryService, MockLlmClient};
use agentic_memory_mesh::p2p::{Capability, CapabilitySet, PeerNode};
use agentic_memory_mesh::schema::SchemaStore;
use clap::Parser;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

fn parse_capabilities(raw: &str) -> anyhow::Result<CapabilitySet> {
    let mut set = CapabilitySet::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        set.insert(
            part.parse::<Capability>()
                .map_err(|e| anyhow::anyhow!("--capabilities: {e}"))?,
        );
    }
    if set.is_empty() {
        anyhow::bail!("--capabilities must name at least one capability");
    }
    Ok(set)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agentic_memory_mesh::init_logging();

    let args = Args::parse();
    let capabilities = parse_capabilities(&args.capabilities)?;

    let node = PeerNode::new(
        capabilities.clone(),
        args.host.clone(),
        args.port,
        args.bootstrap_peers(),
        args.node_id.clone(),
        args.advertise_host(),
    );

    if capabilities.contains(&Capability::Store) {
        let schema = Arc::new(SchemaStore::load(args.schema_path.clone()).await?);
        let service = MemoryService::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(MockLlmClient::new()),
            schema,
        );
        node.register_memory_service(Arc::new(service)).await;
        info!("mounted local memory service (schema: {:?})", args.schema_path);
    }

    node.start().await?;

    // Every node speaks `MemoryApi` uniformly regardless of its own
    // capabilities: local fast path when capable, RPC fan-out otherwise.
    // Agents and the CLI only ever see this router.
    let memory: Arc<dyn MemoryApi> = Arc::new(MemoryRouter::new(node.clone()));
    let poll_interval = Duration::from_secs_f64(args.poll_interval.max(0.1));

    let mut agent_handles = Vec::new();

    if capabilities.contains(&Capability::Inference) {
        let worker = InferenceAgent::new(memory.clone(), agentic_memory_mesh::agent::fresh_state());
        let agent = WorkerAgent::new(worker, memory.clone(), poll_interval);
        let listener_agent = Arc::downgrade(&agent);
        node.add_event_listener(Arc::new(move |event_type: String, _data: serde_json::Value| {
            let agent = listener_agent.clone();
            async move {
                if let Some(agent) = agent.upgrade() {
                    agent.on_network_event(&event_type);
                }
            }
            .boxed()
        }))
        .await;
        agent_handles.push(tokio::spawn(agent.run()));
        info!("inference agent mounted");
    }

    if capabilities.contains(&Capability::Validation) {
        let worker = ValidatorAgent::new(memory.clone(), agentic_memory_mesh::agent::fresh_state());
        let agent = WorkerAgent::new(worker, memory.clone(), poll_interval);
        let listener_agent = Arc::downgrade(&agent);
        node.add_event_listener(Arc::new(move |event_type: String, _data: serde_json::Value| {
            let agent = listener_agent.clone();
            async move {
                if let Some(agent) = agent.upgrade() {
                    agent.on_network_event(&event_type);
                }
            }
            .boxed()
        }))
        .await;
        agent_handles.push(tokio::spawn(agent.run()));
        info!("validator agent mounted");
    }

    if capabilities.contains(&Capability::Cli) {
        agentic_memory_mesh::cli::run_cli(memory.clone(), &node.node_id).await;
    } else {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
        }
    }

    node.stop().await;
    for handle in agent_handles {
        handle.abort();
    }

    Ok(())
}
