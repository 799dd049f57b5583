//! `WorkerAgent`: the common run-loop shared by every background agent.
//! Event-driven wakeup with a poll-interval fallback, startup retry, and
//! per-tick error isolation so one bad tick never kills the loop.
//!
//! Agent liveness is purely local — node status already propagates via
//! gossip, so there is no central agent registry to register with.

use crate::agent::state::AgentState;
use crate::memory::MemoryApi;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

const STARTUP_ATTEMPTS: u32 = 12;
const STARTUP_RETRY_DELAY: Duration = Duration::from_secs(5);
const TICK_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Behaviour specific to one kind of agent. `WorkerAgent::run` drives the
/// shared event-driven/poll loop around a single [`process`](Worker::process)
/// call per tick.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Human-readable source id this agent claims statements under.
    fn source_id(&self) -> &str;

    /// Network event types that should wake this agent early.
    fn event_types(&self) -> &[&str];

    /// One processing cycle. Returns claim texts to assert via `memory.claim`.
    async fn process(&self) -> crate::error::MeshResult<Vec<String>>;
}

/// Shared run-loop state: event-driven wakeup, poll fallback, startup
/// retry, tick error isolation. Embed this in each concrete agent and
/// delegate `run`/`stop`/`on_network_event` to it.
pub struct WorkerAgent<W: Worker> {
    worker: W,
    memory: Arc<dyn MemoryApi>,
    poll_interval: Duration,
    running: AtomicBool,
    event_flag: AtomicBool,
    notify: Notify,
}

impl<W: Worker> WorkerAgent<W> {
    pub fn new(worker: W, memory: Arc<dyn MemoryApi>, poll_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            worker,
            memory,
            poll_interval,
            running: AtomicBool::new(false),
            event_flag: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }

    /// Called by the P2P node when a relevant network event arrives.
    pub fn on_network_event(&self, event_type: &str) {
        if self.worker.event_types().contains(&event_type) {
            self.event_flag.store(true, Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    /// Signal the agent to stop after the current iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_one();
        info!("agent {} stopping", self.worker.source_id());
    }

    /// Main agent loop: startup retry, then event-driven with poll fallback.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        info!("agent {} started", self.worker.source_id());

        let mut connected = false;
        for attempt in 1..=STARTUP_ATTEMPTS {
            if self.tick().await.is_ok() {
                connected = true;
                break;
            }
            warn!(
                "agent {} startup attempt {attempt}/{STARTUP_ATTEMPTS} failed, retrying...",
                self.worker.source_id()
            );
            tokio::time::sleep(STARTUP_RETRY_DELAY).await;
        }
        if !connected {
            error!(
                "agent {} could not connect after {STARTUP_ATTEMPTS} attempts",
                self.worker.source_id()
            );
            return;
        }

        self.run_event_driven().await;
        info!("agent {} stopped", self.worker.source_id());
    }

    async fn run_event_driven(&self) {
        while self.running.load(Ordering::SeqCst) {
            let woke_on_event = tokio::select! {
                _ = self.notify.notified() => true,
                _ = tokio::time::sleep(self.poll_interval) => false,
            };
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if woke_on_event && self.event_flag.swap(false, Ordering::SeqCst) {
                debug!("agent {} woke: event received", self.worker.source_id());
            } else {
                debug!(
                    "agent {} woke: poll timeout ({:?})",
                    self.worker.source_id(),
                    self.poll_interval
                );
            }
            if let Err(e) = self.tick().await {
                error!("agent {} error in event loop: {e}", self.worker.source_id());
                tokio::time::sleep(TICK_ERROR_BACKOFF).await;
            }
        }
    }

    async fn tick(&self) -> crate::error::MeshResult<()> {
        let start = std::time::Instant::now();
        let claims = match self.worker.process().await {
            Ok(claims) => claims,
            Err(e) => {
                error!("agent {} error in tick: {e}", self.worker.source_id());
                return Err(e);
            }
        };
        debug!(
            "agent {} tick: {} claim(s) in {:?}",
            self.worker.source_id(),
            claims.len(),
            start.elapsed()
        );

        for claim_text in claims {
            if let Err(e) = self.memory.claim(claim_text.clone(), self.worker.source_id().to_string()).await {
                error!("agent {} failed to claim '{claim_text}': {e}", self.worker.source_id());
                continue;
            }
            info!(
                "agent {} claimed: {}",
                self.worker.source_id(),
                claim_text.chars().take(100).collect::<String>()
            );
        }
        Ok(())
    }
}

/// Convenience constructor bundling a fresh [`AgentState`] for agents that
/// want one but don't need to share it with siblings.
pub fn fresh_state() -> Arc<AgentState> {
    Arc::new(AgentState::new())
}
