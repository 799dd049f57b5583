//! Event-driven worker agents: background loops that react to mesh events
//! (fast path) or a poll interval (fallback), each guarded by node-local
//! idempotency state.

pub mod base;
pub mod inference;
pub mod state;
pub mod validator;

pub use base::{fresh_state, Worker, WorkerAgent};
pub use inference::InferenceAgent;
pub use state::AgentState;
pub use validator::ValidatorAgent;
