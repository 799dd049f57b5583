//! Node-local idempotency state for worker agents: "already processed"
//! membership sets plus named, TTL-bounded advisory locks.
//!
//! State here is purely local to one node, with no cross-node lock
//! coordination: the store is append-only, so duplicate inference is
//! merely wasted work, not a correctness issue. Locks actually expire
//! after their TTL, since nothing else would ever release one.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Lock {
    holder: String,
    expires_at: Instant,
}

/// Per-agent-instance idempotency bookkeeping. Shared across agents on one
/// node; keys are namespaced by the caller (e.g.
/// `agent:inference:processed_obs`).
#[derive(Default)]
pub struct AgentState {
    processed: DashMap<String, HashSet<String>>,
    locks: Mutex<std::collections::HashMap<String, Lock>>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processed(&self, key: &str, member: &str) -> bool {
        self.processed
            .get(key)
            .map(|set| set.contains(member))
            .unwrap_or(false)
    }

    pub fn mark_processed(&self, key: &str, member: &str) {
        self.processed.entry(key.to_string()).or_default().insert(member.to_string());
    }

    /// Attempt to acquire a named lock for `instance_id`, TTL-bounded.
    /// Returns `true` if this call acquired (or already held) the lock.
    pub fn try_acquire(&self, key: &str, instance_id: &str, ttl: Duration) -> bool {
        let mut locks = self.locks.lock().unwrap();
        let now = Instant::now();
        match locks.get(key) {
            Some(existing) if existing.expires_at > now => existing.holder == instance_id,
            _ => {
                locks.insert(
                    key.to_string(),
                    Lock {
                        holder: instance_id.to_string(),
                        expires_at: now + ttl,
                    },
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_membership_round_trips() {
        let state = AgentState::new();
        assert!(!state.is_processed("k", "a"));
        state.mark_processed("k", "a");
        assert!(state.is_processed("k", "a"));
        assert!(!state.is_processed("k", "b"));
    }

    #[test]
    fn second_instance_cannot_acquire_held_lock() {
        let state = AgentState::new();
        assert!(state.try_acquire("inference:o1", "instance-a", Duration::from_secs(300)));
        assert!(!state.try_acquire("inference:o1", "instance-b", Duration::from_secs(300)));
        assert!(state.try_acquire("inference:o1", "instance-a", Duration::from_secs(300)));
    }

    #[test]
    fn lock_is_reacquirable_after_ttl_expiry() {
        let state = AgentState::new();
        assert!(state.try_acquire("inference:o1", "instance-a", Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(state.try_acquire("inference:o1", "instance-b", Duration::from_millis(300)));
    }
}
