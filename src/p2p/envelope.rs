//! Universal message envelope for all P2P communication.
//!
//! Losslessly JSON-serialisable: `payload` is already a `serde_json::Value`,
//! so round-tripping falls out of `serde_json`'s own number/bool/null
//! handling — we only need to guard against types `serde_json::to_value`
//! can't represent, which none of our payload builders produce.

use crate::util::short_id;
use serde::{Deserialize, Serialize};

/// The kind of message an [`Envelope`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgType {
    Join,
    Welcome,
    Gossip,
    Request,
    Response,
    Event,
    Ping,
    Pong,
    Leave,
}

/// Universal message wrapper for all node-to-node communication, used over
/// both the HTTP request/response channel and the persistent stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub msg_type: MsgType,
    pub msg_id: String,
    #[serde(default)]
    pub sender_id: String,
    /// Empty string means broadcast.
    #[serde(default)]
    pub recipient_id: String,
    pub timestamp: f64,
    /// Hop budget, meaningful only for `event` envelopes.
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// Correlates `response` → `request`, `welcome` → `join`, `pong` → `ping`.
    #[serde(default)]
    pub reply_to: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

fn default_ttl() -> u32 {
    3
}

impl Envelope {
    /// Build a new envelope with a fresh `msg_id` and current timestamp.
    pub fn new(msg_type: MsgType, sender_id: impl Into<String>) -> Self {
        Self {
            msg_type,
            msg_id: short_id(),
            sender_id: sender_id.into(),
            recipient_id: String::new(),
            timestamp: crate::util::unix_time_now(),
            ttl: default_ttl(),
            reply_to: String::new(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = reply_to.into();
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_recipient(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = recipient_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip_is_identity() {
        let env = Envelope::new(MsgType::Event, "node-aaaaaaaa")
            .with_payload(json!({"event_type": "observe", "data": {"id": "x"}}))
            .with_ttl(3);
        let s = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&s).unwrap();
        assert_eq!(back.msg_id, env.msg_id);
        assert_eq!(back.msg_type, env.msg_type);
        assert_eq!(back.ttl, env.ttl);
        assert_eq!(back.payload, env.payload);
    }

    #[test]
    fn default_ttl_is_three() {
        let env = Envelope::new(MsgType::Ping, "n");
        assert_eq!(env.ttl, 3);
    }

    #[test]
    fn two_envelopes_get_distinct_ids() {
        let a = Envelope::new(MsgType::Ping, "n");
        let b = Envelope::new(MsgType::Ping, "n");
        assert_ne!(a.msg_id, b.msg_id);
    }
}
