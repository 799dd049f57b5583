//! Small shared helpers that don't warrant their own module.

/// Current wall-clock time as unix seconds (fractional).
///
/// Centralised so every gossip/heartbeat timestamp in the crate goes
/// through one call site.
pub fn unix_time_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Generate a short opaque message id: 16 lowercase hex chars.
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}
