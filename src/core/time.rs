//! Shared timestamp/event-id helpers for persisted envelopes.

use ulid::Ulid;

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    format!("{}Z", now_epoch_secs())
}

/// Returns unix-epoch seconds.
pub fn now_epoch_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Fresh ulid for event and invocation identifiers.
pub fn new_event_id() -> String {
    Ulid::new().to_string()
}
