//! Outbound failure notifications.
//!
//! Every non-success dispatch produces one structured event for the
//! external event subsystem. The sink is an append-only JSONL file the
//! event service tails; it may be absent. Delivery is best-effort and a
//! delivery failure never changes the supervisor's own outcome.

use crate::core::store::Store;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub ts: String,
    pub event_id: String,
    pub invocation_id: String,
    pub branch: Option<String>,
    pub module: String,
    pub argv_summary: String,
    pub outcome: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl FailureEvent {
    pub fn new(
        invocation_id: &str,
        branch: Option<&str>,
        module: &str,
        argv_summary: &str,
        outcome: &str,
        exit_code: Option<i32>,
        duration_ms: u64,
    ) -> FailureEvent {
        FailureEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            invocation_id: invocation_id.to_string(),
            branch: branch.map(|b| b.to_string()),
            module: module.to_string(),
            argv_summary: argv_summary.to_string(),
            outcome: outcome.to_string(),
            exit_code,
            duration_ms,
        }
    }
}

/// Append one event to the failure sink. Errors are swallowed.
pub fn emit(store: &Store, event: &FailureEvent) {
    let path = store.failure_events_path();
    let Some(parent) = path.parent() else {
        return;
    };
    if std::fs::create_dir_all(parent).is_err() {
        return;
    }
    let Ok(rendered) = serde_json::to_string(event) else {
        return;
    };
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&path) {
        let _ = writeln!(f, "{}", rendered);
    }
}

/// Read back all emitted events; used by diagnostics and tests.
pub fn read_events(store: &Store) -> Vec<FailureEvent> {
    let Ok(content) = std::fs::read_to_string(store.failure_events_path()) else {
        return Vec::new();
    };
    content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}
