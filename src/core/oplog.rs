//! Bounded operation log.
//!
//! `central/log.json` keeps a ring of the most recent router operations so a
//! short-lived process leaves a legible trail without growing state forever.
//! Entries carry an explicit severity band and an explicit source string;
//! only orchestrating components (router, registry ops, supervisor) write
//! here. Logging is best-effort and never fails an invocation.

use crate::core::store::{self, Store};
use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: String,
    pub event_id: String,
    pub severity: Severity,
    pub source: String,
    pub message: String,
    #[serde(default)]
    pub details: JsonValue,
}

/// Append-bounded writer over `central/log.json`.
#[derive(Debug, Clone)]
pub struct OpLog {
    path: PathBuf,
    cap: usize,
}

impl OpLog {
    pub fn open(store: &Store, cap: usize) -> OpLog {
        OpLog {
            path: store.log_path(),
            cap: cap.max(1),
        }
    }

    /// Record one operation. Unreadable prior content degrades to an empty
    /// ring rather than blocking the invocation.
    pub fn record(&self, severity: Severity, source: &str, message: &str, details: JsonValue) {
        let mut entries = match store::read_json::<Vec<LogEntry>>(&self.path) {
            Ok(Some(entries)) => entries,
            _ => Vec::new(),
        };
        entries.push(LogEntry {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            severity,
            source: source.to_string(),
            message: message.to_string(),
            details,
        });
        if entries.len() > self.cap {
            let excess = entries.len() - self.cap;
            entries.drain(..excess);
        }
        let _ = store::write_json_atomic(&self.path, &entries);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        match store::read_json::<Vec<LogEntry>>(&self.path) {
            Ok(Some(entries)) => entries,
            _ => Vec::new(),
        }
    }
}
