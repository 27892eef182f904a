//! Router configuration and operational counters.
//!
//! Two of the three operational files live here: `config.json` (tunables,
//! every field overridable) and `data.json` (counters). The third,
//! `log.json`, is owned by `oplog`. All three are rewritten atomically.

use crate::core::error::RouterError;
use crate::core::store::{self, Store};
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_timeout_secs() -> u64 {
    30
}

fn default_long_timeout_secs() -> u64 {
    120
}

fn default_help_timeout_secs() -> u64 {
    10
}

fn default_help_keyword() -> String {
    "commands".to_string()
}

fn default_log_cap() -> usize {
    100
}

/// Argv keywords that mark an invocation as long-running (layer 1).
fn default_long_running_keywords() -> Vec<String> {
    [
        "start", "watch", "monitor", "serve", "daemon", "audit", "sync", "backup", "restore",
        "close", "checklist", "tail", "listen",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Commands that long-running invocations still bound at the long timeout
/// (layer 2).
fn default_bounded_long_commands() -> Vec<String> {
    ["backup_system", "checklist", "close"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_interpreters() -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert("py".to_string(), "python3".to_string());
    map.insert("sh".to_string(), "sh".to_string());
    map
}

/// Entry-point extensions probed in order; empty string means no extension.
fn default_entry_extensions() -> Vec<String> {
    vec!["py".to_string(), "sh".to_string(), String::new()]
}

/// Module stems that are never registered or scanned: interpreter
/// scaffolding, scripted utilities, test harnesses, backup copies, and the
/// router's own discovery machinery.
fn default_ignored_modules() -> Vec<String> {
    [
        "__main__",
        "__init__",
        "setup",
        "run_all",
        "scan_engine",
        "test",
        "backup",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Tunables persisted at `central/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_long_timeout_secs")]
    pub long_timeout_secs: u64,
    #[serde(default = "default_help_timeout_secs")]
    pub help_timeout_secs: u64,
    #[serde(default = "default_long_running_keywords")]
    pub long_running_keywords: Vec<String>,
    #[serde(default = "default_bounded_long_commands")]
    pub bounded_long_commands: Vec<String>,
    #[serde(default = "default_help_keyword")]
    pub help_keyword: String,
    #[serde(default = "default_interpreters")]
    pub interpreters: BTreeMap<String, String>,
    #[serde(default = "default_entry_extensions")]
    pub entry_extensions: Vec<String>,
    #[serde(default = "default_ignored_modules")]
    pub ignored_modules: Vec<String>,
    #[serde(default = "default_log_cap")]
    pub log_cap: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            default_timeout_secs: default_timeout_secs(),
            long_timeout_secs: default_long_timeout_secs(),
            help_timeout_secs: default_help_timeout_secs(),
            long_running_keywords: default_long_running_keywords(),
            bounded_long_commands: default_bounded_long_commands(),
            help_keyword: default_help_keyword(),
            interpreters: default_interpreters(),
            entry_extensions: default_entry_extensions(),
            ignored_modules: default_ignored_modules(),
            log_cap: default_log_cap(),
        }
    }
}

impl RouterConfig {
    /// Load tunables; missing file or unreadable content falls back to
    /// defaults. Config is advisory, so corruption here is tolerated rather
    /// than healed.
    pub fn load(store: &Store) -> RouterConfig {
        match store::read_json::<RouterConfig>(&store.config_path()) {
            Ok(Some(config)) => config,
            _ => RouterConfig::default(),
        }
    }

    pub fn save(&self, store: &Store) -> Result<(), RouterError> {
        store::write_json_atomic(&store.config_path(), self)
    }

    /// True when a module stem belongs to the ignored set.
    pub fn is_ignored_module(&self, stem: &str) -> bool {
        let lowered = stem.to_lowercase();
        self.ignored_modules.iter().any(|m| lowered.contains(m))
    }
}

/// Counters persisted at `central/data.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterData {
    #[serde(default)]
    pub invocations: u64,
    #[serde(default)]
    pub dispatches: u64,
    #[serde(default)]
    pub failures: u64,
    #[serde(default)]
    pub last_invocation: Option<String>,
}

/// Best-effort read-modify-write of the counter file. Counter loss on a
/// corrupt file is acceptable; counters are operational, not authoritative.
pub fn bump_data(store: &Store, mutate: impl FnOnce(&mut RouterData)) {
    let mut data = match store::read_json::<RouterData>(&store.data_path()) {
        Ok(Some(data)) => data,
        _ => RouterData::default(),
    };
    mutate(&mut data);
    data.last_invocation = Some(time::now_epoch_z());
    let _ = store::write_json_atomic(&store.data_path(), &data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_cover_both_timeout_layers() {
        let config = RouterConfig::default();
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.long_timeout_secs, 120);
        assert!(config.long_running_keywords.contains(&"watch".to_string()));
        assert!(
            config
                .bounded_long_commands
                .contains(&"backup_system".to_string())
        );
    }

    #[test]
    fn test_partial_config_backfills_defaults() {
        let tmp = tempdir().unwrap();
        let store = Store::at(tmp.path());
        std::fs::create_dir_all(store.central_dir()).unwrap();
        std::fs::write(store.config_path(), r#"{"default_timeout_secs": 5}"#).unwrap();
        let config = RouterConfig::load(&store);
        assert_eq!(config.default_timeout_secs, 5);
        assert_eq!(config.long_timeout_secs, 120);
        assert_eq!(config.help_keyword, "commands");
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let tmp = tempdir().unwrap();
        let store = Store::at(tmp.path());
        let config = RouterConfig::load(&store);
        assert_eq!(config.log_cap, 100);
    }

    #[test]
    fn test_ignored_module_matching() {
        let config = RouterConfig::default();
        assert!(config.is_ignored_module("__main__"));
        assert!(config.is_ignored_module("flow_test"));
        assert!(config.is_ignored_module("imports_backup"));
        assert!(!config.is_ignored_module("imports"));
    }

    #[test]
    fn test_bump_data_increments_counters() {
        let tmp = tempdir().unwrap();
        let store = Store::at(tmp.path());
        bump_data(&store, |d| d.invocations += 1);
        bump_data(&store, |d| {
            d.invocations += 1;
            d.failures += 1;
        });
        let data: RouterData = store::read_json(&store.data_path()).unwrap().unwrap();
        assert_eq!(data.invocations, 2);
        assert_eq!(data.failures, 1);
        assert!(data.last_invocation.is_some());
    }
}
