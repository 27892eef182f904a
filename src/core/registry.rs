//! Persistent command registries and global id assignment.
//!
//! Four JSON artifacts are owned here: the branch directory (read-only to
//! the router), the central registry (global id counter, per-branch
//! metadata, statistics), per-branch `registry.json` (discovered commands)
//! and per-branch `active.json` (activated shortcuts).
//!
//! Corrupt files auto-heal: the artifact is replaced with its minimum valid
//! structure, the central `auto_healing_count` is bumped, and the invocation
//! proceeds on the healed file. Content that parses is never discarded;
//! missing keys are backfilled by serde defaults without touching disk.

use crate::core::activation::ActivatedCommand;
use crate::core::branch::BranchDirectory;
use crate::core::config::RouterConfig;
use crate::core::error::RouterError;
use crate::core::oplog::{OpLog, Severity};
use crate::core::schemas;
use crate::core::store::{self, Store};
use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn default_version() -> String {
    schemas::CENTRAL_REGISTRY_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

/// One discovered command in one branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandRecord {
    pub global_id: u64,
    pub command_name: String,
    pub branch_name: String,
    pub module_path: PathBuf,
    pub registered_at: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CentralStatistics {
    #[serde(default)]
    pub total_commands: u64,
    #[serde(default)]
    pub total_branches: u64,
    #[serde(default)]
    pub auto_healing_count: u64,
}

/// Per-branch scan metadata kept on the central registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchModuleMeta {
    #[serde(default)]
    pub classification: String,
    #[serde(default)]
    pub last_scanned: String,
    #[serde(default)]
    pub command_count: u64,
}

/// Central registry document at `central/registry.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentralRegistry {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub last_updated: String,
    /// Aggregate command view; populated opportunistically, may be empty.
    #[serde(default)]
    pub commands: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub modules: BTreeMap<String, BranchModuleMeta>,
    #[serde(default)]
    pub statistics: CentralStatistics,
    /// Bookkeeping: source files consulted by the last scan, per branch.
    #[serde(default)]
    pub source_files: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub global_id_counter: u64,
}

impl Default for CentralRegistry {
    fn default() -> Self {
        CentralRegistry {
            version: default_version(),
            created: time::now_epoch_z(),
            last_updated: String::new(),
            commands: BTreeMap::new(),
            modules: BTreeMap::new(),
            statistics: CentralStatistics::default(),
            source_files: BTreeMap::new(),
            global_id_counter: 0,
        }
    }
}

/// Registry key for one (branch, command) pair.
pub fn registry_key(branch: &str, command: &str) -> String {
    format!("{}:{}", branch, command)
}

fn heal_log(store: &Store, what: &str, path: &Path, detail: &str) {
    let cap = RouterConfig::load(store).log_cap;
    OpLog::open(store, cap).record(
        Severity::Error,
        "registry",
        &format!("auto-healed corrupt {}", what),
        json!({ "path": path.display().to_string(), "detail": detail }),
    );
}

/// Bump the central auto-heal counter under the advisory lock.
fn record_heal(store: &Store) -> Result<(), RouterError> {
    store::with_central_lock(store, || {
        let mut central = load_central_unlocked(store)?;
        central.statistics.auto_healing_count += 1;
        save_central_registry(store, &mut central)
    })
}

/// Load the central registry without taking the advisory lock. A corrupt
/// file is healed inline (its own heal is counted on the fresh structure).
fn load_central_unlocked(store: &Store) -> Result<CentralRegistry, RouterError> {
    let path = store.central_registry_path();
    match store::read_json::<CentralRegistry>(&path) {
        Ok(Some(central)) => Ok(central),
        Ok(None) => Ok(CentralRegistry::default()),
        Err(RouterError::RegistryCorruption(detail)) => {
            let mut fresh = CentralRegistry::default();
            fresh.statistics.auto_healing_count = 1;
            fresh.last_updated = time::now_epoch_z();
            store::write_json_atomic(&path, &fresh)?;
            heal_log(store, "central registry", &path, &detail);
            Ok(fresh)
        }
        Err(e) => Err(e),
    }
}

/// Load the central registry. Missing file yields a fresh in-memory
/// structure; nothing is written until the first save.
pub fn load_central_registry(store: &Store) -> Result<CentralRegistry, RouterError> {
    load_central_unlocked(store)
}

/// Persist the central registry atomically, refreshing `last_updated`.
pub fn save_central_registry(
    store: &Store,
    central: &mut CentralRegistry,
) -> Result<(), RouterError> {
    central.last_updated = time::now_epoch_z();
    store::write_json_atomic(&store.central_registry_path(), central)
}

/// Allocate the next global command id. The advisory lock is held across
/// the whole read-modify-write so concurrent invocations never hand out the
/// same id; the persisted counter is always >= every id returned.
pub fn next_global_id(store: &Store) -> Result<u64, RouterError> {
    store::with_central_lock(store, || {
        let mut central = load_central_unlocked(store)?;
        central.global_id_counter += 1;
        let id = central.global_id_counter;
        save_central_registry(store, &mut central)?;
        Ok(id)
    })
}

/// Load the branch directory. The router never writes this file, but it
/// must survive corruption like any other registry artifact.
pub fn load_branch_directory(store: &Store) -> Result<BranchDirectory, RouterError> {
    let path = store.branch_directory_path();
    match store::read_json::<BranchDirectory>(&path) {
        Ok(Some(directory)) => Ok(directory),
        Ok(None) => Ok(BranchDirectory::default()),
        Err(RouterError::RegistryCorruption(detail)) => {
            let fresh = BranchDirectory::default();
            store::write_json_atomic(&path, &fresh)?;
            record_heal(store)?;
            heal_log(store, "branch directory", &path, &detail);
            Ok(fresh)
        }
        Err(e) => Err(e),
    }
}

fn load_branch_map<T: serde::de::DeserializeOwned + Serialize>(
    store: &Store,
    path: &Path,
    what: &str,
) -> Result<BTreeMap<String, T>, RouterError> {
    match store::read_json::<BTreeMap<String, T>>(path) {
        Ok(Some(map)) => Ok(map),
        Ok(None) => Ok(BTreeMap::new()),
        Err(RouterError::RegistryCorruption(detail)) => {
            let fresh: BTreeMap<String, T> = BTreeMap::new();
            store::write_json_atomic(path, &fresh)?;
            record_heal(store)?;
            heal_log(store, what, path, &detail);
            Ok(fresh)
        }
        Err(e) => Err(e),
    }
}

/// Discovered commands for one branch, keyed `"{branch}:{command}"`.
pub fn load_branch_registry(
    store: &Store,
    branch: &str,
) -> Result<BTreeMap<String, CommandRecord>, RouterError> {
    load_branch_map(store, &store.branch_registry_path(branch), "branch registry")
}

pub fn save_branch_registry(
    store: &Store,
    branch: &str,
    records: &BTreeMap<String, CommandRecord>,
) -> Result<(), RouterError> {
    store::write_json_atomic(&store.branch_registry_path(branch), records)
}

/// Activated shortcuts for one branch, keyed by phrase.
pub fn load_branch_activations(
    store: &Store,
    branch: &str,
) -> Result<BTreeMap<String, ActivatedCommand>, RouterError> {
    load_branch_map(store, &store.branch_active_path(branch), "activation file")
}

/// Merge `touched` into the branch activation file. Entries the caller did
/// not touch survive; sequential invocations never lose each other's edits.
pub fn save_branch_activations(
    store: &Store,
    branch: &str,
    touched: &BTreeMap<String, ActivatedCommand>,
) -> Result<(), RouterError> {
    let mut merged = load_branch_activations(store, branch)?;
    for (phrase, record) in touched {
        merged.insert(phrase.clone(), record.clone());
    }
    store::write_json_atomic(&store.branch_active_path(branch), &merged)
}

/// Rewrite the branch activation file wholesale. Used for removal and
/// rename, where merge semantics cannot express the change.
pub fn replace_branch_activations(
    store: &Store,
    branch: &str,
    records: &BTreeMap<String, ActivatedCommand>,
) -> Result<(), RouterError> {
    store::write_json_atomic(&store.branch_active_path(branch), records)
}
