//! Store abstraction for Junction's registry tree.
//!
//! A `Store` is the handle to one workspace's persisted state: the branch
//! directory at the workspace root and the router's own JSON artifacts under
//! `.junction/`. All cross-invocation state flows through this module, which
//! owns the two persistence disciplines the registry tree relies on:
//!
//! - atomic replacement (write temp sibling, fsync, rename over target)
//! - an advisory file lock held across central read-modify-write sequences
//!
//! Readers never lock; they see either the old or the new consistent file.

use crate::core::error::RouterError;
use crate::core::schemas;
use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Handle to one workspace's registry tree.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path of the workspace root (holds `BRANCH_DIRECTORY.json`).
    pub workspace_root: PathBuf,
    /// Absolute path of the router state root (`{workspace}/.junction`).
    pub router_root: PathBuf,
}

impl Store {
    /// Build a store rooted at an explicit workspace directory.
    pub fn at(workspace_root: &Path) -> Store {
        Store {
            workspace_root: workspace_root.to_path_buf(),
            router_root: workspace_root.join(schemas::ROUTER_DIR_NAME),
        }
    }

    /// Locate the workspace: `JUNCTION_WORKSPACE` if set, otherwise walk up
    /// from the current directory until a `BRANCH_DIRECTORY.json` is found.
    pub fn discover() -> Result<Store, RouterError> {
        if let Ok(root) = std::env::var(schemas::WORKSPACE_ENV_VAR) {
            return Ok(Store::at(Path::new(&root)));
        }
        let mut dir = std::env::current_dir()?;
        loop {
            if dir.join(schemas::BRANCH_DIRECTORY_NAME).is_file() {
                return Ok(Store::at(&dir));
            }
            if !dir.pop() {
                return Err(RouterError::NotFound(format!(
                    "no workspace found: {} is not present in the current directory or any parent (set {})",
                    schemas::BRANCH_DIRECTORY_NAME,
                    schemas::WORKSPACE_ENV_VAR
                )));
            }
        }
    }

    pub fn branch_directory_path(&self) -> PathBuf {
        self.workspace_root.join(schemas::BRANCH_DIRECTORY_NAME)
    }

    pub fn central_dir(&self) -> PathBuf {
        self.router_root.join(schemas::CENTRAL_DIR_NAME)
    }

    pub fn central_registry_path(&self) -> PathBuf {
        self.central_dir().join(schemas::CENTRAL_REGISTRY_NAME)
    }

    pub fn central_lock_path(&self) -> PathBuf {
        self.central_dir().join(schemas::CENTRAL_LOCK_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.central_dir().join(schemas::CENTRAL_CONFIG_NAME)
    }

    pub fn data_path(&self) -> PathBuf {
        self.central_dir().join(schemas::CENTRAL_DATA_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.central_dir().join(schemas::CENTRAL_LOG_NAME)
    }

    pub fn failure_events_path(&self) -> PathBuf {
        self.central_dir().join(schemas::FAILURE_EVENTS_NAME)
    }

    pub fn commands_dir(&self) -> PathBuf {
        self.router_root.join(schemas::COMMANDS_DIR_NAME)
    }

    pub fn branch_commands_dir(&self, branch: &str) -> PathBuf {
        self.commands_dir().join(branch)
    }

    pub fn branch_registry_path(&self, branch: &str) -> PathBuf {
        self.branch_commands_dir(branch)
            .join(schemas::BRANCH_REGISTRY_NAME)
    }

    pub fn branch_active_path(&self, branch: &str) -> PathBuf {
        self.branch_commands_dir(branch)
            .join(schemas::BRANCH_ACTIVE_NAME)
    }

    /// Names of branches that have a per-branch state directory on disk.
    pub fn branches_with_state(&self) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(entries) = fs::read_dir(self.commands_dir()) else {
            return names;
        };
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        names
    }
}

/// Read a JSON file into `T`. `Ok(None)` when the file is missing; a parse
/// failure is surfaced as `RegistryCorruption` so the caller can heal.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RouterError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RouterError::Io(e)),
    };
    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(RouterError::RegistryCorruption(format!(
            "{}: {}",
            path.display(),
            e
        ))),
    }
}

/// Atomically replace `path` with the JSON rendering of `value`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), RouterError> {
    let parent = path
        .parent()
        .ok_or_else(|| RouterError::Dispatch(format!("no parent directory: {}", path.display())))?;
    fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    let tmp = parent.join(format!(".{}.tmp.{}", file_name, std::process::id()));
    {
        let mut f = File::create(&tmp)?;
        f.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
        f.write_all(b"\n")?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Run `op` while holding the exclusive advisory lock on the central
/// registry. This serializes the id-assigning read-modify-write across
/// concurrent router invocations; `op` must not re-enter this function.
pub fn with_central_lock<T>(
    store: &Store,
    op: impl FnOnce() -> Result<T, RouterError>,
) -> Result<T, RouterError> {
    let lock_path = store.central_lock_path();
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)?;
    lock_file.lock_exclusive()?;
    let result = op();
    let _ = FileExt::unlock(&lock_file);
    result
}
