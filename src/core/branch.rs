//! Branch directory records and symbolic-name resolution.
//!
//! The resolver is the single source of truth for "what is this symbolic
//! name". Given `@name`, a bare `name`, or a filesystem path it produces a
//! canonical branch record. It is strictly read-only: external tools own
//! insertions into `BRANCH_DIRECTORY.json`; the router only resolves.

use crate::core::config::RouterConfig;
use crate::core::error::RouterError;
use crate::core::registry;
use crate::core::schemas;
use crate::core::store::Store;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

fn default_status() -> BranchStatus {
    BranchStatus::Active
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    Active,
    Inactive,
    Archived,
}

/// Identity of one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRecord {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub handle: String,
    pub root_path: PathBuf,
    #[serde(default)]
    pub entry_point_path: Option<PathBuf>,
    #[serde(default = "default_status")]
    pub status: BranchStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_active_at: Option<String>,
}

impl BranchRecord {
    /// Ad-hoc record for a directory reachable by convention but absent
    /// from the branch directory. Never persisted.
    pub fn ad_hoc(name: &str, root_path: &Path) -> BranchRecord {
        let mut record = BranchRecord {
            name: name.to_lowercase(),
            display_name: String::new(),
            handle: String::new(),
            root_path: root_path.to_path_buf(),
            entry_point_path: None,
            status: BranchStatus::Active,
            created_at: None,
            last_active_at: None,
        };
        record.fill_derived();
        record
    }

    /// Backfill the derived forms when the directory omits them.
    pub fn fill_derived(&mut self) {
        if self.display_name.is_empty() {
            self.display_name = self.name.to_uppercase();
        }
        if self.handle.is_empty() {
            self.handle = format!("@{}", self.name);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub total_branches: u64,
}

/// The workspace's branch directory document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchDirectory {
    #[serde(default)]
    pub metadata: DirectoryMetadata,
    #[serde(default)]
    pub branches: Vec<BranchRecord>,
}

impl BranchDirectory {
    pub fn find(&self, name: &str) -> Option<&BranchRecord> {
        self.branches
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
    }
}

/// Outcome of resolving one symbolic target.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The reserved `@` handle: the workspace root itself.
    Workspace(PathBuf),
    /// The reserved `@all` sentinel, carried through verbatim.
    All,
    Branch(BranchRecord),
}

/// Read-only resolver over the branch directory. The directory is loaded
/// lazily at the first lookup and cached for the invocation.
pub struct Resolver<'a> {
    store: &'a Store,
    config: &'a RouterConfig,
    directory: Option<BranchDirectory>,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a Store, config: &'a RouterConfig) -> Resolver<'a> {
        Resolver {
            store,
            config,
            directory: None,
        }
    }

    fn directory(&mut self) -> Result<&BranchDirectory, RouterError> {
        if self.directory.is_none() {
            let mut directory = registry::load_branch_directory(self.store)?;
            for record in &mut directory.branches {
                record.fill_derived();
            }
            self.directory = Some(directory);
        }
        Ok(self.directory.get_or_insert_with(BranchDirectory::default))
    }

    /// High-level resolution with the documented priority order: reserved
    /// handles, directory lookup, fallback conventions, error.
    pub fn resolve(&mut self, target: &str) -> Result<Resolution, RouterError> {
        if target == schemas::WORKSPACE_HANDLE {
            return Ok(Resolution::Workspace(self.store.workspace_root.clone()));
        }
        if target.eq_ignore_ascii_case(schemas::ALL_SENTINEL) {
            return Ok(Resolution::All);
        }
        if Path::new(target).is_absolute() {
            if let Some(record) = self.lookup_by_path(Path::new(target))? {
                return Ok(Resolution::Branch(record));
            }
            return self.resolve_path(Path::new(target));
        }
        let name = target.strip_prefix('@').unwrap_or(target);
        if let Some(record) = self.lookup_by_name(name)? {
            return Ok(Resolution::Branch(record));
        }
        for parent in [
            self.store.workspace_root.join(schemas::CORE_PARENT_MARKER),
            self.store.workspace_root.clone(),
        ] {
            let candidate = parent.join(&name.to_lowercase());
            if candidate.is_dir() {
                return Ok(Resolution::Branch(BranchRecord::ad_hoc(name, &candidate)));
            }
        }
        Err(RouterError::NotFound(format!("branch not found: {}", target)))
    }

    pub fn lookup_by_name(&mut self, name: &str) -> Result<Option<BranchRecord>, RouterError> {
        Ok(self.directory()?.find(name).cloned())
    }

    pub fn lookup_by_handle(&mut self, handle: &str) -> Result<Option<BranchRecord>, RouterError> {
        let name = handle.strip_prefix('@').unwrap_or(handle);
        self.lookup_by_name(name)
    }

    pub fn lookup_by_path(&mut self, path: &Path) -> Result<Option<BranchRecord>, RouterError> {
        Ok(self
            .directory()?
            .branches
            .iter()
            .find(|b| b.root_path == path)
            .cloned())
    }

    fn resolve_path(&mut self, path: &Path) -> Result<Resolution, RouterError> {
        let name = branch_name_from_path(path).ok_or_else(|| {
            RouterError::NotFound(format!("branch not found: {}", path.display()))
        })?;
        if let Some(record) = self.lookup_by_name(&name)? {
            return Ok(Resolution::Branch(record));
        }
        if path.is_dir() {
            return Ok(Resolution::Branch(BranchRecord::ad_hoc(&name, path)));
        }
        Err(RouterError::NotFound(format!(
            "branch not found: {}",
            path.display()
        )))
    }

    /// Canonical uppercase form for any recognized symbolic input.
    pub fn normalize(&mut self, arg: &str) -> Result<String, RouterError> {
        match self.resolve(arg)? {
            Resolution::Workspace(_) => Ok("WORKSPACE".to_string()),
            Resolution::All => Ok("ALL".to_string()),
            Resolution::Branch(record) => Ok(record.display_name),
        }
    }

    /// Entry point for a branch: the standard `apps/{name}` layout first,
    /// then the first non-infrastructure implementation file under `apps/`.
    pub fn entry_point(&self, record: &BranchRecord) -> Result<PathBuf, RouterError> {
        if let Some(explicit) = &record.entry_point_path
            && explicit.is_file()
        {
            return Ok(explicit.clone());
        }
        let apps = record.root_path.join(schemas::BRANCH_APPS_DIR);
        for ext in &self.config.entry_extensions {
            let candidate = if ext.is_empty() {
                apps.join(&record.name)
            } else {
                apps.join(format!("{}.{}", record.name, ext))
            };
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        if apps.is_dir() {
            let mut candidates: Vec<PathBuf> = std::fs::read_dir(&apps)?
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .filter(|p| !implementation_stem(p).is_empty())
                .filter(|p| !self.config.is_ignored_module(&implementation_stem(p)))
                .filter(|p| {
                    let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
                    self.config.entry_extensions.iter().any(|e| e == ext)
                })
                .collect();
            candidates.sort();
            if let Some(first) = candidates.into_iter().next() {
                return Ok(first);
            }
        }
        Err(RouterError::Dispatch(format!(
            "no entry point for branch '{}': nothing usable under {}",
            record.name,
            apps.display()
        )))
    }
}

fn implementation_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    if stem.starts_with('.') {
        String::new()
    } else {
        stem.to_string()
    }
}

/// Derive a branch name from a filesystem path: the segment after a known
/// parent marker wins, otherwise the final directory name.
pub fn branch_name_from_path(path: &Path) -> Option<String> {
    let segments: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str().map(|s| s.to_string()),
            _ => None,
        })
        .collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.eq_ignore_ascii_case(schemas::CORE_PARENT_MARKER) && i + 1 < segments.len() {
            return Some(segments[i + 1].to_lowercase());
        }
    }
    segments.last().map(|s| s.to_lowercase())
}
