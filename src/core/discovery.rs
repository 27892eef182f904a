//! Command discovery: learn what commands a branch exposes.
//!
//! Two methods, merged with runtime introspection authoritative:
//!
//! 1. Runtime: spawn the branch entry point with `--help` under a short
//!    deadline and parse the first `commands: a, b, c` line.
//! 2. Static: scan `{root}/apps/modules/` for dispatch patterns
//!    (`cmd == "create"`, `cmd in ["a", "b"]`) and collect the literals.
//!    Literals that only appear in exclusion lists (`not in [...]`) are
//!    never added.
//!
//! Discovery also classifies the branch (`cli`/`library`/`unknown`) from
//! its entry-point source; the label is recorded but never changes
//! dispatch. Registration assigns fresh global ids to unseen commands and
//! leaves existing pairs untouched, so a repeated scan is a no-op.

use crate::core::branch::{BranchRecord, Resolver};
use crate::core::config::RouterConfig;
use crate::core::error::RouterError;
use crate::core::registry::{self, CommandRecord};
use crate::core::schemas;
use crate::core::store::{self, Store};
use crate::core::supervisor::{self, OutcomeClass};
use crate::core::time;
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

static COMPARISON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)\s*(==|!=)\s*["']([A-Za-z][A-Za-z0-9_-]*)["']"#).expect("valid pattern")
});

static MEMBERSHIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+)\s+(not\s+)?in\s*[\[\(]([^\]\)]*)[\])]").expect("valid pattern")
});

static LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([A-Za-z][A-Za-z0-9_-]*)["']"#).expect("valid pattern"));

static PARSER_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"argparse|optparse|click|ArgumentParser|add_argument|getopts|clap")
        .expect("valid pattern")
});

static MAIN_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"if\s+__name__\s*==\s*["']__main__["']|fn\s+main\s*\(|def\s+main\s*\("#)
        .expect("valid pattern")
});

static DEFINITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(def|fn|class|struct)\s+\w+").expect("valid pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Cli,
    Library,
    Unknown,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Cli => "cli",
            Classification::Library => "library",
            Classification::Unknown => "unknown",
        }
    }
}

/// Result of discovering one branch.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub branch: String,
    pub classification: Classification,
    /// Merged command set: runtime order first, then static-only finds.
    pub commands: Vec<String>,
    pub runtime_commands: Vec<String>,
    pub scanned_commands: Vec<String>,
    pub module_path: Option<PathBuf>,
    pub source_files: Vec<PathBuf>,
}

impl DiscoveryReport {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn command_like(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Parse the first `keyword: a, b, c` line of a help dump. Flag tokens
/// (leading `-`) are dropped; order is preserved.
pub fn parse_help_commands(stdout: &str, keyword: &str) -> Vec<String> {
    let pattern = format!(r"(?i)^\s*{}\s*:\s*(.+)$", regex::escape(keyword));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    for line in stdout.lines() {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let mut seen = BTreeSet::new();
        let mut commands = Vec::new();
        for token in caps[1].split(',') {
            let token = token.trim().to_lowercase();
            if token.is_empty() || token.starts_with('-') || !command_like(&token) {
                continue;
            }
            if seen.insert(token.clone()) {
                commands.push(token);
            }
        }
        return commands;
    }
    Vec::new()
}

/// Extract positive dispatch literals from one source file, deduplicated.
/// `not in [...]` membership lists are exclusion guards; their literals are
/// never added by themselves.
pub fn extract_dispatch_literals(content: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut commands = Vec::new();
    let mut push = |literal: &str| {
        let literal = literal.to_string();
        if command_like(&literal) && seen.insert(literal.clone()) {
            commands.push(literal);
        }
    };
    for caps in COMPARISON_RE.captures_iter(content) {
        push(&caps[3]);
    }
    for caps in MEMBERSHIP_RE.captures_iter(content) {
        if caps.get(2).is_some() {
            continue; // exclusion list
        }
        for lit in LITERAL_RE.captures_iter(&caps[3]) {
            push(&lit[1]);
        }
    }
    commands
}

/// Label a branch from its entry-point source.
pub fn classify(content: &str) -> Classification {
    if PARSER_MARKER_RE.is_match(content) || MAIN_BLOCK_RE.is_match(content) {
        Classification::Cli
    } else if DEFINITION_RE.is_match(content) {
        Classification::Library
    } else {
        Classification::Unknown
    }
}

fn module_files(config: &RouterConfig, modules_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(modules_dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            !stem.is_empty() && !stem.starts_with('.') && !config.is_ignored_module(stem)
        })
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            config.entry_extensions.iter().any(|e| e == ext)
        })
        .collect();
    files.sort();
    files
}

/// Static source scan over `{root}/apps/modules/`.
pub fn scan_sources(config: &RouterConfig, root: &Path) -> (Vec<String>, Vec<PathBuf>) {
    let modules_dir = root
        .join(schemas::BRANCH_APPS_DIR)
        .join(schemas::BRANCH_MODULES_DIR);
    let files = module_files(config, &modules_dir);
    let per_file: Vec<Vec<String>> = files
        .par_iter()
        .map(|path| match std::fs::read_to_string(path) {
            Ok(content) => extract_dispatch_literals(&content),
            Err(_) => Vec::new(),
        })
        .collect();
    let mut seen = BTreeSet::new();
    let mut commands = Vec::new();
    for file_commands in per_file {
        for command in file_commands {
            if seen.insert(command.clone()) {
                commands.push(command);
            }
        }
    }
    commands.sort();
    (commands, files)
}

/// Discover one branch with both methods and merge the results.
pub fn discover(
    config: &RouterConfig,
    resolver: &Resolver<'_>,
    record: &BranchRecord,
) -> DiscoveryReport {
    let entry = resolver.entry_point(record).ok();
    let mut runtime_commands = Vec::new();
    let mut classification = Classification::Unknown;
    if let Some(entry) = &entry {
        let (outcome, stdout) = supervisor::run_captured(
            config,
            entry,
            &["--help".to_string()],
            Duration::from_secs(config.help_timeout_secs),
        );
        if outcome.class == OutcomeClass::Success {
            runtime_commands = parse_help_commands(&stdout, &config.help_keyword);
        }
        if let Ok(content) = std::fs::read_to_string(entry) {
            classification = classify(&content);
        }
    }
    let (scanned_commands, source_files) = scan_sources(config, &record.root_path);

    // union, runtime authoritative and first
    let mut seen: BTreeSet<String> = runtime_commands.iter().cloned().collect();
    let mut commands = runtime_commands.clone();
    for command in &scanned_commands {
        if seen.insert(command.clone()) {
            commands.push(command.clone());
        }
    }

    DiscoveryReport {
        branch: record.name.clone(),
        classification,
        commands,
        runtime_commands,
        scanned_commands,
        module_path: entry,
        source_files,
    }
}

/// Persist a discovery report: unseen commands get fresh global ids, known
/// pairs keep theirs. An empty report mutates nothing.
pub fn register(store: &Store, report: &DiscoveryReport) -> Result<Vec<(String, u64)>, RouterError> {
    if report.is_empty() {
        return Ok(Vec::new());
    }
    let branch = &report.branch;
    let mut records = registry::load_branch_registry(store, branch)?;
    let default_module = report
        .module_path
        .clone()
        .or_else(|| report.source_files.first().cloned());
    let mut newly = Vec::new();
    for command in &report.commands {
        let key = registry::registry_key(branch, command);
        if records.contains_key(&key) {
            continue;
        }
        let id = registry::next_global_id(store)?;
        let module_path = default_module
            .clone()
            .unwrap_or_else(|| PathBuf::from(schemas::BRANCH_APPS_DIR));
        records.insert(
            key,
            CommandRecord {
                global_id: id,
                command_name: command.clone(),
                branch_name: branch.clone(),
                module_path,
                registered_at: time::now_epoch_z(),
                active: true,
            },
        );
        newly.push((command.clone(), id));
    }
    if !newly.is_empty() {
        registry::save_branch_registry(store, branch, &records)?;
    }

    let command_count = records.len() as u64;
    store::with_central_lock(store, || {
        let mut central = registry::load_central_registry(store)?;
        let meta = central.modules.entry(branch.clone()).or_default();
        meta.classification = report.classification.as_str().to_string();
        meta.last_scanned = time::now_epoch_z();
        meta.command_count = command_count;
        central.statistics.total_branches = central.modules.len() as u64;
        central.statistics.total_commands += newly.len() as u64;
        for (command, id) in &newly {
            central.commands.insert(
                registry::registry_key(branch, command),
                json!({ "global_id": id, "branch": branch }),
            );
        }
        central.source_files.insert(
            branch.clone(),
            report
                .source_files
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        );
        registry::save_central_registry(store, &mut central)
    })?;
    Ok(newly)
}
