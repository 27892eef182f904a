//! Junction: a command router for multi-branch workspaces.
//!
//! One invocation surface — `junction <command> [args...]` — that
//! transparently dispatches to the right branch entry point, resolves
//! symbolic `@branch` references in arguments, and learns new commands by
//! interrogating branches at runtime.
//!
//! # Architecture
//!
//! - **Short-lived**: every invocation is its own process; all state that
//!   survives between invocations is JSON under the workspace.
//! - **Branches are external**: the router never imports branch code. It
//!   resolves an entry point and spawns it as a child process.
//! - **Static internal dispatch**: router-internal subcommands live in a
//!   fixed table (`subsystems.rs`); only the outside world is discovered
//!   at runtime.
//!
//! # Routing
//!
//! First match wins:
//!
//! 1. no arguments — print the internal module index
//! 2. `help` / `--help` / `-h` — help text
//! 3. `@branch/module ...` — slash dispatch into a branch subpath
//! 4. `@branch ...` — direct dispatch to the branch entry point
//! 5. an internal subcommand — handled in process
//! 6. anything else — progressive shortcut matching; unknown tokens warn
//!    and exit 1

pub mod core;
pub mod subsystems;

pub(crate) mod cli;

use core::activation;
use core::branch::{BranchRecord, Resolution, Resolver};
use core::config::{self, RouterConfig};
use core::discovery;
use core::error::{Band, RouterError};
use core::interact;
use core::oplog::{OpLog, Severity};
use core::preprocess;
use core::registry;
use core::store::Store;
use core::supervisor;
use core::time;

use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Per-invocation context: loaded state plus the invocation identifier
/// carried into failure notifications.
pub struct Invocation {
    pub store: Store,
    pub config: RouterConfig,
    pub oplog: OpLog,
    pub invocation_id: String,
}

impl Invocation {
    pub fn open() -> Result<Invocation, RouterError> {
        let store = Store::discover()?;
        let config = RouterConfig::load(&store);
        let oplog = OpLog::open(&store, config.log_cap);
        Ok(Invocation {
            store,
            config,
            oplog,
            invocation_id: time::new_event_id(),
        })
    }
}

/// One routing decision; pure function of the argv shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    Index,
    Help,
    Version,
    Slash(&'a str),
    Direct(&'a str),
    Internal(&'a str),
    Shortcut(&'a str),
}

fn classify(args: &[String]) -> Route<'_> {
    let Some(first) = args.first() else {
        return Route::Index;
    };
    match first.as_str() {
        "help" | "--help" | "-h" => return Route::Help,
        "version" | "--version" => return Route::Version,
        _ => {}
    }
    if let Some(rest) = first.strip_prefix('@') {
        if rest.contains('/') {
            return Route::Slash(first);
        }
        return Route::Direct(first);
    }
    if subsystems::find(first).is_some() {
        return Route::Internal(first);
    }
    Route::Shortcut(first)
}

/// Entry point for the binary. Returns the process exit code on the
/// success path; failures carry their own exit code on the error.
pub fn run() -> Result<i32, RouterError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    run_with_args(&args)
}

pub fn run_with_args(args: &[String]) -> Result<i32, RouterError> {
    match classify(args) {
        Route::Index => {
            print_module_index();
            Ok(0)
        }
        Route::Help => {
            print_help();
            Ok(0)
        }
        Route::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Route::Slash(first) => {
            let inv = Invocation::open()?;
            config::bump_data(&inv.store, |d| d.invocations += 1);
            settle(&inv, route_slash(&inv, first, &args[1..]))
        }
        Route::Direct(first) => {
            let inv = Invocation::open()?;
            config::bump_data(&inv.store, |d| d.invocations += 1);
            settle(&inv, route_direct(&inv, first, &args[1..]))
        }
        Route::Internal(first) => {
            let inv = Invocation::open()?;
            config::bump_data(&inv.store, |d| d.invocations += 1);
            // the classifier only returns tokens present in the table
            let command = subsystems::find(first).ok_or_else(|| {
                RouterError::NotFound(format!("unknown command: {}", first))
            })?;
            settle(&inv, (command.run)(&inv, &args[1..]))
        }
        Route::Shortcut(first) => {
            let inv = Invocation::open()?;
            config::bump_data(&inv.store, |d| d.invocations += 1);
            settle(&inv, route_shortcut(&inv, first, &args[1..]))
        }
    }
}

/// Record failures in the operation log exactly once. Child failures and
/// timeouts were already logged by the supervisor.
fn settle(inv: &Invocation, result: Result<i32, RouterError>) -> Result<i32, RouterError> {
    if let Err(err) = &result {
        config::bump_data(&inv.store, |d| d.failures += 1);
        match err {
            RouterError::ChildFailure { .. } | RouterError::Timeout(_) => {}
            _ => {
                let severity = match err.band() {
                    Band::Warning => Severity::Warning,
                    Band::Error => Severity::Error,
                };
                inv.oplog
                    .record(severity, "router", &err.to_string(), json!({}));
            }
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Routing paths
// ---------------------------------------------------------------------------

fn dispatch(
    inv: &Invocation,
    branch: Option<&str>,
    module: &Path,
    argv: &[String],
    timeout: Option<std::time::Duration>,
) -> Result<i32, RouterError> {
    config::bump_data(&inv.store, |d| d.dispatches += 1);
    let outcome = supervisor::supervise(
        &inv.store,
        &inv.config,
        &inv.oplog,
        &inv.invocation_id,
        branch,
        module,
        argv,
        timeout,
    );
    supervisor::outcome_to_result(&outcome, module)
}

fn route_direct(inv: &Invocation, target: &str, tail: &[String]) -> Result<i32, RouterError> {
    let mut resolver = Resolver::new(&inv.store, &inv.config);
    let record = match resolver.resolve(target)? {
        Resolution::Branch(record) => record,
        Resolution::All | Resolution::Workspace(_) => {
            return Err(RouterError::UserInput(format!(
                "'{}' cannot be invoked directly",
                target
            )));
        }
    };
    let entry = resolver.entry_point(&record)?;
    let argv = preprocess::preprocess(&mut resolver, tail);
    let timeout = supervisor::choose_timeout(&inv.config, &argv);
    dispatch(inv, Some(&record.name), &entry, &argv, timeout)
}

fn route_slash(inv: &Invocation, first: &str, tail: &[String]) -> Result<i32, RouterError> {
    let Some((head, subpath)) = first.split_once('/') else {
        return Err(RouterError::UserInput(format!("malformed target: {}", first)));
    };
    let mut resolver = Resolver::new(&inv.store, &inv.config);
    let (branch, root) = match resolver.resolve(head)? {
        Resolution::Branch(record) => (Some(record.name.clone()), record.root_path),
        Resolution::Workspace(root) => (None, root),
        Resolution::All => {
            return Err(RouterError::UserInput(format!(
                "'{}' cannot carry a module path",
                first
            )));
        }
    };
    // the subpath is not pre-validated; a missing module surfaces as a
    // launch error from the supervisor
    let module = root.join(subpath);
    let argv = preprocess::preprocess(&mut resolver, tail);
    let timeout = supervisor::choose_timeout(&inv.config, &argv);
    dispatch(inv, branch.as_deref(), &module, &argv, timeout)
}

fn route_shortcut(inv: &Invocation, first: &str, tail: &[String]) -> Result<i32, RouterError> {
    match activation::progressive_match(&inv.store, first, tail)? {
        Some((hit, rest)) => {
            let mut argv = vec![hit.target_command_name.clone()];
            argv.extend(rest);
            let mut resolver = Resolver::new(&inv.store, &inv.config);
            let argv = preprocess::preprocess(&mut resolver, &argv);
            let timeout = supervisor::choose_timeout(&inv.config, &argv);
            dispatch(
                inv,
                Some(&hit.target_branch),
                &hit.target_module_path,
                &argv,
                timeout,
            )
        }
        None => Err(RouterError::NotFound(format!("unknown command: {}", first))),
    }
}

// ---------------------------------------------------------------------------
// Internal command handlers (referenced from the static table)
// ---------------------------------------------------------------------------

fn resolve_branch(resolver: &mut Resolver<'_>, target: &str) -> Result<BranchRecord, RouterError> {
    match resolver.resolve(target)? {
        Resolution::Branch(record) => Ok(record),
        _ => Err(RouterError::UserInput(format!(
            "'{}' does not name a single branch",
            target
        ))),
    }
}

pub(crate) fn run_scan(inv: &Invocation, args: &[String]) -> Result<i32, RouterError> {
    let Some(scan) = cli::parse_args::<cli::ScanCli>("scan", args)? else {
        return Ok(0);
    };
    let mut resolver = Resolver::new(&inv.store, &inv.config);
    let targets: Vec<BranchRecord> = if scan.all {
        let mut directory = registry::load_branch_directory(&inv.store)?;
        for record in &mut directory.branches {
            record.fill_derived();
        }
        directory.branches
    } else {
        let target = scan.target.ok_or_else(|| {
            RouterError::UserInput("scan needs a branch handle or --all".to_string())
        })?;
        vec![resolve_branch(&mut resolver, &target)?]
    };
    if targets.is_empty() {
        println!("no branches in the directory");
        return Ok(0);
    }

    let mut scanned_branches = Vec::new();
    for record in &targets {
        let report = discovery::discover(&inv.config, &resolver, record);
        if report.is_empty() {
            println!("{}: no commands detected", record.display_name);
            continue;
        }
        let newly = discovery::register(&inv.store, &report)?;
        println!(
            "{}: {} command(s) [{}], {} newly registered",
            record.display_name,
            report.commands.len(),
            report.classification.as_str(),
            newly.len()
        );
        for (name, id) in &newly {
            println!("  #{} {}", id, name);
        }
        if !newly.is_empty() {
            scanned_branches.push(record.name.clone());
        }
    }

    for branch in scanned_branches {
        if interact::confirm(&format!("Activate commands for '{}' now?", branch))? {
            interactive_activate(inv, &branch)?;
        }
    }
    Ok(0)
}

fn interactive_activate(inv: &Invocation, branch: &str) -> Result<(), RouterError> {
    let registered = registry::load_branch_registry(&inv.store, branch)?;
    if registered.is_empty() {
        println!("no registered commands for '{}'", branch);
        return Ok(());
    }
    println!("registered commands for '{}':", branch);
    for record in registered.values() {
        println!("  #{} {}", record.global_id, record.command_name);
    }
    loop {
        let Some(choice) = interact::prompt("command to activate (blank to finish)")? else {
            return Ok(());
        };
        if choice.is_empty() {
            return Ok(());
        }
        let key = registry::registry_key(branch, &choice);
        if !registered.contains_key(&key) {
            println!("not a registered command: {}", choice);
            continue;
        }
        let Some(phrase) = interact::prompt("shortcut phrase (1-4 words)")? else {
            return Ok(());
        };
        let description = interact::prompt("description (optional)")?.unwrap_or_default();
        match activation::activate(&inv.store, branch, &choice, &phrase, Some(&description)) {
            Ok(record) => println!(
                "activated '{}' -> {}:{}",
                record.shortcut_phrase, branch, choice
            ),
            Err(err @ (RouterError::DuplicatePhrase(_) | RouterError::UserInput(_))) => {
                core::output::failure_line(&err);
            }
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn run_activate(inv: &Invocation, args: &[String]) -> Result<i32, RouterError> {
    let Some(activate) = cli::parse_args::<cli::ActivateCli>("activate", args)? else {
        return Ok(0);
    };
    let mut resolver = Resolver::new(&inv.store, &inv.config);
    let record = resolve_branch(&mut resolver, &activate.branch)?;
    interactive_activate(inv, &record.name)?;
    Ok(0)
}

pub(crate) fn run_list(inv: &Invocation, args: &[String]) -> Result<i32, RouterError> {
    let Some(list) = cli::parse_args::<cli::ListCli>("list", args)? else {
        return Ok(0);
    };
    let records = match &list.scope {
        Some(scope) => {
            let mut resolver = Resolver::new(&inv.store, &inv.config);
            let record = resolve_branch(&mut resolver, scope)?;
            activation::list_for_branch(&inv.store, &record.name)?
        }
        None => activation::list_all(&inv.store)?,
    };
    if list.format == "json" {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(0);
    }
    if records.is_empty() {
        println!("no activated shortcuts");
        return Ok(0);
    }
    for record in &records {
        let description = if record.description.is_empty() {
            String::new()
        } else {
            format!("  — {}", record.description)
        };
        println!(
            "{:24} -> {}:{}{}",
            record.shortcut_phrase, record.target_branch, record.target_command_name, description
        );
    }
    Ok(0)
}

pub(crate) fn run_edit(inv: &Invocation, args: &[String]) -> Result<i32, RouterError> {
    if !args.is_empty() {
        return Err(RouterError::UserInput(
            "edit takes no arguments; it prompts for the shortcut".to_string(),
        ));
    }
    let Some(phrase) = interact::prompt("shortcut to edit")? else {
        return Ok(0);
    };
    let record = activation::lookup(&inv.store, &phrase)?;
    println!(
        "'{}' -> {}:{} ({})",
        record.shortcut_phrase,
        record.target_branch,
        record.target_command_name,
        if record.description.is_empty() {
            "no description"
        } else {
            record.description.as_str()
        }
    );
    let Some(new_phrase) = interact::prompt("new phrase (blank to keep)")? else {
        return Ok(0);
    };
    let mut current = record.shortcut_phrase.clone();
    if !new_phrase.is_empty() {
        activation::rename(&inv.store, &current, &new_phrase)?;
        current = activation::validate_phrase(&new_phrase)?;
        println!("renamed to '{}'", current);
    }
    let Some(new_description) = interact::prompt("new description (blank to keep)")? else {
        return Ok(0);
    };
    if !new_description.is_empty() {
        activation::update_description(&inv.store, &current, &new_description)?;
        println!("description updated");
    }
    Ok(0)
}

pub(crate) fn run_remove(inv: &Invocation, args: &[String]) -> Result<i32, RouterError> {
    let Some(remove) = cli::parse_args::<cli::RemoveCli>("remove", args)? else {
        return Ok(0);
    };
    let phrase = remove.phrase.join(" ");
    let removed = activation::deactivate(&inv.store, &phrase)?;
    println!(
        "removed '{}' ({}:{})",
        removed.shortcut_phrase, removed.target_branch, removed.target_command_name
    );
    Ok(0)
}

pub(crate) fn run_refresh(inv: &Invocation, args: &[String]) -> Result<i32, RouterError> {
    let Some(refresh) = cli::parse_args::<cli::RefreshCli>("refresh", args)? else {
        return Ok(0);
    };
    let mut resolver = Resolver::new(&inv.store, &inv.config);
    let record = resolve_branch(&mut resolver, &refresh.target)?;
    let report = discovery::discover(&inv.config, &resolver, &record);
    if report.is_empty() {
        println!("{}: no commands detected", record.display_name);
        return Ok(0);
    }
    let newly = discovery::register(&inv.store, &report)?;
    println!(
        "{}: {} command(s), {} newly registered",
        record.display_name,
        report.commands.len(),
        newly.len()
    );
    Ok(0)
}

#[derive(Debug, Serialize)]
struct SystemSummary {
    name: String,
    handle: String,
    root_path: PathBuf,
    classification: String,
    registered: usize,
    activated: usize,
}

pub(crate) fn run_systems(inv: &Invocation, args: &[String]) -> Result<i32, RouterError> {
    let Some(systems) = cli::parse_args::<cli::SystemsCli>("systems", args)? else {
        return Ok(0);
    };
    let mut directory = registry::load_branch_directory(&inv.store)?;
    let central = registry::load_central_registry(&inv.store)?;
    let mut summaries = Vec::new();
    for record in &mut directory.branches {
        record.fill_derived();
        let registered = registry::load_branch_registry(&inv.store, &record.name)?.len();
        let activated = registry::load_branch_activations(&inv.store, &record.name)?.len();
        let classification = central
            .modules
            .get(&record.name)
            .map(|m| m.classification.clone())
            .unwrap_or_else(|| "unscanned".to_string());
        summaries.push(SystemSummary {
            name: record.name.clone(),
            handle: record.handle.clone(),
            root_path: record.root_path.clone(),
            classification,
            registered,
            activated,
        });
    }
    if systems.format == "json" {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(0);
    }
    if summaries.is_empty() {
        println!("no branches in the directory");
        return Ok(0);
    }
    for summary in &summaries {
        println!(
            "{:16} {:16} registered: {:3}  activated: {:3}  [{}]",
            summary.handle,
            summary.name.to_uppercase(),
            summary.registered,
            summary.activated,
            summary.classification
        );
    }
    Ok(0)
}

pub(crate) fn run_passthrough(inv: &Invocation, args: &[String]) -> Result<i32, RouterError> {
    let Some(run) = cli::parse_args::<cli::RunCli>("run", args)? else {
        return Ok(0);
    };
    let module = resolve_module_file(&inv.store, &run.module)?;
    let mut argv = vec![run.command.clone()];
    argv.extend(run.args.iter().cloned());
    let mut resolver = Resolver::new(&inv.store, &inv.config);
    let argv = preprocess::preprocess(&mut resolver, &argv);
    let timeout = supervisor::choose_timeout(&inv.config, &argv);
    dispatch(inv, None, &module, &argv, timeout)
}

/// Search paths for the low-level `run` command: the literal path, then the
/// workspace root, then the workspace `core/` tree.
fn resolve_module_file(store: &Store, module: &str) -> Result<PathBuf, RouterError> {
    let literal = PathBuf::from(module);
    if literal.is_file() {
        return Ok(literal);
    }
    for base in [
        store.workspace_root.clone(),
        store.workspace_root.join(core::schemas::CORE_PARENT_MARKER),
    ] {
        let candidate = base.join(module);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(RouterError::NotFound(format!(
        "module file not found: {}",
        module
    )))
}

pub(crate) fn run_version(_inv: &Invocation, _args: &[String]) -> Result<i32, RouterError> {
    println!("v{}", env!("CARGO_PKG_VERSION"));
    Ok(0)
}

// ---------------------------------------------------------------------------
// Doctor: read-only preflight checks
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    message: String,
}

fn check_parses<T: serde::de::DeserializeOwned>(name: &str, path: &Path) -> CheckResult {
    match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult {
            name: name.to_string(),
            status: CheckStatus::Warn,
            message: "missing (created on first use)".to_string(),
        },
        Err(e) => CheckResult {
            name: name.to_string(),
            status: CheckStatus::Fail,
            message: format!("unreadable: {}", e),
        },
        Ok(content) => match serde_json::from_str::<T>(&content) {
            Ok(_) => CheckResult {
                name: name.to_string(),
                status: CheckStatus::Pass,
                message: "ok".to_string(),
            },
            Err(e) => CheckResult {
                name: name.to_string(),
                status: CheckStatus::Fail,
                message: format!("corrupt (will auto-heal on next write): {}", e),
            },
        },
    }
}

pub(crate) fn run_doctor(inv: &Invocation, args: &[String]) -> Result<i32, RouterError> {
    let Some(doctor) = cli::parse_args::<cli::DoctorCli>("doctor", args)? else {
        return Ok(0);
    };
    let mut checks = Vec::new();
    checks.push(check_parses::<core::branch::BranchDirectory>(
        "branch directory",
        &inv.store.branch_directory_path(),
    ));
    checks.push(check_parses::<registry::CentralRegistry>(
        "central registry",
        &inv.store.central_registry_path(),
    ));
    for branch in inv.store.branches_with_state() {
        checks.push(check_parses::<
            std::collections::BTreeMap<String, registry::CommandRecord>,
        >(
            &format!("{} registry", branch),
            &inv.store.branch_registry_path(&branch),
        ));
        checks.push(check_parses::<
            std::collections::BTreeMap<String, activation::ActivatedCommand>,
        >(
            &format!("{} activations", branch),
            &inv.store.branch_active_path(&branch),
        ));
    }

    // branch names and handles must be unique across the directory
    let mut name_check = CheckResult {
        name: "branch uniqueness".to_string(),
        status: CheckStatus::Pass,
        message: "ok".to_string(),
    };
    if let Ok(Some(directory)) = core::store::read_json::<core::branch::BranchDirectory>(
        &inv.store.branch_directory_path(),
    ) {
        let mut names = std::collections::BTreeSet::new();
        for record in &directory.branches {
            if !names.insert(record.name.to_lowercase()) {
                name_check.status = CheckStatus::Fail;
                name_check.message = format!("branch '{}' appears twice", record.name);
            }
        }
    }
    checks.push(name_check);

    // global phrase uniqueness across every activation file
    let mut phrase_check = CheckResult {
        name: "shortcut uniqueness".to_string(),
        status: CheckStatus::Pass,
        message: "ok".to_string(),
    };
    let mut seen = std::collections::BTreeMap::new();
    for branch in inv.store.branches_with_state() {
        if let Ok(Some(records)) = core::store::read_json::<
            std::collections::BTreeMap<String, activation::ActivatedCommand>,
        >(&inv.store.branch_active_path(&branch))
        {
            for phrase in records.keys() {
                if let Some(other) = seen.insert(phrase.clone(), branch.clone()) {
                    phrase_check.status = CheckStatus::Fail;
                    phrase_check.message =
                        format!("'{}' activated by both '{}' and '{}'", phrase, other, branch);
                }
            }
        }
    }
    checks.push(phrase_check);

    if let Ok(Some(central)) =
        core::store::read_json::<registry::CentralRegistry>(&inv.store.central_registry_path())
        && central.statistics.auto_healing_count > 0
    {
        checks.push(CheckResult {
            name: "auto-healing".to_string(),
            status: CheckStatus::Warn,
            message: format!(
                "{} repair(s) recorded; check the operation log",
                central.statistics.auto_healing_count
            ),
        });
    }

    let failed = checks.iter().filter(|c| c.status == CheckStatus::Fail).count();
    if doctor.format == "json" {
        println!("{}", serde_json::to_string_pretty(&checks)?);
    } else {
        println!("Junction Doctor — registry preflight\n");
        for check in &checks {
            let icon = match check.status {
                CheckStatus::Pass => "PASS",
                CheckStatus::Fail => "FAIL",
                CheckStatus::Warn => "WARN",
            };
            println!("  [{}] {}: {}", icon, check.name, check.message);
        }
        println!(
            "\nSummary: {} checked, {} failed",
            checks.len(),
            failed
        );
    }
    Ok(if failed > 0 { 1 } else { 0 })
}

// ---------------------------------------------------------------------------
// Help surfaces
// ---------------------------------------------------------------------------

fn print_module_index() {
    println!("junction — command router for multi-branch workspaces\n");
    println!("internal modules:");
    for command in subsystems::INTERNAL_COMMANDS {
        println!("  {:10} {}", command.name, command.summary);
    }
    println!("\nrun 'junction help' for the routing forms");
}

fn print_help() {
    println!("junction — command router for multi-branch workspaces\n");
    println!("usage: junction <command> [args...]\n");
    println!("routing, first match wins:");
    println!("  @branch [args...]           dispatch to the branch entry point");
    println!("  @branch/module [args...]    dispatch to a module inside the branch");
    println!("  <internal command>          see below");
    println!("  <shortcut phrase> [args...] dispatch via an activated shortcut\n");
    println!("arguments beginning with '@' are rewritten to absolute branch paths");
    println!("before the child runs; '@all' is passed through verbatim\n");
    println!("internal commands:");
    for command in subsystems::INTERNAL_COMMANDS {
        println!("  {:10} {}", command.name, command.summary);
    }
    println!("\nexit codes: 0 success, 1 error, 2 invalid usage, 130 interrupt");
}
