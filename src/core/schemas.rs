// src/core/schemas.rs
// Centralized names for Junction's persisted JSON artifacts.

// --- Workspace ---
pub const BRANCH_DIRECTORY_NAME: &str = "BRANCH_DIRECTORY.json";
pub const ROUTER_DIR_NAME: &str = ".junction";
pub const WORKSPACE_ENV_VAR: &str = "JUNCTION_WORKSPACE";

// --- Central registry ---
pub const CENTRAL_DIR_NAME: &str = "central";
pub const CENTRAL_REGISTRY_NAME: &str = "registry.json";
pub const CENTRAL_LOCK_NAME: &str = "registry.lock";
pub const CENTRAL_CONFIG_NAME: &str = "config.json";
pub const CENTRAL_DATA_NAME: &str = "data.json";
pub const CENTRAL_LOG_NAME: &str = "log.json";
pub const FAILURE_EVENTS_NAME: &str = "failures.events.jsonl";
pub const CENTRAL_REGISTRY_VERSION: &str = "1.0.0";

// --- Per-branch files ---
pub const COMMANDS_DIR_NAME: &str = "commands";
pub const BRANCH_REGISTRY_NAME: &str = "registry.json";
pub const BRANCH_ACTIVE_NAME: &str = "active.json";

// --- Branch layout conventions ---
pub const BRANCH_APPS_DIR: &str = "apps";
pub const BRANCH_MODULES_DIR: &str = "modules";
/// Parent directory marker: the path segment after it names the branch.
pub const CORE_PARENT_MARKER: &str = "core";

// --- Reserved symbolic tokens ---
pub const WORKSPACE_HANDLE: &str = "@";
pub const ALL_SENTINEL: &str = "@all";
