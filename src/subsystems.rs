//! Internal command registration — the static dispatch table.
//!
//! Router-internal subcommands are known handlers referenced by name here;
//! nothing internal is discovered at runtime. Adding a new internal
//! command: append one entry to `INTERNAL_COMMANDS`. The table also backs
//! the no-argument module index and the reserved-name check in the
//! activation engine.

use crate::Invocation;
use crate::core::error::RouterError;

pub(crate) struct InternalCommand {
    pub name: &'static str,
    pub summary: &'static str,
    pub run: fn(&Invocation, &[String]) -> Result<i32, RouterError>,
}

pub(crate) const INTERNAL_COMMANDS: &[InternalCommand] = &[
    InternalCommand {
        name: "scan",
        summary: "Discover a branch's commands and register them",
        run: crate::run_scan,
    },
    InternalCommand {
        name: "activate",
        summary: "Interactively map discovered commands to shortcuts",
        run: crate::run_activate,
    },
    InternalCommand {
        name: "list",
        summary: "List activated shortcuts, optionally scoped to a branch",
        run: crate::run_list,
    },
    InternalCommand {
        name: "edit",
        summary: "Interactively edit one shortcut",
        run: crate::run_edit,
    },
    InternalCommand {
        name: "remove",
        summary: "Deactivate one shortcut",
        run: crate::run_remove,
    },
    InternalCommand {
        name: "refresh",
        summary: "Re-run discovery for a branch, merging with the registry",
        run: crate::run_refresh,
    },
    InternalCommand {
        name: "systems",
        summary: "Summarize known branches and their command counts",
        run: crate::run_systems,
    },
    InternalCommand {
        name: "run",
        summary: "Low-level pass-through: spawn a module file directly",
        run: crate::run_passthrough,
    },
    InternalCommand {
        name: "version",
        summary: "Print the router version",
        run: crate::run_version,
    },
    InternalCommand {
        name: "doctor",
        summary: "Read-only preflight checks over the registry tree",
        run: crate::run_doctor,
    },
];

pub(crate) fn find(name: &str) -> Option<&'static InternalCommand> {
    INTERNAL_COMMANDS.iter().find(|c| c.name == name)
}

/// True when a token names an internal router command. Internal names are
/// reserved: they can never start an activated shortcut phrase.
pub fn is_internal(token: &str) -> bool {
    INTERNAL_COMMANDS.iter().any(|c| c.name == token)
}
