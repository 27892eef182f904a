//! CLI struct definitions for the router's internal subcommands.
//!
//! The router classifies the first token itself (branch handles and
//! shortcut phrases are not clap's business); once a token names an
//! internal command, the remaining argv is parsed by the matching
//! clap-derived struct here. Dispatch logic lives in `lib.rs`.

use crate::core::error::RouterError;
use crate::core::output;
use clap::Parser;

/// Parse one internal command's argv. `Ok(None)` means clap rendered help
/// or version output and the invocation is complete.
pub(crate) fn parse_args<T: Parser>(
    command: &str,
    args: &[String],
) -> Result<Option<T>, RouterError> {
    let argv = std::iter::once(format!("junction {}", command)).chain(args.iter().cloned());
    match T::try_parse_from(argv) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(err)
            if matches!(
                err.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            print!("{}", err);
            Ok(None)
        }
        Err(err) => Err(RouterError::UserInput(output::one_line(
            &err.to_string(),
            200,
        ))),
    }
}

#[derive(Parser, Debug)]
#[clap(name = "junction scan", about = "Discover a branch's commands and register them")]
pub(crate) struct ScanCli {
    /// Branch to scan, as `@handle` or bare name
    pub target: Option<String>,
    /// Scan every branch in the directory
    #[clap(long)]
    pub all: bool,
}

#[derive(Parser, Debug)]
#[clap(
    name = "junction activate",
    about = "Interactively map discovered commands to shortcut phrases"
)]
pub(crate) struct ActivateCli {
    /// Branch whose commands to activate
    pub branch: String,
}

#[derive(Parser, Debug)]
#[clap(name = "junction list", about = "List activated shortcuts")]
pub(crate) struct ListCli {
    /// Optional branch name or `@handle` to filter by
    pub scope: Option<String>,
    /// Output format: 'text' or 'json'
    #[clap(long, default_value = "text")]
    pub format: String,
}

#[derive(Parser, Debug)]
#[clap(name = "junction remove", about = "Deactivate one shortcut")]
pub(crate) struct RemoveCli {
    /// The shortcut phrase to remove (may be several words)
    #[clap(required = true, num_args = 1..)]
    pub phrase: Vec<String>,
}

#[derive(Parser, Debug)]
#[clap(
    name = "junction refresh",
    about = "Re-run discovery for a branch, merging with the registry"
)]
pub(crate) struct RefreshCli {
    /// Branch to refresh, as `@handle` or bare name
    pub target: String,
}

#[derive(Parser, Debug)]
#[clap(
    name = "junction systems",
    about = "Summarize known branches and their command counts"
)]
pub(crate) struct SystemsCli {
    /// Output format: 'text' or 'json'
    #[clap(long, default_value = "text")]
    pub format: String,
}

#[derive(Parser, Debug)]
#[clap(
    name = "junction run",
    about = "Low-level pass-through: spawn a module file directly"
)]
pub(crate) struct RunCli {
    /// Command token handed to the module as its first argument
    pub command: String,
    /// Module file, absolute or relative to the known search paths
    pub module: String,
    /// Remaining argv for the module
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Parser, Debug)]
#[clap(
    name = "junction doctor",
    about = "Read-only preflight checks over the registry tree"
)]
pub(crate) struct DoctorCli {
    /// Output format: 'text' or 'json'
    #[clap(long, default_value = "text")]
    pub format: String,
}
