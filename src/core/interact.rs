//! Minimal stdin prompting for the interactive internal commands.
//!
//! EOF is a quiet cancel, never an error, so piped and scripted
//! invocations degrade to their non-interactive behavior.

use crate::core::error::RouterError;
use std::io::Write;

/// Ask one question. `None` means EOF (stdin closed).
pub fn prompt(message: &str) -> Result<Option<String>, RouterError> {
    print!("{}: ", message);
    std::io::stdout().flush()?;
    let mut line = String::new();
    let read = std::io::stdin().read_line(&mut line)?;
    if read == 0 {
        println!();
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Yes/no question defaulting to no. EOF counts as no.
pub fn confirm(message: &str) -> Result<bool, RouterError> {
    match prompt(&format!("{} [y/N]", message))? {
        Some(answer) => Ok(matches!(answer.as_str(), "y" | "Y" | "yes" | "YES")),
        None => Ok(false),
    }
}
