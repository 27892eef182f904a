//! Terminal output helpers.
//!
//! Failure lines and persisted argv summaries must stay on one bounded
//! line: multi-line child output, clap usage dumps, and long argument
//! vectors all get flattened here before they reach the user or the log.
//! Terminal failure lines carry their severity band as color; everything
//! verbose goes to the structured operation log instead.

use crate::core::error::{Band, RouterError};

/// Flatten runs of whitespace (including newlines) and cap the result at
/// `limit` characters, marking any truncation with a trailing ellipsis.
pub fn one_line(input: &str, limit: usize) -> String {
    let mut flat = String::new();
    for word in input.split_whitespace() {
        if !flat.is_empty() {
            flat.push(' ');
        }
        flat.push_str(word);
    }
    if flat.chars().count() <= limit {
        return flat;
    }
    let cut: String = flat.chars().take(limit).collect();
    format!("{}...", cut)
}

/// One-line argv summary for failure events and logs.
///
/// Flag values that look like credentials are masked before the summary is
/// bounded, so the redacted form is safe to persist.
pub fn summarize_argv(args: &[String], limit: usize) -> String {
    let masked: Vec<String> = args.iter().map(|a| mask_sensitive(a)).collect();
    one_line(&masked.join(" "), limit)
}

const SENSITIVE_MARKERS: &[&str] = &["token", "secret", "password", "key", "credential"];

fn mask_sensitive(arg: &str) -> String {
    if let Some((name, _value)) = arg.split_once('=') {
        let lowered = name.to_lowercase();
        if SENSITIVE_MARKERS.iter().any(|m| lowered.contains(m)) {
            return format!("{}=***", name);
        }
    }
    arg.to_string()
}

/// Render the single user-visible line for a failure, colored by band.
pub fn failure_line(err: &RouterError) {
    use colored::Colorize;

    let line = one_line(&err.to_string(), 200);
    match err.band() {
        Band::Warning => eprintln!("{} {}", "warning:".yellow().bold(), line),
        Band::Error => eprintln!("{} {}", "error:".red().bold(), line),
    }
}
