//! Shortcut activation: mapping discovered commands to typed phrases.
//!
//! A shortcut phrase is 1–4 lowercase tokens, unique across the entire
//! activation set, not just within one branch. Uniqueness and lookup are a
//! single pass over every per-branch activation file. Writes merge into the
//! existing file, so sequential invocations never clobber each other.

use crate::core::error::RouterError;
use crate::core::registry;
use crate::core::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Longest phrase length, in tokens. Caps progressive-lookup cost.
pub const MAX_PHRASE_TOKENS: usize = 4;

/// One shortcut mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivatedCommand {
    pub shortcut_phrase: String,
    pub target_branch: String,
    pub target_command_name: String,
    pub target_module_path: PathBuf,
    #[serde(default)]
    pub description: String,
}

/// Normalize and validate a phrase: lowercase, single-spaced, 1–4 tokens,
/// first token not reserved by an internal router command.
pub fn validate_phrase(phrase: &str) -> Result<String, RouterError> {
    let tokens: Vec<String> = phrase
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.is_empty() || tokens.len() > MAX_PHRASE_TOKENS {
        return Err(RouterError::UserInput(format!(
            "shortcut phrase must be 1 to {} words: '{}'",
            MAX_PHRASE_TOKENS, phrase
        )));
    }
    if crate::subsystems::is_internal(&tokens[0]) {
        return Err(RouterError::UserInput(format!(
            "'{}' is a reserved router command and cannot start a shortcut",
            tokens[0]
        )));
    }
    Ok(tokens.join(" "))
}

/// Single-pass scan of all activation files for one phrase.
pub fn find_phrase(store: &Store, phrase: &str) -> Result<Option<ActivatedCommand>, RouterError> {
    for branch in store.branches_with_state() {
        let records = registry::load_branch_activations(store, &branch)?;
        if let Some(record) = records.get(phrase) {
            return Ok(Some(record.clone()));
        }
    }
    Ok(None)
}

/// Activate a discovered command under a phrase.
pub fn activate(
    store: &Store,
    branch: &str,
    command_name: &str,
    phrase: &str,
    description: Option<&str>,
) -> Result<ActivatedCommand, RouterError> {
    let phrase = validate_phrase(phrase)?;
    let registered = registry::load_branch_registry(store, branch)?;
    let key = registry::registry_key(branch, command_name);
    let command = registered.get(&key).ok_or_else(|| {
        RouterError::NotFound(format!(
            "command not registered: {} (run discovery for @{} first)",
            key, branch
        ))
    })?;
    if let Some(existing) = find_phrase(store, &phrase)? {
        return Err(RouterError::DuplicatePhrase(format!(
            "'{}' is already activated by branch '{}'",
            phrase, existing.target_branch
        )));
    }
    let record = ActivatedCommand {
        shortcut_phrase: phrase.clone(),
        target_branch: branch.to_string(),
        target_command_name: command_name.to_string(),
        target_module_path: command.module_path.clone(),
        description: description.unwrap_or_default().to_string(),
    };
    let mut touched = BTreeMap::new();
    touched.insert(phrase, record.clone());
    registry::save_branch_activations(store, branch, &touched)?;
    Ok(record)
}

/// Remove one activated shortcut; returns the removed record.
pub fn deactivate(store: &Store, phrase: &str) -> Result<ActivatedCommand, RouterError> {
    let phrase = phrase.to_lowercase();
    for branch in store.branches_with_state() {
        let mut records = registry::load_branch_activations(store, &branch)?;
        if let Some(removed) = records.remove(&phrase) {
            registry::replace_branch_activations(store, &branch, &records)?;
            return Ok(removed);
        }
    }
    Err(RouterError::NotFound(format!(
        "shortcut not activated: {}",
        phrase
    )))
}

pub fn lookup(store: &Store, phrase: &str) -> Result<ActivatedCommand, RouterError> {
    find_phrase(store, &phrase.to_lowercase())?.ok_or_else(|| {
        RouterError::NotFound(format!("shortcut not activated: {}", phrase))
    })
}

/// Rename a shortcut in one atomic rewrite of its branch file: the old
/// phrase is removed and the new one inserted in the same write.
pub fn rename(store: &Store, old_phrase: &str, new_phrase: &str) -> Result<(), RouterError> {
    let old_phrase = old_phrase.to_lowercase();
    let new_phrase = validate_phrase(new_phrase)?;
    if new_phrase != old_phrase
        && let Some(existing) = find_phrase(store, &new_phrase)?
    {
        return Err(RouterError::DuplicatePhrase(format!(
            "'{}' is already activated by branch '{}'",
            new_phrase, existing.target_branch
        )));
    }
    for branch in store.branches_with_state() {
        let mut records = registry::load_branch_activations(store, &branch)?;
        if let Some(mut record) = records.remove(&old_phrase) {
            record.shortcut_phrase = new_phrase.clone();
            records.insert(new_phrase, record);
            registry::replace_branch_activations(store, &branch, &records)?;
            return Ok(());
        }
    }
    Err(RouterError::NotFound(format!(
        "shortcut not activated: {}",
        old_phrase
    )))
}

/// Update the description of one activated shortcut in place.
pub fn update_description(
    store: &Store,
    phrase: &str,
    description: &str,
) -> Result<(), RouterError> {
    let phrase = phrase.to_lowercase();
    for branch in store.branches_with_state() {
        let mut records = registry::load_branch_activations(store, &branch)?;
        if let Some(record) = records.get_mut(&phrase) {
            record.description = description.to_string();
            registry::replace_branch_activations(store, &branch, &records)?;
            return Ok(());
        }
    }
    Err(RouterError::NotFound(format!(
        "shortcut not activated: {}",
        phrase
    )))
}

pub fn list_all(store: &Store) -> Result<Vec<ActivatedCommand>, RouterError> {
    let mut all = Vec::new();
    for branch in store.branches_with_state() {
        all.extend(registry::load_branch_activations(store, &branch)?.into_values());
    }
    all.sort_by(|a, b| a.shortcut_phrase.cmp(&b.shortcut_phrase));
    Ok(all)
}

pub fn list_for_branch(store: &Store, branch: &str) -> Result<Vec<ActivatedCommand>, RouterError> {
    let mut records: Vec<ActivatedCommand> = registry::load_branch_activations(store, branch)?
        .into_values()
        .collect();
    records.sort_by(|a, b| a.shortcut_phrase.cmp(&b.shortcut_phrase));
    Ok(records)
}

/// Progressive matching: try candidate phrases built from the command token
/// plus the first `k` args, longest first, down to the bare token. The
/// first activated candidate wins and the rest of the args become the child
/// tail.
pub fn progressive_match(
    store: &Store,
    command: &str,
    args: &[String],
) -> Result<Option<(ActivatedCommand, Vec<String>)>, RouterError> {
    let max_extra = args.len().min(MAX_PHRASE_TOKENS - 1);
    for k in (0..=max_extra).rev() {
        let mut candidate = command.to_lowercase();
        for arg in &args[..k] {
            candidate.push(' ');
            candidate.push_str(&arg.to_lowercase());
        }
        if let Some(record) = find_phrase(store, &candidate)? {
            return Ok(Some((record, args[k..].to_vec())));
        }
    }
    Ok(None)
}
