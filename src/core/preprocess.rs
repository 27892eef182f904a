//! Argument preprocessing: `@` reference rewriting.
//!
//! Pure function over an argv slice, run once before every child spawn.
//! Tokens beginning with `@` become absolute paths; everything else passes
//! through untouched. Reserved sentinels survive verbatim so receiving
//! branches can interpret them. Unresolvable names also pass through, so
//! the child owns the error for names it invented.

use crate::core::branch::{Resolution, Resolver};
use crate::core::schemas;

/// Rewrite one argv slice. Idempotent: rewriting the output again is a
/// no-op, since produced paths no longer start with `@`.
pub fn preprocess(resolver: &mut Resolver<'_>, args: &[String]) -> Vec<String> {
    args.iter().map(|arg| rewrite(resolver, arg)).collect()
}

fn rewrite(resolver: &mut Resolver<'_>, arg: &str) -> String {
    if arg.eq_ignore_ascii_case(schemas::ALL_SENTINEL) {
        return arg.to_string();
    }
    if !arg.starts_with('@') {
        return arg.to_string();
    }
    let (target, subpath) = match arg.find('/') {
        Some(pos) => (&arg[..pos], Some(&arg[pos + 1..])),
        None => (arg, None),
    };
    let root = match resolver.resolve(target) {
        Ok(Resolution::Workspace(root)) => root,
        Ok(Resolution::Branch(record)) => record.root_path,
        // @all was handled above; any other resolution failure leaves the
        // token for the child to complain about.
        _ => return arg.to_string(),
    };
    match subpath {
        // subpath existence is not validated here
        Some(rest) => root.join(rest).to_string_lossy().to_string(),
        None => root.to_string_lossy().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::branch::{BranchDirectory, BranchRecord, DirectoryMetadata};
    use crate::core::config::RouterConfig;
    use crate::core::store::{self, Store};
    use tempfile::tempdir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn seed_workspace() -> (tempfile::TempDir, Store, RouterConfig) {
        let tmp = tempdir().unwrap();
        let ws = tmp.path();
        let flow_root = ws.join("core").join("flow");
        let seed_root = ws.join("seed");
        std::fs::create_dir_all(&flow_root).unwrap();
        std::fs::create_dir_all(&seed_root).unwrap();
        let directory = BranchDirectory {
            metadata: DirectoryMetadata::default(),
            branches: vec![
                BranchRecord::ad_hoc("flow", &flow_root),
                BranchRecord::ad_hoc("seed", &seed_root),
            ],
        };
        let store = Store::at(ws);
        store::write_json_atomic(&store.branch_directory_path(), &directory).unwrap();
        (tmp, store, RouterConfig::default())
    }

    #[test]
    fn test_handle_becomes_absolute_path() {
        let (tmp, store, config) = seed_workspace();
        let mut resolver = Resolver::new(&store, &config);
        let out = preprocess(&mut resolver, &args(&["create", "@seed", "Title"]));
        assert_eq!(out[0], "create");
        assert_eq!(out[1], tmp.path().join("seed").to_str().unwrap());
        assert_eq!(out[2], "Title");
    }

    #[test]
    fn test_slash_suffix_is_appended_without_validation() {
        let (tmp, store, config) = seed_workspace();
        let mut resolver = Resolver::new(&store, &config);
        let out = preprocess(&mut resolver, &args(&["@flow/plans/q3.md"]));
        assert_eq!(
            out[0],
            tmp.path()
                .join("core/flow/plans/q3.md")
                .to_str()
                .unwrap()
        );
    }

    #[test]
    fn test_all_sentinel_survives_in_place() {
        let (_tmp, store, config) = seed_workspace();
        let mut resolver = Resolver::new(&store, &config);
        let out = preprocess(&mut resolver, &args(&["sync", "@all", "now"]));
        assert_eq!(out, args(&["sync", "@all", "now"]));
    }

    #[test]
    fn test_unknown_handle_passes_through() {
        let (_tmp, store, config) = seed_workspace();
        let mut resolver = Resolver::new(&store, &config);
        let out = preprocess(&mut resolver, &args(&["@ghost", "@ghost/sub"]));
        assert_eq!(out, args(&["@ghost", "@ghost/sub"]));
    }

    #[test]
    fn test_workspace_handle_resolves_to_root() {
        let (tmp, store, config) = seed_workspace();
        let mut resolver = Resolver::new(&store, &config);
        let out = preprocess(&mut resolver, &args(&["@"]));
        assert_eq!(out[0], tmp.path().to_str().unwrap());
    }

    #[test]
    fn test_preprocess_is_idempotent() {
        let (_tmp, store, config) = seed_workspace();
        let mut resolver = Resolver::new(&store, &config);
        let input = args(&["create", "@seed", "@flow/imports", "@all", "@ghost", "plain"]);
        let once = preprocess(&mut resolver, &input);
        let twice = preprocess(&mut resolver, &once);
        assert_eq!(once, twice);
    }
}
