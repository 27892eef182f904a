//! Registry invariants across sequences of operations: id monotonicity
//! under contention, scan idempotence, activation merge semantics, and
//! auto-heal behavior.

use anyhow::Result;
use junction::core::activation::{self, ActivatedCommand};
use junction::core::branch::{BranchDirectory, BranchRecord, DirectoryMetadata, Resolver};
use junction::core::config::RouterConfig;
use junction::core::registry::{self, CommandRecord};
use junction::core::store::{self, Store};
use junction::core::time;
use junction::core::discovery;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn seed_workspace() -> (TempDir, Store) {
    let tmp = TempDir::new().unwrap();
    let ws = tmp.path();
    let flow_root = ws.join("core").join("flow");
    fs::create_dir_all(flow_root.join("apps")).unwrap();
    fs::write(
        flow_root.join("apps").join("flow.sh"),
        "#!/bin/sh\nif [ \"$1\" = \"--help\" ]; then echo 'commands: create, list'; fi\nexit 0\n",
    )
    .unwrap();
    let directory = BranchDirectory {
        metadata: DirectoryMetadata::default(),
        branches: vec![BranchRecord::ad_hoc("flow", &flow_root)],
    };
    let store = Store::at(ws);
    store::write_json_atomic(&store.branch_directory_path(), &directory).unwrap();
    (tmp, store)
}

#[test]
fn concurrent_id_assignment_never_duplicates() {
    let (_tmp, store) = seed_workspace();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(std::thread::spawn(move || {
            let mut ids = Vec::new();
            for _ in 0..5 {
                ids.push(registry::next_global_id(&store).unwrap());
            }
            ids
        }));
    }
    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    let unique: BTreeSet<u64> = all.iter().copied().collect();
    assert_eq!(all.len(), 40);
    assert_eq!(unique.len(), 40, "duplicate global ids handed out");
    let central = registry::load_central_registry(&store).unwrap();
    assert_eq!(central.global_id_counter, 40);
    assert_eq!(central.global_id_counter, *all.last().unwrap());
}

#[test]
fn repeated_discovery_assigns_no_new_ids() -> Result<()> {
    let (_tmp, store) = seed_workspace();
    let config = RouterConfig::default();
    let resolver = Resolver::new(&store, &config);
    let mut lookup = Resolver::new(&store, &config);
    let record = match lookup.resolve("@flow")? {
        junction::core::branch::Resolution::Branch(record) => record,
        other => panic!("expected branch, got {:?}", other),
    };

    let first = discovery::register(&store, &discovery::discover(&config, &resolver, &record))?;
    assert_eq!(first.len(), 2);
    let counter_after_first = registry::load_central_registry(&store)?.global_id_counter;

    let second = discovery::register(&store, &discovery::discover(&config, &resolver, &record))?;
    assert!(second.is_empty());
    assert_eq!(
        registry::load_central_registry(&store)?.global_id_counter,
        counter_after_first
    );
    Ok(())
}

#[test]
fn global_ids_unique_across_branch_registries() -> Result<()> {
    let (_tmp, store) = seed_workspace();
    for branch in ["flow", "seed", "drift"] {
        let mut records = BTreeMap::new();
        for command in ["create", "list"] {
            let id = registry::next_global_id(&store)?;
            records.insert(
                registry::registry_key(branch, command),
                CommandRecord {
                    global_id: id,
                    command_name: command.to_string(),
                    branch_name: branch.to_string(),
                    module_path: PathBuf::from("/ws/x"),
                    registered_at: time::now_epoch_z(),
                    active: true,
                },
            );
        }
        registry::save_branch_registry(&store, branch, &records)?;
    }
    let mut seen = BTreeSet::new();
    for branch in ["flow", "seed", "drift"] {
        for record in registry::load_branch_registry(&store, branch)?.values() {
            assert!(
                seen.insert(record.global_id),
                "global id {} reused",
                record.global_id
            );
        }
    }
    Ok(())
}

#[test]
fn activation_files_merge_across_sequential_writers() -> Result<()> {
    let (_tmp, store) = seed_workspace();
    let entry = PathBuf::from("/ws/core/flow/apps/flow.sh");
    let record = |phrase: &str, command: &str| ActivatedCommand {
        shortcut_phrase: phrase.to_string(),
        target_branch: "flow".to_string(),
        target_command_name: command.to_string(),
        target_module_path: entry.clone(),
        description: String::new(),
    };

    let mut first = BTreeMap::new();
    first.insert("plan create".to_string(), record("plan create", "create"));
    registry::save_branch_activations(&store, "flow", &first)?;

    // a second invocation touching a different phrase must not lose the first
    let mut second = BTreeMap::new();
    second.insert("plan list".to_string(), record("plan list", "list"));
    registry::save_branch_activations(&store, "flow", &second)?;

    let loaded = registry::load_branch_activations(&store, "flow")?;
    assert_eq!(loaded.len(), 2);
    assert!(loaded.contains_key("plan create"));
    assert!(loaded.contains_key("plan list"));

    // saving an empty touched-set is a no-op on content
    registry::save_branch_activations(&store, "flow", &BTreeMap::new())?;
    assert_eq!(registry::load_branch_activations(&store, "flow")?.len(), 2);
    Ok(())
}

#[test]
fn phrase_union_is_duplicate_free_after_engine_use() -> Result<()> {
    let (_tmp, store) = seed_workspace();
    for (branch, command, id) in [("flow", "create", 1), ("seed", "audit", 2)] {
        let mut records = BTreeMap::new();
        records.insert(
            registry::registry_key(branch, command),
            CommandRecord {
                global_id: id,
                command_name: command.to_string(),
                branch_name: branch.to_string(),
                module_path: PathBuf::from("/ws/x"),
                registered_at: time::now_epoch_z(),
                active: true,
            },
        );
        registry::save_branch_registry(&store, branch, &records)?;
    }
    activation::activate(&store, "flow", "create", "plan create", None)?;
    activation::activate(&store, "seed", "audit", "seed audit", None)?;
    assert!(activation::activate(&store, "seed", "audit", "plan create", None).is_err());

    let all = activation::list_all(&store)?;
    let phrases: BTreeSet<String> = all.iter().map(|a| a.shortcut_phrase.clone()).collect();
    assert_eq!(phrases.len(), all.len());
    Ok(())
}

#[test]
fn healing_is_idempotent_and_counted_once_per_corruption() -> Result<()> {
    let (_tmp, store) = seed_workspace();
    let path = store.branch_registry_path("flow");
    fs::create_dir_all(path.parent().unwrap())?;
    fs::write(&path, "{ nope")?;

    // first load heals and bumps the counter
    assert!(registry::load_branch_registry(&store, "flow")?.is_empty());
    let healed_once = registry::load_central_registry(&store)?
        .statistics
        .auto_healing_count;
    assert_eq!(healed_once, 1);

    // healthy file: further loads change neither content nor counter
    let content_before = fs::read_to_string(&path)?;
    assert!(registry::load_branch_registry(&store, "flow")?.is_empty());
    assert_eq!(fs::read_to_string(&path)?, content_before);
    assert_eq!(
        registry::load_central_registry(&store)?
            .statistics
            .auto_healing_count,
        1
    );
    Ok(())
}

#[test]
fn save_then_load_is_equivalent_for_all_artifacts() -> Result<()> {
    let (_tmp, store) = seed_workspace();

    let mut central = registry::load_central_registry(&store)?;
    central.global_id_counter = 17;
    registry::save_central_registry(&store, &mut central)?;
    assert_eq!(registry::load_central_registry(&store)?.global_id_counter, 17);

    let mut records = BTreeMap::new();
    records.insert(
        registry::registry_key("flow", "create"),
        CommandRecord {
            global_id: 17,
            command_name: "create".to_string(),
            branch_name: "flow".to_string(),
            module_path: Path::new("/ws/core/flow/apps/flow.sh").to_path_buf(),
            registered_at: time::now_epoch_z(),
            active: true,
        },
    );
    registry::save_branch_registry(&store, "flow", &records)?;
    assert_eq!(registry::load_branch_registry(&store, "flow")?, records);
    Ok(())
}
