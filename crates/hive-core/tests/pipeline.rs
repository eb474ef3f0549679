//! End-to-end runs over in-memory collaborators: select, build, persist,
//! reload, push and activate.

use hive_core::fakes::{FakeBuilder, RecordingTransfer, ScriptedRemote};
use hive_core::{
    activate, build_systems, load_state, push, save_state, CancellationToken, HiveError, Instance,
    Inventory, SkipList, Step, System,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// What the evaluator would hand us at the start of every run.
fn evaluated() -> Inventory {
    Inventory {
        paths: vec!["nixpkgs=/src/nixpkgs".to_string()],
        ssh: "Host *\n  User root\n".to_string(),
        ..Default::default()
    }
    .with_system("web", System::default())
    .with_system("db", System::default())
    .with_instance("web-1", Instance::new("web").with_store("ssh://cache").with_tag("eu"))
    .with_instance("web-2", Instance::new("web").with_store("ssh://cache").with_tag("us"))
    .with_instance("db-1", Instance::new("db").with_tag("eu"))
}

// ---------------------------------------------------------------------------
// Build cache across runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn results_survive_a_restart_without_rebuilding() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join(".hive.state");
    let cancel = CancellationToken::new();

    // First run builds both systems and saves state.
    let mut inv = evaluated();
    load_state(&state, &mut inv, &SkipList::default()).unwrap();
    let systems = inv.match_systems::<&str>(&[]).unwrap();
    let builder = FakeBuilder::new();
    build_systems(&mut inv, &systems, &builder, &cancel).await.unwrap();
    assert_eq!(builder.calls().len(), 2);
    save_state(&state, &inv).unwrap();

    // Second run restores them and the builder is never asked.
    let mut inv = evaluated();
    let summary = load_state(&state, &mut inv, &SkipList::default()).unwrap();
    assert_eq!(summary.restored, 2);
    let builder = FakeBuilder::new();
    build_systems(&mut inv, &systems, &builder, &cancel).await.unwrap();
    assert!(builder.calls().is_empty());
    assert_eq!(inv.systems["web"].result(), Some("/nix/store/fake-web"));
    assert_eq!(inv.systems["db"].result(), Some("/nix/store/fake-db"));
}

#[tokio::test]
async fn removed_system_is_dropped_from_state() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join(".hive.state");
    let cancel = CancellationToken::new();

    let mut inv = evaluated();
    build_systems(&mut inv, &["web", "db"], &FakeBuilder::new(), &cancel)
        .await
        .unwrap();
    save_state(&state, &inv).unwrap();

    // The operator deletes "db" (and its instance) from the deployment.
    let mut inv = evaluated();
    inv.systems.remove("db");
    inv.instances.remove("db-1");
    let summary = load_state(&state, &mut inv, &SkipList::default()).unwrap();
    assert_eq!(summary.restored, 1);
    assert_eq!(summary.stale, 1);
    assert!(inv.systems["web"].is_built());

    // The next save forgets it entirely.
    save_state(&state, &inv).unwrap();
    let saved = std::fs::read_to_string(&state).unwrap();
    assert_eq!(saved, "(result-v0|web|/nix/store/fake-web)\n");
}

#[tokio::test]
async fn skipping_build_only_trusts_artifacts_still_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join(".hive.state");
    let kept = dir.path().join("web-system");
    std::fs::create_dir(&kept).unwrap();
    let gone = dir.path().join("db-system");

    let mut inv = evaluated()
        .with_system("web", System::default().with_result(kept.to_string_lossy()))
        .with_system("db", System::default().with_result(gone.to_string_lossy()));
    save_state(&state, &inv).unwrap();

    inv = evaluated();
    let skip = SkipList::default().with(Step::Build);
    let summary = load_state(&state, &mut inv, &skip).unwrap();
    assert_eq!(summary.restored, 1);
    assert_eq!(summary.missing, 1);

    let builder = FakeBuilder::new();
    build_systems(&mut inv, &["web", "db"], &builder, &CancellationToken::new())
        .await
        .unwrap();
    let rebuilt: Vec<_> = builder.calls().into_iter().map(|(s, _)| s).collect();
    assert_eq!(rebuilt, vec!["db"]);
}

#[tokio::test]
async fn state_written_mid_crash_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join(".hive.state");
    std::fs::write(&state, "(result-v0|web|/nix/store/w)\n(result-v0|db|/nix/st").unwrap();

    let mut inv = evaluated();
    let summary = load_state(&state, &mut inv, &SkipList::default()).unwrap();
    assert!(summary.truncated);
    assert_eq!(inv.systems["web"].result(), Some("/nix/store/w"));
    assert!(!inv.systems["db"].is_built());
}

// ---------------------------------------------------------------------------
// Deploy pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deploy_by_tag_builds_pushes_and_activates() {
    let cancel = CancellationToken::new();
    let mut inv = evaluated();

    let instances = inv.match_instances(&["eu"]).unwrap();
    assert_eq!(instances, vec!["db-1", "web-1"]);

    let systems = inv.instance_systems(&instances).unwrap();
    let builder = FakeBuilder::new();
    build_systems(&mut inv, &systems, &builder, &cancel).await.unwrap();

    let transfer = RecordingTransfer::new();
    push(&inv, &instances, None, &transfer, &cancel).await.unwrap();
    assert_eq!(
        transfer.calls(),
        vec![
            ("ssh://db-1".to_string(), vec!["/nix/store/fake-db".to_string()]),
            ("ssh://cache".to_string(), vec!["/nix/store/fake-web".to_string()]),
            ("ssh://web-1".to_string(), vec!["/nix/store/fake-web".to_string()]),
        ]
    );

    let remote = ScriptedRemote::new();
    activate(&inv, &instances, &remote, &cancel).await.unwrap();
    assert_eq!(remote.calls().len(), 2);
    assert_eq!(
        remote.calls()[1].1[1],
        "/nix/store/fake-web/bin/switch-to-configuration"
    );
}

#[tokio::test]
async fn shared_store_receives_one_batch() {
    let cancel = CancellationToken::new();
    let mut inv = evaluated();
    let instances = inv.match_instances(&["web"]).unwrap();
    let systems = inv.instance_systems(&instances).unwrap();
    build_systems(&mut inv, &systems, &FakeBuilder::new(), &cancel)
        .await
        .unwrap();

    let transfer = RecordingTransfer::new();
    let plan = push(&inv, &instances, None, &transfer, &cancel).await.unwrap();
    assert_eq!(plan.jobs().len(), 3);
    let to_cache = transfer
        .calls()
        .into_iter()
        .filter(|(d, _)| d == "ssh://cache")
        .count();
    assert_eq!(to_cache, 1);
}

#[tokio::test]
async fn typo_in_pattern_stops_before_any_work() {
    let inv = evaluated();
    let err = inv.match_instances(&["web-1", "wbe-2"]).unwrap_err();
    assert!(matches!(err, HiveError::NoMatch { ref pattern } if pattern == "wbe-2"));
}
