// tests/store_persistence.rs

mod common;
use crate::common::{TestResult, init_tracing};

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use rundag::errors::StoreError;
use rundag::store::{
    ContextStore, LockMode, LockOptions, RECOVERED_EVENT, ScopedLock, StoreOptions,
};
use serde_json::json;
use tempfile::tempdir;

fn quick_lock() -> LockOptions {
    LockOptions {
        wait: Duration::from_millis(10),
        retries: 3,
    }
}

#[tokio::test]
async fn load_without_snapshot_starts_empty() -> TestResult {
    init_tracing();
    let dir = tempdir()?;

    let store = ContextStore::load("fresh", StoreOptions::in_dir(dir.path())).await?;
    assert_eq!(store.version(), 0);
    assert!(store.keys().is_empty());
    assert!(store.events().is_empty());
    assert_eq!(store.disk_version().await?, None);
    assert_eq!(store.data_path(), Some(dir.path().join("fresh.json").as_path()));
    Ok(())
}

#[tokio::test]
async fn save_then_load_round_trips_state_and_version() -> TestResult {
    init_tracing();
    let dir = tempdir()?;

    let store = ContextStore::load("project", StoreOptions::in_dir(dir.path())).await?;
    store.set("plan", json!({ "steps": ["design", "build"] }));
    store.append_event("phase", json!({ "name": "design" }));
    store.add_artifact("backend", "out/api.rs");
    store.set("owner", json!("ops"));
    store.append_event("phase", json!({ "name": "build" }));
    store.atomic_update("counter", |_| json!(1));

    let written = store.save().await?;
    assert_eq!(written, 6);
    assert!(dir.path().join("project.json").exists());
    assert!(dir.path().join("project.lock").exists());

    let reloaded = ContextStore::load("project", StoreOptions::in_dir(dir.path())).await?;
    assert_eq!(reloaded.version(), 6);
    assert_eq!(reloaded.snapshot(), store.snapshot());
    assert_eq!(reloaded.get("owner"), Some(json!("ops")));
    assert_eq!(reloaded.artifacts()[0].location, "out/api.rs");
    Ok(())
}

#[tokio::test]
async fn save_leaves_no_temp_files_behind() -> TestResult {
    init_tracing();
    let dir = tempdir()?;

    let store = ContextStore::load("clean", StoreOptions::in_dir(dir.path())).await?;
    for i in 0..5 {
        store.set("i", json!(i));
        store.save().await?;
    }

    let leftovers: Vec<_> = fs::read_dir(dir.path())?
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
    Ok(())
}

#[tokio::test]
async fn scenario_c_corrupt_snapshot_is_quarantined_and_replaced() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let data = dir.path().join("broken.json");
    fs::write(&data, b"{ \"version\": 3, \"data\": {")?;

    let store = ContextStore::load("broken", StoreOptions::in_dir(dir.path())).await?;

    assert!(store.keys().is_empty());
    assert!(store.artifacts().is_empty());
    let recovered = store.events_of_kind(RECOVERED_EVENT);
    assert_eq!(recovered.len(), 1);
    assert_eq!(store.version(), 1);

    let backups: Vec<String> = fs::read_dir(dir.path())?
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("broken.json.corrupt-"))
        .collect();
    assert_eq!(backups.len(), 1, "expected one quarantined file");
    assert!(!data.exists(), "corrupt file should have been moved aside");

    let backup_path = recovered[0].payload["backup"].as_str().unwrap_or_default();
    assert!(backup_path.ends_with(&backups[0]));
    assert_eq!(
        fs::read(dir.path().join(&backups[0]))?,
        b"{ \"version\": 3, \"data\": {".to_vec()
    );

    // The recovered store is usable and saves over the old location.
    store.set("k", json!(true));
    store.save().await?;
    let reloaded = ContextStore::load("broken", StoreOptions::in_dir(dir.path())).await?;
    assert_eq!(reloaded.get("k"), Some(json!(true)));
    assert_eq!(reloaded.version(), 2);
    Ok(())
}

#[tokio::test]
async fn stale_temp_files_are_removed_on_load() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let stale = dir.path().join("job.json.1234-99-deadbeef.tmp");
    let other_store = dir.path().join("other.json.1-1-00000000.tmp");
    fs::write(&stale, b"partial")?;
    fs::write(&other_store, b"partial")?;

    let options = StoreOptions {
        stale_temp_age: Duration::ZERO,
        ..StoreOptions::in_dir(dir.path())
    };
    ContextStore::load("job", options).await?;

    assert!(!stale.exists(), "stale temp file should be removed");
    assert!(other_store.exists(), "temp files of other stores are left alone");
    Ok(())
}

#[tokio::test]
async fn young_temp_files_are_kept() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let young = dir.path().join("job.json.1234-99-deadbeef.tmp");
    fs::write(&young, b"in flight")?;

    ContextStore::load("job", StoreOptions::in_dir(dir.path())).await?;

    assert!(young.exists());
    Ok(())
}

#[tokio::test]
async fn save_fails_with_lock_error_while_another_writer_holds_the_lock() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let options = StoreOptions {
        lock: quick_lock(),
        ..StoreOptions::in_dir(dir.path())
    };
    let store = ContextStore::load("busy", options).await?;
    store.set("k", json!(1));

    let lock_path = dir.path().join("busy.lock");
    let held = ScopedLock::acquire(&lock_path, LockMode::Exclusive, quick_lock()).await?;
    assert_eq!(held.mode(), LockMode::Exclusive);

    match store.save().await {
        Err(StoreError::LockAcquisition { path, attempts }) => {
            assert_eq!(path, lock_path);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected LockAcquisition, got {other:?}"),
    }

    drop(held);
    assert_eq!(store.save().await?, 1);
    Ok(())
}

#[tokio::test]
async fn load_fails_with_lock_error_while_a_writer_holds_the_lock() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let lock_path = dir.path().join("busy.lock");
    let _held = ScopedLock::acquire(&lock_path, LockMode::Exclusive, quick_lock()).await?;

    let options = StoreOptions {
        lock: quick_lock(),
        ..StoreOptions::in_dir(dir.path())
    };
    let result = ContextStore::load("busy", options).await;
    assert!(matches!(result, Err(StoreError::LockAcquisition { .. })));
    Ok(())
}

#[tokio::test]
async fn shared_locks_coexist() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let lock_path = dir.path().join("readers.lock");

    let first = ScopedLock::acquire(&lock_path, LockMode::Shared, quick_lock()).await?;
    let second = ScopedLock::acquire(&lock_path, LockMode::Shared, quick_lock()).await?;
    assert_eq!(first.path(), second.path());

    let writer = ScopedLock::acquire(&lock_path, LockMode::Exclusive, quick_lock()).await;
    assert!(matches!(writer, Err(StoreError::LockAcquisition { .. })));
    Ok(())
}

#[tokio::test]
async fn staleness_tracks_newer_versions_on_disk() -> TestResult {
    init_tracing();
    let dir = tempdir()?;

    let writer = ContextStore::load("shared", StoreOptions::in_dir(dir.path())).await?;
    let reader = ContextStore::load("shared", StoreOptions::in_dir(dir.path())).await?;
    assert!(!reader.is_stale().await?);

    writer.set("k", json!("v"));
    writer.save().await?;

    assert!(reader.is_stale().await?);
    assert!(!writer.is_stale().await?);
    assert_eq!(reader.disk_version().await?, Some(1));

    let refreshed = ContextStore::load("shared", StoreOptions::in_dir(dir.path())).await?;
    assert!(!refreshed.is_stale().await?);
    Ok(())
}

#[tokio::test]
async fn queued_saves_never_move_the_disk_version_backwards() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let store = Arc::new(ContextStore::load("racy", StoreOptions::in_dir(dir.path())).await?);
    store.set("k", json!(1));

    let lock_path = dir.path().join("racy.lock");
    let held = ScopedLock::acquire(&lock_path, LockMode::Exclusive, quick_lock()).await?;

    let first = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.save().await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    store.set("k", json!(2));
    let second = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.save().await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    drop(held);

    assert_eq!(first.await??, 2);
    assert_eq!(second.await??, 2);
    assert_eq!(store.disk_version().await?, Some(2));

    let reloaded = ContextStore::load("racy", StoreOptions::in_dir(dir.path())).await?;
    assert_eq!(reloaded.get("k"), Some(json!(2)));
    Ok(())
}

#[tokio::test]
async fn older_view_does_not_overwrite_a_newer_snapshot() -> TestResult {
    init_tracing();
    let dir = tempdir()?;

    let behind = ContextStore::load("shared", StoreOptions::in_dir(dir.path())).await?;
    let ahead = ContextStore::load("shared", StoreOptions::in_dir(dir.path())).await?;
    ahead.set("owner", json!("ahead"));
    ahead.set("step", json!(2));
    assert_eq!(ahead.save().await?, 2);

    behind.set("owner", json!("behind"));
    assert_eq!(behind.save().await?, 2);
    assert!(behind.is_stale().await?);

    let reloaded = ContextStore::load("shared", StoreOptions::in_dir(dir.path())).await?;
    assert_eq!(reloaded.version(), 2);
    assert_eq!(reloaded.get("owner"), Some(json!("ahead")));
    Ok(())
}

#[tokio::test]
async fn invalid_identifiers_are_rejected() -> TestResult {
    init_tracing();
    let dir = tempdir()?;

    for id in ["", "..", "a/b"] {
        let result = ContextStore::load(id, StoreOptions::in_dir(dir.path())).await;
        assert!(
            matches!(result, Err(StoreError::InvalidId(_))),
            "'{id}' should be rejected"
        );
    }
    Ok(())
}
