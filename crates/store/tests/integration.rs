//! Integration tests for store crate

use sprig_errors::StoreError;
use sprig_events::{AppEvent, StoreEvent};
use sprig_hash::Hash;
use sprig_store::{InstallRecord, InstallStatus, InstallStore};
use sprig_types::Version;
use std::time::Duration;
use tempfile::tempdir;

fn record(hash: &Hash, name: &str, version: &str, status: InstallStatus) -> InstallRecord {
    InstallRecord::new(
        hash.clone(),
        name,
        Version::parse(version).unwrap(),
        status,
        format!("/prefix/{name}"),
    )
}

#[tokio::test]
async fn test_lock_contention() {
    let temp = tempdir().unwrap();
    let store = InstallStore::new(temp.path());
    let hash = Hash::from_data(b"libfoo");

    let held = store.begin_install(&hash, Duration::ZERO).await.unwrap();

    let err = store
        .begin_install(&hash, Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyInProgressElsewhere { .. }));

    let err = store
        .begin_install(&hash, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::LockTimeout { .. }));

    drop(held);
    let again = store.begin_install(&hash, Duration::ZERO).await.unwrap();
    assert_eq!(again.hash(), &hash);
}

#[tokio::test]
async fn test_waiter_gets_lock_after_release() {
    let temp = tempdir().unwrap();
    let store = InstallStore::new(temp.path());
    let hash = Hash::from_data(b"libfoo");

    let held = store.begin_install(&hash, Duration::ZERO).await.unwrap();
    let waiter = {
        let store = store.clone();
        let hash = hash.clone();
        tokio::spawn(async move { store.begin_install(&hash, Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    store
        .record_result(&held, record(&hash, "libfoo", "2.0", InstallStatus::Installed))
        .await
        .unwrap();
    drop(held);

    let lock = waiter.await.unwrap().unwrap();
    assert_eq!(lock.hash(), &hash);
    assert!(store.is_installed(&hash).await.unwrap());
}

#[tokio::test]
async fn test_stale_in_progress_record_is_reclaimed() {
    let temp = tempdir().unwrap();
    let (tx, mut rx) = sprig_events::channel();
    let store = InstallStore::new(temp.path()).with_event_sender(tx);
    let hash = Hash::from_data(b"libbar");

    {
        let lock = store.begin_install(&hash, Duration::ZERO).await.unwrap();
        store
            .mark_in_progress(&lock, record(&hash, "libbar", "1.0", InstallStatus::Failed))
            .await
            .unwrap();
        // the lock goes away without a final record, as after a crash
    }

    let lock = store.begin_install(&hash, Duration::ZERO).await.unwrap();
    let mut reclaimed = false;
    while let Ok(event) = rx.try_recv() {
        if let AppEvent::Store(StoreEvent::StaleLockReclaimed { hash: h, pid, .. }) = event {
            assert_eq!(h, hash.to_hex());
            assert_eq!(pid, Some(std::process::id()));
            reclaimed = true;
        }
    }
    assert!(reclaimed);

    store
        .record_result(&lock, record(&hash, "libbar", "1.0", InstallStatus::Installed))
        .await
        .unwrap();
    let stored = store.lookup(&hash).await.unwrap().unwrap();
    assert_eq!(stored.status, InstallStatus::Installed);
}

#[tokio::test]
async fn test_list_sorted_by_name_and_version() {
    let temp = tempdir().unwrap();
    let store = InstallStore::new(temp.path());
    store.init().await.unwrap();

    for (name, version) in [("zlib", "1.3"), ("cmake", "3.27"), ("zlib", "1.2")] {
        let hash = Hash::from_data(format!("{name}@{version}").as_bytes());
        let lock = store.begin_install(&hash, Duration::ZERO).await.unwrap();
        store
            .record_result(
                &lock,
                record(&hash, name, version, InstallStatus::Installed).with_explicit(name == "cmake"),
            )
            .await
            .unwrap();
    }

    let listed: Vec<(String, String)> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.name, r.version.to_string()))
        .collect();
    assert_eq!(
        listed,
        [
            ("cmake".to_string(), "3.27".to_string()),
            ("zlib".to_string(), "1.2".to_string()),
            ("zlib".to_string(), "1.3".to_string()),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_never_see_partial_records() {
    let temp = tempdir().unwrap();
    let store = InstallStore::new(temp.path());
    let hash = Hash::from_data(b"busy");
    let lock = store.begin_install(&hash, Duration::ZERO).await.unwrap();
    store
        .record_result(&lock, record(&hash, "busy", "1.0", InstallStatus::Failed))
        .await
        .unwrap();

    let reader = {
        let store = store.clone();
        let hash = hash.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let found = store.lookup(&hash).await.unwrap();
                assert!(found.is_some());
                tokio::task::yield_now().await;
            }
        })
    };
    for i in 0..50 {
        let mut rec = record(&hash, "busy", "1.0", InstallStatus::Failed);
        rec.log_path = Some(format!("/logs/attempt-{i}.log").into());
        store.record_result(&lock, rec).await.unwrap();
    }
    reader.await.unwrap();
}
