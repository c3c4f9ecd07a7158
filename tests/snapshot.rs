//! Snapshot protocol: pre-image capture, rollback, and crash recovery.

mod utils;

use std::collections::BTreeMap;

use credential_status_manager::{Error, Manager, StatusPurpose};
use utils::{FlakyStore, MemStore, credential, manager, options};

/// Raw contents of every file in a store.
fn contents(store: &MemStore) -> BTreeMap<String, String> {
    store
        .filenames()
        .into_iter()
        .map(|name| {
            let content = store.raw(&name).expect("listed file should exist");
            (name, content)
        })
        .collect()
}

#[tokio::test]
async fn save_and_restore_round_trip() {
    let mut options = options();
    // byte-for-byte comparison needs stable status credentials
    options.sign_status_credential = false;
    let (manager, repo, meta) = manager(options).await;

    for id in ["https://ex/3732", "https://ex/6274", "https://ex/0285"] {
        manager.allocate_supported_statuses(credential(id)).await.expect("should allocate");
    }
    manager.revoke_credential("https://ex/6274").await.expect("should revoke");

    let repo_before = contents(&repo);
    let config_before = meta.raw("config.json").expect("config should exist");

    manager.save_snapshot().await.expect("should save snapshot");
    assert!(meta.raw("snapshot.json").is_some());

    // a half-applied operation: one list overwritten, the config diverged
    let some_list = repo.filenames().into_iter().next().expect("a list should exist");
    repo.write_raw(&some_list, "{}");
    meta.remove_raw("config.json");

    manager.restore_snapshot().await.expect("should restore snapshot");

    assert_eq!(contents(&repo), repo_before, "status credentials restored byte-for-byte");
    assert_eq!(
        meta.raw("config.json").expect("config should exist"),
        config_before,
        "config restored byte-for-byte"
    );
    assert!(meta.raw("snapshot.json").is_none(), "snapshot removed after restore");
}

#[tokio::test]
async fn saving_over_an_existing_snapshot_is_rejected() {
    let (manager, _, _) = manager(options()).await;

    manager.save_snapshot().await.expect("should save snapshot");
    let err = manager.save_snapshot().await.expect_err("should fail");
    assert!(matches!(err, Error::SnapshotExists));

    manager.cleanup_snapshot().await.expect("should clean up");
    manager.save_snapshot().await.expect("should save once cleaned up");
}

#[tokio::test]
async fn crash_between_snapshot_and_operation_recovers() {
    let repo = FlakyStore::default();
    let meta = FlakyStore::default();
    let manager = Manager::new(options(), repo.clone(), meta.clone())
        .await
        .expect("should create manager");

    for id in ["https://ex/3732", "https://ex/6274", "https://ex/0285"] {
        manager.allocate_revocation_status(credential(id)).await.expect("should allocate");
    }

    // the next config write dies mid-allocation; the retry completes
    meta.fail_next_update();
    manager
        .allocate_revocation_status(credential("https://ex/9821"))
        .await
        .expect("retried allocation should succeed");

    let config = manager.config().await.expect("should read config");
    assert_eq!(config.credentials_issued_counter, 4, "one increment despite the crash");
    assert!(meta.inner().raw("snapshot.json").is_none(), "no snapshot left behind");

    let status = manager.get_status("https://ex/9821").await.expect("should find status");
    assert!(status[&StatusPurpose::Revocation].valid);
}

#[tokio::test]
async fn stale_snapshot_restores_on_the_next_call() {
    let mut options = options();
    options.sign_status_credential = false;
    let (manager, _, meta) = manager(options).await;

    manager
        .allocate_revocation_status(credential("https://ex/3732"))
        .await
        .expect("should allocate");

    // crash simulation: pre-image captured, then the process died after
    // deleting the config
    manager.save_snapshot().await.expect("should save snapshot");
    meta.remove_raw("config.json");

    // the next mutating call restores the pre-image, then proceeds
    manager
        .allocate_revocation_status(credential("https://ex/6274"))
        .await
        .expect("should allocate after restore");

    let config = manager.config().await.expect("should read config");
    assert_eq!(config.credentials_issued_counter, 2);
    assert!(config.latest_entry("https://ex/3732").is_some(), "pre-crash state survived");
    assert!(meta.raw("snapshot.json").is_none());
}

#[tokio::test]
async fn invalid_state_without_a_snapshot_propagates() {
    let (manager, repo, _) = manager(options()).await;

    manager
        .allocate_revocation_status(credential("https://ex/3732"))
        .await
        .expect("should allocate");

    // lose a tracked status credential with no pre-image to recover from
    let list_id =
        manager.config().await.expect("should read config").status_credential_ids[0].clone();
    repo.remove_raw(&list_id);

    let err = manager
        .allocate_revocation_status(credential("https://ex/6274"))
        .await
        .expect_err("should fail");
    assert!(matches!(err, Error::InvalidRepoState(_)));

    let err = manager.cleanup_snapshot().await.expect_err("should fail");
    assert!(matches!(err, Error::InvalidRepoState(_)));
}

#[tokio::test]
async fn second_manager_adopts_and_repairs_the_deployment() {
    let mut options = options();
    options.sign_status_credential = false;
    let (first, repo, meta) = manager(options.clone()).await;

    first
        .allocate_revocation_status(credential("https://ex/3732"))
        .await
        .expect("should allocate");
    first.save_snapshot().await.expect("should save snapshot");
    meta.remove_raw("config.json");
    drop(first);

    // a fresh manager over the same repositories rolls back to the
    // pre-image during adoption
    let second = Manager::new(options, repo.clone(), meta.clone())
        .await
        .expect("should adopt existing deployment");

    let status = second.get_status("https://ex/3732").await.expect("should find status");
    assert!(status[&StatusPurpose::Revocation].valid);
    assert!(meta.raw("snapshot.json").is_none());
}

#[tokio::test]
async fn extra_repository_files_are_tolerated() {
    let (manager, repo, _) = manager(options()).await;

    repo.write_raw("CNAME", "status.example.com");

    manager
        .allocate_revocation_status(credential("https://ex/3732"))
        .await
        .expect("extra files do not invalidate the deployment");
    manager.get_repo_state().await.expect("state should be valid");
}
