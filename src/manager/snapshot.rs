//! # Snapshots
//!
//! Crash-consistent transactions over two remote repositories, without
//! transactional backends: capture a full pre-image before mutating,
//! delete it on success, and roll back to it when the validator finds the
//! repositories in disagreement.

use std::collections::BTreeMap;

use super::Manager;
use crate::config::Snapshot;
use crate::error::{Error, Result};
use crate::provider::RepoStore;

impl<S: RepoStore> Manager<S> {
    /// Capture a pre-image of the config and every status credential as
    /// `snapshot.json`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SnapshotExists`] if a snapshot is already present;
    /// run [`Manager::cleanup_snapshot`] first.
    pub async fn save_snapshot(&self) -> Result<()> {
        if self.meta.snapshot_exists().await? {
            return Err(Error::SnapshotExists);
        }

        let (config, _) = self.meta.get_config().await?;
        let mut status_credentials = BTreeMap::new();
        for list_id in &config.status_credential_ids {
            let (credential, _) = self.repo.get(list_id).await?;
            status_credentials.insert(list_id.clone(), credential);
        }

        self.meta.create_snapshot(&Snapshot { config, status_credentials }).await?;
        tracing::debug!("snapshot saved");
        Ok(())
    }

    /// Roll both repositories back to the captured pre-image.
    ///
    /// Deletions precede recreations so that a crash mid-restore leaves
    /// `snapshot.json` intact and the restore re-runnable.
    ///
    /// # Errors
    ///
    /// Returns an error if any backend call fails; the snapshot survives
    /// and the restore can be retried.
    pub async fn restore_snapshot(&self) -> Result<()> {
        let snapshot = self.meta.get_snapshot().await?;

        for name in self.repo.list_filenames().await? {
            let (_, token) = self.repo.store().get(&name).await?;
            self.repo.delete(&name, &token).await?;
        }
        if self.meta.config_exists().await? {
            self.meta.delete_config().await?;
        }

        for (list_id, credential) in &snapshot.status_credentials {
            self.repo.create(list_id, credential).await?;
        }
        self.meta.create_config(&snapshot.config).await?;

        self.meta.delete_snapshot().await?;
        tracing::debug!("snapshot restored");
        Ok(())
    }

    /// Bring the repositories to a known-good baseline: restore when the
    /// state is invalid and a snapshot exists, delete a stale snapshot
    /// when the state is valid, and surface an invalid state with nothing
    /// to restore from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRepoState`] when the state is invalid and
    /// no snapshot exists. Operator intervention is needed.
    pub async fn cleanup_snapshot(&self) -> Result<()> {
        let snapshot_exists = self.meta.snapshot_exists().await?;

        match self.get_repo_state().await {
            Ok(()) => {
                if snapshot_exists {
                    tracing::debug!("repository state valid; deleting stale snapshot");
                    self.meta.delete_snapshot().await?;
                }
                Ok(())
            }
            Err(error @ Error::InvalidRepoState(_)) => {
                if snapshot_exists {
                    tracing::warn!("repository state invalid; restoring snapshot: {error}");
                    self.restore_snapshot().await
                } else {
                    tracing::error!("repository state invalid with no snapshot: {error}");
                    Err(error)
                }
            }
            Err(error) => Err(error),
        }
    }
}
