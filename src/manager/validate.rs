//! # Repository State Validation
//!
//! Computes whether the config, the event log, and the set of status
//! credential files agree. The first violation found is returned; the
//! snapshot engine decides whether it is recoverable.

use std::collections::BTreeSet;

use serde_json::Value;

use super::Manager;
use crate::core::OneMany;
use crate::error::{Error, Result};
use crate::model::{STATUS_CREDENTIAL_TYPE, STATUS_LIST_TYPE, StatusPurpose, VerifiableCredential};
use crate::provider::RepoStore;

impl<S: RepoStore> Manager<S> {
    /// Verify cross-resource invariants, returning the first violation as
    /// [`Error::InvalidRepoState`].
    ///
    /// Extra files in the status repository are tolerated and logged;
    /// missing ones are a violation.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRepoState`] on violation; [`Error::Other`] for
    /// backend faults.
    pub async fn get_repo_state(&self) -> Result<()> {
        if !self.meta.config_exists().await? {
            return Err(Error::InvalidRepoState("config.json is missing".to_string()));
        }
        let (config, _) = self.meta.get_config().await?;

        let mut tracked = BTreeSet::new();
        for list_id in &config.status_credential_ids {
            if !self.repo.exists(list_id).await? {
                return Err(Error::InvalidRepoState(format!(
                    "status credential {list_id} is missing from the status repository"
                )));
            }
            let (credential, _) = self.repo.get(list_id).await?;
            self.check_status_credential(&credential, list_id)?;

            for (purpose, info) in &config.status_credential_info {
                let tracks_latest = credential
                    .id
                    .as_deref()
                    .is_some_and(|id| id.ends_with(&info.latest_status_credential_id));
                if tracks_latest {
                    tracked.insert(*purpose);
                }
            }
        }

        for purpose in config.status_credential_info.keys() {
            if !tracked.contains(purpose) {
                return Err(Error::InvalidRepoState(format!(
                    "the latest {purpose} status credential is not among the tracked lists"
                )));
            }
        }

        let filenames: BTreeSet<String> = self.repo.list_filenames().await?.into_iter().collect();
        for list_id in &config.status_credential_ids {
            if !filenames.contains(list_id) {
                return Err(Error::InvalidRepoState(format!(
                    "status credential {list_id} is not listed in the status repository"
                )));
            }
        }
        for name in filenames.difference(&config.status_credential_ids.iter().cloned().collect()) {
            tracing::warn!("unexpected file in status repository: {name}");
        }

        let distinct = config.distinct_credentials() as u64;
        if distinct != config.credentials_issued_counter {
            return Err(Error::InvalidRepoState(format!(
                "event log holds {distinct} distinct credential ids but the issued counter is {}",
                config.credentials_issued_counter
            )));
        }

        let capacity: u64 = config
            .status_credential_info
            .values()
            .map(|info| {
                info.status_credentials_counter.saturating_sub(1) * self.list_size as u64
                    + info.latest_credentials_issued_counter
            })
            .sum();
        if config.credentials_issued_counter > capacity {
            return Err(Error::InvalidRepoState(format!(
                "issued counter {} exceeds the allocated capacity {capacity}",
                config.credentials_issued_counter
            )));
        }

        Ok(())
    }

    /// Shape check for one status credential file.
    fn check_status_credential(
        &self, credential: &VerifiableCredential, list_id: &str,
    ) -> Result<()> {
        if !credential.type_.contains(|t| t.as_str() == STATUS_CREDENTIAL_TYPE) {
            return Err(Error::InvalidRepoState(format!(
                "{list_id} is not a {STATUS_CREDENTIAL_TYPE}"
            )));
        }

        let subject = credential
            .credential_subject
            .as_ref()
            .and_then(OneMany::as_one)
            .ok_or_else(|| {
                Error::InvalidRepoState(format!("{list_id} has no credential subject"))
            })?;

        if subject.claims.get("type").and_then(Value::as_str) != Some(STATUS_LIST_TYPE) {
            return Err(Error::InvalidRepoState(format!(
                "the subject of {list_id} is not a {STATUS_LIST_TYPE}"
            )));
        }

        let purpose_ok = subject
            .claims
            .get("statusPurpose")
            .and_then(Value::as_str)
            .is_some_and(|p| p.parse::<StatusPurpose>().is_ok());
        if !purpose_ok {
            return Err(Error::InvalidRepoState(format!(
                "{list_id} carries an unknown status purpose"
            )));
        }

        let base = self.status_credential_url(list_id);
        let id_ok = subject.id.as_deref().is_some_and(|id| id.starts_with(&base));
        if !id_ok {
            return Err(Error::InvalidRepoState(format!(
                "the subject id of {list_id} does not begin with {base}"
            )));
        }

        Ok(())
    }
}
