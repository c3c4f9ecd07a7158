//! # Status Updates
//!
//! Flips one status bit for a previously allocated credential. The event
//! log is consulted for the credential's position, the affected status
//! credential is rewritten, and a fresh log entry records the transition.

use chrono::Utc;
use serde_json::Value;

use super::Manager;
use crate::core::OneMany;
use crate::error::{Error, Result};
use crate::model::{StatusPurpose, VerifiableCredential};
use crate::provider::RepoStore;
use crate::status::StatusList;

impl<S: RepoStore> Manager<S> {
    /// Set the credential's `purpose` bit to `invalidate` and persist the
    /// rewritten status credential plus a new event log entry.
    pub(super) async fn update_status_unsafe(
        &self, credential_id: &str, purpose: StatusPurpose, invalidate: bool,
    ) -> Result<VerifiableCredential> {
        let (mut config, config_token) = self.meta.get_config().await?;

        let entry = config
            .latest_entry(credential_id)
            .ok_or_else(|| {
                Error::NotFound(format!("no status has been allocated for {credential_id}"))
            })?
            .clone();

        let Some(state) = entry.credential_status_info.get(&purpose) else {
            return Err(Error::BadRequest(format!(
                "credential does not carry a {purpose} status"
            )));
        };

        // revocation dominates: the only transition a revoked credential
        // accepts is being told, again, that it is revoked
        let revoked = entry
            .credential_status_info
            .get(&StatusPurpose::Revocation)
            .is_some_and(|s| !s.valid);
        if revoked && !(purpose == StatusPurpose::Revocation && invalidate) {
            return Err(Error::BadRequest(format!(
                "credential {credential_id} has been revoked and cannot be updated for {purpose}"
            )));
        }

        let (status_credential, file_token) = self.repo.get(&state.status_credential_id).await?;

        if state.valid == !invalidate {
            tracing::debug!(
                "{purpose} status of {credential_id} already {}; nothing to do",
                if invalidate { "invalid" } else { "valid" }
            );
            return Ok(status_credential);
        }

        let mut updated =
            self.flip_status_bit(status_credential, state.status_list_index, invalidate)?;
        if self.sign_status_credential {
            updated = self.identity.sign(&updated)?;
        }
        self.repo.update(&state.status_credential_id, &updated, &file_token).await?;

        let mut new_entry = entry;
        new_entry.timestamp = Utc::now();
        if let Some(s) = new_entry.credential_status_info.get_mut(&purpose) {
            s.valid = !invalidate;
        }
        config.event_log.push(new_entry);
        self.meta.update_config(&config, &config_token).await?;

        tracing::debug!("{purpose} status of {credential_id} set to valid={}", !invalidate);
        Ok(updated)
    }

    /// Rewrite the credential's encoded list with the bit at `index` set
    /// to `value`.
    fn flip_status_bit(
        &self, mut credential: VerifiableCredential, index: u64, value: bool,
    ) -> Result<VerifiableCredential> {
        let subject = credential
            .credential_subject
            .as_mut()
            .and_then(|subject| match subject {
                OneMany::One(one) => Some(one),
                OneMany::Many(many) => many.first_mut(),
            })
            .ok_or_else(|| {
                Error::InvalidRepoState("status credential has no subject".to_string())
            })?;

        let encoded = subject.claims.get("encodedList").and_then(Value::as_str).ok_or_else(
            || Error::InvalidRepoState("status credential has no encoded list".to_string()),
        )?;

        let mut list = StatusList::decode(encoded, self.list_bits())
            .map_err(|e| Error::InvalidRepoState(format!("issue decoding status list: {e}")))?;
        list.set(usize::try_from(index).map_err(anyhow::Error::from)?, value)?;

        subject.claims.insert("encodedList".to_string(), Value::String(list.encode()?));
        Ok(credential)
    }
}
