//! # Status Allocation
//!
//! Assigns a `(list id, index)` pair per purpose to a user credential.
//! Allocation is idempotent by credential id: the event log is the
//! directory of every id ever seen, and a re-match reconstructs the
//! original entries instead of allocating again.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;

use super::{MAX_CREDENTIAL_ID_LENGTH, Manager};
use crate::config::{Config, EventLogEntry, StatusState};
use crate::core::{Kind, OneMany, generate};
use crate::error::{Error, Result};
use crate::model::{
    CONTEXT_STATUS, CONTEXT_V1, CONTEXT_V2, STATUS_ENTRY_TYPE, StatusEntry, StatusPurpose,
    VerifiableCredential,
};
use crate::provider::RepoStore;
use crate::status::compose_status_credential;

/// Outcome of attaching status entries to a user credential. Holds the
/// not-yet-persisted config so the unsafe operation can commit it in a
/// single write.
pub(super) struct Attachment {
    pub credential: VerifiableCredential,
    pub new_user_credential: bool,
    pub new_list_ids: BTreeMap<StatusPurpose, String>,
    pub status_info: BTreeMap<StatusPurpose, StatusState>,
    pub config: Config,
    pub config_token: String,
}

impl<S: RepoStore> Manager<S> {
    /// Idempotently assign the credential to a `(list id, index)` for each
    /// requested purpose. Mutates only the in-memory config.
    pub(super) async fn attach_credential_status(
        &self, credential: &Value, purposes: &[StatusPurpose],
    ) -> Result<Attachment> {
        if purposes.is_empty() {
            return Err(Error::BadRequest("at least one status purpose is required".to_string()));
        }
        if credential.is_string() {
            return Err(Error::BadRequest(
                "compact JWT credentials are not supported; supply the credential as a JSON object"
                    .to_string(),
            ));
        }
        let Some(object) = credential.as_object() else {
            return Err(Error::BadRequest("credential must be a JSON object".to_string()));
        };

        // work on a copy with any pre-existing status and proof stripped,
        // whatever shape they took
        let mut object = object.clone();
        object.remove("credentialStatus");
        object.remove("proof");

        let mut credential: VerifiableCredential = serde_json::from_value(object.into())
            .map_err(|e| Error::BadRequest(format!("malformed credential: {e}")))?;

        match credential.context.first().and_then(Kind::as_string) {
            Some(CONTEXT_V1) => {
                // the 1.1 context has no status list vocabulary of its own
                let has_status_context =
                    credential.context.iter().any(|c| c.as_string() == Some(CONTEXT_STATUS));
                if !has_status_context {
                    credential.context.push(Kind::String(CONTEXT_STATUS.to_string()));
                }
            }
            Some(CONTEXT_V2) => {}
            _ => {
                return Err(Error::BadRequest(format!(
                    "credential '@context' must lead with {CONTEXT_V1} or {CONTEXT_V2}"
                )));
            }
        }

        let credential_id = match &credential.id {
            Some(id) => {
                validate_credential_id(id)?;
                id.clone()
            }
            None => {
                let id = generate::urn_uuid();
                credential.id = Some(id.clone());
                id
            }
        };

        let (mut config, config_token) = self.meta.get_config().await?;

        // at-most-once allocation per id
        if let Some(entry) = config.latest_entry(&credential_id) {
            tracing::debug!("credential {credential_id} already allocated; reusing entries");
            let status_info = entry.credential_status_info.clone();
            return Ok(Attachment {
                credential: self.with_status_entries(credential, &status_info),
                new_user_credential: false,
                new_list_ids: BTreeMap::new(),
                status_info,
                config,
                config_token,
            });
        }

        let mut new_list_ids = BTreeMap::new();
        let mut status_info = BTreeMap::new();

        for purpose in purposes {
            let info = config.status_credential_info.get_mut(purpose).ok_or_else(|| {
                Error::BadRequest(format!("unsupported status purpose: {purpose}"))
            })?;

            if info.latest_credentials_issued_counter >= self.list_size as u64 {
                let list_id = generate::status_credential_id();
                tracing::debug!("list {} is full; rolling {purpose} over to {list_id}",
                    info.latest_status_credential_id);

                info.latest_status_credential_id = list_id.clone();
                info.latest_credentials_issued_counter = 0;
                info.status_credentials_counter += 1;
                config.status_credential_ids.push(list_id.clone());
                new_list_ids.insert(*purpose, list_id);
            }

            // the incremented counter doubles as the 1-based list index
            info.latest_credentials_issued_counter += 1;
            status_info.insert(
                *purpose,
                StatusState {
                    status_credential_id: info.latest_status_credential_id.clone(),
                    status_list_index: info.latest_credentials_issued_counter,
                    valid: true,
                },
            );
        }

        config.credentials_issued_counter += 1;

        Ok(Attachment {
            credential: self.with_status_entries(credential, &status_info),
            new_user_credential: true,
            new_list_ids,
            status_info,
            config,
            config_token,
        })
    }

    /// Allocate and persist: create any rolled-over lists, append the
    /// event log entry, and commit the config in a single write.
    pub(super) async fn allocate_status_unsafe(
        &self, credential: &Value, purposes: &[StatusPurpose],
    ) -> Result<VerifiableCredential> {
        let attachment = self.attach_credential_status(credential, purposes).await?;
        let mut user_credential = attachment.credential;

        if !attachment.new_user_credential {
            if self.sign_user_credential {
                user_credential = self.identity.sign(&user_credential)?;
            }
            return Ok(user_credential);
        }

        let mut config = attachment.config;

        for (purpose, list_id) in &attachment.new_list_ids {
            let url = self.status_credential_url(list_id);
            let mut status_credential = compose_status_credential(
                self.identity.did(),
                &url,
                *purpose,
                None,
                self.list_bits(),
            )?;
            if self.sign_status_credential {
                status_credential = self.identity.sign(&status_credential)?;
            }
            self.repo.create(list_id, &status_credential).await?;
        }

        config.event_log.push(EventLogEntry {
            timestamp: Utc::now(),
            credential_id: user_credential.id.clone().unwrap_or_default(),
            credential_issuer: user_credential.issuer_id().to_string(),
            credential_subject: user_credential.subject_id().map(ToString::to_string),
            credential_status_info: attachment.status_info,
        });
        self.meta.update_config(&config, &attachment.config_token).await?;

        if self.sign_user_credential {
            user_credential = self.identity.sign(&user_credential)?;
        }
        Ok(user_credential)
    }

    /// Attach `credentialStatus` entries: a bare object for one purpose,
    /// an array for several.
    fn with_status_entries(
        &self, mut credential: VerifiableCredential,
        status_info: &BTreeMap<StatusPurpose, StatusState>,
    ) -> VerifiableCredential {
        let mut entries: Vec<StatusEntry> = status_info
            .iter()
            .map(|(purpose, state)| {
                let url = self.status_credential_url(&state.status_credential_id);
                StatusEntry {
                    id: format!("{url}#{}", state.status_list_index),
                    type_: STATUS_ENTRY_TYPE.to_string(),
                    status_purpose: *purpose,
                    status_list_index: state.status_list_index.to_string(),
                    status_list_credential: url,
                }
            })
            .collect();

        credential.credential_status = Some(if entries.len() == 1 {
            OneMany::One(entries.remove(0))
        } else {
            OneMany::Many(entries)
        });
        credential
    }
}

/// A supplied credential id must be a URL, a UUID URN, or a DID, and no
/// longer than [`MAX_CREDENTIAL_ID_LENGTH`].
fn validate_credential_id(id: &str) -> Result<()> {
    if id.len() > MAX_CREDENTIAL_ID_LENGTH {
        return Err(Error::BadRequest(format!(
            "credential id exceeds {MAX_CREDENTIAL_ID_LENGTH} characters"
        )));
    }
    let acceptable = id.starts_with("https://")
        || id.starts_with("http://")
        || id.starts_with("urn:uuid:")
        || id.starts_with("did:");
    if !acceptable {
        return Err(Error::BadRequest(
            "credential id must be a URL, a UUID URN, or a DID".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_validation() {
        assert!(validate_credential_id("https://example.com/credentials/3732").is_ok());
        assert!(validate_credential_id("urn:uuid:0c24895a-5f37-42c0-a3f0-9d4e33b7ba4f").is_ok());
        assert!(validate_credential_id("did:example:ebfeb1f712ebc6f1c276e12ec21").is_ok());

        assert!(validate_credential_id("not-an-identifier").is_err());
        let too_long = format!("https://example.com/{}", "a".repeat(MAX_CREDENTIAL_ID_LENGTH));
        assert!(validate_credential_id(&too_long).is_err());
    }
}
