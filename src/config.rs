//! # Persisted State
//!
//! The authoritative manager state (`config.json`), the transient
//! crash-recovery pre-image (`snapshot.json`), and the typed wrappers
//! mapping them, plus the per-list status credentials, onto a
//! [`RepoStore`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{StatusPurpose, VerifiableCredential};
use crate::provider::RepoStore;

/// Filename of the authoritative state in the metadata repository.
const CONFIG_FILE: &str = "config.json";

/// Filename of the transient snapshot in the metadata repository.
const SNAPSHOT_FILE: &str = "snapshot.json";

/// Authoritative manager state, persisted as `config.json`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Count of distinct user credentials ever allocated.
    pub credentials_issued_counter: u64,

    /// Ordered identifiers of every status credential ever created, across
    /// all purposes. Each doubles as its filename in the status repository.
    pub status_credential_ids: Vec<String>,

    /// Per-purpose tracking of the newest list and its fill level.
    pub status_credential_info: BTreeMap<StatusPurpose, StatusCredentialInfo>,

    /// Append-only record of every allocation and status transition. The
    /// latest entry for a credential id is the authoritative current state.
    pub event_log: Vec<EventLogEntry>,
}

impl Config {
    /// The most recent event log entry for `credential_id`, if the
    /// credential has been allocated.
    #[must_use]
    pub fn latest_entry(&self, credential_id: &str) -> Option<&EventLogEntry> {
        self.event_log.iter().rev().find(|e| e.credential_id == credential_id)
    }

    /// Number of distinct credential ids in the event log.
    #[must_use]
    pub fn distinct_credentials(&self) -> usize {
        self.event_log.iter().map(|e| e.credential_id.as_str()).collect::<BTreeSet<_>>().len()
    }
}

/// Per-purpose rolling-list state.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCredentialInfo {
    /// Identifier of the newest list for this purpose.
    pub latest_status_credential_id: String,

    /// Number of indices allocated in the newest list, `1..=LIST_SIZE`.
    pub latest_credentials_issued_counter: u64,

    /// Number of lists ever created for this purpose.
    pub status_credentials_counter: u64,
}

/// One allocation or status transition.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    /// RFC-3339 date-time the event was recorded.
    pub timestamp: DateTime<Utc>,

    /// The user credential's id (URL, UUID URN, or DID).
    pub credential_id: String,

    /// The user credential's issuer.
    pub credential_issuer: String,

    /// The user credential's subject id, when one was present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_subject: Option<String>,

    /// Status assignment per purpose as of this event.
    pub credential_status_info: BTreeMap<StatusPurpose, StatusState>,
}

/// A credential's position and validity within one purpose's list.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusState {
    /// Identifier of the list holding the credential's bit.
    pub status_credential_id: String,

    /// 1-based position of the bit within the list.
    pub status_list_index: u64,

    /// `false` when the bit is set (credential invalid for this purpose).
    pub valid: bool,
}

/// Point-in-time pre-image of the whole deployment: the config plus every
/// status credential. Persisted as `snapshot.json` for the duration of one
/// critical section.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// The config at snapshot time.
    #[serde(flatten)]
    pub config: Config,

    /// Every status credential at snapshot time, keyed by list id.
    pub status_credentials: BTreeMap<String, VerifiableCredential>,
}

/// Serialize a persisted document the way every file in both repositories
/// is written: pretty-printed with 2-space indent.
fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Typed access to `config.json` and `snapshot.json` in the metadata
/// repository.
#[derive(Debug)]
pub struct ConfigStore<S: RepoStore> {
    store: S,
}

impl<S: RepoStore> ConfigStore<S> {
    /// Wrap the metadata repository.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying repository, for authority and existence probes.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Write the initial `config.json`.
    pub async fn create_config(&self, config: &Config) -> Result<()> {
        Ok(self.store.create(CONFIG_FILE, &to_pretty_json(config)?).await?)
    }

    /// Read `config.json` and its concurrency token.
    pub async fn get_config(&self) -> Result<(Config, String)> {
        let (content, token) = self.store.get(CONFIG_FILE).await?;
        Ok((serde_json::from_str(&content)?, token))
    }

    /// Overwrite `config.json` at the revision identified by `token`.
    pub async fn update_config(&self, config: &Config, token: &str) -> Result<()> {
        Ok(self.store.update(CONFIG_FILE, &to_pretty_json(config)?, token).await?)
    }

    /// Remove `config.json`.
    pub async fn delete_config(&self) -> Result<()> {
        let (_, token) = self.store.get(CONFIG_FILE).await?;
        Ok(self.store.delete(CONFIG_FILE, &token).await?)
    }

    /// `true` if `config.json` exists.
    pub async fn config_exists(&self) -> Result<bool> {
        Ok(self.store.exists(CONFIG_FILE).await?)
    }

    /// Write `snapshot.json`.
    pub async fn create_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        Ok(self.store.create(SNAPSHOT_FILE, &to_pretty_json(snapshot)?).await?)
    }

    /// Read `snapshot.json`.
    pub async fn get_snapshot(&self) -> Result<Snapshot> {
        let (content, _) = self.store.get(SNAPSHOT_FILE).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Remove `snapshot.json`.
    pub async fn delete_snapshot(&self) -> Result<()> {
        let (_, token) = self.store.get(SNAPSHOT_FILE).await?;
        Ok(self.store.delete(SNAPSHOT_FILE, &token).await?)
    }

    /// `true` if `snapshot.json` exists.
    pub async fn snapshot_exists(&self) -> Result<bool> {
        Ok(self.store.exists(SNAPSHOT_FILE).await?)
    }
}

/// Typed access to the per-list status credentials in the status
/// repository. Filenames are the 20-character list ids.
#[derive(Debug)]
pub struct StatusCredentialStore<S: RepoStore> {
    store: S,
}

impl<S: RepoStore> StatusCredentialStore<S> {
    /// Wrap the status repository.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying repository, for authority and existence probes.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Write a new status credential.
    pub async fn create(&self, id: &str, credential: &VerifiableCredential) -> Result<()> {
        Ok(self.store.create(id, &to_pretty_json(credential)?).await?)
    }

    /// Read the status credential for `id` and its concurrency token.
    pub async fn get(&self, id: &str) -> Result<(VerifiableCredential, String)> {
        let (content, token) = self.store.get(id).await?;
        Ok((serde_json::from_str(&content)?, token))
    }

    /// Overwrite the status credential for `id` at the revision identified
    /// by `token`.
    pub async fn update(
        &self, id: &str, credential: &VerifiableCredential, token: &str,
    ) -> Result<()> {
        Ok(self.store.update(id, &to_pretty_json(credential)?, token).await?)
    }

    /// Delete the file `id` at the revision identified by `token`.
    pub async fn delete(&self, id: &str, token: &str) -> Result<()> {
        Ok(self.store.delete(id, token).await?)
    }

    /// `true` if a file named `id` exists.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.store.exists(id).await?)
    }

    /// Names of all files in the status repository.
    pub async fn list_filenames(&self) -> Result<Vec<String>> {
        Ok(self.store.list_filenames().await?)
    }
}
