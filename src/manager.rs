//! # Status Manager
//!
//! The orchestrating entry points. A [`Manager`] serializes every mutating
//! call behind a per-instance mutex and wraps it in the snapshot protocol:
//! clean up any stale snapshot, capture a fresh pre-image, run the
//! operation, then clean up again. A failure anywhere inside the critical
//! section is retried a bounded number of times; an unrecoverable
//! repository state propagates immediately.

mod allocate;
mod snapshot;
mod update;
mod validate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::{Config, ConfigStore, StatusCredentialInfo, StatusCredentialStore, StatusState};
use crate::core::generate;
use crate::error::{Error, Result};
use crate::identity::{DidMethod, Identity};
use crate::model::{StatusPurpose, VerifiableCredential};
use crate::provider::RepoStore;
use crate::status::compose_status_credential;
use crate::store::{GitRepo, GithubRepo, GitlabRepo};

/// Number of bits in a status list.
pub const LIST_SIZE: usize = 100_000;

/// Longest permitted user credential id.
pub const MAX_CREDENTIAL_ID_LENGTH: usize = 64;

/// Bound on the retry loop around a mutating call. Failures other than an
/// unrecoverable repository state are retried until this many attempts
/// have been made, then surface unchanged.
const MAX_ATTEMPTS: usize = 3;

/// Supported Git hosting services.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GitService {
    /// GitHub, publishing via `github.io`.
    #[default]
    Github,

    /// GitLab, publishing via `gitlab.io`.
    Gitlab,
}

impl GitService {
    const fn pages_domain(self) -> &'static str {
        match self {
            Self::Github => "github.io",
            Self::Gitlab => "gitlab.io",
        }
    }
}

/// Options recognized by [`create_manager`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// The Git service hosting both repositories.
    pub git_service: GitService,

    /// Account under which both repositories live.
    pub owner_account_name: String,

    /// Name of the status credential repository.
    pub repo_name: String,

    /// Name of the metadata repository.
    pub meta_repo_name: String,

    /// GitLab project id of the status repository.
    pub repo_id: Option<String>,

    /// GitLab project id of the metadata repository.
    pub meta_repo_id: Option<String>,

    /// Access token for the status repository.
    pub repo_access_token: String,

    /// Access token for the metadata repository.
    pub meta_repo_access_token: String,

    /// DID method for the issuer identity.
    pub did_method: DidMethod,

    /// Seed the issuer's Ed25519 key is derived from.
    pub did_seed: String,

    /// HTTPS URL backing the identity. Required iff `did_method` is `web`.
    pub did_web_url: Option<String>,

    /// Status purposes tracked for every issued credential. Every purpose
    /// listed here gets its own rolling status list. Defaults to both
    /// supported purposes.
    pub status_purposes: Vec<StatusPurpose>,

    /// Attach a proof to every status credential. Defaults to `true`.
    pub sign_status_credential: bool,

    /// Attach a proof to allocated user credentials. Defaults to `false`.
    pub sign_user_credential: bool,

    /// Bits per status list. Defaults to [`LIST_SIZE`]; lowering it is
    /// only useful for exercising rollover in tests.
    pub list_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            git_service: GitService::default(),
            owner_account_name: String::new(),
            repo_name: String::new(),
            meta_repo_name: String::new(),
            repo_id: None,
            meta_repo_id: None,
            repo_access_token: String::new(),
            meta_repo_access_token: String::new(),
            did_method: DidMethod::default(),
            did_seed: String::new(),
            did_web_url: None,
            status_purposes: StatusPurpose::SUPPORTED.to_vec(),
            sign_status_credential: true,
            sign_user_credential: false,
            list_size: LIST_SIZE,
        }
    }
}

/// Everything the event log records about one credential.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialInfo {
    /// The credential id.
    pub id: String,

    /// The credential's issuer.
    pub issuer: String,

    /// The credential's subject id, when one was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Current status per purpose.
    pub status_info: BTreeMap<StatusPurpose, StatusState>,
}

/// An issuer's status manager, generic over the repository backend.
#[derive(Debug)]
pub struct Manager<S: RepoStore> {
    repo: StatusCredentialStore<S>,
    meta: ConfigStore<S>,
    identity: Identity,
    status_url_base: String,
    purposes: Vec<StatusPurpose>,
    sign_status_credential: bool,
    sign_user_credential: bool,
    list_size: usize,
    lock: Mutex<()>,
}

/// Build a [`Manager`] against the Git service named in `options`.
///
/// # Errors
///
/// Returns [`Error::BadRequest`] for missing options,
/// [`Error::InvalidDidSeed`] for a bad seed, [`Error::InvalidToken`] when
/// an access token lacks rights, [`Error::MissingRepository`] when a
/// repository has not been created, and [`Error::InvalidRepoState`] when
/// an existing deployment cannot be adopted.
pub async fn create_manager(options: Options) -> Result<Manager<GitRepo>> {
    if options.owner_account_name.is_empty() {
        return Err(Error::BadRequest("'ownerAccountName' is required".to_string()));
    }
    if options.repo_name.is_empty() || options.meta_repo_name.is_empty() {
        return Err(Error::BadRequest("'repoName' and 'metaRepoName' are required".to_string()));
    }
    if options.repo_access_token.is_empty() || options.meta_repo_access_token.is_empty() {
        return Err(Error::BadRequest(
            "'repoAccessToken' and 'metaRepoAccessToken' are required".to_string(),
        ));
    }

    let (repo, meta_repo) = match options.git_service {
        GitService::Github => (
            GitRepo::Github(GithubRepo::new(
                &options.owner_account_name,
                &options.repo_name,
                &options.repo_access_token,
            )?),
            GitRepo::Github(GithubRepo::new(
                &options.owner_account_name,
                &options.meta_repo_name,
                &options.meta_repo_access_token,
            )?),
        ),
        GitService::Gitlab => {
            let repo_id = options
                .repo_id
                .as_deref()
                .ok_or_else(|| Error::BadRequest("'repoId' is required with GitLab".to_string()))?;
            let meta_repo_id = options.meta_repo_id.as_deref().ok_or_else(|| {
                Error::BadRequest("'metaRepoId' is required with GitLab".to_string())
            })?;
            (
                GitRepo::Gitlab(GitlabRepo::new(repo_id, &options.repo_access_token)?),
                GitRepo::Gitlab(GitlabRepo::new(meta_repo_id, &options.meta_repo_access_token)?),
            )
        }
    };

    Manager::new(options, repo, meta_repo).await
}

impl<S: RepoStore> Manager<S> {
    /// Build a manager over the provided repository instances.
    ///
    /// Derives the issuer identity eagerly, verifies authority over and
    /// existence of both repositories, then either adopts an existing
    /// deployment (running snapshot cleanup to reach a known-good
    /// baseline) or bootstraps an empty one.
    ///
    /// # Errors
    ///
    /// As for [`create_manager`], minus the option checks.
    pub async fn new(options: Options, repo: S, meta_repo: S) -> Result<Self> {
        let identity = Identity::derive(
            options.did_method,
            &options.did_seed,
            options.did_web_url.as_deref(),
        )?;

        if options.status_purposes.is_empty() {
            return Err(Error::BadRequest("at least one status purpose is required".to_string()));
        }

        let manager = Self {
            repo: StatusCredentialStore::new(repo),
            meta: ConfigStore::new(meta_repo),
            identity,
            status_url_base: format!(
                "https://{}.{}/{}",
                options.owner_account_name,
                options.git_service.pages_domain(),
                options.repo_name
            ),
            purposes: options.status_purposes,
            sign_status_credential: options.sign_status_credential,
            sign_user_credential: options.sign_user_credential,
            list_size: options.list_size,
            lock: Mutex::new(()),
        };

        if !(manager.repo.store().has_authority().await?
            && manager.meta.store().has_authority().await?)
        {
            return Err(Error::InvalidToken(
                "access token lacks rights on the configured repositories".to_string(),
            ));
        }
        if !(manager.repo.store().repo_exists().await?
            && manager.meta.store().repo_exists().await?)
        {
            return Err(Error::MissingRepository(
                "status and metadata repositories must be created before use".to_string(),
            ));
        }

        if manager.repo.store().is_empty().await? && !manager.meta.config_exists().await? {
            manager.bootstrap().await?;
        } else {
            manager.cleanup_snapshot().await?;
        }

        Ok(manager)
    }

    /// Create the initial deployment: one empty status credential per
    /// supported purpose, a zeroed config, and the published website.
    async fn bootstrap(&self) -> Result<()> {
        tracing::debug!("bootstrapping empty deployment");

        let mut status_credential_ids = Vec::new();
        let mut status_credential_info = BTreeMap::new();

        for &purpose in &self.purposes {
            let list_id = generate::status_credential_id();
            let url = self.status_credential_url(&list_id);

            let mut credential = compose_status_credential(
                self.identity.did(),
                &url,
                purpose,
                None,
                self.list_bits(),
            )?;
            if self.sign_status_credential {
                credential = self.identity.sign(&credential)?;
            }
            self.repo.create(&list_id, &credential).await?;

            status_credential_info.insert(
                purpose,
                StatusCredentialInfo {
                    latest_status_credential_id: list_id.clone(),
                    latest_credentials_issued_counter: 0,
                    status_credentials_counter: 1,
                },
            );
            status_credential_ids.push(list_id);
        }

        self.meta
            .create_config(&Config {
                credentials_issued_counter: 0,
                status_credential_ids,
                status_credential_info,
                event_log: Vec::new(),
            })
            .await?;

        self.repo.store().deploy_website().await?;
        Ok(())
    }

    /// Assign `credential` a status entry for each requested purpose.
    ///
    /// Idempotent by credential id: re-allocating an id returns the
    /// original entries without touching counters. A credential arriving
    /// without an id is assigned a `urn:uuid`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for malformed input and
    /// [`Error::InvalidRepoState`] when recovery failed to converge.
    pub async fn allocate_status(
        &self, credential: Value, purposes: &[StatusPurpose],
    ) -> Result<VerifiableCredential> {
        let mut attempt = 1;
        loop {
            match self.allocate_transaction(&credential, purposes).await {
                Ok(credential) => return Ok(credential),
                Err(e) if e.is_invalid_repo_state() || attempt == MAX_ATTEMPTS => return Err(e),
                Err(e) => tracing::debug!("retrying allocation (attempt {attempt}): {e}"),
            }
            attempt += 1;
        }
    }

    /// [`Manager::allocate_status`] for `revocation` only.
    ///
    /// # Errors
    ///
    /// As for [`Manager::allocate_status`].
    pub async fn allocate_revocation_status(
        &self, credential: Value,
    ) -> Result<VerifiableCredential> {
        self.allocate_status(credential, &[StatusPurpose::Revocation]).await
    }

    /// [`Manager::allocate_status`] for `suspension` only.
    ///
    /// # Errors
    ///
    /// As for [`Manager::allocate_status`].
    pub async fn allocate_suspension_status(
        &self, credential: Value,
    ) -> Result<VerifiableCredential> {
        self.allocate_status(credential, &[StatusPurpose::Suspension]).await
    }

    /// [`Manager::allocate_status`] for every purpose this manager tracks.
    ///
    /// # Errors
    ///
    /// As for [`Manager::allocate_status`].
    pub async fn allocate_supported_statuses(
        &self, credential: Value,
    ) -> Result<VerifiableCredential> {
        let purposes = self.purposes.clone();
        self.allocate_status(credential, &purposes).await
    }

    /// Flip the credential's status bit for `purpose`, returning the
    /// updated (re-signed when configured) status credential. Requesting
    /// the state already in force is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unallocated id,
    /// [`Error::BadRequest`] when the credential does not carry the
    /// purpose or has been revoked, and [`Error::InvalidRepoState`] when
    /// recovery failed to converge.
    pub async fn update_status(
        &self, credential_id: &str, purpose: StatusPurpose, invalidate: bool,
    ) -> Result<VerifiableCredential> {
        let mut attempt = 1;
        loop {
            match self.update_transaction(credential_id, purpose, invalidate).await {
                Ok(credential) => return Ok(credential),
                Err(e) if e.is_invalid_repo_state() || attempt == MAX_ATTEMPTS => return Err(e),
                Err(e) => tracing::debug!("retrying status update (attempt {attempt}): {e}"),
            }
            attempt += 1;
        }
    }

    /// Permanently invalidate the credential.
    ///
    /// # Errors
    ///
    /// As for [`Manager::update_status`].
    pub async fn revoke_credential(&self, credential_id: &str) -> Result<VerifiableCredential> {
        self.update_status(credential_id, StatusPurpose::Revocation, true).await
    }

    /// Temporarily invalidate the credential.
    ///
    /// # Errors
    ///
    /// As for [`Manager::update_status`].
    pub async fn suspend_credential(&self, credential_id: &str) -> Result<VerifiableCredential> {
        self.update_status(credential_id, StatusPurpose::Suspension, true).await
    }

    /// Lift a suspension.
    ///
    /// # Errors
    ///
    /// As for [`Manager::update_status`].
    pub async fn unsuspend_credential(&self, credential_id: &str) -> Result<VerifiableCredential> {
        self.update_status(credential_id, StatusPurpose::Suspension, false).await
    }

    /// The credential's current status per purpose.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unallocated id.
    pub async fn get_status(
        &self, credential_id: &str,
    ) -> Result<BTreeMap<StatusPurpose, StatusState>> {
        Ok(self.get_credential_info(credential_id).await?.status_info)
    }

    /// Everything the event log records about the credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unallocated id.
    pub async fn get_credential_info(&self, credential_id: &str) -> Result<CredentialInfo> {
        let _guard = self.lock.lock().await;

        let (config, _) = self.meta.get_config().await?;
        let entry = config.latest_entry(credential_id).ok_or_else(|| {
            Error::NotFound(format!("no status has been allocated for {credential_id}"))
        })?;

        Ok(CredentialInfo {
            id: entry.credential_id.clone(),
            issuer: entry.credential_issuer.clone(),
            subject: entry.credential_subject.clone(),
            status_info: entry.credential_status_info.clone(),
        })
    }

    /// The published status credential for `list_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the list does not exist or cannot be read.
    pub async fn get_status_credential(&self, list_id: &str) -> Result<VerifiableCredential> {
        Ok(self.repo.get(list_id).await?.0)
    }

    /// A read-only copy of the current config.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.json` cannot be read.
    pub async fn config(&self) -> Result<Config> {
        Ok(self.meta.get_config().await?.0)
    }

    /// Critical section for one allocation.
    async fn allocate_transaction(
        &self, credential: &Value, purposes: &[StatusPurpose],
    ) -> Result<VerifiableCredential> {
        let _guard = self.lock.lock().await;

        self.cleanup_snapshot().await?;
        self.save_snapshot().await?;
        let result = self.allocate_status_unsafe(credential, purposes).await;
        self.finish_transaction(result).await
    }

    /// Critical section for one status update.
    async fn update_transaction(
        &self, credential_id: &str, purpose: StatusPurpose, invalidate: bool,
    ) -> Result<VerifiableCredential> {
        let _guard = self.lock.lock().await;

        self.cleanup_snapshot().await?;
        self.save_snapshot().await?;
        let result = self.update_status_unsafe(credential_id, purpose, invalidate).await;
        self.finish_transaction(result).await
    }

    /// The `finally` half of a critical section: run cleanup whatever the
    /// operation's outcome, without masking the operation's error.
    async fn finish_transaction(
        &self, result: Result<VerifiableCredential>,
    ) -> Result<VerifiableCredential> {
        let cleanup = self.cleanup_snapshot().await;
        match result {
            Ok(credential) => cleanup.map(|()| credential),
            Err(e) => {
                if let Err(cleanup_error) = cleanup {
                    tracing::warn!("cleanup after failed operation also failed: {cleanup_error}");
                }
                Err(e)
            }
        }
    }

    /// URL a status credential is published under.
    fn status_credential_url(&self, list_id: &str) -> String {
        format!("{}/{list_id}", self.status_url_base)
    }

    /// Bitstring length: one bit per assignable index, plus the reserved
    /// index 0.
    const fn list_bits(&self) -> usize {
        self.list_size + 1
    }
}
