//! Shared fixtures: in-memory repository stores and manager construction.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use credential_status_manager::{
    Manager, Options, RepoStore, VerifiableCredential, status::StatusList,
};
use serde_json::{Value, json};

/// A 64-character seed, deterministic across test runs.
pub const DID_SEED: &str = "DsnrHBHFQP0ab59dQELh3uEwy7i5ArcOTwxkwRO2hM87CBRGWBEChPO7AjmwkAZ2";

/// An in-memory [`RepoStore`]. Clones share state, so tests can hold a
/// handle to the store a manager owns and inspect or corrupt files
/// directly. The concurrency token is a per-file revision number.
#[derive(Clone, Debug, Default)]
pub struct MemStore {
    files: Arc<Mutex<BTreeMap<String, (String, u64)>>>,
    revision: Arc<AtomicU64>,
}

impl MemStore {
    /// Raw file content, bypassing the `RepoStore` interface.
    pub fn raw(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).map(|(content, _)| content.clone())
    }

    /// All filenames currently stored.
    pub fn filenames(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    /// Overwrite or insert a file directly, simulating out-of-band writes
    /// or a partially completed operation.
    pub fn write_raw(&self, path: &str, content: &str) {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst);
        self.files.lock().unwrap().insert(path.to_string(), (content.to_string(), revision));
    }

    /// Remove a file directly.
    pub fn remove_raw(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }
}

impl RepoStore for MemStore {
    async fn create(&self, path: &str, content: &str) -> Result<()> {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock().unwrap();
        if files.contains_key(path) {
            bail!("file already exists: {path}");
        }
        files.insert(path.to_string(), (content.to_string(), revision));
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<(String, String)> {
        let files = self.files.lock().unwrap();
        let Some((content, revision)) = files.get(path) else {
            bail!("file not found: {path}");
        };
        Ok((content.clone(), revision.to_string()))
    }

    async fn update(&self, path: &str, content: &str, token: &str) -> Result<()> {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock().unwrap();
        let Some((_, current)) = files.get(path) else {
            bail!("file not found: {path}");
        };
        if current.to_string() != token {
            bail!("{path} was modified concurrently");
        }
        files.insert(path.to_string(), (content.to_string(), revision));
        Ok(())
    }

    async fn delete(&self, path: &str, token: &str) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        let Some((_, current)) = files.get(path) else {
            bail!("file not found: {path}");
        };
        if current.to_string() != token {
            bail!("{path} was modified concurrently");
        }
        files.remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn list_filenames(&self) -> Result<Vec<String>> {
        Ok(self.filenames())
    }

    async fn repo_exists(&self) -> Result<bool> {
        Ok(true)
    }

    async fn has_authority(&self) -> Result<bool> {
        Ok(true)
    }
}

/// A [`MemStore`] wrapper that fails the next `update` call when armed,
/// simulating a backend fault mid-operation.
#[derive(Clone, Debug, Default)]
pub struct FlakyStore {
    inner: MemStore,
    fail_next_update: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn inner(&self) -> &MemStore {
        &self.inner
    }

    /// Arm the store: the next `update` fails once, then behaves normally.
    pub fn fail_next_update(&self) {
        self.fail_next_update.store(true, Ordering::SeqCst);
    }
}

impl RepoStore for FlakyStore {
    async fn create(&self, path: &str, content: &str) -> Result<()> {
        self.inner.create(path, content).await
    }

    async fn get(&self, path: &str) -> Result<(String, String)> {
        self.inner.get(path).await
    }

    async fn update(&self, path: &str, content: &str, token: &str) -> Result<()> {
        if self.fail_next_update.swap(false, Ordering::SeqCst) {
            bail!("injected network failure");
        }
        self.inner.update(path, content, token).await
    }

    async fn delete(&self, path: &str, token: &str) -> Result<()> {
        self.inner.delete(path, token).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn list_filenames(&self) -> Result<Vec<String>> {
        self.inner.list_filenames().await
    }

    async fn repo_exists(&self) -> Result<bool> {
        Ok(true)
    }

    async fn has_authority(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Options for a test deployment on in-memory stores.
pub fn options() -> Options {
    Options {
        owner_account_name: "issuer".to_string(),
        repo_name: "status".to_string(),
        meta_repo_name: "status-meta".to_string(),
        repo_access_token: "repo-token".to_string(),
        meta_repo_access_token: "meta-token".to_string(),
        did_seed: DID_SEED.to_string(),
        ..Options::default()
    }
}

/// A manager over fresh in-memory stores, returning handles to both.
pub async fn manager(options: Options) -> (Manager<MemStore>, MemStore, MemStore) {
    let repo = MemStore::default();
    let meta = MemStore::default();
    let manager = Manager::new(options, repo.clone(), meta.clone())
        .await
        .expect("should create manager");
    (manager, repo, meta)
}

/// A user credential in the VC 1.1 dialect.
pub fn credential(id: &str) -> Value {
    json!({
        "@context": ["https://www.w3.org/2018/credentials/v1"],
        "id": id,
        "type": ["VerifiableCredential"],
        "issuer": "did:example:issuer",
        "credentialSubject": {
            "id": "did:example:ebfeb1f712ebc6f1c276e12ec21"
        }
    })
}

/// Decode the bitstring of a status credential produced with `list_size`.
pub fn decoded_list(credential: &VerifiableCredential, list_size: usize) -> StatusList {
    let subject = credential
        .credential_subject
        .as_ref()
        .and_then(credential_status_manager::OneMany::as_one)
        .expect("status credential should have a subject");
    let encoded =
        subject.claims["encodedList"].as_str().expect("encoded list should be a string");
    // one bit per assignable index plus the reserved index 0
    StatusList::decode(encoded, list_size + 1).expect("should decode")
}
