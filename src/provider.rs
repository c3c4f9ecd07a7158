//! # Providers
//!
//! The capability trait the manager is generic over. A `RepoStore` is a
//! named collection of text files with optimistic-concurrency tokens, as
//! hosted by a Git service. Backends supply their own token scheme (a blob
//! sha, a commit id); the manager only echoes tokens back.

use std::future::Future;

use anyhow::Result;

/// File CRUD against one remote repository.
///
/// Every call may suspend and may fail transiently; callers are expected
/// to reload state rather than cache across calls.
pub trait RepoStore: Send + Sync {
    /// Create a new file. Fails if the file already exists.
    fn create(&self, path: &str, content: &str) -> impl Future<Output = Result<()>> + Send;

    /// Read a file, returning its content and the backend's
    /// optimistic-concurrency token for the revision read.
    fn get(&self, path: &str) -> impl Future<Output = Result<(String, String)>> + Send;

    /// Overwrite a file. `token` must match the revision previously read;
    /// a concurrent write from elsewhere surfaces as an error.
    fn update(
        &self, path: &str, content: &str, token: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a file at the revision identified by `token`.
    fn delete(&self, path: &str, token: &str) -> impl Future<Output = Result<()>> + Send;

    /// `true` if the file exists.
    fn exists(&self, path: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Names of all files at the repository root.
    fn list_filenames(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// `true` if the repository holds no files.
    fn is_empty(&self) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(self.list_filenames().await?.is_empty()) }
    }

    /// `true` if the repository itself has been created on the backend.
    fn repo_exists(&self) -> impl Future<Output = Result<bool>> + Send;

    /// `true` if the repository is reachable and the configured token
    /// carries admin, push, or pull rights on it.
    fn has_authority(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Trigger (re)deployment of the static site publishing this
    /// repository's files. Opaque to the manager.
    fn deploy_website(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}
