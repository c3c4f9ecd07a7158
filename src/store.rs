//! # Git-Hosted Repository Stores
//!
//! [`RepoStore`] backends for GitHub and GitLab, addressed through their
//! REST APIs. Both publish the status repository as a static site
//! (`github.io` / `gitlab.io`), which is how relying parties fetch status
//! credentials.

mod github;
mod gitlab;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};

pub use self::github::GithubRepo;
pub use self::gitlab::GitlabRepo;
use crate::provider::RepoStore;

/// Commit message for a backend write: `"[<RFC-3339>]: <verb> <resource>"`.
/// Informational only.
pub(crate) fn commit_message(verb: &str, resource: &str) -> String {
    format!("[{}]: {verb} {resource}", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// A repository on either supported Git service.
#[derive(Debug)]
pub enum GitRepo {
    /// A GitHub repository.
    Github(GithubRepo),

    /// A GitLab project.
    Gitlab(GitlabRepo),
}

impl RepoStore for GitRepo {
    async fn create(&self, path: &str, content: &str) -> Result<()> {
        match self {
            Self::Github(repo) => repo.create(path, content).await,
            Self::Gitlab(repo) => repo.create(path, content).await,
        }
    }

    async fn get(&self, path: &str) -> Result<(String, String)> {
        match self {
            Self::Github(repo) => repo.get(path).await,
            Self::Gitlab(repo) => repo.get(path).await,
        }
    }

    async fn update(&self, path: &str, content: &str, token: &str) -> Result<()> {
        match self {
            Self::Github(repo) => repo.update(path, content, token).await,
            Self::Gitlab(repo) => repo.update(path, content, token).await,
        }
    }

    async fn delete(&self, path: &str, token: &str) -> Result<()> {
        match self {
            Self::Github(repo) => repo.delete(path, token).await,
            Self::Gitlab(repo) => repo.delete(path, token).await,
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self {
            Self::Github(repo) => repo.exists(path).await,
            Self::Gitlab(repo) => repo.exists(path).await,
        }
    }

    async fn list_filenames(&self) -> Result<Vec<String>> {
        match self {
            Self::Github(repo) => repo.list_filenames().await,
            Self::Gitlab(repo) => repo.list_filenames().await,
        }
    }

    async fn repo_exists(&self) -> Result<bool> {
        match self {
            Self::Github(repo) => repo.repo_exists().await,
            Self::Gitlab(repo) => repo.repo_exists().await,
        }
    }

    async fn has_authority(&self) -> Result<bool> {
        match self {
            Self::Github(repo) => repo.has_authority().await,
            Self::Gitlab(repo) => repo.has_authority().await,
        }
    }

    async fn deploy_website(&self) -> Result<()> {
        match self {
            Self::Github(repo) => repo.deploy_website().await,
            Self::Gitlab(repo) => repo.deploy_website().await,
        }
    }
}
