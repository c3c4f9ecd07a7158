//! # GitHub Backend
//!
//! File CRUD against the GitHub [Contents API]. The blob `sha` returned on
//! every read serves as the optimistic-concurrency token.
//!
//! [Contents API]: https://docs.github.com/en/rest/repos/contents

use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use base64ct::{Base64, Encoding};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::commit_message;

const API_BASE: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One GitHub repository.
#[derive(Debug)]
pub struct GithubRepo {
    client: Client,
    repo_url: String,
    token: String,
}

/// A file returned by the Contents API.
#[derive(Deserialize)]
struct ContentFile {
    content: String,
    sha: String,
}

/// One entry of a directory listing.
#[derive(Deserialize)]
struct ContentEntry {
    name: String,
    #[serde(rename = "type")]
    type_: String,
}

/// Repository metadata, reduced to the caller's permissions.
#[derive(Deserialize)]
struct Repository {
    #[serde(default)]
    permissions: Permissions,
}

#[derive(Default, Deserialize)]
struct Permissions {
    #[serde(default)]
    admin: bool,
    #[serde(default)]
    push: bool,
    #[serde(default)]
    pull: bool,
}

impl GithubRepo {
    /// Address the repository `owner/repo` with a personal access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(owner: &str, repo: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("credential-status-manager")
            .build()?;

        Ok(Self {
            client,
            repo_url: format!("{API_BASE}/repos/{owner}/{repo}"),
            token: token.to_string(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.token).header("accept", "application/vnd.github+json")
    }

    fn content_url(&self, path: &str) -> String {
        format!("{}/contents/{path}", self.repo_url)
    }

    /// See [`crate::provider::RepoStore::create`].
    pub async fn create(&self, path: &str, content: &str) -> Result<()> {
        let body = json!({
            "message": commit_message("create", path),
            "content": Base64::encode_string(content.as_bytes()),
        });
        let response =
            self.authorized(self.client.put(self.content_url(path))).json(&body).send().await?;
        if !response.status().is_success() {
            bail!("issue creating {path}: {}", response.status());
        }
        Ok(())
    }

    /// See [`crate::provider::RepoStore::get`].
    pub async fn get(&self, path: &str) -> Result<(String, String)> {
        let response = self.authorized(self.client.get(self.content_url(path))).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            bail!("file not found: {path}");
        }
        if !response.status().is_success() {
            bail!("issue reading {path}: {}", response.status());
        }

        let file: ContentFile = response.json().await?;
        // the API wraps base64 content in newlines
        let encoded: String = file.content.split_whitespace().collect();
        let bytes = Base64::decode_vec(&encoded).map_err(|e| anyhow!("issue decoding {path}: {e}"))?;
        Ok((String::from_utf8(bytes)?, file.sha))
    }

    /// See [`crate::provider::RepoStore::update`].
    pub async fn update(&self, path: &str, content: &str, token: &str) -> Result<()> {
        let body = json!({
            "message": commit_message("update", path),
            "content": Base64::encode_string(content.as_bytes()),
            "sha": token,
        });
        let response =
            self.authorized(self.client.put(self.content_url(path))).json(&body).send().await?;
        if response.status() == StatusCode::CONFLICT {
            bail!("{path} was modified concurrently");
        }
        if !response.status().is_success() {
            bail!("issue updating {path}: {}", response.status());
        }
        Ok(())
    }

    /// See [`crate::provider::RepoStore::delete`].
    pub async fn delete(&self, path: &str, token: &str) -> Result<()> {
        let body = json!({
            "message": commit_message("delete", path),
            "sha": token,
        });
        let response =
            self.authorized(self.client.delete(self.content_url(path))).json(&body).send().await?;
        if !response.status().is_success() {
            bail!("issue deleting {path}: {}", response.status());
        }
        Ok(())
    }

    /// See [`crate::provider::RepoStore::exists`].
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let response = self.authorized(self.client.get(self.content_url(path))).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            bail!("issue probing {path}: {}", response.status());
        }
        Ok(true)
    }

    /// See [`crate::provider::RepoStore::list_filenames`].
    pub async fn list_filenames(&self) -> Result<Vec<String>> {
        let response = self.authorized(self.client.get(self.content_url(""))).send().await?;
        // an empty repository has no root listing
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }
        if !response.status().is_success() {
            bail!("issue listing repository: {}", response.status());
        }

        let entries: Vec<ContentEntry> = response.json().await?;
        Ok(entries.into_iter().filter(|e| e.type_ == "file").map(|e| e.name).collect())
    }

    /// See [`crate::provider::RepoStore::repo_exists`].
    pub async fn repo_exists(&self) -> Result<bool> {
        let response = self.authorized(self.client.get(&self.repo_url)).send().await?;
        Ok(response.status() != StatusCode::NOT_FOUND)
    }

    /// See [`crate::provider::RepoStore::has_authority`].
    ///
    /// A missing repository reports `true`: authority is indeterminate and
    /// the follow-up existence probe gives the precise error.
    pub async fn has_authority(&self) -> Result<bool> {
        let response = self.authorized(self.client.get(&self.repo_url)).send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            StatusCode::NOT_FOUND => Ok(true),
            status if status.is_success() => {
                let repo: Repository = response.json().await?;
                Ok(repo.permissions.admin || repo.permissions.push || repo.permissions.pull)
            }
            status => bail!("issue probing repository authority: {status}"),
        }
    }

    /// See [`crate::provider::RepoStore::deploy_website`]. Requests a GitHub
    /// Pages build.
    pub async fn deploy_website(&self) -> Result<()> {
        let url = format!("{}/pages/builds", self.repo_url);
        let response = self.authorized(self.client.post(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::warn!("GitHub Pages is not configured; skipping deployment");
            return Ok(());
        }
        if !response.status().is_success() {
            bail!("issue requesting Pages build: {}", response.status());
        }
        Ok(())
    }
}
