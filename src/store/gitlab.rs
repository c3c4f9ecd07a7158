//! # GitLab Backend
//!
//! File CRUD against the GitLab [Repository Files API]. The
//! `last_commit_id` returned on every read serves as the
//! optimistic-concurrency token; file content is additionally verified
//! against the reported `content_sha256`.
//!
//! [Repository Files API]: https://docs.gitlab.com/ee/api/repository_files.html

use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use base64ct::{Base64, Encoding};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use super::commit_message;

const API_BASE: &str = "https://gitlab.com/api/v4";
const BRANCH: &str = "main";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Developer role, the minimum required to push.
const ACCESS_LEVEL_DEVELOPER: u64 = 30;

/// One GitLab project.
#[derive(Debug)]
pub struct GitlabRepo {
    client: Client,
    project_url: String,
    token: String,
}

/// A file returned by the Repository Files API.
#[derive(Deserialize)]
struct FileResponse {
    content: String,
    last_commit_id: String,
    #[serde(default)]
    content_sha256: Option<String>,
}

/// One entry of a repository tree listing.
#[derive(Deserialize)]
struct TreeEntry {
    name: String,
    #[serde(rename = "type")]
    type_: String,
}

/// Project metadata, reduced to the caller's access levels.
#[derive(Deserialize)]
struct Project {
    #[serde(default)]
    permissions: ProjectPermissions,
}

#[derive(Default, Deserialize)]
struct ProjectPermissions {
    project_access: Option<Access>,
    group_access: Option<Access>,
}

#[derive(Deserialize)]
struct Access {
    access_level: u64,
}

impl GitlabRepo {
    /// Address the project `project_id` with a personal access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(project_id: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("credential-status-manager")
            .build()?;

        Ok(Self {
            client,
            project_url: format!("{API_BASE}/projects/{project_id}"),
            token: token.to_string(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("PRIVATE-TOKEN", &self.token)
    }

    fn file_url(&self, path: &str) -> String {
        format!("{}/repository/files/{path}", self.project_url)
    }

    /// See [`crate::provider::RepoStore::create`].
    pub async fn create(&self, path: &str, content: &str) -> Result<()> {
        let body = json!({
            "branch": BRANCH,
            "content": Base64::encode_string(content.as_bytes()),
            "encoding": "base64",
            "commit_message": commit_message("create", path),
        });
        let response =
            self.authorized(self.client.post(self.file_url(path))).json(&body).send().await?;
        if !response.status().is_success() {
            bail!("issue creating {path}: {}", response.status());
        }
        Ok(())
    }

    /// See [`crate::provider::RepoStore::get`].
    pub async fn get(&self, path: &str) -> Result<(String, String)> {
        let response = self
            .authorized(self.client.get(self.file_url(path)))
            .query(&[("ref", BRANCH)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            bail!("file not found: {path}");
        }
        if !response.status().is_success() {
            bail!("issue reading {path}: {}", response.status());
        }

        let file: FileResponse = response.json().await?;
        let encoded: String = file.content.split_whitespace().collect();
        let bytes = Base64::decode_vec(&encoded).map_err(|e| anyhow!("issue decoding {path}: {e}"))?;

        if let Some(expected) = &file.content_sha256 {
            let digest = hex(Sha256::digest(&bytes).as_slice());
            if digest != *expected {
                bail!("content digest mismatch for {path}");
            }
        }

        Ok((String::from_utf8(bytes)?, file.last_commit_id))
    }

    /// See [`crate::provider::RepoStore::update`].
    pub async fn update(&self, path: &str, content: &str, token: &str) -> Result<()> {
        let body = json!({
            "branch": BRANCH,
            "content": Base64::encode_string(content.as_bytes()),
            "encoding": "base64",
            "commit_message": commit_message("update", path),
            "last_commit_id": token,
        });
        let response =
            self.authorized(self.client.put(self.file_url(path))).json(&body).send().await?;
        if response.status() == StatusCode::BAD_REQUEST || response.status() == StatusCode::CONFLICT
        {
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
            "branch": BRANCH,
            "commit_message": commit_message("delete", path),
            "last_commit_id": token,
        });
        let response =
            self.authorized(self.client.delete(self.file_url(path))).json(&body).send().await?;
        if !response.status().is_success() {
            bail!("issue deleting {path}: {}", response.status());
        }
        Ok(())
    }

    /// See [`crate::provider::RepoStore::exists`].
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let response = self
            .authorized(self.client.head(self.file_url(path)))
            .query(&[("ref", BRANCH)])
            .send()
            .await?;
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
        let url = format!("{}/repository/tree", self.project_url);
        let response = self
            .authorized(self.client.get(url))
            .query(&[("ref", BRANCH), ("per_page", "100")])
            .send()
            .await?;
        // an empty project has no tree
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }
        if !response.status().is_success() {
            bail!("issue listing project tree: {}", response.status());
        }

        let entries: Vec<TreeEntry> = response.json().await?;
        Ok(entries.into_iter().filter(|e| e.type_ == "blob").map(|e| e.name).collect())
    }

    /// See [`crate::provider::RepoStore::repo_exists`].
    pub async fn repo_exists(&self) -> Result<bool> {
        let response = self.authorized(self.client.get(&self.project_url)).send().await?;
        Ok(response.status() != StatusCode::NOT_FOUND)
    }

    /// See [`crate::provider::RepoStore::has_authority`].
    ///
    /// A missing project reports `true`: authority is indeterminate and
    /// the follow-up existence probe gives the precise error.
    pub async fn has_authority(&self) -> Result<bool> {
        let response = self.authorized(self.client.get(&self.project_url)).send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            StatusCode::NOT_FOUND => Ok(true),
            status if status.is_success() => {
                let project: Project = response.json().await?;
                let level = |access: Option<Access>| access.map_or(0, |a| a.access_level);
                Ok(level(project.permissions.project_access).max(level(project.permissions.group_access))
                    >= ACCESS_LEVEL_DEVELOPER)
            }
            status => bail!("issue probing project authority: {status}"),
        }
    }

    /// See [`crate::provider::RepoStore::deploy_website`]. Triggers the
    /// project pipeline that publishes GitLab Pages.
    pub async fn deploy_website(&self) -> Result<()> {
        let url = format!("{}/pipeline", self.project_url);
        let response =
            self.authorized(self.client.post(url)).json(&json!({"ref": BRANCH})).send().await?;
        if response.status() == StatusCode::BAD_REQUEST || response.status() == StatusCode::NOT_FOUND
        {
            tracing::warn!("no Pages pipeline configured; skipping deployment");
            return Ok(());
        }
        if !response.status().is_success() {
            bail!("issue triggering Pages pipeline: {}", response.status());
        }
        Ok(())
    }
}

/// Lowercase hex of a digest.
fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
