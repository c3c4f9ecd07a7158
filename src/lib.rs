//! # Credential Status Manager
//!
//! An issuer-side manager for [Bitstring Status List] credentials. Every
//! issued credential is assigned one bit per status purpose (`revocation`,
//! `suspension`) in a compressed bitstring embedded in a signed status
//! credential. Status credentials are published as static assets from a
//! Git-hosted repository, while a companion metadata repository carries the
//! authoritative `config.json` and, transiently, the `snapshot.json` used
//! for crash-consistent recovery.
//!
//! # Design
//!
//! The manager is generic over a [`RepoStore`] capability providing file
//! CRUD with optimistic-concurrency tokens. Two backends are bundled:
//! GitHub and GitLab, both addressed through their REST APIs. All mutating
//! entry points are serialized by a per-manager mutex and wrapped in a
//! snapshot/restore protocol so that a crash mid-operation rolls back to
//! the pre-operation state on the next call.
//!
//! [Bitstring Status List]: https://www.w3.org/TR/vc-bitstring-status-list/

pub mod core;
pub mod provider;
pub mod status;

mod config;
mod error;
mod identity;
mod manager;
mod model;
mod store;

pub use crate::config::{Config, EventLogEntry, Snapshot, StatusCredentialInfo, StatusState};
pub use crate::core::{Kind, OneMany};
pub use crate::error::{Error, Result};
pub use crate::identity::{DidMethod, Identity};
pub use crate::manager::{
    CredentialInfo, GitService, LIST_SIZE, MAX_CREDENTIAL_ID_LENGTH, Manager, Options,
    create_manager,
};
pub use crate::model::{
    CredentialSubject, Issuer, Proof, StatusEntry, StatusPurpose, VerifiableCredential,
};
pub use crate::provider::RepoStore;
pub use crate::store::{GitRepo, GithubRepo, GitlabRepo};
