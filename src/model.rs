//! # Verifiable Credential Model
//!
//! A deliberately narrow subset of the W3C Verifiable Credentials data
//! model. User credentials are schema-loose JSON: only the properties this
//! crate reads or writes are typed, everything else round-trips untouched
//! through the flattened `extra` map.

use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{Kind, OneMany};

/// First `@context` element for the VC data model v1.1.
pub const CONTEXT_V1: &str = "https://www.w3.org/2018/credentials/v1";

/// First `@context` element for the VC data model v2.0.
pub const CONTEXT_V2: &str = "https://www.w3.org/ns/credentials/v2";

/// Context term definitions for Bitstring Status List properties. Required
/// alongside [`CONTEXT_V1`]; already bundled by [`CONTEXT_V2`].
pub const CONTEXT_STATUS: &str = "https://www.w3.org/ns/credentials/status/v1";

/// `type` entry carried by every status list credential.
pub const STATUS_CREDENTIAL_TYPE: &str = "BitstringStatusListCredential";

/// `credentialSubject.type` of a status list credential.
pub const STATUS_LIST_TYPE: &str = "BitstringStatusList";

/// `credentialStatus.type` of a user credential's status entry.
pub const STATUS_ENTRY_TYPE: &str = "BitstringStatusListEntry";

/// `VerifiableCredential` captures the properties of a credential that the
/// status manager manipulates. Unknown properties are preserved in `extra`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifiableCredential {
    /// The @context property is used to map property URIs into short-form
    /// aliases. It is an ordered set whose first item determines the
    /// data-model dialect: "`https://www.w3.org/2018/credentials/v1`" for
    /// v1.1 or "`https://www.w3.org/ns/credentials/v2`" for v2.0.
    /// Subsequent items may be composed of any combination of URLs and/or
    /// objects, each processable as a [JSON-LD Context](https://www.w3.org/TR/json-ld11/#the-context).
    #[serde(rename = "@context")]
    pub context: Vec<Kind<Value>>,

    /// The id property is OPTIONAL. If present, the id property's value
    /// MUST be a single URL, a UUID URN, or a DID, which MAY be
    /// dereferenceable. For example,
    /// "`http://example.edu/credentials/3732`". The id doubles as the
    /// allocation key: a credential arriving without one is assigned a
    /// `urn:uuid` before any status is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The type property is used to determine whether or not a provided
    /// verifiable credential is appropriate for the intended use-case. It
    /// is an unordered set of terms or URIs (full or relative to
    /// @context) and always contains `VerifiableCredential`.
    #[serde(rename = "type")]
    pub type_: OneMany<String>,

    /// A URI or object with an id property. It is RECOMMENDED that the
    /// URI/object id, if dereferenced, results in machine-readable
    /// information about the issuer that can be used to verify credential
    /// information.
    pub issuer: Kind<Issuer>,

    /// An XMLSCHEMA11-2 (RFC3339) date-time the credential becomes valid.
    /// e.g. 2010-01-01T19:23:24Z.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,

    /// A set of objects containing claims about credential subject(s).
    /// Each object MAY carry an id property identifying the subject it
    /// describes; the first such id found is recorded in the event log
    /// alongside the credential's status assignment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_subject: Option<OneMany<CredentialSubject>>,

    /// Status entries assigned by the allocator: one object per purpose,
    /// serialized as a bare object when there is exactly one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<OneMany<StatusEntry>>,

    /// Cryptographic proof(s) over the credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<OneMany<Proof>>,

    /// Properties outside this crate's concern, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VerifiableCredential {
    /// The issuer URI, whichever shape the `issuer` property takes.
    #[must_use]
    pub fn issuer_id(&self) -> &str {
        match &self.issuer {
            Kind::String(id) => id,
            Kind::Object(issuer) => &issuer.id,
        }
    }

    /// The first subject's `id`, if any subject carries one.
    #[must_use]
    pub fn subject_id(&self) -> Option<&str> {
        let subject = self.credential_subject.as_ref()?;
        subject.iter().find_map(|s| s.id.as_deref())
    }
}

/// Issuer identifies the issuer of the credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Issuer {
    /// The issuer URI.
    pub id: String,

    /// Issuer-specific fields expressing additional information about the
    /// issuer.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `CredentialSubject` holds claims about the subject(s) referenced by the
/// credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialSubject {
    /// A URI uniquely identifying the subject of the claims.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Claims about the subject.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// A `BitstringStatusListEntry` associating a credential with one bit of a
/// published status list.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    /// The list URL suffixed with `#<index>`.
    pub id: String,

    /// Always `BitstringStatusListEntry`.
    #[serde(rename = "type")]
    pub type_: String,

    /// The purpose of the referenced status bit.
    pub status_purpose: StatusPurpose,

    /// Position of the status bit in the list, as a decimal string.
    /// Positions are 1-based: index 0 is never assigned.
    pub status_list_index: String,

    /// URL of the status list credential holding the bit.
    pub status_list_credential: String,
}

/// `StatusPurpose` is the meaning carried by one status bit.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "camelCase")]
pub enum StatusPurpose {
    /// Permanently cancels the validity of a credential.
    #[default]
    Revocation,

    /// Temporarily suspends the validity of a credential.
    Suspension,
}

impl StatusPurpose {
    /// The purposes this manager tracks for every issued credential.
    pub const SUPPORTED: [Self; 2] = [Self::Revocation, Self::Suspension];
}

impl Display for StatusPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revocation => write!(f, "revocation"),
            Self::Suspension => write!(f, "suspension"),
        }
    }
}

impl FromStr for StatusPurpose {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "revocation" => Ok(Self::Revocation),
            "suspension" => Ok(Self::Suspension),
            _ => bail!("unknown status purpose: {s}"),
        }
    }
}

/// An `Ed25519Signature2020` data-integrity proof.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    /// The proof suite. Always `Ed25519Signature2020`.
    #[serde(rename = "type")]
    pub type_: String,

    /// RFC-3339 date-time the proof was created.
    pub created: DateTime<Utc>,

    /// DID URL of the public key verifying the proof.
    pub verification_method: String,

    /// The relationship between the proof and the credential. Always
    /// `assertionMethod` for issuance.
    pub proof_purpose: String,

    /// Multibase-encoded signature value.
    pub proof_value: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn loose_round_trip() {
        let source = json!({
            "@context": [CONTEXT_V1, "https://www.w3.org/2018/credentials/examples/v1"],
            "id": "https://example.com/credentials/3732",
            "type": ["VerifiableCredential", "EmployeeIDCredential"],
            "issuer": "https://example.com/issuers/14",
            "credentialSubject": {
                "id": "did:example:ebfeb1f712ebc6f1c276e12ec21",
                "employeeId": "1234567890"
            },
            "expirationDate": "2033-12-20T23:21:55Z"
        });

        let vc: VerifiableCredential =
            serde_json::from_value(source.clone()).expect("should deserialize");
        assert_eq!(vc.issuer_id(), "https://example.com/issuers/14");
        assert_eq!(vc.subject_id(), Some("did:example:ebfeb1f712ebc6f1c276e12ec21"));
        assert!(vc.extra.contains_key("expirationDate"), "unknown properties preserved");

        let round_tripped = serde_json::to_value(&vc).expect("should serialize");
        assert_eq!(round_tripped, source);
    }

    #[test]
    fn issuer_as_object() {
        let vc: VerifiableCredential = serde_json::from_value(json!({
            "@context": [CONTEXT_V2],
            "type": "VerifiableCredential",
            "issuer": {"id": "did:web:example.com", "name": "Example"},
        }))
        .expect("should deserialize");
        assert_eq!(vc.issuer_id(), "did:web:example.com");
    }

    #[test]
    fn purpose_strings() {
        assert_eq!(StatusPurpose::Revocation.to_string(), "revocation");
        assert_eq!(
            "suspension".parse::<StatusPurpose>().expect("should parse"),
            StatusPurpose::Suspension
        );
        assert!("message".parse::<StatusPurpose>().is_err());
    }

    #[test]
    fn single_status_serializes_as_object() {
        let vc = VerifiableCredential {
            credential_status: Some(OneMany::One(StatusEntry {
                id: "https://example.github.io/status/ABC#1".to_string(),
                type_: STATUS_ENTRY_TYPE.to_string(),
                status_purpose: StatusPurpose::Revocation,
                status_list_index: "1".to_string(),
                status_list_credential: "https://example.github.io/status/ABC".to_string(),
            })),
            ..VerifiableCredential::default()
        };

        let json = serde_json::to_value(&vc).expect("should serialize");
        assert!(json["credentialStatus"].is_object(), "one entry is a bare object");
        assert_eq!(json["credentialStatus"]["statusListIndex"], json!("1"));
    }
}
