//! # Status Lists
//!
//! The bitstring codec and the composition of status list credentials
//! suitable for publishing as static assets.

pub mod bitstring;

use anyhow::Result;
use chrono::Utc;
use serde_json::{Map, Value, json};

pub use self::bitstring::StatusList;
use crate::core::{Kind, OneMany};
use crate::model::{
    CONTEXT_V2, CredentialSubject, STATUS_CREDENTIAL_TYPE, STATUS_LIST_TYPE, StatusPurpose,
    VerifiableCredential,
};

/// Build a status list credential for publishing.
///
/// The credential's `id` is the URL the list is published under and its
/// subject is the encoded bitstring. When `list` is absent a zeroed list of
/// `length` bits is encoded. No proof is attached here; signing is the
/// caller's choice.
///
/// # Errors
///
/// Returns an error if the bitstring cannot be encoded.
pub fn compose_status_credential(
    issuer: &str, url_id: &str, purpose: StatusPurpose, list: Option<StatusList>, length: usize,
) -> Result<VerifiableCredential> {
    let list = list.unwrap_or_else(|| StatusList::new(length));
    let encoded_list = list.encode()?;

    let mut claims = Map::new();
    claims.insert("type".to_string(), Value::String(STATUS_LIST_TYPE.to_string()));
    claims.insert("statusPurpose".to_string(), json!(purpose));
    claims.insert("encodedList".to_string(), Value::String(encoded_list));

    Ok(VerifiableCredential {
        context: vec![Kind::String(CONTEXT_V2.to_string())],
        id: Some(url_id.to_string()),
        type_: OneMany::Many(vec![
            "VerifiableCredential".to_string(),
            STATUS_CREDENTIAL_TYPE.to_string(),
        ]),
        issuer: Kind::String(issuer.to_string()),
        valid_from: Some(Utc::now()),
        credential_subject: Some(OneMany::One(CredentialSubject {
            id: Some(format!("{url_id}#list")),
            claims,
        })),
        ..VerifiableCredential::default()
    })
}
