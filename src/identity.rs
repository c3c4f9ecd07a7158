//! # Issuer Identity
//!
//! Derives the issuer DID and verification method from a seed and signs
//! credentials with an `Ed25519Signature2020` data-integrity proof. The
//! signature covers the canonical (key-sorted) JSON serialization of the
//! proof-less credential, in the manner of `JcsEd25519Signature2020`.

use chrono::Utc;
use ed25519_dalek::{Signer as _, SigningKey};
use multibase::Base;
use serde::{Deserialize, Serialize};

use crate::core::OneMany;
use crate::error::{Error, Result};
use crate::model::{Proof, VerifiableCredential};

/// Multicodec prefix for an Ed25519 public key.
const ED25519_CODEC: [u8; 2] = [0xed, 0x01];

/// Supported DID methods for the issuer identity.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DidMethod {
    /// `did:key`: the DID is derived from the public key alone.
    #[default]
    Key,

    /// `did:web`: the DID is derived from an HTTPS URL under the issuer's
    /// control.
    Web,
}

/// The issuer's signing identity, derived once at manager creation.
#[derive(Clone)]
pub struct Identity {
    did: String,
    verification_method: String,
    signing_key: SigningKey,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // key material stays out of logs
        f.debug_struct("Identity")
            .field("did", &self.did)
            .field("verification_method", &self.verification_method)
            .finish_non_exhaustive()
    }
}

impl Identity {
    /// Derive an identity from a DID method and seed.
    ///
    /// The seed is either a multibase-encoded value (prefix `z`) decoding
    /// to exactly 32 bytes, or a UTF-8 string of at least 32 bytes of which
    /// the first 32 are used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDidSeed`] for any other seed shape, and
    /// [`Error::BadRequest`] when `did:web` is requested without a URL.
    pub fn derive(method: DidMethod, seed: &str, web_url: Option<&str>) -> Result<Self> {
        let signing_key = SigningKey::from_bytes(&seed_bytes(seed)?);
        let fingerprint = fingerprint(&signing_key);

        let did = match method {
            DidMethod::Key => format!("did:key:{fingerprint}"),
            DidMethod::Web => {
                let Some(url) = web_url else {
                    return Err(Error::BadRequest(
                        "'didWebUrl' is required with the 'web' DID method".to_string(),
                    ));
                };
                did_web(url)
            }
        };

        Ok(Self {
            verification_method: format!("{did}#{fingerprint}"),
            did,
            signing_key,
        })
    }

    /// The issuer DID.
    #[must_use]
    pub fn did(&self) -> &str {
        &self.did
    }

    /// The DID URL of the verification method proofs refer to.
    #[must_use]
    pub fn verification_method(&self) -> &str {
        &self.verification_method
    }

    /// Attach an `Ed25519Signature2020` proof dated at sign time.
    ///
    /// Any existing proof is discarded before signing.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential cannot be serialized.
    pub fn sign(&self, credential: &VerifiableCredential) -> Result<VerifiableCredential> {
        let mut unsigned = credential.clone();
        unsigned.proof = None;

        // canonical form: serde_json object keys are ordered
        let canonical = serde_json::to_string(&serde_json::to_value(&unsigned)?)?;
        let signature = self.signing_key.sign(canonical.as_bytes());

        unsigned.proof = Some(OneMany::One(Proof {
            type_: "Ed25519Signature2020".to_string(),
            created: Utc::now(),
            verification_method: self.verification_method.clone(),
            proof_purpose: "assertionMethod".to_string(),
            proof_value: multibase::encode(Base::Base58Btc, signature.to_bytes()),
        }));

        Ok(unsigned)
    }
}

/// Resolve the raw 32-byte signing seed from its textual form.
fn seed_bytes(seed: &str) -> Result<[u8; 32]> {
    if seed.starts_with('z') {
        let (_, decoded) = multibase::decode(seed)
            .map_err(|e| Error::InvalidDidSeed(format!("issue decoding multibase seed: {e}")))?;
        return decoded.try_into().map_err(|decoded: Vec<u8>| {
            Error::InvalidDidSeed(format!("multibase seed is {} bytes, expected 32", decoded.len()))
        });
    }

    let bytes = seed.as_bytes();
    if bytes.len() < 32 {
        return Err(Error::InvalidDidSeed(
            "seed must be multibase-encoded or at least 32 bytes".to_string(),
        ));
    }
    let mut first32 = [0u8; 32];
    first32.copy_from_slice(&bytes[..32]);
    Ok(first32)
}

/// Multibase fingerprint of the public key, per the `did:key` method.
fn fingerprint(signing_key: &SigningKey) -> String {
    let mut multicodec = ED25519_CODEC.to_vec();
    multicodec.extend_from_slice(signing_key.verifying_key().as_bytes());
    multibase::encode(Base::Base58Btc, multicodec)
}

/// Transform an HTTPS URL into a `did:web` identifier.
fn did_web(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
        .trim_end_matches('/');
    format!("did:web:{}", stripped.replace(':', "%3A").replace('/', ":"))
}
