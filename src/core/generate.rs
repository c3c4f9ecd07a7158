//! # Identifier Generation
//!
//! Random identifiers for status credentials and user credentials that
//! arrive without an `id`.

use rand::Rng;
use uuid::Uuid;

/// Length of a status credential identifier.
pub const STATUS_CREDENTIAL_ID_LENGTH: usize = 20;

/// Character set for status credential identifiers.
const ALPHABET: &[u8] = b"012ABCDEFGHIJKLMnopqrstuvwxyz3456abcdefghijklmNOPQRSTUVWXYZ789";

/// Generate a random status credential identifier. The identifier doubles
/// as the credential's filename in the status repository.
#[must_use]
pub fn status_credential_id() -> String {
    let mut rng = rand::rng();
    (0..STATUS_CREDENTIAL_ID_LENGTH)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect()
}

/// Generate a `urn:uuid` identifier for a credential issued without one.
#[must_use]
pub fn urn_uuid() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}
