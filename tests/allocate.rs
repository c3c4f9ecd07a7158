//! Status allocation: index assignment, idempotency, and input validation.

mod utils;

use credential_status_manager::{Error, OneMany, StatusPurpose};
use serde_json::json;
use utils::{credential, manager, options};

#[tokio::test]
async fn sequential_allocations_share_a_list() {
    let (manager, _, _) = manager(options()).await;

    let mut list_urls = Vec::new();
    for (n, id) in ["https://ex/3732", "https://ex/6274", "https://ex/0285"].iter().enumerate() {
        let allocated = manager
            .allocate_revocation_status(credential(id))
            .await
            .expect("should allocate");

        let status = allocated.credential_status.as_ref().expect("status should be set");
        let OneMany::One(entry) = status else {
            panic!("one purpose should serialize as a bare object");
        };
        assert_eq!(entry.type_, "BitstringStatusListEntry");
        assert_eq!(entry.status_purpose, StatusPurpose::Revocation);
        assert_eq!(entry.status_list_index, (n + 1).to_string(), "indices are 1-based");
        assert_eq!(entry.id, format!("{}#{}", entry.status_list_credential, n + 1));
        assert!(
            entry.status_list_credential.starts_with("https://issuer.github.io/status/"),
            "list is published under the owner's static site"
        );
        list_urls.push(entry.status_list_credential.clone());
    }

    assert_eq!(list_urls[0], list_urls[1]);
    assert_eq!(list_urls[1], list_urls[2]);

    let config = manager.config().await.expect("should read config");
    assert_eq!(config.credentials_issued_counter, 3);
    assert_eq!(config.event_log.len(), 3);
}

#[tokio::test]
async fn allocation_is_idempotent() {
    let (manager, _, _) = manager(options()).await;

    let first = manager
        .allocate_revocation_status(credential("https://ex/6274"))
        .await
        .expect("should allocate");
    let second = manager
        .allocate_revocation_status(credential("https://ex/6274"))
        .await
        .expect("should re-allocate");

    assert_eq!(first.credential_status, second.credential_status);

    let config = manager.config().await.expect("should read config");
    assert_eq!(config.credentials_issued_counter, 1, "counters unchanged on re-allocation");
    assert_eq!(config.event_log.len(), 1, "no second event log entry");
}

#[tokio::test]
async fn missing_id_gets_a_urn_uuid() {
    let (manager, _, _) = manager(options()).await;

    let mut subject = credential("https://ex/3732");
    subject.as_object_mut().expect("should be an object").remove("id");

    let allocated =
        manager.allocate_revocation_status(subject).await.expect("should allocate");
    assert!(allocated.id.as_deref().expect("id should be set").starts_with("urn:uuid:"));
}

#[tokio::test]
async fn both_purposes_yield_an_entry_array() {
    let (manager, _, _) = manager(options()).await;

    let allocated = manager
        .allocate_supported_statuses(credential("https://ex/3732"))
        .await
        .expect("should allocate");

    let Some(OneMany::Many(entries)) = &allocated.credential_status else {
        panic!("multiple purposes should serialize as an array");
    };
    assert_eq!(entries.len(), 2);
    let purposes: Vec<_> = entries.iter().map(|e| e.status_purpose).collect();
    assert!(purposes.contains(&StatusPurpose::Revocation));
    assert!(purposes.contains(&StatusPurpose::Suspension));
    assert_ne!(
        entries[0].status_list_credential, entries[1].status_list_credential,
        "each purpose rolls its own list"
    );

    let config = manager.config().await.expect("should read config");
    assert_eq!(config.credentials_issued_counter, 1, "one credential, however many purposes");
}

#[tokio::test]
async fn v1_context_gains_the_status_vocabulary() {
    let (manager, _, _) = manager(options()).await;

    let allocated = manager
        .allocate_revocation_status(credential("https://ex/3732"))
        .await
        .expect("should allocate");

    let context = serde_json::to_value(&allocated.context).expect("should serialize");
    assert_eq!(context[0], "https://www.w3.org/2018/credentials/v1");
    assert!(
        context
            .as_array()
            .expect("should be an array")
            .contains(&json!("https://www.w3.org/ns/credentials/status/v1")),
        "status context appended for the 1.1 dialect"
    );
}

#[tokio::test]
async fn incoming_status_and_proof_are_stripped() {
    let (manager, _, _) = manager(options()).await;

    let mut subject = credential("https://ex/3732");
    let object = subject.as_object_mut().expect("should be an object");
    object.insert("credentialStatus".to_string(), json!({"type": "SomethingElse"}));
    object.insert(
        "proof".to_string(),
        json!({
            "type": "Ed25519Signature2020",
            "created": "2026-01-01T00:00:00Z",
            "verificationMethod": "did:example:issuer#key-1",
            "proofPurpose": "assertionMethod",
            "proofValue": "z3FXQjecWufY"
        }),
    );

    let allocated =
        manager.allocate_revocation_status(subject).await.expect("should allocate");
    assert!(allocated.proof.is_none(), "user credentials are unsigned by default");
    let status = allocated.credential_status.as_ref().and_then(OneMany::as_one).expect("status");
    assert_eq!(status.type_, "BitstringStatusListEntry", "incoming status replaced");
}

#[tokio::test]
async fn malformed_inputs_are_rejected() {
    let (manager, _, _) = manager(options()).await;

    // compact JWT
    let err = manager
        .allocate_revocation_status(json!("eyJhbGciOiJFZERTQSJ9.eyJ2YyI6e319.c2ln"))
        .await
        .expect_err("should reject");
    assert!(matches!(err, Error::BadRequest(_)));

    // unsupported context dialect
    let err = manager
        .allocate_revocation_status(json!({
            "@context": ["https://www.w3.org/2020/credentials/v99"],
            "type": ["VerifiableCredential"],
            "issuer": "did:example:issuer"
        }))
        .await
        .expect_err("should reject");
    assert!(matches!(err, Error::BadRequest(_)));

    // id is neither URL, UUID URN, nor DID
    let err = manager
        .allocate_revocation_status(credential("credential-42"))
        .await
        .expect_err("should reject");
    assert!(matches!(err, Error::BadRequest(_)));

    // id too long
    let err = manager
        .allocate_revocation_status(credential(&format!("https://ex/{}", "a".repeat(64))))
        .await
        .expect_err("should reject");
    assert!(matches!(err, Error::BadRequest(_)));

    let config = manager.config().await.expect("should read config");
    assert_eq!(config.credentials_issued_counter, 0, "rejected inputs allocate nothing");
}

#[tokio::test]
async fn credential_info_records_issuer_and_subject() {
    let (manager, _, _) = manager(options()).await;

    manager
        .allocate_revocation_status(credential("https://ex/3732"))
        .await
        .expect("should allocate");

    let info =
        manager.get_credential_info("https://ex/3732").await.expect("should find credential");
    assert_eq!(info.id, "https://ex/3732");
    assert_eq!(info.issuer, "did:example:issuer");
    assert_eq!(info.subject.as_deref(), Some("did:example:ebfeb1f712ebc6f1c276e12ec21"));
    assert!(info.status_info[&StatusPurpose::Revocation].valid);

    let err = manager.get_credential_info("https://ex/unknown").await.expect_err("should fail");
    assert!(matches!(err, Error::NotFound(_)));
}
