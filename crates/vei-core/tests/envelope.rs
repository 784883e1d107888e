// crates/vei-core/tests/envelope.rs
// ============================================================================
// Module: Request Envelope Tests
// Description: Argument normalization, fingerprints, and call digests.
// Purpose: Pin the replay key so recorded fixtures stay addressable.
// ============================================================================

//! Request envelope and fingerprint tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions are permitted."
)]

use std::collections::HashSet;

use serde_json::json;
use vei_core::EnvelopeError;
use vei_core::OperationClass;
use vei_core::OperationId;
use vei_core::RequestEnvelope;
use vei_core::hashing::DEFAULT_HASH_ALGORITHM;
use vei_core::hashing::hash_bytes;
use vei_core::hashing::hash_canonical_json;
use vei_core::envelope::call_digest;
use vei_core::envelope::fingerprint;
use vei_core::envelope::normalize_args;

fn mail_send() -> OperationId {
    OperationId::new("mail", "send")
}

#[test]
fn null_args_normalize_to_empty_object() {
    let args = normalize_args(&mail_send(), serde_json::Value::Null).unwrap();
    assert!(args.is_empty());
}

#[test]
fn non_object_args_are_rejected() {
    for bad in [json!([1, 2]), json!("to"), json!(7), json!(true)] {
        let err = normalize_args(&mail_send(), bad).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidArguments { .. }));
    }
}

#[test]
fn fingerprint_ignores_key_order() {
    let a = normalize_args(&mail_send(), json!({"to": "a", "subj": "b"})).unwrap();
    let b = normalize_args(&mail_send(), json!({"subj": "b", "to": "a"})).unwrap();
    assert_eq!(fingerprint(1, 1, &mail_send(), &a).unwrap(), fingerprint(1, 1, &mail_send(), &b).unwrap());
}

#[test]
fn fingerprint_depends_on_seed_and_sequence() {
    let args = normalize_args(&mail_send(), json!({"to": "a"})).unwrap();
    let base = fingerprint(42_042, 1, &mail_send(), &args).unwrap();
    assert_ne!(base, fingerprint(42_043, 1, &mail_send(), &args).unwrap());
    assert_ne!(base, fingerprint(42_042, 2, &mail_send(), &args).unwrap());
    assert_eq!(base.as_str().len(), 64);
}

#[test]
fn call_digest_is_seed_and_sequence_free() {
    let first = RequestEnvelope::build(1, 1, mail_send(), OperationClass::WriteRisky, json!({"to": "a"})).unwrap();
    let second = RequestEnvelope::build(9, 5, mail_send(), OperationClass::WriteRisky, json!({"to": "a"})).unwrap();
    assert_eq!(first.call_digest, second.call_digest);
    assert_ne!(first.fingerprint, second.fingerprint);
    assert_eq!(first.call_digest, call_digest(&mail_send(), &first.args).unwrap());
}

#[test]
fn envelope_exposes_service_and_operation() {
    let envelope = RequestEnvelope::build(1, 3, mail_send(), OperationClass::WriteRisky, serde_json::Value::Null).unwrap();
    assert_eq!(envelope.service(), "mail");
    assert_eq!(envelope.operation_name(), "send");
    assert_eq!(envelope.sequence, 3);
    assert!(envelope.args.is_empty());
}

#[test]
fn operation_id_parses_dotted_form() {
    let parsed: OperationId = "erp.post_payment".parse().unwrap();
    assert_eq!(parsed.service().as_str(), "erp");
    assert_eq!(parsed.operation().as_str(), "post_payment");
    assert_eq!(parsed.to_string(), "erp.post_payment");
    assert!("nodot".parse::<OperationId>().is_err());
}

#[test]
fn digests_deduplicate_in_hash_sets() {
    let first = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &json!({"b": 1, "a": 2})).unwrap();
    let reordered = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &json!({"a": 2, "b": 1})).unwrap();
    let other = hash_bytes(DEFAULT_HASH_ALGORITHM, b"other");
    let unique: HashSet<_> = [first.clone(), reordered, other].into_iter().collect();
    assert_eq!(unique.len(), 2);
    assert!(unique.contains(&first));
}
