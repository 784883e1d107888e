// crates/vei-core/tests/router.rs
// ============================================================================
// Module: Connector Router Tests
// Description: Dispatch ordering, receipts, redaction, and audit events.
// Purpose: Verify the router's invariants end to end.
// ============================================================================

//! Connector router tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions are permitted."
)]

mod common;

use std::sync::Arc;

use common::FailingSink;
use common::TestResult;
use common::config;
use common::sim_session;
use common::sink;
use serde_json::json;
use vei_core::PolicyAction;
use vei_core::ResultStatus;
use vei_core::RouterError;
use vei_core::Timestamp;
use vei_core::runtime::InMemoryReceiptSink;
use vei_core::runtime::MemoryAuditSink;
use vei_core::runtime::Session;

#[test]
fn unknown_operations_consume_no_sequence() -> TestResult {
    let mut session = sim_session(1)?;
    let err = session.dispatch("mail", "teleport", json!({})).unwrap_err();
    assert!(matches!(err, RouterError::UnknownOperation(ref name) if name == "mail.teleport"));
    assert_eq!(session.sequence(), 0);
    assert!(session.receipts().is_empty());
    let next = session.dispatch("browser", "read", json!({}))?;
    assert_eq!(next.request.sequence, 1);
    Ok(())
}

#[test]
fn invalid_arguments_consume_no_sequence() -> TestResult {
    let mut session = sim_session(1)?;
    let err = session.dispatch("mail", "send", json!(["vendor"])).unwrap_err();
    assert!(matches!(err, RouterError::InvalidArguments(_)));
    assert_eq!(session.sequence(), 0);
    Ok(())
}

#[test]
fn sequences_are_contiguous_across_outcomes() -> TestResult {
    let mut session = sim_session(1)?;
    session.dispatch("browser", "read", json!({}))?;
    session.dispatch("mail", "send", json!({"to": "a"}))?;
    session.dispatch("approvals", "list", json!({}))?;
    let sequences: Vec<u64> = session.receipts().iter().map(|receipt| receipt.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn pending_calls_never_reach_the_adapter() -> TestResult {
    let mut session = sim_session(1)?;
    let dispatch = session.dispatch("mail", "send", json!({"to": "a"}))?;
    assert_eq!(dispatch.decision.action, PolicyAction::RequireApproval);
    assert!(session.world().records("mail").is_empty());
    assert!(session.recorded_fixtures().is_empty());
    assert_eq!(dispatch.receipt.result_status, ResultStatus::Pending);
    Ok(())
}

#[test]
fn denied_calls_never_reach_the_adapter() -> TestResult {
    let mut cfg = config(1);
    cfg.gate.write_safe_enabled = false;
    let mut session = Session::new(cfg)?;
    let dispatch = session.dispatch("slack", "post", json!({"channel": "#ops", "text": "hi"}))?;
    assert_eq!(dispatch.decision.action, PolicyAction::Deny);
    assert!(session.world().records("slack").is_empty());
    assert!(dispatch.receipt.redacted_result["error"]["message"].as_str().unwrap().contains("write_safe_disabled"));
    Ok(())
}

#[test]
fn receipts_are_redacted_but_results_are_not() -> TestResult {
    let mut session = sim_session(1)?;
    let dispatch = session.dispatch(
        "tickets",
        "create",
        json!({
            "title": "Call 555-123-4567",
            "reporter": "ada@example.com",
            "password": "hunter2",
            "note": "key sk_live12345678",
        }),
    )?;
    let args = &dispatch.receipt.redacted_args;
    assert_eq!(args["title"], json!("Call [REDACTED_PHONE]"));
    assert_eq!(args["reporter"], json!("[REDACTED_EMAIL]"));
    assert_eq!(args["password"], json!("[REDACTED]"));
    assert_eq!(args["note"], json!("key [REDACTED_KEY]"));
    assert_eq!(dispatch.request.args["reporter"], json!("ada@example.com"));
    let record = &session.world().records("tickets")[0];
    assert_eq!(record["args"]["reporter"], json!("ada@example.com"));
    Ok(())
}

#[test]
fn receipts_carry_logical_timestamps() -> TestResult {
    let mut session = sim_session(1)?;
    session.dispatch("browser", "read", json!({}))?;
    session.dispatch("browser", "read", json!({}))?;
    let stamps: Vec<Timestamp> = session.receipts().iter().map(|receipt| receipt.timestamp).collect();
    assert_eq!(stamps, vec![Timestamp::Logical(1), Timestamp::Logical(2)]);
    Ok(())
}

#[test]
fn receipts_reach_the_external_sink() -> TestResult {
    let store = InMemoryReceiptSink::new();
    let mut session = Session::builder(config(1)).receipt_sink(sink(store.clone())).build()?;
    session.dispatch("browser", "read", json!({}))?;
    session.dispatch("mail", "send", json!({"to": "a"}))?;
    let persisted = store.receipts_for(session.id())?;
    assert_eq!(persisted, session.receipts());
    assert_eq!(store.receipt_count()?, 2);
    Ok(())
}

#[test]
fn sink_failures_surface_after_the_call_is_logged() -> TestResult {
    let mut session = Session::builder(config(1)).receipt_sink(sink(FailingSink)).build()?;
    let err = session.dispatch("browser", "read", json!({})).unwrap_err();
    assert!(matches!(err, RouterError::ReceiptPersistence(_)));
    assert_eq!(session.receipts().len(), 1);
    assert_eq!(session.sequence(), 1);
    assert!(matches!(session.close(), Err(RouterError::ReceiptPersistence(_))));
    Ok(())
}

#[test]
fn closed_sessions_refuse_dispatch() -> TestResult {
    let mut session = sim_session(1)?;
    session.close()?;
    assert!(session.is_closed());
    let err = session.dispatch("browser", "read", json!({})).unwrap_err();
    assert!(matches!(err, RouterError::SessionClosed(_)));
    Ok(())
}

#[test]
fn audit_events_follow_dispatches_and_approvals() -> TestResult {
    let audit = Arc::new(MemoryAuditSink::new());
    let mut session = Session::builder(config(1)).audit_sink(audit.clone()).build()?;
    session.dispatch("browser", "read", json!({}))?;
    session.dispatch("mail", "send", json!({"to": "a"}))?;
    session.approve(&"mail.send".parse()?)?;

    let events = audit.events();
    let kinds: Vec<&str> = events.iter().filter_map(|event| event["event"].as_str()).collect();
    assert_eq!(kinds, vec!["dispatch", "approval", "dispatch", "approval", "dispatch"]);
    assert_eq!(events[0]["mode"], json!("sim"));
    assert_eq!(events[0]["decision"], json!("allow"));
    assert_eq!(events[1]["resolution"], json!("unresolved"));
    assert_eq!(events[2]["decision"], json!("require_approval"));
    assert_eq!(events[3]["resolution"], json!("approved"));
    assert_eq!(events[4]["reason"], json!("control"));
    Ok(())
}
