// crates/vei-core/tests/receipt_sinks.rs
// ============================================================================
// Module: Receipt Sink Tests
// Description: JSON lines and in-memory receipt persistence.
// Purpose: Ensure receipts survive the session in append order.
// ============================================================================

//! Receipt sink and audit file tests.

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

use common::TestResult;
use common::config;
use common::sink;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use vei_core::Receipt;
use vei_core::SessionId;
use vei_core::runtime::FileAuditSink;
use vei_core::runtime::InMemoryReceiptSink;
use vei_core::runtime::JsonlReceiptSink;
use vei_core::runtime::Session;
use vei_core::runtime::SessionConfig;

fn named(session: &str) -> SessionConfig {
    SessionConfig {
        session_id: SessionId::new(session),
        ..config(9)
    }
}

fn lines(path: &std::path::Path) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().map(serde_json::from_str).collect::<Result<Vec<Value>, _>>()?)
}

#[test]
fn jsonl_sink_appends_one_line_per_receipt() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("receipts").join("episode.jsonl");
    let store = JsonlReceiptSink::open(&path)?;
    let mut session = Session::builder(named("jsonl")).receipt_sink(sink(store)).build()?;
    session.dispatch("browser", "read", json!({}))?;
    session.dispatch("mail", "send", json!({"to": "ada@example.com"}))?;
    session.close()?;

    let records = lines(&path)?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["session_id"], json!("jsonl"));
    let second: Receipt = serde_json::from_value(records[1]["receipt"].clone())?;
    assert_eq!(&second, &session.receipts()[1]);
    assert_eq!(second.redacted_args["to"], json!("[REDACTED_EMAIL]"));
    Ok(())
}

#[test]
fn jsonl_lines_are_canonical() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("receipts.jsonl");
    let mut session = Session::builder(named("canon")).receipt_sink(sink(JsonlReceiptSink::open(&path)?)).build()?;
    session.dispatch("tickets", "create", json!({"zeta": 1, "alpha": 2}))?;
    session.close()?;
    let text = std::fs::read_to_string(&path)?;
    let line = text.lines().next().unwrap();
    assert!(line.find("\"alpha\"").unwrap() < line.find("\"zeta\"").unwrap());
    assert!(!line.contains(": "));
    Ok(())
}

#[test]
fn jsonl_sink_appends_across_sessions() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("shared.jsonl");
    for name in ["first", "second"] {
        let mut session =
            Session::builder(named(name)).receipt_sink(sink(JsonlReceiptSink::open(&path)?)).build()?;
        session.dispatch("browser", "read", json!({}))?;
        session.close()?;
    }
    let sessions: Vec<Value> = lines(&path)?.into_iter().map(|record| record["session_id"].clone()).collect();
    assert_eq!(sessions, vec![json!("first"), json!("second")]);
    Ok(())
}

#[test]
fn in_memory_sink_separates_sessions() -> TestResult {
    let store = InMemoryReceiptSink::new();
    for name in ["a", "b"] {
        let mut session = Session::builder(named(name)).receipt_sink(sink(store.clone())).build()?;
        session.dispatch("browser", "read", json!({}))?;
        session.dispatch("browser", "read", json!({}))?;
    }
    assert_eq!(store.receipt_count()?, 4);
    let a = store.receipts_for(&SessionId::new("a"))?;
    assert_eq!(a.iter().map(|receipt| receipt.sequence).collect::<Vec<_>>(), vec![1, 2]);
    assert!(store.receipts_for(&SessionId::new("missing"))?.is_empty());
    Ok(())
}

#[test]
fn file_audit_sink_writes_json_lines() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("audit.jsonl");
    let audit = Arc::new(FileAuditSink::new(&path)?);
    let mut session = Session::builder(named("audit")).audit_sink(audit).build()?;
    session.dispatch("mail", "send", json!({"to": "a"}))?;
    let events = lines(&path)?;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"], json!("approval"));
    assert_eq!(events[1]["event"], json!("dispatch"));
    assert_eq!(events[1]["session_id"], json!("audit"));
    Ok(())
}
