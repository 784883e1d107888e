// crates/vei-core/tests/common/mod.rs
// ============================================================================
// Module: VEI Core Test Helpers
// Description: Shared sessions, workflows, and fake collaborators.
// Purpose: Keep integration tests focused on behavior instead of setup.
// ============================================================================

//! Shared helpers for vei-core integration tests.

#![allow(dead_code, reason = "Each test binary uses a different subset of helpers.")]

use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use vei_core::OperationRegistry;
use vei_core::Receipt;
use vei_core::ReceiptSink;
use vei_core::ReceiptSinkError;
use vei_core::SessionId;
use vei_core::WorkflowSource;
use vei_core::runtime::Session;
use vei_core::runtime::SessionConfig;

/// Result alias used by integration tests.
pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Seed used by the reference scenario.
pub const SCENARIO_SEED: u64 = 42_042;

/// Builds a session config with the given seed and defaults elsewhere.
pub fn config(seed: u64) -> SessionConfig {
    SessionConfig {
        seed,
        ..SessionConfig::default()
    }
}

/// Builds a sim session over the enterprise catalog.
pub fn sim_session(seed: u64) -> Result<Session, Box<dyn std::error::Error>> {
    Ok(Session::new(config(seed))?)
}

/// Returns the enterprise catalog.
pub fn registry() -> Result<OperationRegistry, Box<dyn std::error::Error>> {
    Ok(OperationRegistry::enterprise()?)
}

/// Builds a workflow source from JSON.
pub fn workflow(value: Value) -> Result<WorkflowSource, Box<dyn std::error::Error>> {
    Ok(serde_json::from_value(value)?)
}

/// The seed 42042 reference scenario.
pub fn scenario_source() -> Result<WorkflowSource, Box<dyn std::error::Error>> {
    workflow(json!({
        "name": "vendor-quote-followup",
        "objective": {
            "statement": "Read the vendor quote, notify procurement, and mail the vendor.",
            "success": ["vendor mailed after approval"]
        },
        "world": {
            "browser": { "read": { "title": "Quote #42", "total": 1200 } },
            "mail": { "inbox": [] }
        },
        "actors": [{ "actor_id": "buyer", "role": "procurement" }],
        "approvals": [{ "stage": "vendor-mail", "approver": "manager" }],
        "steps": [
            {
                "id": "read",
                "call": { "service": "browser", "operation": "read", "args": {} },
                "expect": [{ "kind": "field_present", "field": "view.title" }]
            },
            {
                "id": "post",
                "call": {
                    "service": "slack",
                    "operation": "post",
                    "args": { "channel": "#procurement", "text": "Quote: ${steps.read.view.title}" }
                }
            },
            {
                "id": "retry_approval",
                "call": {
                    "service": "approvals",
                    "operation": "status",
                    "args": { "service": "mail", "operation": "send" }
                }
            },
            {
                "id": "send",
                "call": {
                    "service": "mail",
                    "operation": "send",
                    "args": { "to": "vendor@example.com", "subj": "${world.browser.read.title}" }
                },
                "on_failure": "jump:retry_approval"
            }
        ],
        "success": [{ "kind": "step_succeeded", "step": "send" }],
        "tags": ["procurement"]
    }))
}

/// Receipt sink that always fails.
pub struct FailingSink;

impl ReceiptSink for FailingSink {
    fn append(&self, _session: &SessionId, _receipt: &Receipt) -> Result<(), ReceiptSinkError> {
        Err(ReceiptSinkError::Io("disk full".to_string()))
    }

    fn flush(&self) -> Result<(), ReceiptSinkError> {
        Err(ReceiptSinkError::Io("disk full".to_string()))
    }
}

/// Receipt sink that accepts appends but fails to flush.
pub struct FlushFailingSink;

impl ReceiptSink for FlushFailingSink {
    fn append(&self, _session: &SessionId, _receipt: &Receipt) -> Result<(), ReceiptSinkError> {
        Ok(())
    }

    fn flush(&self) -> Result<(), ReceiptSinkError> {
        Err(ReceiptSinkError::Io("fsync failed".to_string()))
    }
}

/// Wraps a sink in an `Arc<dyn ReceiptSink>`.
pub fn sink<S: ReceiptSink + 'static>(sink: S) -> Arc<dyn ReceiptSink> {
    Arc::new(sink)
}
