// crates/vei-core/src/runtime/audit.rs
// ============================================================================
// Module: VEI Audit Logging
// Description: Structured audit events for dispatches, approvals, and episodes.
// Purpose: Emit JSON-line logs without tying hosts to a logging framework.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are small serializable records written one JSON object per
//! line. The router emits a [`DispatchAuditEvent`] per call and an
//! [`ApprovalAuditEvent`] per approval transition; the runner emits
//! [`EpisodeAuditEvent`]s for status changes and suspensions. Events never
//! carry call arguments. Sinks swallow write failures so logging cannot
//! change dispatch behavior.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Events
// ============================================================================

/// One dispatch through the router.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchAuditEvent {
    /// Event name.
    pub event: &'static str,
    /// Wall-clock emission time.
    pub timestamp_ms: u128,
    /// Session identifier.
    pub session_id: String,
    /// Request sequence.
    pub sequence: u64,
    /// `service.operation`.
    pub operation: String,
    /// Operation class label.
    pub operation_class: &'static str,
    /// Connector mode label; absent when no adapter ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    /// Policy action label.
    pub decision: &'static str,
    /// Policy reason label.
    pub reason: &'static str,
    /// Result status label.
    pub status: &'static str,
    /// Error kind label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

/// Approval transition.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalAuditEvent {
    /// Event name.
    pub event: &'static str,
    /// Wall-clock emission time.
    pub timestamp_ms: u128,
    /// Session identifier.
    pub session_id: String,
    /// Approval identifier.
    pub approval_id: String,
    /// Target `service.operation`.
    pub operation: String,
    /// Resolution label after the transition.
    pub resolution: &'static str,
    /// Sequence at which the transition happened.
    pub sequence: u64,
}

/// Runner status change or suspension.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeAuditEvent {
    /// Event name.
    pub event: &'static str,
    /// Wall-clock emission time.
    pub timestamp_ms: u128,
    /// Workflow name.
    pub workflow: String,
    /// Step involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Episode status label.
    pub status: &'static str,
    /// Extra structured detail.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

/// Returns wall-clock milliseconds for audit timestamps.
#[must_use]
pub fn audit_timestamp_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_millis()).unwrap_or_default()
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for VEI events.
pub trait AuditSink: Send + Sync {
    /// Records a dispatch event.
    fn record_dispatch(&self, event: &DispatchAuditEvent);

    /// Records an approval event.
    fn record_approval(&self, event: &ApprovalAuditEvent);

    /// Records an episode event.
    fn record_episode(&self, event: &EpisodeAuditEvent);
}

/// Audit sink that writes JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one serialized event.
    fn emit<T: Serialize>(event: &T) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record_dispatch(&self, event: &DispatchAuditEvent) {
        Self::emit(event);
    }

    fn record_approval(&self, event: &ApprovalAuditEvent) {
        Self::emit(event);
    }

    fn record_episode(&self, event: &EpisodeAuditEvent) {
        Self::emit(event);
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Writes one serialized event and flushes.
    fn emit<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_dispatch(&self, event: &DispatchAuditEvent) {
        self.emit(event);
    }

    fn record_approval(&self, event: &ApprovalAuditEvent) {
        self.emit(event);
    }

    fn record_episode(&self, event: &EpisodeAuditEvent) {
        self.emit(event);
    }
}

/// Audit sink that keeps serialized events in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Recorded events.
    events: Mutex<Vec<Value>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<Value> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Stores one serialized event.
    fn emit<T: Serialize>(&self, event: &T) {
        if let Ok(value) = serde_json::to_value(event)
            && let Ok(mut events) = self.events.lock()
        {
            events.push(value);
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record_dispatch(&self, event: &DispatchAuditEvent) {
        self.emit(event);
    }

    fn record_approval(&self, event: &ApprovalAuditEvent) {
        self.emit(event);
    }

    fn record_episode(&self, event: &EpisodeAuditEvent) {
        self.emit(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_dispatch(&self, _event: &DispatchAuditEvent) {}

    fn record_approval(&self, _event: &ApprovalAuditEvent) {}

    fn record_episode(&self, _event: &EpisodeAuditEvent) {}
}
