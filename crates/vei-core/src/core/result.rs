// crates/vei-core/src/core/result.rs
// ============================================================================
// Module: VEI Result Envelope
// Description: Dispatch outcomes, adapter payloads, and replay fixtures.
// Purpose: Give every dispatch one uniform, serializable result shape.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The router returns a [`ResultEnvelope`] for every dispatch, whether the
//! call reached an adapter, was denied, or is waiting on approval. Adapter
//! failures are normalized into [`ResultErrorKind`] values here so callers
//! never see raw adapter errors.
//!
//! [`ReplayFixtures`] is the fingerprint-keyed table of adapter outcomes that
//! the replay adapter serves from.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::envelope::Fingerprint;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// The call completed.
    Ok,
    /// The call was denied or the adapter failed.
    Error,
    /// The call is waiting on an approval.
    Pending,
}

impl ResultStatus {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Pending => "pending",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Adapter failure subkind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    /// Replay fixture table had no entry for the fingerprint.
    ReplayMiss,
    /// Live adapter refused the call.
    LiveBlocked,
    /// Simulator failed.
    SimFault,
}

/// Error kind carried by an error result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultErrorKind {
    /// The policy gate denied the call.
    PolicyDenied,
    /// An adapter failed; the subkind says how.
    AdapterError,
    /// An approval control call found nothing to act on.
    ApprovalNotFound,
    /// Approval control arguments were malformed.
    InvalidControlArguments,
}

impl ResultErrorKind {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PolicyDenied => "policy_denied",
            Self::AdapterError => "adapter_error",
            Self::ApprovalNotFound => "approval_not_found",
            Self::InvalidControlArguments => "invalid_control_arguments",
        }
    }
}

/// Error details on an error result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultError {
    /// Error kind.
    pub kind: ResultErrorKind,
    /// Adapter subkind, present for [`ResultErrorKind::AdapterError`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subkind: Option<AdapterErrorKind>,
    /// Human-readable message.
    pub message: String,
}

// ============================================================================
// SECTION: Adapter Payloads
// ============================================================================

/// Adapter output before the router wraps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResult {
    /// Canonical data exposed to callers and expectations.
    pub data: Value,
    /// Backend-shaped payload kept for audit.
    pub raw: Value,
}

/// Adapter failure before the router wraps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterFailure {
    /// Failure subkind.
    pub kind: AdapterErrorKind,
    /// Human-readable message.
    pub message: String,
}

/// Recorded adapter outcome for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordedOutcome {
    /// Adapter returned a result.
    Ok(RawResult),
    /// Adapter failed.
    Err(AdapterFailure),
}

// ============================================================================
// SECTION: Result Envelope
// ============================================================================

/// Uniform dispatch outcome.
///
/// # Invariants
/// - `error` is present iff `status` is [`ResultStatus::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Sequence number of the request.
    pub sequence: u64,
    /// Fingerprint of the request.
    pub fingerprint: Fingerprint,
    /// Result status.
    pub status: ResultStatus,
    /// Canonical data.
    pub data: Value,
    /// Backend-shaped payload.
    pub raw: Value,
    /// Error details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
}

impl ResultEnvelope {
    /// Builds an ok result from adapter output.
    #[must_use]
    pub fn ok(sequence: u64, fingerprint: Fingerprint, result: RawResult) -> Self {
        Self {
            sequence,
            fingerprint,
            status: ResultStatus::Ok,
            data: result.data,
            raw: result.raw,
            error: None,
        }
    }

    /// Builds an error result.
    #[must_use]
    pub fn error(sequence: u64, fingerprint: Fingerprint, kind: ResultErrorKind, message: impl Into<String>) -> Self {
        Self {
            sequence,
            fingerprint,
            status: ResultStatus::Error,
            data: Value::Null,
            raw: Value::Null,
            error: Some(ResultError {
                kind,
                subkind: None,
                message: message.into(),
            }),
        }
    }

    /// Builds an error result from an adapter failure.
    #[must_use]
    pub fn adapter_failure(sequence: u64, fingerprint: Fingerprint, failure: AdapterFailure) -> Self {
        Self {
            sequence,
            fingerprint,
            status: ResultStatus::Error,
            data: Value::Null,
            raw: Value::Null,
            error: Some(ResultError {
                kind: ResultErrorKind::AdapterError,
                subkind: Some(failure.kind),
                message: failure.message,
            }),
        }
    }

    /// Builds a pending result carrying approval details in `data`.
    #[must_use]
    pub fn pending(sequence: u64, fingerprint: Fingerprint, data: Value) -> Self {
        Self {
            sequence,
            fingerprint,
            status: ResultStatus::Pending,
            data,
            raw: Value::Null,
            error: None,
        }
    }

    /// Returns true for ok results.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }

    /// Returns the error kind, if any.
    #[must_use]
    pub fn error_kind(&self) -> Option<ResultErrorKind> {
        self.error.as_ref().map(|error| error.kind)
    }

    /// Returns the adapter failure subkind, if any.
    #[must_use]
    pub fn adapter_error(&self) -> Option<AdapterErrorKind> {
        self.error.as_ref().and_then(|error| error.subkind)
    }
}

// ============================================================================
// SECTION: Replay Fixtures
// ============================================================================

/// Fingerprint-keyed table of recorded adapter outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplayFixtures {
    /// Recorded outcomes.
    entries: BTreeMap<Fingerprint, RecordedOutcome>,
}

impl ReplayFixtures {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, replacing any previous entry for the fingerprint.
    pub fn record(&mut self, fingerprint: Fingerprint, outcome: RecordedOutcome) {
        self.entries.insert(fingerprint, outcome);
    }

    /// Looks up an outcome.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&RecordedOutcome> {
        self.entries.get(fingerprint)
    }

    /// Merges another table into this one.
    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// Iterates over entries in fingerprint order.
    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &RecordedOutcome)> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(Fingerprint, RecordedOutcome)> for ReplayFixtures {
    fn from_iter<I: IntoIterator<Item = (Fingerprint, RecordedOutcome)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
