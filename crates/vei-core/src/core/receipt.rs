// crates/vei-core/src/core/receipt.rs
// ============================================================================
// Module: VEI Receipts
// Description: Append-only audit and replay records for dispatches.
// Purpose: Persist one redacted record per dispatch.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The router appends exactly one [`Receipt`] per dispatch. Receipts carry
//! redacted arguments and results and are never mutated after creation.
//! Two runs with the same seed and actions produce receipt logs that differ
//! only in their timestamps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::envelope::Fingerprint;
use crate::core::identifiers::OperationName;
use crate::core::identifiers::ServiceName;
use crate::core::operation::OperationClass;
use crate::core::policy::PolicyDecision;
use crate::core::result::ResultStatus;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Receipt
// ============================================================================

/// Audit and replay record for a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Sequence number of the request.
    pub sequence: u64,
    /// Fingerprint of the request.
    pub fingerprint: Fingerprint,
    /// Service name.
    pub service: ServiceName,
    /// Operation name.
    pub operation: OperationName,
    /// Gating class.
    pub operation_class: OperationClass,
    /// Policy decision.
    pub decision: PolicyDecision,
    /// Result status.
    pub result_status: ResultStatus,
    /// Arguments with sensitive values redacted.
    pub redacted_args: Value,
    /// Result data with sensitive values redacted.
    pub redacted_result: Value,
    /// Clock reading at dispatch time.
    pub timestamp: Timestamp,
}

impl Receipt {
    /// Returns a copy with the timestamp zeroed for timestamp-insensitive comparison.
    #[must_use]
    pub fn without_timestamp(&self) -> Self {
        Self {
            timestamp: Timestamp::Logical(0),
            ..self.clone()
        }
    }
}
