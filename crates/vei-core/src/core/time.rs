// crates/vei-core/src/core/time.rs
// ============================================================================
// Module: VEI Time Model
// Description: Canonical timestamp representation for receipts.
// Purpose: Keep receipt timestamps explicit and replayable.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Receipts carry a [`Timestamp`] supplied by a runtime clock. Core types
//! never read the wall clock; a logical clock keeps entire receipt logs
//! byte-identical across runs, while a wall clock is available for hosts that
//! want real times.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used in receipts.
///
/// # Invariants
/// - Values are provided by a clock implementation, never read by core types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Timestamp {
    /// Unix epoch milliseconds.
    UnixMillis(i64),
    /// Monotonic logical time value.
    Logical(u64),
}

impl Timestamp {
    /// Returns the timestamp as unix milliseconds when available.
    #[must_use]
    pub const fn as_unix_millis(&self) -> Option<i64> {
        match self {
            Self::UnixMillis(value) => Some(*value),
            Self::Logical(_) => None,
        }
    }

    /// Returns the timestamp as logical time when available.
    #[must_use]
    pub const fn as_logical(&self) -> Option<u64> {
        match self {
            Self::UnixMillis(_) => None,
            Self::Logical(value) => Some(*value),
        }
    }
}
