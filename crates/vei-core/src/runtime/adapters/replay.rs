// crates/vei-core/src/runtime/adapters/replay.rs
// ============================================================================
// Module: VEI Replay Adapter
// Description: Serves recorded adapter outcomes by request fingerprint.
// Purpose: Reproduce a recorded session byte for byte.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The replay adapter never computes anything: it returns the outcome
//! recorded under the request fingerprint, including recorded failures. A
//! fingerprint with no entry is a [`AdapterError::ReplayMiss`], fatal to
//! the step but not to the process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use super::AdapterError;
use crate::core::envelope::RequestEnvelope;
use crate::core::result::RawResult;
use crate::core::result::RecordedOutcome;
use crate::core::result::ReplayFixtures;

// ============================================================================
// SECTION: Replay Adapter
// ============================================================================

/// Fixture-backed adapter.
#[derive(Debug, Clone, Default)]
pub struct ReplayAdapter {
    /// Shared fixture table.
    fixtures: Arc<ReplayFixtures>,
}

impl ReplayAdapter {
    /// Creates a replay adapter.
    #[must_use]
    pub fn new(fixtures: ReplayFixtures) -> Self {
        Self {
            fixtures: Arc::new(fixtures),
        }
    }

    /// Returns the fixture table.
    #[must_use]
    pub fn fixtures(&self) -> &ReplayFixtures {
        &self.fixtures
    }

    /// Returns the recorded outcome for a request.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::ReplayMiss`] when nothing was recorded, or the
    /// recorded failure.
    pub fn execute(&self, request: &RequestEnvelope) -> Result<RawResult, AdapterError> {
        match self.fixtures.get(&request.fingerprint) {
            Some(RecordedOutcome::Ok(result)) => Ok(result.clone()),
            Some(RecordedOutcome::Err(failure)) => Err(AdapterError::from_failure(failure)),
            None => Err(AdapterError::ReplayMiss(format!("{} ({})", request.fingerprint, request.operation))),
        }
    }
}
