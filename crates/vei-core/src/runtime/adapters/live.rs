// crates/vei-core/src/runtime/adapters/live.rs
// ============================================================================
// Module: VEI Live Adapter
// Description: Guarded pass-through to a live backend.
// Purpose: Enforce live-only write flags and the hard-block list.
// Dependencies: serde, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The live adapter sits behind the policy gate and adds its own checks:
//! hard-blocked operations never pass, and safe or risky writes pass only
//! when their live allow flag is set. Both flags default to off. Anything
//! refused becomes [`AdapterError::LiveBlocked`].
//!
//! [`SimulatedLiveBackend`] stands in for real connectors and tags its raw
//! payloads with `live_backend = "simulated"`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::AdapterError;
use super::SimAdapter;
use crate::core::envelope::RequestEnvelope;
use crate::core::identifiers::OperationId;
use crate::core::operation::OperationClass;
use crate::core::result::RawResult;
use crate::interfaces::AdapterContext;
use crate::interfaces::LiveBackend;
use crate::interfaces::LiveBackendError;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Live adapter guards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Permit safe writes against the live backend.
    pub allow_write_safe: bool,
    /// Permit risky writes against the live backend.
    pub allow_write_risky: bool,
    /// Operations never forwarded.
    pub hard_block: BTreeSet<OperationId>,
}

impl LiveConfig {
    /// Returns the refusal reason for a request, if any.
    #[must_use]
    pub fn refusal(&self, request: &RequestEnvelope) -> Option<String> {
        if self.hard_block.contains(&request.operation) {
            return Some(format!("{} is hard-blocked", request.operation));
        }
        match request.operation_class {
            OperationClass::Read => None,
            OperationClass::WriteSafe if self.allow_write_safe => None,
            OperationClass::WriteRisky if self.allow_write_risky => None,
            class => Some(format!("{} writes are disabled for {}", class, request.operation)),
        }
    }
}

// ============================================================================
// SECTION: Live Adapter
// ============================================================================

/// Guarded live adapter.
#[derive(Clone)]
pub struct LiveAdapter {
    /// Guards.
    config: LiveConfig,
    /// Backend reached after the guards pass.
    backend: Arc<dyn LiveBackend>,
}

impl LiveAdapter {
    /// Creates a live adapter.
    #[must_use]
    pub fn new(config: LiveConfig, backend: Arc<dyn LiveBackend>) -> Self {
        Self {
            config,
            backend,
        }
    }

    /// Returns the guards.
    #[must_use]
    pub const fn config(&self) -> &LiveConfig {
        &self.config
    }

    /// Executes a request after the live guards pass.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::LiveBlocked`] when a guard refuses the call
    /// or the backend fails.
    pub fn execute(&self, request: &RequestEnvelope, ctx: &mut AdapterContext<'_>) -> Result<RawResult, AdapterError> {
        if let Some(reason) = self.config.refusal(request) {
            return Err(AdapterError::LiveBlocked(reason));
        }
        self.backend
            .execute(request, ctx)
            .map_err(|err: LiveBackendError| AdapterError::LiveBlocked(err.to_string()))
    }
}

// ============================================================================
// SECTION: Simulated Backend
// ============================================================================

/// Live backend that delegates to the simulator.
#[derive(Clone)]
pub struct SimulatedLiveBackend {
    /// Simulator delegate.
    sim: SimAdapter,
}

impl SimulatedLiveBackend {
    /// Creates a simulated backend.
    #[must_use]
    pub const fn new(sim: SimAdapter) -> Self {
        Self {
            sim,
        }
    }
}

impl LiveBackend for SimulatedLiveBackend {
    fn execute(&self, request: &RequestEnvelope, ctx: &mut AdapterContext<'_>) -> Result<RawResult, LiveBackendError> {
        let mut result =
            self.sim.execute(request, ctx).map_err(|err| LiveBackendError::Backend(err.detail().to_string()))?;
        if let Value::Object(raw) = &mut result.raw {
            raw.insert("adapter".to_string(), Value::String("live".to_string()));
            raw.insert("live_backend".to_string(), Value::String("simulated".to_string()));
        }
        Ok(result)
    }
}
