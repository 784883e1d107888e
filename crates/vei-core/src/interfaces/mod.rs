// crates/vei-core/src/interfaces/mod.rs
// ============================================================================
// Module: VEI Interfaces
// Description: Backend-agnostic seams for simulators, live backends, receipts, and clocks.
// Purpose: Define the contract surfaces the runtime depends on.
// Dependencies: crate::core, rand_chacha
// ============================================================================

//! ## Overview
//! Interfaces let hosts plug service content, live backends, receipt
//! persistence, and time sources into the runtime without the runtime
//! knowing their details. Implementations must be deterministic for a given
//! input (clocks aside) and must fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand_chacha::ChaCha20Rng;
use serde_json::Value;
use thiserror::Error;

use crate::core::envelope::RequestEnvelope;
use crate::core::identifiers::SessionId;
use crate::core::receipt::Receipt;
use crate::core::result::RawResult;
use crate::core::time::Timestamp;
use crate::core::world::WorldState;

// ============================================================================
// SECTION: Adapter Context
// ============================================================================

/// Per-dispatch state handed to adapters.
pub struct AdapterContext<'a> {
    /// Session seed.
    pub seed: u64,
    /// Session world.
    pub world: &'a mut WorldState,
}

// ============================================================================
// SECTION: Service Simulator
// ============================================================================

/// Deterministic generator derived per call by the sim adapter.
pub type SimRng = ChaCha20Rng;

/// State handed to a simulator for one call.
pub struct SimContext<'a> {
    /// Generator seeded from `(seed, service, operation, sequence)`.
    pub rng: &'a mut SimRng,
    /// Session world.
    pub world: &'a mut WorldState,
}

/// Simulator failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulatorError {
    /// The simulator does not implement the operation.
    #[error("simulator does not support {0}")]
    Unsupported(String),
    /// Arguments were rejected.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The simulated backend reported a failure.
    #[error("simulated failure: {0}")]
    Failure(String),
}

/// Service content logic used by the sim adapter.
///
/// Implementations must draw randomness only from `ctx.rng`.
pub trait ServiceSimulator: Send + Sync {
    /// Produces canonical result data for a request.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError`] when the call cannot be simulated.
    fn simulate(&self, request: &RequestEnvelope, ctx: &mut SimContext<'_>) -> Result<Value, SimulatorError>;
}

// ============================================================================
// SECTION: Live Backend
// ============================================================================

/// Live backend failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveBackendError {
    /// The backend refused or failed the call.
    #[error("live backend error: {0}")]
    Backend(String),
}

/// Backend reached by the live adapter after its own checks pass.
pub trait LiveBackend: Send + Sync {
    /// Executes a request against the backend.
    ///
    /// # Errors
    ///
    /// Returns [`LiveBackendError`] when the backend fails.
    fn execute(&self, request: &RequestEnvelope, ctx: &mut AdapterContext<'_>) -> Result<RawResult, LiveBackendError>;
}

// ============================================================================
// SECTION: Receipt Sink
// ============================================================================

/// Receipt persistence errors.
#[derive(Debug, Error)]
pub enum ReceiptSinkError {
    /// I/O failure.
    #[error("receipt sink io error: {0}")]
    Io(String),
    /// Serialization failure.
    #[error("receipt sink serialization error: {0}")]
    Serialization(String),
    /// Backend-specific failure.
    #[error("receipt sink error: {0}")]
    Sink(String),
}

/// Durable destination for receipts.
///
/// Sinks serialize concurrent access internally.
pub trait ReceiptSink: Send + Sync {
    /// Appends a receipt for a session.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptSinkError`] when the receipt cannot be persisted.
    fn append(&self, session: &SessionId, receipt: &Receipt) -> Result<(), ReceiptSinkError>;

    /// Flushes buffered receipts.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptSinkError`] when flushing fails.
    fn flush(&self) -> Result<(), ReceiptSinkError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of receipt timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}
