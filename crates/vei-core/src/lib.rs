// crates/vei-core/src/lib.rs
// ============================================================================
// Module: VEI Core Library
// Description: Public API surface for the virtual enterprise engine.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! VEI core routes agent tool calls through a policy gate to simulated,
//! replayed, or live backends and records a receipt for every call. On top
//! of the router it compiles declarative workflows into validated step
//! graphs and runs them deterministically: the same seed and the same
//! actions reproduce the same fingerprints, results, and receipts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AdapterContext;
pub use interfaces::Clock;
pub use interfaces::LiveBackend;
pub use interfaces::LiveBackendError;
pub use interfaces::ReceiptSink;
pub use interfaces::ReceiptSinkError;
pub use interfaces::ServiceSimulator;
pub use interfaces::SimContext;
pub use interfaces::SimRng;
pub use interfaces::SimulatorError;
pub use runtime::ConnectorMode;
pub use runtime::ConnectorModes;
pub use runtime::ConnectorRouter;
pub use runtime::Dispatch;
pub use runtime::LiveConfig;
pub use runtime::PolicyGate;
pub use runtime::RouterError;
pub use runtime::RunProgress;
pub use runtime::RunnerConfig;
pub use runtime::RunnerError;
pub use runtime::Session;
pub use runtime::SessionBuilder;
pub use runtime::SessionConfig;
pub use runtime::WorkflowRunner;
pub use runtime::WorkflowValidationError;
pub use runtime::compile;
