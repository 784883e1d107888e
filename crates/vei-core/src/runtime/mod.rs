// crates/vei-core/src/runtime/mod.rs
// ============================================================================
// Module: VEI Runtime
// Description: Router, gate, adapters, compiler, runner, and sinks.
// Purpose: Execute tool calls and workflows deterministically.
// Dependencies: crate::{core, interfaces}, rand_chacha, serde_json
// ============================================================================

//! ## Overview
//! Runtime modules compose the core types into the connector router and the
//! workflow runner. Every tool call, whether issued by an agent or by the
//! runner, goes through the same [`ConnectorRouter::dispatch`] path so that
//! gating and receipting cannot be bypassed.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod adapters;
pub mod audit;
pub mod compiler;
pub mod expectations;
pub mod gate;
pub mod router;
pub mod runner;
pub mod session;
pub mod store;
pub mod template;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use adapters::Adapter;
pub use adapters::AdapterError;
pub use adapters::AdapterSet;
pub use adapters::AdapterTable;
pub use adapters::ConnectorMode;
pub use adapters::ConnectorModeError;
pub use adapters::ConnectorModes;
pub use adapters::GenericSimulator;
pub use adapters::LiveAdapter;
pub use adapters::LiveConfig;
pub use adapters::ReplayAdapter;
pub use adapters::SimAdapter;
pub use adapters::SimulatedLiveBackend;
pub use adapters::SimulatorRegistry;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use compiler::WorkflowValidationError;
pub use compiler::compile;
pub use gate::GateOutcome;
pub use gate::PolicyGate;
pub use gate::decide;
pub use router::ConnectorRouter;
pub use router::Dispatch;
pub use router::RouterError;
pub use router::SessionState;
pub use runner::RunProgress;
pub use runner::RunnerConfig;
pub use runner::RunnerError;
pub use runner::WorkflowRunner;
pub use session::DEFAULT_SEED;
pub use session::Session;
pub use session::SessionBuilder;
pub use session::SessionConfig;
pub use session::SessionError;
pub use session::SessionReport;
pub use store::InMemoryReceiptSink;
pub use store::JsonlReceiptSink;
pub use store::LogicalClock;
pub use store::SystemClock;
