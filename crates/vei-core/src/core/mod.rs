// crates/vei-core/src/core/mod.rs
// ============================================================================
// Module: VEI Core Types
// Description: Canonical request, policy, receipt, workflow, and run-state types.
// Purpose: Provide stable, serializable types shared by the runtime and hosts.
// Dependencies: serde, serde_json, regex
// ============================================================================

//! ## Overview
//! Core types are pure data plus deterministic helpers (hashing, redaction,
//! path resolution). They never perform I/O or read the clock; the runtime
//! composes them into the router, gate, compiler, and runner.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod approval;
pub mod envelope;
pub mod hashing;
pub mod identifiers;
pub mod operation;
pub mod policy;
pub mod receipt;
pub mod redaction;
pub mod result;
pub mod run_state;
pub mod time;
pub mod workflow;
pub mod world;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use approval::ApprovalError;
pub use approval::ApprovalQueue;
pub use approval::ApprovalResolution;
pub use approval::ApprovalTarget;
pub use approval::PendingApproval;
pub use envelope::CallDigest;
pub use envelope::EnvelopeError;
pub use envelope::Fingerprint;
pub use envelope::RequestEnvelope;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::ApprovalId;
pub use identifiers::OperationId;
pub use identifiers::OperationIdError;
pub use identifiers::OperationName;
pub use identifiers::ServiceName;
pub use identifiers::SessionId;
pub use identifiers::StepId;
pub use identifiers::WorkflowName;
pub use operation::APPROVALS_SERVICE;
pub use operation::ApprovalControl;
pub use operation::OperationClass;
pub use operation::OperationRegistry;
pub use operation::OperationRoute;
pub use operation::OperationSpec;
pub use operation::RegistryError;
pub use policy::ApprovalMatch;
pub use policy::GateConfig;
pub use policy::OverrideAction;
pub use policy::PolicyAction;
pub use policy::PolicyDecision;
pub use policy::PolicyReason;
pub use receipt::Receipt;
pub use redaction::Redactor;
pub use result::AdapterErrorKind;
pub use result::AdapterFailure;
pub use result::RawResult;
pub use result::RecordedOutcome;
pub use result::ReplayFixtures;
pub use result::ResultEnvelope;
pub use result::ResultError;
pub use result::ResultErrorKind;
pub use result::ResultStatus;
pub use run_state::EpisodeRunState;
pub use run_state::EpisodeStatus;
pub use run_state::StepOutcome;
pub use run_state::StepTransition;
pub use run_state::StepVerdict;
pub use run_state::Suspension;
pub use run_state::TerminalReason;
pub use time::Timestamp;
pub use workflow::ApprovalFallback;
pub use workflow::CompiledFailurePolicy;
pub use workflow::CompiledStep;
pub use workflow::CompiledWorkflow;
pub use workflow::Expectation;
pub use workflow::FailureEdge;
pub use workflow::FailureEdgeKind;
pub use workflow::FailurePolicy;
pub use workflow::SuccessCriterion;
pub use workflow::WorkflowSource;
pub use workflow::WorkflowSourceError;
pub use world::WorldSnapshot;
pub use world::WorldState;
