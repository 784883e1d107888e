// crates/vei-core/src/runtime/router.rs
// ============================================================================
// Module: VEI Connector Router
// Description: Single dispatch entry point composing gate, adapters, and receipts.
// Purpose: Turn every tool call into a gated, receipted request/response pair.
// Dependencies: serde_json, thiserror, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! [`ConnectorRouter::dispatch`] is the only way a tool call reaches a
//! backend. It resolves the operation, builds the request envelope, asks the
//! policy gate, runs the adapter chosen for the service, and appends exactly
//! one receipt. Adapter failures come back as error results; only receipt
//! persistence and hashing failures surface as [`RouterError`].
//!
//! Calls to the reserved `approvals` service never reach an adapter. They
//! request, inspect, and resolve approvals in the session queue.
//!
//! Security posture: receipts are redacted before persistence; results
//! returned to callers are not.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::approval::ApprovalQueue;
use crate::core::approval::ApprovalResolution;
use crate::core::approval::ApprovalTarget;
use crate::core::envelope::EnvelopeError;
use crate::core::envelope::RequestEnvelope;
use crate::core::envelope::call_digest;
use crate::core::envelope::normalize_args;
use crate::core::identifiers::ApprovalId;
use crate::core::identifiers::OperationId;
use crate::core::identifiers::SessionId;
use crate::core::operation::ApprovalControl;
use crate::core::operation::OperationRegistry;
use crate::core::operation::OperationRoute;
use crate::core::policy::PolicyAction;
use crate::core::policy::PolicyDecision;
use crate::core::policy::PolicyReason;
use crate::core::receipt::Receipt;
use crate::core::redaction::Redactor;
use crate::core::result::RawResult;
use crate::core::result::RecordedOutcome;
use crate::core::result::ReplayFixtures;
use crate::core::result::ResultEnvelope;
use crate::core::result::ResultErrorKind;
use crate::core::world::WorldState;
use crate::interfaces::AdapterContext;
use crate::interfaces::Clock;
use crate::interfaces::ReceiptSink;
use crate::runtime::adapters::AdapterTable;
use crate::runtime::audit::ApprovalAuditEvent;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::DispatchAuditEvent;
use crate::runtime::audit::audit_timestamp_ms;
use crate::runtime::gate::PolicyGate;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors that escape a dispatch.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The operation is not registered.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    /// Arguments were not an object.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The session was closed.
    #[error("session {0} is closed")]
    SessionClosed(SessionId),
    /// The receipt could not be persisted.
    #[error("receipt persistence failed: {0}")]
    ReceiptPersistence(String),
    /// Canonical hashing failed.
    #[error("hashing failed: {0}")]
    Hash(String),
}

impl From<EnvelopeError> for RouterError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::InvalidArguments {
                ..
            } => Self::InvalidArguments(err.to_string()),
            EnvelopeError::Hash(inner) => Self::Hash(inner.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Session State
// ============================================================================

/// Mutable per-session state the router operates on.
///
/// # Invariants
/// - `sequence` is the last assigned sequence number; the next call gets `sequence + 1`.
/// - `receipts` is append-only and ordered by sequence.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Session identifier.
    pub(crate) session_id: SessionId,
    /// Session seed.
    pub(crate) seed: u64,
    /// Last assigned sequence number.
    pub(crate) sequence: u64,
    /// Session world.
    pub(crate) world: WorldState,
    /// Approval queue.
    pub(crate) approvals: ApprovalQueue,
    /// Receipt log.
    pub(crate) receipts: Vec<Receipt>,
    /// Adapter outcomes recorded for replay.
    pub(crate) fixtures: ReplayFixtures,
    /// True once the session is closed.
    pub(crate) closed: bool,
}

impl SessionState {
    /// Creates fresh session state.
    #[must_use]
    pub fn new(session_id: SessionId, seed: u64, world: WorldState, approvals: ApprovalQueue) -> Self {
        Self {
            session_id,
            seed,
            sequence: 0,
            world,
            approvals,
            receipts: Vec::new(),
            fixtures: ReplayFixtures::new(),
            closed: false,
        }
    }

    /// Assigns the next sequence number.
    const fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

// ============================================================================
// SECTION: Dispatch Output
// ============================================================================

/// Everything produced by one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Normalized request.
    pub request: RequestEnvelope,
    /// Policy decision.
    pub decision: PolicyDecision,
    /// Result returned to the caller.
    pub result: ResultEnvelope,
    /// Receipt appended to the log.
    pub receipt: Receipt,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Connector router shared by one session.
pub struct ConnectorRouter {
    /// Operation registry.
    registry: Arc<OperationRegistry>,
    /// Policy gate.
    gate: PolicyGate,
    /// Adapters per service.
    adapters: AdapterTable,
    /// Receipt redaction rules.
    redactor: Redactor,
    /// Receipt clock.
    clock: Arc<dyn Clock>,
    /// External receipt sink.
    receipt_sink: Option<Arc<dyn ReceiptSink>>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
}

/// Result of the gate-and-execute phase, before receipting.
struct Executed {
    /// Decision.
    decision: PolicyDecision,
    /// Result.
    result: ResultEnvelope,
    /// Mode label of the adapter that ran, if any.
    mode: Option<&'static str>,
}

impl ConnectorRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(
        registry: Arc<OperationRegistry>,
        gate: PolicyGate,
        adapters: AdapterTable,
        redactor: Redactor,
        clock: Arc<dyn Clock>,
        receipt_sink: Option<Arc<dyn ReceiptSink>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            gate,
            adapters,
            redactor,
            clock,
            receipt_sink,
            audit,
        }
    }

    /// Returns the operation registry.
    #[must_use]
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Returns the policy gate.
    #[must_use]
    pub const fn gate(&self) -> &PolicyGate {
        &self.gate
    }

    /// Returns the adapter table.
    #[must_use]
    pub const fn adapters(&self) -> &AdapterTable {
        &self.adapters
    }

    /// Dispatches one tool call.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownOperation`] or
    /// [`RouterError::InvalidArguments`] before any sequence number is
    /// consumed, and [`RouterError::ReceiptPersistence`] when the receipt
    /// sink fails.
    pub fn dispatch(
        &self,
        state: &mut SessionState,
        service: &str,
        operation: &str,
        args: Value,
    ) -> Result<Dispatch, RouterError> {
        if state.closed {
            return Err(RouterError::SessionClosed(state.session_id.clone()));
        }
        let spec = self
            .registry
            .lookup(service, operation)
            .ok_or_else(|| RouterError::UnknownOperation(format!("{service}.{operation}")))?
            .clone();
        let args = normalize_args(&spec.id, args)?;
        let sequence = state.next_sequence();
        let request = RequestEnvelope::build(state.seed, sequence, spec.id.clone(), spec.class, Value::Object(args))?;

        let executed = match spec.route {
            OperationRoute::ApprovalControl(control) => self.execute_control(state, &request, control)?,
            OperationRoute::Adapter => self.execute_gated(state, &request),
        };

        let receipt = self.build_receipt(&request, &executed);
        state.receipts.push(receipt.clone());
        if let Some(sink) = &self.receipt_sink {
            sink.append(&state.session_id, &receipt)
                .map_err(|err| RouterError::ReceiptPersistence(err.to_string()))?;
        }
        self.audit.record_dispatch(&DispatchAuditEvent {
            event: "dispatch",
            timestamp_ms: audit_timestamp_ms(),
            session_id: state.session_id.to_string(),
            sequence,
            operation: request.operation.to_string(),
            operation_class: request.operation_class.as_str(),
            mode: executed.mode,
            decision: executed.decision.action.as_str(),
            reason: executed.decision.reason.as_str(),
            status: executed.result.status.as_str(),
            error_kind: executed.result.error_kind().map(ResultErrorKind::as_str),
        });
        Ok(Dispatch {
            request,
            decision: executed.decision,
            result: executed.result,
            receipt,
        })
    }

    /// Gates an adapter-backed request and runs the adapter when allowed.
    fn execute_gated(&self, state: &mut SessionState, request: &RequestEnvelope) -> Executed {
        let outcome = self.gate.evaluate(request, &mut state.approvals);
        if outcome.enqueued
            && let Some(id) = &outcome.approval
        {
            self.audit_approval(state, id, &request.operation, ApprovalResolution::Unresolved);
        }
        match outcome.decision.action {
            PolicyAction::Deny => Executed {
                decision: outcome.decision,
                result: ResultEnvelope::error(
                    request.sequence,
                    request.fingerprint.clone(),
                    ResultErrorKind::PolicyDenied,
                    format!("{} denied by policy: {}", request.operation, outcome.decision.reason.as_str()),
                ),
                mode: None,
            },
            PolicyAction::RequireApproval => Executed {
                decision: outcome.decision,
                result: ResultEnvelope::pending(
                    request.sequence,
                    request.fingerprint.clone(),
                    json!({
                        "approval_id": outcome.approval.as_ref().map(ToString::to_string),
                        "operation": request.operation.to_string(),
                        "resolution": ApprovalResolution::Unresolved.as_str(),
                    }),
                ),
                mode: None,
            },
            PolicyAction::Allow => {
                let adapter = self.adapters.adapter_for(request.service());
                let mut ctx = AdapterContext {
                    seed: state.seed,
                    world: &mut state.world,
                };
                let record = adapter.records_fixtures();
                let result = match adapter.execute(request, &mut ctx) {
                    Ok(raw) => {
                        if record {
                            state.fixtures.record(request.fingerprint.clone(), RecordedOutcome::Ok(raw.clone()));
                        }
                        ResultEnvelope::ok(request.sequence, request.fingerprint.clone(), raw)
                    }
                    Err(err) => {
                        let failure = err.into_failure();
                        if record {
                            state.fixtures.record(request.fingerprint.clone(), RecordedOutcome::Err(failure.clone()));
                        }
                        ResultEnvelope::adapter_failure(request.sequence, request.fingerprint.clone(), failure)
                    }
                };
                Executed {
                    decision: outcome.decision,
                    result,
                    mode: Some(adapter.mode().as_str()),
                }
            }
        }
    }

    /// Executes an approval control operation against the session queue.
    fn execute_control(
        &self,
        state: &mut SessionState,
        request: &RequestEnvelope,
        control: ApprovalControl,
    ) -> Result<Executed, RouterError> {
        let decision = PolicyDecision::allow(PolicyReason::Control);
        let sequence = request.sequence;
        let fingerprint = request.fingerprint.clone();
        let invalid = |message: String| Executed {
            decision,
            result: ResultEnvelope::error(
                sequence,
                fingerprint.clone(),
                ResultErrorKind::InvalidControlArguments,
                message,
            ),
            mode: None,
        };

        if control == ApprovalControl::List {
            let approvals = serde_json::to_value(state.approvals.entries())
                .map_err(|err| RouterError::Hash(err.to_string()))?;
            return Ok(Executed {
                decision,
                result: ResultEnvelope::ok(
                    sequence,
                    fingerprint.clone(),
                    RawResult {
                        data: json!({ "approvals": approvals.clone() }),
                        raw: json!({ "adapter": "control", "approvals": approvals }),
                    },
                ),
                mode: None,
            });
        }

        let target = match self.control_target(&request.args) {
            Ok(target) => target,
            Err(message) => return Ok(invalid(message)),
        };
        let data = match control {
            ApprovalControl::Request => {
                let id = match state.approvals.find_unresolved(&target) {
                    Some(existing) => existing.id.clone(),
                    None => {
                        let id = state.approvals.enqueue(target.clone(), fingerprint.clone(), sequence);
                        self.audit_approval(state, &id, &target.operation, ApprovalResolution::Unresolved);
                        id
                    }
                };
                json!({
                    "approval_id": id.to_string(),
                    "operation": target.operation.to_string(),
                    "resolution": ApprovalResolution::Unresolved.as_str(),
                })
            }
            ApprovalControl::Status => {
                let latest = state.approvals.latest_for(&target);
                json!({
                    "approval_id": latest.map(|entry| entry.id.to_string()),
                    "operation": target.operation.to_string(),
                    "resolution": latest.map_or("none", |entry| entry.resolution.as_str()),
                })
            }
            ApprovalControl::Approve | ApprovalControl::Deny => {
                let resolution = if control == ApprovalControl::Approve {
                    ApprovalResolution::Approved
                } else {
                    ApprovalResolution::Denied
                };
                match state.approvals.resolve(&target, resolution, sequence) {
                    Ok(ids) => {
                        for id in &ids {
                            self.audit_approval(state, id, &target.operation, resolution);
                        }
                        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                        json!({
                            "operation": target.operation.to_string(),
                            "resolution": resolution.as_str(),
                            "resolved": ids,
                        })
                    }
                    Err(err) => {
                        return Ok(Executed {
                            decision,
                            result: ResultEnvelope::error(
                                sequence,
                                fingerprint,
                                ResultErrorKind::ApprovalNotFound,
                                err.to_string(),
                            ),
                            mode: None,
                        });
                    }
                }
            }
            ApprovalControl::List => Value::Null,
        };
        Ok(Executed {
            decision,
            result: ResultEnvelope::ok(
                sequence,
                fingerprint,
                RawResult {
                    raw: json!({ "adapter": "control", "payload": data.clone() }),
                    data,
                },
            ),
            mode: None,
        })
    }

    /// Parses `{service, operation, args?}` into an approval target.
    fn control_target(&self, args: &Map<String, Value>) -> Result<ApprovalTarget, String> {
        let service = args.get("service").and_then(Value::as_str).ok_or("missing string field `service`")?;
        let operation = args.get("operation").and_then(Value::as_str).ok_or("missing string field `operation`")?;
        let spec = self
            .registry
            .lookup(service, operation)
            .filter(|spec| !spec.is_approval_control())
            .ok_or_else(|| format!("no approvable operation {service}.{operation}"))?;
        let call_args = match args.get("args") {
            None => None,
            Some(value) => Some(normalize_args(&spec.id, value.clone()).map_err(|err| err.to_string())?),
        };
        let digest = match call_args {
            Some(call_args) => Some(call_digest(&spec.id, &call_args).map_err(|err| err.to_string())?),
            None => None,
        };
        let mut target = ApprovalTarget::operation(spec.id.clone());
        if let Some(digest) = digest {
            target = self.gate.target_for(&spec.id, &digest);
        }
        Ok(target)
    }

    /// Builds the redacted receipt for a dispatch.
    fn build_receipt(&self, request: &RequestEnvelope, executed: &Executed) -> Receipt {
        let result_payload = executed.result.error.as_ref().map_or_else(
            || executed.result.data.clone(),
            |error| json!({ "error": serde_json::to_value(error).unwrap_or(Value::Null) }),
        );
        Receipt {
            sequence: request.sequence,
            fingerprint: request.fingerprint.clone(),
            service: request.operation.service().clone(),
            operation: request.operation.operation().clone(),
            operation_class: request.operation_class,
            decision: executed.decision,
            result_status: executed.result.status,
            redacted_args: Value::Object(self.redactor.redact_map(&request.args)),
            redacted_result: self.redactor.redact_value(&result_payload),
            timestamp: self.clock.now(),
        }
    }

    /// Emits an approval audit event.
    fn audit_approval(
        &self,
        state: &SessionState,
        id: &ApprovalId,
        operation: &OperationId,
        resolution: ApprovalResolution,
    ) {
        self.audit.record_approval(&ApprovalAuditEvent {
            event: "approval",
            timestamp_ms: audit_timestamp_ms(),
            session_id: state.session_id.to_string(),
            approval_id: id.to_string(),
            operation: operation.to_string(),
            resolution: resolution.as_str(),
            sequence: state.sequence,
        });
    }

    /// Expires every unresolved approval in a session and audits each.
    pub(crate) fn expire_approvals(&self, state: &mut SessionState) -> Vec<ApprovalId> {
        let at = state.sequence;
        let expired = state.approvals.expire_all(at);
        for id in &expired {
            if let Some(entry) = state.approvals.get(id) {
                let operation = entry.target.operation.clone();
                self.audit_approval(state, id, &operation, ApprovalResolution::Expired);
            }
        }
        expired
    }

    /// Flushes the external receipt sink.
    pub(crate) fn flush_receipts(&self) -> Result<(), RouterError> {
        match &self.receipt_sink {
            Some(sink) => sink.flush().map_err(|err| RouterError::ReceiptPersistence(err.to_string())),
            None => Ok(()),
        }
    }
}
