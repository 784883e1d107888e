// crates/vei-core/src/runtime/gate.rs
// ============================================================================
// Module: VEI Policy Gate
// Description: Pure gating decisions plus approval enqueueing.
// Purpose: Decide allow, deny, or require_approval before any side effect.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! [`decide`] is a pure function of the operation class, gate configuration,
//! and approval queue. [`PolicyGate::evaluate`] wraps it with the gate's only
//! side effect: enqueueing one pending approval when the answer is
//! `require_approval` and no matching approval is already unresolved.
//!
//! Rule order: hard-block list, operation override, class rules. Risky
//! operations pass when pre-granted or approved, fail when the latest
//! matching resolution was a denial, and otherwise need approval.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::approval::ApprovalQueue;
use crate::core::approval::ApprovalResolution;
use crate::core::approval::ApprovalTarget;
use crate::core::envelope::CallDigest;
use crate::core::envelope::RequestEnvelope;
use crate::core::identifiers::ApprovalId;
use crate::core::identifiers::OperationId;
use crate::core::operation::OperationClass;
use crate::core::policy::ApprovalMatch;
use crate::core::policy::GateConfig;
use crate::core::policy::OverrideAction;
use crate::core::policy::PolicyAction;
use crate::core::policy::PolicyDecision;
use crate::core::policy::PolicyReason;

// ============================================================================
// SECTION: Pure Decision
// ============================================================================

/// Decides how to gate a call.
#[must_use]
pub fn decide(
    operation: &OperationId,
    class: OperationClass,
    digest: &CallDigest,
    config: &GateConfig,
    approvals: &ApprovalQueue,
) -> PolicyDecision {
    if config.hard_block.contains(operation) {
        return PolicyDecision::deny(PolicyReason::HardBlocked);
    }
    match config.overrides.get(operation) {
        Some(OverrideAction::Allow) => return PolicyDecision::allow(PolicyReason::OverrideAllow),
        Some(OverrideAction::Deny) => return PolicyDecision::deny(PolicyReason::OverrideDeny),
        Some(OverrideAction::RequireApproval) => {
            return approval_decision(operation, digest, config, approvals);
        }
        None => {}
    }
    match class {
        OperationClass::Read => PolicyDecision::allow(PolicyReason::Read),
        OperationClass::WriteSafe if config.write_safe_enabled => {
            PolicyDecision::allow(PolicyReason::WriteSafeAllowed)
        }
        OperationClass::WriteSafe => PolicyDecision::deny(PolicyReason::WriteSafeDisabled),
        OperationClass::WriteRisky => approval_decision(operation, digest, config, approvals),
    }
}

/// Applies the approval rules for risky or override-gated operations.
fn approval_decision(
    operation: &OperationId,
    digest: &CallDigest,
    config: &GateConfig,
    approvals: &ApprovalQueue,
) -> PolicyDecision {
    if config.pre_granted.contains(operation) {
        return PolicyDecision::allow(PolicyReason::PreGranted);
    }
    match approvals.latest_resolution(operation, digest) {
        Some(ApprovalResolution::Approved) if approvals.unresolved_for(operation, digest).is_none() => {
            PolicyDecision::allow(PolicyReason::ApprovalGranted)
        }
        Some(ApprovalResolution::Denied) if approvals.unresolved_for(operation, digest).is_none() => {
            PolicyDecision::deny(PolicyReason::ApprovalDenied)
        }
        _ => PolicyDecision::require_approval(),
    }
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Gate evaluation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    /// Decision.
    pub decision: PolicyDecision,
    /// Approval the call waits on, when the decision requires approval.
    pub approval: Option<ApprovalId>,
    /// True when this evaluation enqueued the approval.
    pub enqueued: bool,
}

/// Stateful wrapper around [`decide`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyGate {
    /// Gate configuration.
    config: GateConfig,
}

impl PolicyGate {
    /// Creates a gate.
    #[must_use]
    pub const fn new(config: GateConfig) -> Self {
        Self {
            config,
        }
    }

    /// Returns the gate configuration.
    #[must_use]
    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Returns the configured approval matching granularity.
    #[must_use]
    pub const fn approval_match(&self) -> ApprovalMatch {
        self.config.approval_match
    }

    /// Decides without touching the approval queue.
    #[must_use]
    pub fn peek(&self, request: &RequestEnvelope, approvals: &ApprovalQueue) -> PolicyDecision {
        decide(&request.operation, request.operation_class, &request.call_digest, &self.config, approvals)
    }

    /// Decides and enqueues an approval when one is required.
    pub fn evaluate(&self, request: &RequestEnvelope, approvals: &mut ApprovalQueue) -> GateOutcome {
        let decision = self.peek(request, approvals);
        if decision.action != PolicyAction::RequireApproval {
            return GateOutcome {
                decision,
                approval: None,
                enqueued: false,
            };
        }
        if let Some(existing) = approvals.unresolved_for(&request.operation, &request.call_digest) {
            return GateOutcome {
                decision,
                approval: Some(existing.id.clone()),
                enqueued: false,
            };
        }
        let target = self.target_for(&request.operation, &request.call_digest);
        let id = approvals.enqueue(target, request.fingerprint.clone(), request.sequence);
        GateOutcome {
            decision,
            approval: Some(id),
            enqueued: true,
        }
    }

    /// Builds the approval target for a call under the configured granularity.
    #[must_use]
    pub fn target_for(&self, operation: &OperationId, digest: &CallDigest) -> ApprovalTarget {
        ApprovalTarget {
            operation: operation.clone(),
            call_digest: match self.config.approval_match {
                ApprovalMatch::Operation => None,
                ApprovalMatch::Call => Some(digest.clone()),
            },
        }
    }
}
