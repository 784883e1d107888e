// crates/vei-core/src/core/policy.rs
// ============================================================================
// Module: VEI Policy Types
// Description: Policy decisions, reason codes, and gate configuration.
// Purpose: Provide the serializable vocabulary of the policy gate.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`PolicyDecision`] pairs an action with a stable reason code and is
//! recorded on every receipt. [`GateConfig`] holds everything the pure
//! decision function consults besides the operation class and approval
//! state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::OperationId;

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Gate action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    /// Forward to the adapter.
    Allow,
    /// Short-circuit with a policy error.
    Deny,
    /// Short-circuit with a pending approval.
    RequireApproval,
}

impl PolicyAction {
    /// Returns the stable label for the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::RequireApproval => "require_approval",
        }
    }
}

/// Reason code attached to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyReason {
    /// Operation is on the hard-block list.
    HardBlocked,
    /// Operation override forces allow.
    OverrideAllow,
    /// Operation override forces deny.
    OverrideDeny,
    /// Read operations are always allowed.
    Read,
    /// Safe writes are enabled.
    WriteSafeAllowed,
    /// Safe writes are disabled by configuration.
    WriteSafeDisabled,
    /// A pre-granted approval token covers the operation.
    PreGranted,
    /// A matching approval was approved.
    ApprovalGranted,
    /// The latest matching approval was denied.
    ApprovalDenied,
    /// The operation needs an approval that has not been granted.
    ApprovalRequired,
    /// Router-internal approval control.
    Control,
}

impl PolicyReason {
    /// Returns the stable label for the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HardBlocked => "hard_blocked",
            Self::OverrideAllow => "override_allow",
            Self::OverrideDeny => "override_deny",
            Self::Read => "read",
            Self::WriteSafeAllowed => "write_safe_allowed",
            Self::WriteSafeDisabled => "write_safe_disabled",
            Self::PreGranted => "pre_granted",
            Self::ApprovalGranted => "approval_granted",
            Self::ApprovalDenied => "approval_denied",
            Self::ApprovalRequired => "approval_required",
            Self::Control => "control",
        }
    }
}

/// Outcome of gating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Gate action.
    pub action: PolicyAction,
    /// Reason code.
    pub reason: PolicyReason,
}

impl PolicyDecision {
    /// Builds an allow decision.
    #[must_use]
    pub const fn allow(reason: PolicyReason) -> Self {
        Self {
            action: PolicyAction::Allow,
            reason,
        }
    }

    /// Builds a deny decision.
    #[must_use]
    pub const fn deny(reason: PolicyReason) -> Self {
        Self {
            action: PolicyAction::Deny,
            reason,
        }
    }

    /// Builds a require-approval decision.
    #[must_use]
    pub const fn require_approval() -> Self {
        Self {
            action: PolicyAction::RequireApproval,
            reason: PolicyReason::ApprovalRequired,
        }
    }
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Operation-level override action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideAction {
    /// Always allow.
    Allow,
    /// Always deny.
    Deny,
    /// Require approval regardless of class.
    RequireApproval,
}

/// Granularity used to match approvals to calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMatch {
    /// Match on `service.operation`.
    #[default]
    Operation,
    /// Match on `service.operation` and equal call digests.
    Call,
}

/// Policy gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Allow safe writes.
    pub write_safe_enabled: bool,
    /// Operations denied regardless of approval state.
    pub hard_block: BTreeSet<OperationId>,
    /// Per-operation overrides.
    pub overrides: BTreeMap<OperationId, OverrideAction>,
    /// Operations with a standing approval token.
    pub pre_granted: BTreeSet<OperationId>,
    /// Approval matching granularity.
    pub approval_match: ApprovalMatch,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            write_safe_enabled: true,
            hard_block: BTreeSet::new(),
            overrides: BTreeMap::new(),
            pre_granted: BTreeSet::new(),
            approval_match: ApprovalMatch::Operation,
        }
    }
}
