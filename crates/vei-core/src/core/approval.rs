// crates/vei-core/src/core/approval.rs
// ============================================================================
// Module: VEI Approval Queue
// Description: Pending approvals and their resolution state machine.
// Purpose: Track operations awaiting explicit approval within one session.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A [`PendingApproval`] is created when the gate answers `require_approval`
//! (or when a workflow explicitly requests one) and moves through
//! `unresolved -> approved | denied | expired`. Only unresolved entries ever
//! transition; terminal entries are kept for audit and for the gate's
//! grant/denial lookups.
//!
//! Matching uses [`ApprovalMatch`]: at `operation` granularity any call to
//! the same `service.operation` matches; at `call` granularity the call
//! digests must also agree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::envelope::CallDigest;
use crate::core::envelope::Fingerprint;
use crate::core::identifiers::ApprovalId;
use crate::core::identifiers::OperationId;
use crate::core::policy::ApprovalMatch;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Resolution state of an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalResolution {
    /// Awaiting an explicit decision.
    Unresolved,
    /// Approved by an explicit resolution call.
    Approved,
    /// Denied by an explicit resolution call.
    Denied,
    /// Still unresolved when the episode ended.
    Expired,
}

impl ApprovalResolution {
    /// Returns true for approved, denied, and expired.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Expired => "expired",
        }
    }
}

/// What an approval covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTarget {
    /// Target operation.
    pub operation: OperationId,
    /// Call digest; absent when the approval covers the whole operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_digest: Option<CallDigest>,
}

impl ApprovalTarget {
    /// Creates a target covering every call to the operation.
    #[must_use]
    pub const fn operation(operation: OperationId) -> Self {
        Self {
            operation,
            call_digest: None,
        }
    }

    /// Returns true when this target covers a call.
    ///
    /// Under [`ApprovalMatch::Call`] a target without a digest still covers
    /// every call to its operation.
    #[must_use]
    pub fn covers(&self, operation: &OperationId, digest: &CallDigest, matching: ApprovalMatch) -> bool {
        if &self.operation != operation {
            return false;
        }
        match (matching, &self.call_digest) {
            (ApprovalMatch::Operation, _) | (ApprovalMatch::Call, None) => true,
            (ApprovalMatch::Call, Some(own)) => own == digest,
        }
    }

    /// Returns true when a resolution request addressed to `other` reaches this target.
    fn resolved_by(&self, other: &Self, matching: ApprovalMatch) -> bool {
        if self.operation != other.operation {
            return false;
        }
        match (matching, &other.call_digest, &self.call_digest) {
            (ApprovalMatch::Operation, _, _) | (ApprovalMatch::Call, None, _) => true,
            (ApprovalMatch::Call, Some(requested), Some(own)) => requested == own,
            (ApprovalMatch::Call, Some(_), None) => true,
        }
    }
}

/// One approval in the session queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    /// Session-unique identifier.
    pub id: ApprovalId,
    /// Covered operation or call.
    pub target: ApprovalTarget,
    /// Fingerprint of the request that created the approval.
    pub requested_by: Fingerprint,
    /// Sequence number of the request that created the approval.
    pub requested_at: u64,
    /// Current resolution.
    pub resolution: ApprovalResolution,
    /// Sequence number of the resolving request, if resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Approval queue errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    /// No unresolved approval matched the resolution target.
    #[error("no unresolved approval matches {0}")]
    NoMatchingApproval(OperationId),
    /// Resolutions must be approved or denied.
    #[error("invalid approval resolution: {0}")]
    InvalidResolution(&'static str),
}

// ============================================================================
// SECTION: Queue
// ============================================================================

/// Per-session approval queue.
///
/// # Invariants
/// - Entries are append-only; only `resolution`/`resolved_at` change, once.
/// - Identifiers are `approval-<n>` with `n` starting at 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalQueue {
    /// Matching granularity.
    matching: ApprovalMatch,
    /// Approvals in creation order.
    entries: Vec<PendingApproval>,
}

impl ApprovalQueue {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new(matching: ApprovalMatch) -> Self {
        Self {
            matching,
            entries: Vec::new(),
        }
    }

    /// Returns the matching granularity.
    #[must_use]
    pub const fn matching(&self) -> ApprovalMatch {
        self.matching
    }

    /// Returns every approval in creation order.
    #[must_use]
    pub fn entries(&self) -> &[PendingApproval] {
        &self.entries
    }

    /// Looks up an approval by id.
    #[must_use]
    pub fn get(&self, id: &ApprovalId) -> Option<&PendingApproval> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    /// Returns the number of unresolved approvals.
    #[must_use]
    pub fn unresolved_count(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.resolution.is_terminal()).count()
    }

    /// Returns the oldest unresolved approval covering a call.
    #[must_use]
    pub fn unresolved_for(&self, operation: &OperationId, digest: &CallDigest) -> Option<&PendingApproval> {
        self.entries.iter().find(|entry| {
            entry.resolution == ApprovalResolution::Unresolved
                && entry.target.covers(operation, digest, self.matching)
        })
    }

    /// Returns the most recent terminal resolution covering a call.
    #[must_use]
    pub fn latest_resolution(&self, operation: &OperationId, digest: &CallDigest) -> Option<ApprovalResolution> {
        self.entries
            .iter()
            .filter(|entry| entry.resolution.is_terminal())
            .filter(|entry| entry.target.covers(operation, digest, self.matching))
            .max_by_key(|entry| entry.resolved_at.unwrap_or(entry.requested_at))
            .map(|entry| entry.resolution)
    }

    /// Returns the oldest unresolved approval reached by a target.
    #[must_use]
    pub fn find_unresolved(&self, target: &ApprovalTarget) -> Option<&PendingApproval> {
        self.entries.iter().find(|entry| {
            entry.resolution == ApprovalResolution::Unresolved && entry.target.resolved_by(target, self.matching)
        })
    }

    /// Returns the most recently created approval reached by a target.
    #[must_use]
    pub fn latest_for(&self, target: &ApprovalTarget) -> Option<&PendingApproval> {
        self.entries.iter().rev().find(|entry| entry.target.resolved_by(target, self.matching))
    }

    /// Returns true when an approved entry covers the call.
    #[must_use]
    pub fn is_approved(&self, operation: &OperationId, digest: &CallDigest) -> bool {
        self.latest_resolution(operation, digest) == Some(ApprovalResolution::Approved)
    }

    /// Appends an unresolved approval and returns its identifier.
    pub fn enqueue(&mut self, target: ApprovalTarget, requested_by: Fingerprint, requested_at: u64) -> ApprovalId {
        let id = ApprovalId::new(format!("approval-{}", self.entries.len() + 1));
        self.entries.push(PendingApproval {
            id: id.clone(),
            target,
            requested_by,
            requested_at,
            resolution: ApprovalResolution::Unresolved,
            resolved_at: None,
        });
        id
    }

    /// Resolves every unresolved approval reached by `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::InvalidResolution`] for non-decision
    /// resolutions and [`ApprovalError::NoMatchingApproval`] when nothing
    /// was unresolved.
    pub fn resolve(
        &mut self,
        target: &ApprovalTarget,
        resolution: ApprovalResolution,
        at: u64,
    ) -> Result<Vec<ApprovalId>, ApprovalError> {
        if !matches!(resolution, ApprovalResolution::Approved | ApprovalResolution::Denied) {
            return Err(ApprovalError::InvalidResolution(resolution.as_str()));
        }
        let matching = self.matching;
        let mut resolved = Vec::new();
        for entry in &mut self.entries {
            if entry.resolution == ApprovalResolution::Unresolved && entry.target.resolved_by(target, matching) {
                entry.resolution = resolution;
                entry.resolved_at = Some(at);
                resolved.push(entry.id.clone());
            }
        }
        if resolved.is_empty() {
            return Err(ApprovalError::NoMatchingApproval(target.operation.clone()));
        }
        Ok(resolved)
    }

    /// Expires every unresolved approval and returns their identifiers.
    pub fn expire_all(&mut self, at: u64) -> Vec<ApprovalId> {
        let mut expired = Vec::new();
        for entry in &mut self.entries {
            if entry.resolution == ApprovalResolution::Unresolved {
                entry.resolution = ApprovalResolution::Expired;
                entry.resolved_at = Some(at);
                expired.push(entry.id.clone());
            }
        }
        expired
    }
}
