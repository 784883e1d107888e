// crates/vei-core/src/core/run_state.rs
// ============================================================================
// Module: VEI Episode Run State
// Description: Runner progress, step outcomes, and terminal reasons.
// Purpose: Make every runner decision auditable after the fact.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`EpisodeRunState`] is owned and mutated only by the workflow runner. Its
//! outcome history records every attempt in order, including the transition
//! the runner took afterwards, so a reader can reconstruct exactly why an
//! episode ended the way it did.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::envelope::Fingerprint;
use crate::core::identifiers::ApprovalId;
use crate::core::identifiers::StepId;
use crate::core::identifiers::WorkflowName;
use crate::core::result::ResultStatus;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Episode status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    /// Steps remain to be executed.
    Running,
    /// Every step was visited and the success criteria held.
    Succeeded,
    /// A step failure or unmet criteria ended the episode.
    Failed,
    /// The episode was cut short.
    Aborted,
}

impl EpisodeStatus {
    /// Returns true for succeeded, failed, and aborted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

/// Why an episode reached its terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalReason {
    /// All steps visited and criteria held.
    Completed,
    /// A step failed under `on_failure: fail`.
    StepFailed {
        /// Failing step.
        step: StepId,
    },
    /// The jump counter exceeded its bound.
    JumpLimitExceeded {
        /// Step whose jump was refused.
        step: StepId,
        /// Configured bound.
        limit: u32,
    },
    /// Some steps were never visited.
    StepsNotVisited {
        /// Unvisited steps.
        steps: Vec<StepId>,
    },
    /// Success criteria failed.
    SuccessCriteriaFailed {
        /// Failure descriptions.
        failures: Vec<String>,
    },
    /// The execution budget ran out or the episode ended early.
    EpisodeTimeout,
    /// The router failed fatally.
    RouterFailure {
        /// Failure description.
        message: String,
    },
}

// ============================================================================
// SECTION: Step Outcomes
// ============================================================================

/// Verdict for one step attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepVerdict {
    /// Every expectation held.
    Passed,
    /// Expectations failed or the router rejected the call.
    AssertionFailed {
        /// Failure descriptions.
        failures: Vec<String>,
    },
    /// An approval blocking the step was denied.
    ApprovalDenied {
        /// Denied approval.
        approval: ApprovalId,
    },
    /// An approval blocking the step expired at episode end.
    ApprovalExpired {
        /// Expired approval.
        approval: ApprovalId,
    },
}

impl StepVerdict {
    /// Returns true for passed verdicts.
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// What the runner did after an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum StepTransition {
    /// Advanced to the next step.
    Advance,
    /// Recorded the failure and advanced.
    Continue,
    /// Jumped to another step.
    Jump(StepId),
    /// Ended the episode.
    Stop,
}

/// One recorded step attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Step identifier.
    pub step: StepId,
    /// Attempt number for this step, starting at 1.
    pub attempt: u32,
    /// Dispatch sequence, absent when nothing was dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Dispatch fingerprint, absent when nothing was dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    /// Result status, absent when nothing was dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_status: Option<ResultStatus>,
    /// Verdict.
    pub verdict: StepVerdict,
    /// Transition taken.
    pub transition: StepTransition,
}

/// Suspension on an unresolved approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    /// Suspended step.
    pub step: StepId,
    /// Blocking approval.
    pub approval: ApprovalId,
}

// ============================================================================
// SECTION: Run State
// ============================================================================

/// Runner progress for one episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRunState {
    /// Workflow being executed.
    pub workflow: WorkflowName,
    /// Episode status.
    pub status: EpisodeStatus,
    /// Current step index; `None` once past the last step.
    pub current: Option<usize>,
    /// Outcome history in execution order.
    pub history: Vec<StepOutcome>,
    /// Jumps taken so far.
    pub jumps: u32,
    /// Dispatches performed so far.
    pub executions: u32,
    /// Active suspension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<Suspension>,
    /// Terminal reason once the status is terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<TerminalReason>,
}

impl EpisodeRunState {
    /// Creates a running state positioned at the first step.
    #[must_use]
    pub const fn new(workflow: WorkflowName) -> Self {
        Self {
            workflow,
            status: EpisodeStatus::Running,
            current: Some(0),
            history: Vec::new(),
            jumps: 0,
            executions: 0,
            suspended: None,
            reason: None,
        }
    }

    /// Returns the latest outcome recorded for a step.
    #[must_use]
    pub fn latest_outcome(&self, step: &StepId) -> Option<&StepOutcome> {
        self.history.iter().rev().find(|outcome| &outcome.step == step)
    }

    /// Returns the number of attempts recorded for a step.
    #[must_use]
    pub fn attempts(&self, step: &StepId) -> u32 {
        let count = self.history.iter().filter(|outcome| &outcome.step == step).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Returns the number of failed outcomes in the history.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.history.iter().filter(|outcome| !outcome.verdict.passed()).count()
    }

    /// Returns true when the episode is suspended.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }
}
