// crates/vei-core/src/core/workflow.rs
// ============================================================================
// Module: VEI Workflow Model
// Description: Workflow source documents and compiled, indexed step graphs.
// Purpose: Define the declarative workflow DSL and its validated form.
// Dependencies: serde, serde_json, toml
// ============================================================================

//! ## Overview
//! A [`WorkflowSource`] is the authored document (JSON or TOML). The
//! compiler turns it into a [`CompiledWorkflow`]: an immutable step graph
//! indexed by step id, with resolved operations, failure-path edges, the
//! initial world snapshot, and a structural fingerprint for deduplication.
//!
//! `on_failure` is written as `fail`, `continue`, or `jump:<step_id>`.
//! String arguments of the form `${steps.<id>.<path>}` or `${world.<path>}`
//! are templates resolved by the runner at dispatch time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::OperationId;
use crate::core::identifiers::StepId;
use crate::core::identifiers::WorkflowName;
use crate::core::operation::ApprovalControl;
use crate::core::operation::OperationRoute;
use crate::core::operation::OperationSpec;
use crate::core::result::ResultStatus;
use crate::core::world::WorldSnapshot;

// ============================================================================
// SECTION: Source Errors
// ============================================================================

/// Errors raised while parsing a workflow document.
#[derive(Debug, Error)]
pub enum WorkflowSourceError {
    /// JSON parse failure.
    #[error("invalid workflow json: {0}")]
    Json(String),
    /// TOML parse failure.
    #[error("invalid workflow toml: {0}")]
    Toml(String),
}

// ============================================================================
// SECTION: Failure Policy
// ============================================================================

/// Step failure policy as authored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FailurePolicy {
    /// Fail the episode.
    #[default]
    Fail,
    /// Record the failure and advance (`skip` is accepted as an alias).
    Continue,
    /// Move the step pointer to another step.
    Jump(StepId),
}

/// Prefix of the jump policy form.
const JUMP_PREFIX: &str = "jump:";

/// Errors raised when parsing a failure policy string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailurePolicyError {
    /// Unrecognized policy text.
    #[error("on_failure must be fail, continue, skip, or jump:<step_id>; got `{0}`")]
    Unrecognized(String),
}

impl TryFrom<String> for FailurePolicy {
    type Error = FailurePolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        let keyword = trimmed.to_ascii_lowercase();
        match keyword.as_str() {
            "" | "fail" => Ok(Self::Fail),
            "continue" | "skip" => Ok(Self::Continue),
            _ => match trimmed.split_at_checked(JUMP_PREFIX.len()) {
                // Keywords are case-insensitive; the jump target keeps its case.
                Some((prefix, target)) if prefix.eq_ignore_ascii_case(JUMP_PREFIX) => {
                    let target = target.trim();
                    if target.is_empty() {
                        Err(FailurePolicyError::Unrecognized(value))
                    } else {
                        Ok(Self::Jump(StepId::new(target)))
                    }
                }
                _ => Err(FailurePolicyError::Unrecognized(value)),
            },
        }
    }
}

impl From<FailurePolicy> for String {
    fn from(value: FailurePolicy) -> Self {
        value.to_string()
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => f.write_str("fail"),
            Self::Continue => f.write_str("continue"),
            Self::Jump(target) => write!(f, "jump:{target}"),
        }
    }
}

/// Fallback applied when an unresolved approval blocks a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalFallback {
    /// Deny the blocking approval instead of suspending.
    AutoDeny,
}

// ============================================================================
// SECTION: Expectations
// ============================================================================

/// Per-step expectation evaluated against a result envelope.
///
/// `field` paths are dotted and resolve against the result `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    /// Result status equals the given value.
    Status {
        /// Expected status.
        equals: ResultStatus,
    },
    /// Rendered field text contains a substring.
    ResultContains {
        /// Field path; the whole data value when absent.
        #[serde(default)]
        field: Option<String>,
        /// Required substring.
        contains: String,
    },
    /// Field equals a JSON value.
    ResultEquals {
        /// Field path; the whole data value when absent.
        #[serde(default)]
        field: Option<String>,
        /// Expected value.
        equals: Value,
    },
    /// Field exists and is not null.
    FieldPresent {
        /// Field path.
        field: String,
    },
    /// Unresolved approvals in the session do not exceed a bound.
    PendingMax {
        /// Maximum unresolved approvals.
        max: usize,
    },
}

/// Workflow-level success criterion evaluated against the outcome history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuccessCriterion {
    /// The latest outcome of a step passed.
    StepSucceeded {
        /// Step to check.
        step: StepId,
    },
    /// The latest outcome of every step passed.
    AllStepsSucceeded,
    /// Failed outcomes in the history do not exceed a bound.
    MaxFailures {
        /// Maximum failed outcomes.
        max: usize,
    },
    /// Unresolved approvals at the end do not exceed a bound.
    PendingMax {
        /// Maximum unresolved approvals.
        max: usize,
    },
}

// ============================================================================
// SECTION: Source Document
// ============================================================================

/// Workflow objective.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Objective {
    /// Objective statement.
    #[serde(default)]
    pub statement: String,
    /// Human-readable success notes.
    #[serde(default)]
    pub success: Vec<String>,
}

/// Actor participating in the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Actor identifier.
    pub actor_id: String,
    /// Actor role.
    pub role: String,
    /// Mail address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Chat handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<String>,
}

/// Declared business constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Constraint name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Whether the constraint is mandatory.
    #[serde(default = "default_true")]
    pub required: bool,
}

/// Declared approval stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStage {
    /// Stage name.
    pub stage: String,
    /// Approver actor or role.
    pub approver: String,
    /// Whether the stage is mandatory.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Evidence the approver expects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Declared recovery path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePath {
    /// Path name.
    pub name: String,
    /// Step whose failure triggers the path.
    pub trigger_step: StepId,
    /// Steps that recover from the failure.
    #[serde(default)]
    pub recovery_steps: Vec<StepId>,
    /// Notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Tool call as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSource {
    /// Service name.
    pub service: String,
    /// Operation name.
    pub operation: String,
    /// Argument template.
    #[serde(default)]
    pub args: Value,
}

/// Step as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSource {
    /// Step identifier.
    pub id: StepId,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Tool call.
    pub call: CallSource,
    /// Expectations; `status == ok` when empty.
    #[serde(default)]
    pub expect: Vec<Expectation>,
    /// Failure policy.
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Attempts after which any failure is final.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Fallback when an approval blocks the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_fallback: Option<ApprovalFallback>,
}

/// Authored workflow document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSource {
    /// Workflow name.
    pub name: WorkflowName,
    /// Objective.
    #[serde(default)]
    pub objective: Objective,
    /// Initial world snapshot.
    #[serde(default)]
    pub world: Value,
    /// Actors.
    #[serde(default)]
    pub actors: Vec<Actor>,
    /// Constraints.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Approval stages.
    #[serde(default)]
    pub approvals: Vec<ApprovalStage>,
    /// Steps in declaration order.
    pub steps: Vec<StepSource>,
    /// Success criteria.
    #[serde(default)]
    pub success: Vec<SuccessCriterion>,
    /// Declared recovery paths.
    #[serde(default)]
    pub failure_paths: Vec<FailurePath>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Serde default helper for `required` flags.
const fn default_true() -> bool {
    true
}

impl WorkflowSource {
    /// Parses a workflow from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowSourceError::Json`] on malformed input.
    pub fn from_json_str(input: &str) -> Result<Self, WorkflowSourceError> {
        serde_json::from_str(input).map_err(|err| WorkflowSourceError::Json(err.to_string()))
    }

    /// Parses a workflow from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowSourceError::Toml`] on malformed input.
    pub fn from_toml_str(input: &str) -> Result<Self, WorkflowSourceError> {
        toml::from_str(input).map_err(|err| WorkflowSourceError::Toml(err.to_string()))
    }
}

// ============================================================================
// SECTION: Compiled Workflow
// ============================================================================

/// Resolved failure policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompiledFailurePolicy {
    /// Fail the episode.
    Fail,
    /// Record the failure and advance.
    Continue,
    /// Jump to a resolved step.
    Jump {
        /// Target step.
        target: StepId,
        /// Target index.
        index: usize,
    },
}

/// Executable step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledStep {
    /// Position in declaration order.
    pub index: usize,
    /// Step identifier.
    pub id: StepId,
    /// Description.
    pub description: String,
    /// Resolved operation.
    pub operation: OperationSpec,
    /// Argument template.
    pub args: Value,
    /// Expectations; never empty after compilation.
    pub expect: Vec<Expectation>,
    /// Resolved failure policy.
    pub on_failure: CompiledFailurePolicy,
    /// Attempts after which any failure is final.
    pub max_attempts: Option<u32>,
    /// Fallback when an approval blocks the step.
    pub approval_fallback: Option<ApprovalFallback>,
}

impl CompiledStep {
    /// Returns true when the step calls the approval control service.
    #[must_use]
    pub const fn is_approval_step(&self) -> bool {
        self.operation.is_approval_control()
    }

    /// Returns the operation a `request`, `status`, or `approve` step names.
    ///
    /// Only literal `service` and `operation` arguments count; `list`,
    /// `deny`, and non-approval steps name nothing.
    #[must_use]
    pub fn approval_target(&self) -> Option<OperationId> {
        match self.operation.route {
            OperationRoute::ApprovalControl(
                ApprovalControl::Request | ApprovalControl::Status | ApprovalControl::Approve,
            ) => {
                let service = self.args.get("service")?.as_str()?;
                let operation = self.args.get("operation")?.as_str()?;
                Some(OperationId::new(service, operation))
            }
            OperationRoute::ApprovalControl(ApprovalControl::Deny | ApprovalControl::List) | OperationRoute::Adapter => {
                None
            }
        }
    }
}

/// Origin of a failure-path edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum FailureEdgeKind {
    /// Derived from a step's `on_failure: jump:<id>`.
    OnFailure,
    /// Declared in `failure_paths`.
    Declared(String),
}

/// Failure-path edge between steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEdge {
    /// Failing step.
    pub from: StepId,
    /// Recovery step.
    pub to: StepId,
    /// Edge origin.
    pub kind: FailureEdgeKind,
}

/// Validated, immutable workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledWorkflow {
    /// Workflow name.
    name: WorkflowName,
    /// Objective.
    objective: Objective,
    /// Actors.
    actors: Vec<Actor>,
    /// Constraints.
    constraints: Vec<Constraint>,
    /// Approval stages.
    approvals: Vec<ApprovalStage>,
    /// Steps in declaration order.
    steps: Vec<CompiledStep>,
    /// Step index by id.
    index: BTreeMap<StepId, usize>,
    /// Failure-path edges.
    failure_edges: Vec<FailureEdge>,
    /// Success criteria.
    success: Vec<SuccessCriterion>,
    /// Initial world snapshot.
    world: WorldSnapshot,
    /// Structural fingerprint of the source.
    structural_fingerprint: HashDigest,
    /// Tags.
    tags: Vec<String>,
    /// Metadata.
    metadata: BTreeMap<String, Value>,
}

/// Parts assembled by the compiler.
pub(crate) struct CompiledParts {
    /// Source document.
    pub source: WorkflowSource,
    /// Compiled steps.
    pub steps: Vec<CompiledStep>,
    /// Failure-path edges.
    pub failure_edges: Vec<FailureEdge>,
    /// Structural fingerprint.
    pub structural_fingerprint: HashDigest,
}

impl CompiledWorkflow {
    /// Assembles a compiled workflow from validated parts.
    pub(crate) fn from_parts(parts: CompiledParts) -> Self {
        let CompiledParts {
            source,
            steps,
            failure_edges,
            structural_fingerprint,
        } = parts;
        let index = steps.iter().map(|step| (step.id.clone(), step.index)).collect();
        Self {
            name: source.name,
            objective: source.objective,
            actors: source.actors,
            constraints: source.constraints,
            approvals: source.approvals,
            steps,
            index,
            failure_edges,
            success: source.success,
            world: WorldSnapshot::new(source.world),
            structural_fingerprint,
            tags: source.tags,
            metadata: source.metadata,
        }
    }

    /// Returns the workflow name.
    #[must_use]
    pub const fn name(&self) -> &WorkflowName {
        &self.name
    }

    /// Returns the objective.
    #[must_use]
    pub const fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Returns the actors.
    #[must_use]
    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    /// Returns the constraints.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Returns the approval stages.
    #[must_use]
    pub fn approvals(&self) -> &[ApprovalStage] {
        &self.approvals
    }

    /// Returns the steps in declaration order.
    #[must_use]
    pub fn steps(&self) -> &[CompiledStep] {
        &self.steps
    }

    /// Returns a step by index.
    #[must_use]
    pub fn step_at(&self, index: usize) -> Option<&CompiledStep> {
        self.steps.get(index)
    }

    /// Returns a step by id.
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&CompiledStep> {
        self.index.get(id).and_then(|index| self.steps.get(*index))
    }

    /// Returns the declaration position of a step.
    #[must_use]
    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Returns the failure-path edges.
    #[must_use]
    pub fn failure_edges(&self) -> &[FailureEdge] {
        &self.failure_edges
    }

    /// Returns the success criteria.
    #[must_use]
    pub fn success(&self) -> &[SuccessCriterion] {
        &self.success
    }

    /// Returns the initial world snapshot.
    #[must_use]
    pub const fn world(&self) -> &WorldSnapshot {
        &self.world
    }

    /// Returns the structural fingerprint.
    #[must_use]
    pub const fn structural_fingerprint(&self) -> &HashDigest {
        &self.structural_fingerprint
    }

    /// Returns the tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the metadata.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }
}
