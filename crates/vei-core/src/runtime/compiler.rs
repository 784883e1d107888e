// crates/vei-core/src/runtime/compiler.rs
// ============================================================================
// Module: VEI Workflow Compiler
// Description: Validates workflow sources and builds compiled step graphs.
// Purpose: Reject unsafe or unbounded workflows before any step runs.
// Dependencies: thiserror, crate::{core, runtime::template}
// ============================================================================

//! ## Overview
//! [`compile`] runs the validation passes in a fixed order and stops at the
//! first failure; it never returns a partially compiled workflow.
//!
//! 1. Structure: at least one step, non-empty unique step ids.
//! 2. Tool availability: every call names a registered operation.
//! 3. Failure-path integrity: jump targets and declared failure paths name
//!    existing steps, and the failure-only walk has no cycle without a step
//!    that declares `max_attempts`.
//! 4. Approval intent: each `write_risky` step follows an
//!    `approvals.{request,status,approve}` step naming its operation, or
//!    declares `approval_fallback = "auto_deny"`.
//! 5. Templates: step references point at earlier steps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::OperationId;
use crate::core::identifiers::StepId;
use crate::core::operation::OperationClass;
use crate::core::operation::OperationRegistry;
use crate::core::result::ResultStatus;
use crate::core::workflow::ApprovalFallback;
use crate::core::workflow::CompiledFailurePolicy;
use crate::core::workflow::CompiledParts;
use crate::core::workflow::CompiledStep;
use crate::core::workflow::CompiledWorkflow;
use crate::core::workflow::Expectation;
use crate::core::workflow::FailureEdge;
use crate::core::workflow::FailureEdgeKind;
use crate::core::workflow::FailurePolicy;
use crate::core::workflow::SuccessCriterion;
use crate::core::workflow::WorkflowSource;
use crate::runtime::template::TemplateRef;
use crate::runtime::template::references;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Compilation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowValidationError {
    /// The workflow declares no steps.
    #[error("workflow declares no steps")]
    NoSteps,
    /// A step id is empty.
    #[error("step at position {0} has an empty id")]
    EmptyStepId(usize),
    /// Two steps share an id.
    #[error("duplicate step id `{0}`")]
    DuplicateStepId(StepId),
    /// A step calls an unregistered operation.
    #[error("step `{step}` calls unknown operation {operation}")]
    UnknownOperation {
        /// Offending step.
        step: StepId,
        /// `service.operation` as written.
        operation: String,
    },
    /// `max_attempts` must be positive.
    #[error("step `{0}` declares max_attempts = 0")]
    ZeroMaxAttempts(StepId),
    /// A jump names a missing step.
    #[error("step `{step}` jumps to unknown step `{target}`")]
    UnknownJumpTarget {
        /// Offending step.
        step: StepId,
        /// Missing target.
        target: StepId,
    },
    /// A declared failure path names a missing step.
    #[error("failure path `{path}` references unknown step `{step}`")]
    UnknownFailurePathStep {
        /// Failure path name.
        path: String,
        /// Missing step.
        step: StepId,
    },
    /// Failure transitions loop with no attempt bound.
    #[error("failure transitions cycle through {} with no max_attempts", display_steps(.0))]
    UnboundedFailureCycle(Vec<StepId>),
    /// A risky step has no prior approval step and no fallback.
    #[error("write_risky step `{step}` ({operation}) has no preceding approval step for {operation} or auto_deny fallback")]
    MissingApprovalIntent {
        /// Offending step.
        step: StepId,
        /// Risky operation.
        operation: String,
    },
    /// A template is malformed or references an unavailable step.
    #[error("step `{step}` has invalid template: {reason}")]
    InvalidTemplate {
        /// Offending step.
        step: StepId,
        /// Failure detail.
        reason: String,
    },
    /// A success criterion names a missing step.
    #[error("success criterion references unknown step `{0}`")]
    UnknownCriterionStep(StepId),
    /// Structural hashing failed.
    #[error("structural fingerprint failed: {0}")]
    Hash(String),
}

/// Joins step ids for error messages.
fn display_steps(steps: &[StepId]) -> String {
    steps.iter().map(StepId::as_str).collect::<Vec<_>>().join(" -> ")
}

// ============================================================================
// SECTION: Compilation
// ============================================================================

/// Compiles a workflow source against an operation registry.
///
/// # Errors
///
/// Returns the first [`WorkflowValidationError`] found.
pub fn compile(
    source: WorkflowSource,
    registry: &OperationRegistry,
) -> Result<CompiledWorkflow, WorkflowValidationError> {
    let positions = check_structure(&source)?;

    let specs = source
        .steps
        .iter()
        .map(|step| {
            registry.lookup(&step.call.service, &step.call.operation).ok_or_else(|| {
                WorkflowValidationError::UnknownOperation {
                    step: step.id.clone(),
                    operation: format!("{}.{}", step.call.service, step.call.operation),
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut steps = Vec::with_capacity(source.steps.len());
    for ((index, step), spec) in source.steps.iter().enumerate().zip(specs) {
        if step.max_attempts == Some(0) {
            return Err(WorkflowValidationError::ZeroMaxAttempts(step.id.clone()));
        }
        let on_failure = match &step.on_failure {
            FailurePolicy::Fail => CompiledFailurePolicy::Fail,
            FailurePolicy::Continue => CompiledFailurePolicy::Continue,
            FailurePolicy::Jump(target) => {
                let target_index = positions.get(target).copied().ok_or_else(|| {
                    WorkflowValidationError::UnknownJumpTarget {
                        step: step.id.clone(),
                        target: target.clone(),
                    }
                })?;
                CompiledFailurePolicy::Jump {
                    target: target.clone(),
                    index: target_index,
                }
            }
        };
        let expect = if step.expect.is_empty() {
            vec![Expectation::Status {
                equals: ResultStatus::Ok,
            }]
        } else {
            step.expect.clone()
        };
        steps.push(CompiledStep {
            index,
            id: step.id.clone(),
            description: step.description.clone(),
            operation: spec.clone(),
            args: step.call.args.clone(),
            expect,
            on_failure,
            max_attempts: step.max_attempts,
            approval_fallback: step.approval_fallback,
        });
    }

    let failure_edges = failure_edges(&source, &steps, &positions)?;
    check_failure_cycles(&steps)?;
    check_approval_intent(&steps)?;
    check_templates(&steps, &positions)?;
    check_success_criteria(&source, &positions)?;

    let structural_fingerprint =
        hash_canonical_json(DEFAULT_HASH_ALGORITHM, &source).map_err(|err| WorkflowValidationError::Hash(err.to_string()))?;
    Ok(CompiledWorkflow::from_parts(CompiledParts {
        source,
        steps,
        failure_edges,
        structural_fingerprint,
    }))
}

/// Checks step presence and id uniqueness; returns positions by id.
fn check_structure(source: &WorkflowSource) -> Result<BTreeMap<StepId, usize>, WorkflowValidationError> {
    if source.steps.is_empty() {
        return Err(WorkflowValidationError::NoSteps);
    }
    let mut positions = BTreeMap::new();
    for (index, step) in source.steps.iter().enumerate() {
        if step.id.as_str().trim().is_empty() {
            return Err(WorkflowValidationError::EmptyStepId(index));
        }
        if positions.insert(step.id.clone(), index).is_some() {
            return Err(WorkflowValidationError::DuplicateStepId(step.id.clone()));
        }
    }
    Ok(positions)
}

/// Collects failure edges from jumps and declared failure paths.
fn failure_edges(
    source: &WorkflowSource,
    steps: &[CompiledStep],
    positions: &BTreeMap<StepId, usize>,
) -> Result<Vec<FailureEdge>, WorkflowValidationError> {
    let mut edges: Vec<FailureEdge> = steps
        .iter()
        .filter_map(|step| match &step.on_failure {
            CompiledFailurePolicy::Jump {
                target, ..
            } => Some(FailureEdge {
                from: step.id.clone(),
                to: target.clone(),
                kind: FailureEdgeKind::OnFailure,
            }),
            CompiledFailurePolicy::Fail | CompiledFailurePolicy::Continue => None,
        })
        .collect();
    for path in &source.failure_paths {
        let known = |step: &StepId| {
            if positions.contains_key(step) {
                Ok(())
            } else {
                Err(WorkflowValidationError::UnknownFailurePathStep {
                    path: path.name.clone(),
                    step: step.clone(),
                })
            }
        };
        known(&path.trigger_step)?;
        for recovery in &path.recovery_steps {
            known(recovery)?;
            edges.push(FailureEdge {
                from: path.trigger_step.clone(),
                to: recovery.clone(),
                kind: FailureEdgeKind::Declared(path.name.clone()),
            });
        }
    }
    Ok(edges)
}

/// Returns the step reached when `index` fails, if any.
fn failure_successor(steps: &[CompiledStep], index: usize) -> Option<usize> {
    match steps.get(index).map(|step| &step.on_failure) {
        Some(CompiledFailurePolicy::Jump {
            index: target, ..
        }) => Some(*target),
        Some(CompiledFailurePolicy::Continue) if index + 1 < steps.len() => Some(index + 1),
        _ => None,
    }
}

/// Rejects failure-only cycles that no `max_attempts` bound can exit.
fn check_failure_cycles(steps: &[CompiledStep]) -> Result<(), WorkflowValidationError> {
    // 0 = unvisited, 1 = on the current walk, 2 = done.
    let mut marks = vec![0_u8; steps.len()];
    for start in 0 .. steps.len() {
        let mut walk = Vec::new();
        let mut current = Some(start);
        while let Some(index) = current {
            match marks[index] {
                2 => break,
                1 => {
                    let from = walk.iter().position(|visited| *visited == index).unwrap_or(0);
                    let cycle = &walk[from ..];
                    if !cycle.iter().any(|member: &usize| steps[*member].max_attempts.is_some()) {
                        return Err(WorkflowValidationError::UnboundedFailureCycle(
                            cycle.iter().map(|member| steps[*member].id.clone()).collect(),
                        ));
                    }
                    break;
                }
                _ => {
                    marks[index] = 1;
                    walk.push(index);
                    current = failure_successor(steps, index);
                }
            }
        }
        for visited in walk {
            marks[visited] = 2;
        }
    }
    Ok(())
}

/// Requires an approval step naming each risky step's operation before it,
/// unless the risky step auto-denies.
fn check_approval_intent(steps: &[CompiledStep]) -> Result<(), WorkflowValidationError> {
    let mut approved: BTreeSet<OperationId> = BTreeSet::new();
    for step in steps {
        if step.operation.class == OperationClass::WriteRisky
            && !approved.contains(&step.operation.id)
            && step.approval_fallback != Some(ApprovalFallback::AutoDeny)
        {
            return Err(WorkflowValidationError::MissingApprovalIntent {
                step: step.id.clone(),
                operation: step.operation.id.to_string(),
            });
        }
        if let Some(target) = step.approval_target() {
            approved.insert(target);
        }
    }
    Ok(())
}

/// Checks that step templates only reference earlier steps.
fn check_templates(steps: &[CompiledStep], positions: &BTreeMap<StepId, usize>) -> Result<(), WorkflowValidationError> {
    for step in steps {
        let refs = references(&step.args).map_err(|err| WorkflowValidationError::InvalidTemplate {
            step: step.id.clone(),
            reason: err.to_string(),
        })?;
        for reference in refs {
            if let TemplateRef::Step {
                step: target, ..
            } = reference
            {
                match positions.get(&target) {
                    Some(position) if *position < step.index => {}
                    _ => {
                        return Err(WorkflowValidationError::InvalidTemplate {
                            step: step.id.clone(),
                            reason: format!("`{target}` is not an earlier step"),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// Checks that success criteria name existing steps.
fn check_success_criteria(
    source: &WorkflowSource,
    positions: &BTreeMap<StepId, usize>,
) -> Result<(), WorkflowValidationError> {
    for criterion in &source.success {
        if let SuccessCriterion::StepSucceeded {
            step,
        } = criterion
            && !positions.contains_key(step)
        {
            return Err(WorkflowValidationError::UnknownCriterionStep(step.clone()));
        }
    }
    Ok(())
}
