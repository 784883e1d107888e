// crates/vei-core/src/runtime/expectations.rs
// ============================================================================
// Module: VEI Expectations
// Description: Step expectation and success criterion evaluation.
// Purpose: Turn result envelopes and run history into pass/fail verdicts.
// Dependencies: serde_json, crate::core
// ============================================================================

//! ## Overview
//! Both evaluators return a list of failure descriptions; an empty list
//! means the check passed. Field paths resolve against result `data` using
//! the same dotted-path rules as the world snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::result::ResultEnvelope;
use crate::core::run_state::EpisodeRunState;
use crate::core::workflow::CompiledWorkflow;
use crate::core::workflow::Expectation;
use crate::core::workflow::SuccessCriterion;
use crate::core::world::resolve_path;

// ============================================================================
// SECTION: Step Expectations
// ============================================================================

/// Evaluates step expectations against a result.
///
/// `pending` is the number of unresolved approvals in the session after the
/// dispatch.
#[must_use]
pub fn evaluate_expectations(expectations: &[Expectation], result: &ResultEnvelope, pending: usize) -> Vec<String> {
    expectations.iter().filter_map(|expectation| check(expectation, result, pending)).collect()
}

/// Checks one expectation; returns the failure description, if any.
fn check(expectation: &Expectation, result: &ResultEnvelope, pending: usize) -> Option<String> {
    match expectation {
        Expectation::Status {
            equals,
        } => (result.status != *equals)
            .then(|| format!("status: expected {}, got {}", equals.as_str(), result.status.as_str())),
        Expectation::ResultContains {
            field,
            contains,
        } => match field_value(result, field.as_deref()) {
            None => Some(missing(field.as_deref())),
            Some(value) => (!render(value).contains(contains.as_str()))
                .then(|| format!("{}: does not contain `{contains}`", label(field.as_deref()))),
        },
        Expectation::ResultEquals {
            field,
            equals,
        } => match field_value(result, field.as_deref()) {
            None => Some(missing(field.as_deref())),
            Some(value) => (value != equals).then(|| format!("{}: expected {equals}, got {value}", label(field.as_deref()))),
        },
        Expectation::FieldPresent {
            field,
        } => match field_value(result, Some(field)) {
            Some(value) if !value.is_null() => None,
            _ => Some(missing(Some(field))),
        },
        Expectation::PendingMax {
            max,
        } => (pending > *max).then(|| format!("pending approvals: {pending} exceeds {max}")),
    }
}

/// Resolves a field path against result data.
fn field_value<'a>(result: &'a ResultEnvelope, field: Option<&str>) -> Option<&'a Value> {
    resolve_path(&result.data, field.unwrap_or(""))
}

/// Renders a value as searchable text.
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Returns a display label for a field.
fn label(field: Option<&str>) -> &str {
    field.unwrap_or("data")
}

/// Describes a missing field.
fn missing(field: Option<&str>) -> String {
    format!("{}: missing", label(field))
}

// ============================================================================
// SECTION: Success Criteria
// ============================================================================

/// Evaluates workflow success criteria against the run history.
#[must_use]
pub fn evaluate_criteria(workflow: &CompiledWorkflow, state: &EpisodeRunState, pending: usize) -> Vec<String> {
    let mut failures = Vec::new();
    for criterion in workflow.success() {
        match criterion {
            SuccessCriterion::StepSucceeded {
                step,
            } => {
                if !state.latest_outcome(step).is_some_and(|outcome| outcome.verdict.passed()) {
                    failures.push(format!("step `{step}` did not succeed"));
                }
            }
            SuccessCriterion::AllStepsSucceeded => {
                for step in workflow.steps() {
                    if !state.latest_outcome(&step.id).is_some_and(|outcome| outcome.verdict.passed()) {
                        failures.push(format!("step `{}` did not succeed", step.id));
                    }
                }
            }
            SuccessCriterion::MaxFailures {
                max,
            } => {
                let count = state.failure_count();
                if count > *max {
                    failures.push(format!("failures: {count} exceeds {max}"));
                }
            }
            SuccessCriterion::PendingMax {
                max,
            } => {
                if pending > *max {
                    failures.push(format!("pending approvals: {pending} exceeds {max}"));
                }
            }
        }
    }
    failures
}
