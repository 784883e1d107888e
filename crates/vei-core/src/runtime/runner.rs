// crates/vei-core/src/runtime/runner.rs
// ============================================================================
// Module: VEI Workflow Runner
// Description: Deterministic step loop over a compiled workflow.
// Purpose: Drive a session through a workflow with explicit failure control.
// Dependencies: serde, serde_json, thiserror, crate::{core, runtime}
// ============================================================================

//! ## Overview
//! [`WorkflowRunner`] executes one compiled workflow against one session.
//! Episodes move `running -> succeeded | failed | aborted`; every attempt is
//! recorded as a [`StepOutcome`] with the transition taken, so the whole
//! control flow can be audited from [`EpisodeRunState`].
//!
//! A step blocked by an unresolved approval suspends the runner: [`WorkflowRunner::run`]
//! returns [`RunProgress::Suspended`] and the caller resolves the approval
//! through the session before calling `run` again. Steps declaring
//! `approval_fallback = "auto_deny"` deny the blocking approval instead.
//! [`WorkflowRunner::end_episode`] expires whatever is still unresolved.
//!
//! Jumps are bounded by [`RunnerConfig::max_jumps`] and total dispatch
//! attempts by [`RunnerConfig::max_step_executions`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::approval::ApprovalResolution;
use crate::core::envelope::Fingerprint;
use crate::core::identifiers::StepId;
use crate::core::result::ResultStatus;
use crate::core::run_state::EpisodeRunState;
use crate::core::run_state::EpisodeStatus;
use crate::core::run_state::StepOutcome;
use crate::core::run_state::StepTransition;
use crate::core::run_state::StepVerdict;
use crate::core::run_state::Suspension;
use crate::core::run_state::TerminalReason;
use crate::core::workflow::ApprovalFallback;
use crate::core::workflow::CompiledFailurePolicy;
use crate::core::workflow::CompiledStep;
use crate::core::workflow::CompiledWorkflow;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::EpisodeAuditEvent;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::audit::audit_timestamp_ms;
use crate::runtime::expectations::evaluate_criteria;
use crate::runtime::expectations::evaluate_expectations;
use crate::runtime::router::RouterError;
use crate::runtime::session::Session;
use crate::runtime::session::SessionBuilder;
use crate::runtime::session::SessionConfig;
use crate::runtime::template::TemplateScope;
use crate::runtime::template::resolve;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Runner limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum jumps per episode.
    pub max_jumps: u32,
    /// Maximum step attempts per episode; the episode timeout.
    pub max_step_executions: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_jumps: 8,
            max_step_executions: 256,
        }
    }
}

// ============================================================================
// SECTION: Errors and Progress
// ============================================================================

/// Runner failures.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The router failed fatally; the episode is aborted.
    #[error("router failure: {0}")]
    Router(#[from] RouterError),
    /// The run state points at a step the workflow does not have.
    #[error("inconsistent run state: {0}")]
    InconsistentState(String),
}

/// Result of driving the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunProgress {
    /// Waiting on an approval; call `run` again once it is resolved.
    Suspended(Suspension),
    /// The episode reached a terminal status.
    Finished(EpisodeStatus),
}

/// What the approval check decided for the current step.
enum ApprovalGate {
    /// Dispatch the step.
    Proceed,
    /// An outcome was recorded without dispatching the step.
    Settled,
    /// Suspend on an unresolved approval.
    Yield(Suspension),
}

/// Dispatch details recorded on an outcome.
struct Dispatched {
    /// Request sequence.
    sequence: u64,
    /// Request fingerprint.
    fingerprint: Fingerprint,
    /// Result status.
    status: ResultStatus,
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Deterministic runner for one episode.
pub struct WorkflowRunner {
    /// Workflow being executed.
    workflow: CompiledWorkflow,
    /// Limits.
    config: RunnerConfig,
    /// Run state.
    state: EpisodeRunState,
    /// Latest result data per step, for templates.
    step_data: BTreeMap<StepId, Value>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
}

impl WorkflowRunner {
    /// Creates a runner positioned at the first step.
    #[must_use]
    pub fn new(workflow: CompiledWorkflow, config: RunnerConfig) -> Self {
        let state = EpisodeRunState::new(workflow.name().clone());
        Self {
            workflow,
            config,
            state,
            step_data: BTreeMap::new(),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns a session builder seeded with the workflow's world.
    #[must_use]
    pub fn session_builder(&self, config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config).world(self.workflow.world().clone())
    }

    /// Returns the workflow.
    #[must_use]
    pub const fn workflow(&self) -> &CompiledWorkflow {
        &self.workflow
    }

    /// Returns the limits.
    #[must_use]
    pub const fn config(&self) -> RunnerConfig {
        self.config
    }

    /// Returns the run state.
    #[must_use]
    pub const fn state(&self) -> &EpisodeRunState {
        &self.state
    }

    /// Runs until the episode finishes or suspends.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Router`] after aborting the episode on a fatal
    /// router failure.
    pub fn run(&mut self, session: &mut Session) -> Result<RunProgress, RunnerError> {
        loop {
            if self.state.status.is_terminal() {
                return Ok(RunProgress::Finished(self.state.status));
            }
            let Some(index) = self.state.current else {
                self.finalize(session);
                continue;
            };
            let step = self
                .workflow
                .step_at(index)
                .cloned()
                .ok_or_else(|| RunnerError::InconsistentState(format!("no step at index {index}")))?;

            match self.check_approval(session, &step)? {
                ApprovalGate::Yield(suspension) => return Ok(RunProgress::Suspended(suspension)),
                ApprovalGate::Settled => continue,
                ApprovalGate::Proceed => {}
            }
            if self.state.executions >= self.config.max_step_executions {
                self.terminate(EpisodeStatus::Aborted, TerminalReason::EpisodeTimeout, Some(&step.id));
                continue;
            }
            self.execute(session, &step)?;
        }
    }

    /// Handles approvals blocking a step.
    fn check_approval(&mut self, session: &mut Session, step: &CompiledStep) -> Result<ApprovalGate, RunnerError> {
        if let Some(suspension) = self.state.suspended.clone() {
            let resolution = session.approval(&suspension.approval).map(|entry| entry.resolution).ok_or_else(|| {
                RunnerError::InconsistentState(format!("unknown approval {}", suspension.approval))
            })?;
            match resolution {
                ApprovalResolution::Unresolved => return Ok(ApprovalGate::Yield(suspension)),
                ApprovalResolution::Approved => {
                    self.state.suspended = None;
                    self.emit("episode_resumed", Some(&step.id), json!({ "approval_id": suspension.approval }));
                }
                ApprovalResolution::Denied => {
                    self.state.suspended = None;
                    self.settle(step, StepVerdict::ApprovalDenied { approval: suspension.approval }, None);
                    return Ok(ApprovalGate::Settled);
                }
                ApprovalResolution::Expired => {
                    self.state.suspended = None;
                    self.settle(step, StepVerdict::ApprovalExpired { approval: suspension.approval }, None);
                    return Ok(ApprovalGate::Settled);
                }
            }
        }
        if step.is_approval_step() {
            return Ok(ApprovalGate::Proceed);
        }
        let Ok(args) = self.resolve_args(step) else {
            return Ok(ApprovalGate::Proceed);
        };
        let blocking = session
            .blocking_approval(&step.operation.id, &args)
            .ok()
            .flatten()
            .map(|entry| entry.id.clone());
        let Some(approval) = blocking else {
            return Ok(ApprovalGate::Proceed);
        };
        if step.approval_fallback == Some(ApprovalFallback::AutoDeny) {
            if let Err(err) = session.deny_call(&step.operation.id, args) {
                return Err(self.abort(err, &step.id));
            }
            self.settle(step, StepVerdict::ApprovalDenied { approval }, None);
            return Ok(ApprovalGate::Settled);
        }
        let suspension = Suspension {
            step: step.id.clone(),
            approval,
        };
        self.state.suspended = Some(suspension.clone());
        self.emit("episode_suspended", Some(&step.id), json!({ "approval_id": suspension.approval }));
        Ok(ApprovalGate::Yield(suspension))
    }

    /// Dispatches a step and settles its outcome.
    fn execute(&mut self, session: &mut Session, step: &CompiledStep) -> Result<(), RunnerError> {
        self.state.executions += 1;
        let args = match self.resolve_args(step) {
            Ok(args) => args,
            Err(reason) => {
                self.settle(step, StepVerdict::AssertionFailed { failures: vec![reason] }, None);
                return Ok(());
            }
        };
        let service = step.operation.id.service().as_str();
        let operation = step.operation.id.operation().as_str();
        let dispatch = match session.dispatch(service, operation, args) {
            Ok(dispatch) => dispatch,
            Err(err @ (RouterError::UnknownOperation(_) | RouterError::InvalidArguments(_))) => {
                self.settle(step, StepVerdict::AssertionFailed { failures: vec![err.to_string()] }, None);
                return Ok(());
            }
            Err(err) => return Err(self.abort(err, &step.id)),
        };
        let pending = session.approvals().unresolved_count();
        let failures = evaluate_expectations(&step.expect, &dispatch.result, pending);
        self.step_data.insert(step.id.clone(), dispatch.result.data.clone());
        let verdict = if failures.is_empty() {
            StepVerdict::Passed
        } else {
            StepVerdict::AssertionFailed {
                failures,
            }
        };
        self.settle(
            step,
            verdict,
            Some(Dispatched {
                sequence: dispatch.result.sequence,
                fingerprint: dispatch.result.fingerprint,
                status: dispatch.result.status,
            }),
        );
        Ok(())
    }

    /// Resolves step argument templates.
    fn resolve_args(&self, step: &CompiledStep) -> Result<Value, String> {
        let scope = TemplateScope {
            steps: &self.step_data,
            world: self.workflow.world(),
        };
        resolve(&step.args, scope).map_err(|err| err.to_string())
    }

    /// Records an attempt and applies the step's failure policy.
    ///
    /// Once a step has used `max_attempts` attempts any failure is final.
    fn settle(&mut self, step: &CompiledStep, verdict: StepVerdict, dispatched: Option<Dispatched>) {
        let attempt = self.state.attempts(&step.id) + 1;
        let next = (step.index + 1 < self.workflow.steps().len()).then_some(step.index + 1);
        let mut terminal = None;
        let transition = if verdict.passed() {
            self.state.current = next;
            StepTransition::Advance
        } else {
            let exhausted = step.max_attempts.is_some_and(|max| attempt >= max);
            let policy = if exhausted { CompiledFailurePolicy::Fail } else { step.on_failure.clone() };
            match policy {
                CompiledFailurePolicy::Fail => {
                    terminal = Some(TerminalReason::StepFailed {
                        step: step.id.clone(),
                    });
                    StepTransition::Stop
                }
                CompiledFailurePolicy::Continue => {
                    self.state.current = next;
                    StepTransition::Continue
                }
                CompiledFailurePolicy::Jump {
                    ..
                } if self.state.jumps >= self.config.max_jumps => {
                    terminal = Some(TerminalReason::JumpLimitExceeded {
                        step: step.id.clone(),
                        limit: self.config.max_jumps,
                    });
                    StepTransition::Stop
                }
                CompiledFailurePolicy::Jump {
                    target,
                    index,
                } => {
                    self.state.jumps += 1;
                    self.state.current = Some(index);
                    StepTransition::Jump(target)
                }
            }
        };
        let (sequence, fingerprint, result_status) = match dispatched {
            Some(dispatched) => (Some(dispatched.sequence), Some(dispatched.fingerprint), Some(dispatched.status)),
            None => (None, None, None),
        };
        self.state.history.push(StepOutcome {
            step: step.id.clone(),
            attempt,
            sequence,
            fingerprint,
            result_status,
            verdict,
            transition,
        });
        if let Some(reason) = terminal {
            self.terminate(EpisodeStatus::Failed, reason, Some(&step.id));
        }
    }

    /// Finalizes an episode whose pointer ran past the last step.
    fn finalize(&mut self, session: &Session) {
        let unvisited: Vec<StepId> = self
            .workflow
            .steps()
            .iter()
            .filter(|step| self.state.latest_outcome(&step.id).is_none())
            .map(|step| step.id.clone())
            .collect();
        if !unvisited.is_empty() {
            self.terminate(
                EpisodeStatus::Failed,
                TerminalReason::StepsNotVisited {
                    steps: unvisited,
                },
                None,
            );
            return;
        }
        let failures = evaluate_criteria(&self.workflow, &self.state, session.approvals().unresolved_count());
        if failures.is_empty() {
            self.terminate(EpisodeStatus::Succeeded, TerminalReason::Completed, None);
        } else {
            self.terminate(
                EpisodeStatus::Failed,
                TerminalReason::SuccessCriteriaFailed {
                    failures,
                },
                None,
            );
        }
    }

    /// Ends the episode early, expiring unresolved approvals.
    ///
    /// A suspended step records an expired-approval outcome; a running
    /// episode becomes aborted with `episode_timeout`. Receipts are flushed
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Router`] when the receipt flush fails. The run
    /// state is already terminal by then.
    pub fn end_episode(&mut self, session: &mut Session) -> Result<EpisodeStatus, RunnerError> {
        let closed = session.close();
        if !self.state.status.is_terminal() {
            self.expire_episode();
        }
        closed?;
        Ok(self.state.status)
    }

    /// Records the expired suspension, if any, and aborts with `episode_timeout`.
    fn expire_episode(&mut self) {
        if let Some(suspension) = self.state.suspended.take() {
            let attempt = self.state.attempts(&suspension.step) + 1;
            self.state.history.push(StepOutcome {
                step: suspension.step.clone(),
                attempt,
                sequence: None,
                fingerprint: None,
                result_status: None,
                verdict: StepVerdict::ApprovalExpired {
                    approval: suspension.approval,
                },
                transition: StepTransition::Stop,
            });
        }
        self.terminate(EpisodeStatus::Aborted, TerminalReason::EpisodeTimeout, None);
    }

    /// Maps a fatal router error, aborting the episode.
    fn abort(&mut self, err: RouterError, step: &StepId) -> RunnerError {
        self.terminate(
            EpisodeStatus::Aborted,
            TerminalReason::RouterFailure {
                message: err.to_string(),
            },
            Some(step),
        );
        RunnerError::Router(err)
    }

    /// Moves the episode to a terminal status.
    fn terminate(&mut self, status: EpisodeStatus, reason: TerminalReason, step: Option<&StepId>) {
        self.state.status = status;
        let detail = serde_json::to_value(&reason).unwrap_or(Value::Null);
        self.state.reason = Some(reason);
        self.emit("episode_status", step, detail);
    }

    /// Emits an episode audit event.
    fn emit(&self, event: &'static str, step: Option<&StepId>, detail: Value) {
        self.audit.record_episode(&EpisodeAuditEvent {
            event,
            timestamp_ms: audit_timestamp_ms(),
            workflow: self.workflow.name().to_string(),
            step: step.map(ToString::to_string),
            status: self.state.status.as_str(),
            detail,
        });
    }
}
