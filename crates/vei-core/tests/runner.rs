// crates/vei-core/tests/runner.rs
// ============================================================================
// Module: Workflow Runner Tests
// Description: Failure policies, bounds, approvals, and episode endings.
// Purpose: Pin every runner transition to an observable outcome.
// ============================================================================

//! Workflow runner tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions are permitted."
)]

mod common;

use std::sync::Arc;

use common::FailingSink;
use common::FlushFailingSink;
use common::TestResult;
use common::config;
use common::registry;
use common::sink;
use common::workflow;
use serde_json::Value;
use serde_json::json;
use vei_core::ApprovalResolution;
use vei_core::EpisodeStatus;
use vei_core::OperationId;
use vei_core::StepId;
use vei_core::StepTransition;
use vei_core::StepVerdict;
use vei_core::TerminalReason;
use vei_core::compile;
use vei_core::runtime::MemoryAuditSink;
use vei_core::runtime::RunProgress;
use vei_core::runtime::RunnerConfig;
use vei_core::runtime::RunnerError;
use vei_core::runtime::Session;
use vei_core::runtime::WorkflowRunner;

fn read_step(id: &str) -> Value {
    json!({ "id": id, "call": { "service": "browser", "operation": "read", "args": {} } })
}

/// A read step whose expectation can never hold.
fn failing_step(id: &str, on_failure: &str) -> Value {
    json!({
        "id": id,
        "call": { "service": "browser", "operation": "read", "args": {} },
        "expect": [{ "kind": "result_equals", "field": "count", "equals": 99 }],
        "on_failure": on_failure
    })
}

fn runner_for(value: Value, runner_config: RunnerConfig) -> Result<(WorkflowRunner, Session), Box<dyn std::error::Error>> {
    let compiled = compile(workflow(value)?, &registry()?)?;
    let runner = WorkflowRunner::new(compiled, runner_config);
    let session = runner.session_builder(config(3)).build()?;
    Ok((runner, session))
}

fn approval_workflow(fallback: Option<&str>) -> Value {
    let mut send = json!({
        "id": "send",
        "call": { "service": "mail", "operation": "send", "args": { "to": "vendor@example.com" } }
    });
    if let Some(fallback) = fallback {
        send["approval_fallback"] = json!(fallback);
    }
    json!({
        "name": "gated-send",
        "steps": [
            {
                "id": "ask",
                "call": { "service": "approvals", "operation": "request", "args": { "service": "mail", "operation": "send" } }
            },
            send
        ]
    })
}

#[test]
fn linear_workflows_succeed() -> TestResult {
    let (mut runner, mut session) = runner_for(
        json!({
            "name": "linear",
            "steps": [read_step("a"), { "id": "b", "call": { "service": "slack", "operation": "post", "args": { "text": "hi" } } }],
            "success": [{ "kind": "all_steps_succeeded" }]
        }),
        RunnerConfig::default(),
    )?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Succeeded));
    assert_eq!(runner.state().reason, Some(TerminalReason::Completed));
    let transitions: Vec<&StepTransition> = runner.state().history.iter().map(|outcome| &outcome.transition).collect();
    assert_eq!(transitions, vec![&StepTransition::Advance, &StepTransition::Advance]);
    assert_eq!(runner.state().history[1].sequence, Some(2));
    // A finished runner reports the same status again.
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Succeeded));
    Ok(())
}

#[test]
fn fail_policy_stops_the_episode() -> TestResult {
    let (mut runner, mut session) = runner_for(
        json!({ "name": "w", "steps": [failing_step("a", "fail"), read_step("b")] }),
        RunnerConfig::default(),
    )?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Failed));
    assert_eq!(runner.state().reason, Some(TerminalReason::StepFailed {
        step: StepId::new("a")
    }));
    assert_eq!(runner.state().history.len(), 1);
    assert!(matches!(runner.state().history[0].verdict, StepVerdict::AssertionFailed { ref failures } if failures[0].contains("count")));
    assert_eq!(session.sequence(), 1);
    Ok(())
}

#[test]
fn continue_policy_moves_on_and_criteria_decide() -> TestResult {
    let source = json!({ "name": "w", "steps": [failing_step("a", "continue"), read_step("b")] });
    let (mut runner, mut session) = runner_for(source.clone(), RunnerConfig::default())?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Succeeded));
    assert_eq!(runner.state().history[0].transition, StepTransition::Continue);

    let mut strict = source;
    strict["success"] = json!([{ "kind": "max_failures", "max": 0 }]);
    let (mut runner, mut session) = runner_for(strict, RunnerConfig::default())?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Failed));
    assert!(matches!(runner.state().reason, Some(TerminalReason::SuccessCriteriaFailed { .. })));
    Ok(())
}

#[test]
fn jumps_are_bounded() -> TestResult {
    let (mut runner, mut session) = runner_for(
        json!({ "name": "w", "steps": [read_step("a"), failing_step("b", "jump:a")] }),
        RunnerConfig {
            max_jumps: 2,
            ..RunnerConfig::default()
        },
    )?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Failed));
    assert_eq!(runner.state().reason, Some(TerminalReason::JumpLimitExceeded {
        step: StepId::new("b"),
        limit: 2,
    }));
    assert_eq!(runner.state().jumps, 2);
    assert_eq!(runner.state().executions, 6);
    Ok(())
}

#[test]
fn max_attempts_turns_the_last_failure_into_fail() -> TestResult {
    let mut retried = failing_step("b", "jump:a");
    retried["max_attempts"] = json!(2);
    let (mut runner, mut session) =
        runner_for(json!({ "name": "w", "steps": [read_step("a"), retried] }), RunnerConfig::default())?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Failed));
    assert_eq!(runner.state().reason, Some(TerminalReason::StepFailed {
        step: StepId::new("b")
    }));
    assert_eq!(runner.state().attempts(&StepId::new("b")), 2);
    Ok(())
}

#[test]
fn skipped_steps_fail_the_episode() -> TestResult {
    let (mut runner, mut session) = runner_for(
        json!({ "name": "w", "steps": [failing_step("a", "jump:c"), read_step("b"), read_step("c")] }),
        RunnerConfig::default(),
    )?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Failed));
    assert_eq!(runner.state().reason, Some(TerminalReason::StepsNotVisited {
        steps: vec![StepId::new("b")]
    }));
    Ok(())
}

#[test]
fn execution_budget_aborts_the_episode() -> TestResult {
    let (mut runner, mut session) = runner_for(
        json!({ "name": "w", "steps": [read_step("a"), read_step("b")] }),
        RunnerConfig {
            max_step_executions: 1,
            ..RunnerConfig::default()
        },
    )?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Aborted));
    assert_eq!(runner.state().reason, Some(TerminalReason::EpisodeTimeout));
    assert_eq!(session.sequence(), 1);
    Ok(())
}

#[test]
fn unresolved_templates_fail_without_dispatch() -> TestResult {
    let (mut runner, mut session) = runner_for(
        json!({
            "name": "w",
            "steps": [{
                "id": "a",
                "call": { "service": "docs", "operation": "search", "args": { "q": "${world.docs.missing}" } }
            }]
        }),
        RunnerConfig::default(),
    )?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Failed));
    assert!(matches!(runner.state().history[0].verdict, StepVerdict::AssertionFailed { .. }));
    assert_eq!(runner.state().history[0].sequence, None);
    assert_eq!(session.sequence(), 0);
    Ok(())
}

#[test]
fn templates_feed_earlier_results_forward() -> TestResult {
    let (mut runner, mut session) = runner_for(
        json!({
            "name": "w",
            "world": { "crm": { "list_contacts": [{ "name": "Ada", "id": "C-7" }] } },
            "steps": [
                { "id": "contacts", "call": { "service": "crm", "operation": "list_contacts", "args": {} } },
                {
                    "id": "log",
                    "call": {
                        "service": "crm",
                        "operation": "log_activity",
                        "args": { "contact": "${steps.contacts.view.0.id}", "note": "Called ${steps.contacts.view.0.name}" }
                    }
                }
            ]
        }),
        RunnerConfig::default(),
    )?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Succeeded));
    let logged = &session.receipts()[1].redacted_args;
    assert_eq!(logged["contact"], json!("C-7"));
    assert_eq!(logged["note"], json!("Called Ada"));
    Ok(())
}

#[test]
fn blocked_steps_suspend_until_approved() -> TestResult {
    let (mut runner, mut session) = runner_for(approval_workflow(None), RunnerConfig::default())?;
    let RunProgress::Suspended(suspension) = runner.run(&mut session)? else {
        panic!("expected suspension");
    };
    assert_eq!(suspension.step, StepId::new("send"));
    assert_eq!(suspension.approval.as_str(), "approval-1");
    // Still blocked: running again yields the same suspension without dispatching.
    assert_eq!(runner.run(&mut session)?, RunProgress::Suspended(suspension));
    assert_eq!(session.sequence(), 1);

    session.approve(&OperationId::new("mail", "send"))?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Succeeded));
    assert_eq!(session.world().records("mail").len(), 1);
    Ok(())
}

#[test]
fn denied_suspensions_settle_as_approval_denied() -> TestResult {
    let (mut runner, mut session) = runner_for(approval_workflow(None), RunnerConfig::default())?;
    assert!(matches!(runner.run(&mut session)?, RunProgress::Suspended(_)));
    session.deny(&OperationId::new("mail", "send"))?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Failed));
    let last = runner.state().history.last().unwrap();
    assert!(matches!(last.verdict, StepVerdict::ApprovalDenied { ref approval } if approval.as_str() == "approval-1"));
    assert!(session.world().records("mail").is_empty());
    Ok(())
}

#[test]
fn auto_deny_resolves_the_blocking_approval() -> TestResult {
    let (mut runner, mut session) = runner_for(approval_workflow(Some("auto_deny")), RunnerConfig::default())?;
    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Failed));
    let last = runner.state().history.last().unwrap();
    assert!(matches!(last.verdict, StepVerdict::ApprovalDenied { .. }));
    let entry = session.approval(&"approval-1".into()).unwrap();
    assert_eq!(entry.resolution, ApprovalResolution::Denied);
    assert_eq!(session.receipts().last().unwrap().operation.as_str(), "deny");
    Ok(())
}

#[test]
fn ending_a_suspended_episode_expires_the_approval() -> TestResult {
    let (mut runner, mut session) = runner_for(approval_workflow(None), RunnerConfig::default())?;
    assert!(matches!(runner.run(&mut session)?, RunProgress::Suspended(_)));
    assert_eq!(runner.end_episode(&mut session)?, EpisodeStatus::Aborted);
    assert_eq!(runner.state().reason, Some(TerminalReason::EpisodeTimeout));
    let last = runner.state().history.last().unwrap();
    assert!(matches!(last.verdict, StepVerdict::ApprovalExpired { .. }));
    assert_eq!(last.transition, StepTransition::Stop);
    assert!(session.is_closed());
    assert_eq!(session.approval(&"approval-1".into()).unwrap().resolution, ApprovalResolution::Expired);
    Ok(())
}

#[test]
fn failed_flush_still_aborts_the_episode() -> TestResult {
    let compiled = compile(workflow(approval_workflow(None))?, &registry()?)?;
    let mut runner = WorkflowRunner::new(compiled, RunnerConfig::default());
    let mut session = runner.session_builder(config(3)).receipt_sink(sink(FlushFailingSink)).build()?;
    assert!(matches!(runner.run(&mut session)?, RunProgress::Suspended(_)));

    let err = runner.end_episode(&mut session).unwrap_err();
    assert!(matches!(err, RunnerError::Router(_)));
    assert_eq!(runner.state().status, EpisodeStatus::Aborted);
    assert_eq!(runner.state().reason, Some(TerminalReason::EpisodeTimeout));
    assert!(runner.state().suspended.is_none());
    let last = runner.state().history.last().unwrap();
    assert!(matches!(last.verdict, StepVerdict::ApprovalExpired { .. }));

    assert_eq!(runner.run(&mut session)?, RunProgress::Finished(EpisodeStatus::Aborted));
    assert_eq!(runner.state().reason, Some(TerminalReason::EpisodeTimeout));
    Ok(())
}

#[test]
fn ending_a_finished_episode_keeps_its_status() -> TestResult {
    let (mut runner, mut session) =
        runner_for(json!({ "name": "w", "steps": [read_step("a")] }), RunnerConfig::default())?;
    runner.run(&mut session)?;
    assert_eq!(runner.end_episode(&mut session)?, EpisodeStatus::Succeeded);
    Ok(())
}

#[test]
fn router_failures_abort_the_episode() -> TestResult {
    let compiled = compile(workflow(json!({ "name": "w", "steps": [read_step("a")] }))?, &registry()?)?;
    let mut runner = WorkflowRunner::new(compiled, RunnerConfig::default());
    let mut session = runner.session_builder(config(3)).receipt_sink(sink(FailingSink)).build()?;
    let err = runner.run(&mut session).unwrap_err();
    assert!(matches!(err, RunnerError::Router(_)));
    assert_eq!(runner.state().status, EpisodeStatus::Aborted);
    assert!(matches!(runner.state().reason, Some(TerminalReason::RouterFailure { .. })));
    Ok(())
}

#[test]
fn episode_events_are_audited() -> TestResult {
    let audit = Arc::new(MemoryAuditSink::new());
    let compiled = compile(workflow(approval_workflow(None))?, &registry()?)?;
    let mut runner = WorkflowRunner::new(compiled, RunnerConfig::default()).with_audit(audit.clone());
    let mut session = runner.session_builder(config(3)).build()?;
    runner.run(&mut session)?;
    session.approve(&OperationId::new("mail", "send"))?;
    runner.run(&mut session)?;

    let events: Vec<String> =
        audit.events().iter().filter_map(|event| event["event"].as_str().map(str::to_string)).collect();
    assert_eq!(events, vec!["episode_suspended", "episode_resumed", "episode_status"]);
    let last = audit.events().last().cloned().unwrap();
    assert_eq!(last["status"], json!("succeeded"));
    assert_eq!(last["detail"]["kind"], json!("completed"));
    Ok(())
}
