// crates/vei-core/tests/compiler.rs
// ============================================================================
// Module: Workflow Compiler Tests
// Description: Validation failures, compiled defaults, and fingerprints.
// Purpose: Reject malformed workflows before any call is dispatched.
// ============================================================================

//! Workflow compiler tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions are permitted."
)]

mod common;

use common::TestResult;
use common::registry;
use common::scenario_source;
use common::workflow;
use serde_json::Value;
use serde_json::json;
use vei_core::CompiledFailurePolicy;
use vei_core::Expectation;
use vei_core::FailureEdgeKind;
use vei_core::FailurePolicy;
use vei_core::ResultStatus;
use vei_core::StepId;
use vei_core::WorkflowSource;
use vei_core::WorkflowValidationError;
use vei_core::compile;

fn step(id: &str, service: &str, operation: &str) -> Value {
    json!({ "id": id, "call": { "service": service, "operation": operation, "args": {} } })
}

fn compile_err(value: Value) -> WorkflowValidationError {
    compile(workflow(value).unwrap(), &registry().unwrap()).unwrap_err()
}

#[test]
fn scenario_compiles_with_defaults() -> TestResult {
    let compiled = compile(scenario_source()?, &registry()?)?;
    assert_eq!(compiled.steps().len(), 4);
    let post = compiled.step(&StepId::new("post")).unwrap();
    assert_eq!(post.expect, vec![Expectation::Status {
        equals: ResultStatus::Ok
    }]);
    assert_eq!(post.on_failure, CompiledFailurePolicy::Fail);
    let send = compiled.step(&StepId::new("send")).unwrap();
    assert_eq!(send.on_failure, CompiledFailurePolicy::Jump {
        target: StepId::new("retry_approval"),
        index: 2,
    });
    assert!(compiled.step(&StepId::new("retry_approval")).unwrap().is_approval_step());
    assert_eq!(compiled.position(&StepId::new("send")), Some(3));
    assert_eq!(compiled.world().resolve("browser.read.title"), Some(&json!("Quote #42")));
    assert_eq!(compiled.tags(), ["procurement".to_string()]);
    Ok(())
}

#[test]
fn failure_edges_include_jumps_and_declared_paths() -> TestResult {
    let mut source = scenario_source()?;
    source.failure_paths.push(serde_json::from_value(json!({
        "name": "vendor-unreachable",
        "trigger_step": "send",
        "recovery_steps": ["post"]
    }))?);
    let compiled = compile(source, &registry()?)?;
    let edges = compiled.failure_edges();
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0].kind, FailureEdgeKind::OnFailure);
    assert_eq!(edges[0].to, StepId::new("retry_approval"));
    assert_eq!(edges[1].kind, FailureEdgeKind::Declared("vendor-unreachable".to_string()));
    assert_eq!(edges[1].to, StepId::new("post"));
    Ok(())
}

#[test]
fn structural_fingerprint_is_stable_and_content_sensitive() -> TestResult {
    let first = compile(scenario_source()?, &registry()?)?;
    let second = compile(scenario_source()?, &registry()?)?;
    assert_eq!(first.structural_fingerprint(), second.structural_fingerprint());
    let mut changed = scenario_source()?;
    changed.tags.push("urgent".to_string());
    let third = compile(changed, &registry()?)?;
    assert_ne!(first.structural_fingerprint(), third.structural_fingerprint());
    Ok(())
}

#[test]
fn empty_workflows_are_rejected() {
    assert_eq!(compile_err(json!({"name": "empty", "steps": []})), WorkflowValidationError::NoSteps);
}

#[test]
fn blank_and_duplicate_ids_are_rejected() {
    let blank = compile_err(json!({"name": "w", "steps": [step(" ", "browser", "read")]}));
    assert_eq!(blank, WorkflowValidationError::EmptyStepId(0));
    let duplicate = compile_err(json!({
        "name": "w",
        "steps": [step("a", "browser", "read"), step("a", "browser", "open")]
    }));
    assert_eq!(duplicate, WorkflowValidationError::DuplicateStepId(StepId::new("a")));
}

#[test]
fn unknown_operations_are_rejected() {
    let err = compile_err(json!({"name": "w", "steps": [step("a", "mail", "teleport")]}));
    assert_eq!(err, WorkflowValidationError::UnknownOperation {
        step: StepId::new("a"),
        operation: "mail.teleport".to_string(),
    });
}

#[test]
fn zero_max_attempts_is_rejected() {
    let mut only = step("a", "browser", "read");
    only["max_attempts"] = json!(0);
    let err = compile_err(json!({"name": "w", "steps": [only]}));
    assert_eq!(err, WorkflowValidationError::ZeroMaxAttempts(StepId::new("a")));
}

#[test]
fn unknown_jump_targets_are_rejected() {
    let mut only = step("a", "browser", "read");
    only["on_failure"] = json!("jump:nowhere");
    let err = compile_err(json!({"name": "w", "steps": [only]}));
    assert_eq!(err, WorkflowValidationError::UnknownJumpTarget {
        step: StepId::new("a"),
        target: StepId::new("nowhere"),
    });
}

#[test]
fn malformed_failure_policies_fail_to_parse() {
    let mut only = step("a", "browser", "read");
    only["on_failure"] = json!("retry");
    let parsed: Result<WorkflowSource, _> = serde_json::from_value(json!({"name": "w", "steps": [only]}));
    assert!(parsed.is_err());
    assert_eq!(FailurePolicy::try_from("jump: b ".to_string()).unwrap(), FailurePolicy::Jump(StepId::new("b")));
}

#[test]
fn failure_policy_keywords_are_case_insensitive() {
    assert_eq!(FailurePolicy::try_from("skip".to_string()).unwrap(), FailurePolicy::Continue);
    assert_eq!(FailurePolicy::try_from(" Continue ".to_string()).unwrap(), FailurePolicy::Continue);
    assert_eq!(FailurePolicy::try_from("FAIL".to_string()).unwrap(), FailurePolicy::Fail);
    assert_eq!(FailurePolicy::try_from(String::new()).unwrap(), FailurePolicy::Fail);
    assert_eq!(FailurePolicy::try_from("Jump:Retry".to_string()).unwrap(), FailurePolicy::Jump(StepId::new("Retry")));
    assert!(FailurePolicy::try_from("jump:  ".to_string()).is_err());

    let mut a = step("a", "browser", "read");
    a["on_failure"] = json!("skip");
    let compiled = compile(workflow(json!({"name": "w", "steps": [a]})).unwrap(), &registry().unwrap()).unwrap();
    assert_eq!(compiled.step(&StepId::new("a")).unwrap().on_failure, CompiledFailurePolicy::Continue);
}

#[test]
fn unknown_failure_path_steps_are_rejected() {
    let err = compile_err(json!({
        "name": "w",
        "steps": [step("a", "browser", "read")],
        "failure_paths": [{ "name": "p", "trigger_step": "a", "recovery_steps": ["ghost"] }]
    }));
    assert_eq!(err, WorkflowValidationError::UnknownFailurePathStep {
        path: "p".to_string(),
        step: StepId::new("ghost"),
    });
}

#[test]
fn unbounded_failure_cycles_are_rejected() {
    let mut a = step("a", "browser", "read");
    a["on_failure"] = json!("continue");
    let mut b = step("b", "browser", "open");
    b["on_failure"] = json!("jump:a");
    let err = compile_err(json!({"name": "w", "steps": [a.clone(), b.clone()]}));
    assert_eq!(err, WorkflowValidationError::UnboundedFailureCycle(vec![StepId::new("a"), StepId::new("b")]));

    b["max_attempts"] = json!(3);
    let bounded = workflow(json!({"name": "w", "steps": [a, b]})).unwrap();
    assert!(compile(bounded, &registry().unwrap()).is_ok());
}

#[test]
fn self_jumps_need_an_attempt_bound() {
    let mut a = step("a", "browser", "read");
    a["on_failure"] = json!("jump:a");
    let err = compile_err(json!({"name": "w", "steps": [a]}));
    assert_eq!(err, WorkflowValidationError::UnboundedFailureCycle(vec![StepId::new("a")]));
}

#[test]
fn risky_steps_need_approval_intent() {
    let err = compile_err(json!({"name": "w", "steps": [step("pay", "erp", "post_payment")]}));
    assert_eq!(err, WorkflowValidationError::MissingApprovalIntent {
        step: StepId::new("pay"),
        operation: "erp.post_payment".to_string(),
    });

    let mut fallback = step("pay", "erp", "post_payment");
    fallback["approval_fallback"] = json!("auto_deny");
    let ok = workflow(json!({"name": "w", "steps": [fallback]})).unwrap();
    assert!(compile(ok, &registry().unwrap()).is_ok());
}

#[test]
fn approval_steps_after_the_risky_step_do_not_count() {
    let err = compile_err(json!({
        "name": "w",
        "steps": [step("pay", "erp", "post_payment"), step("ask", "approvals", "request")]
    }));
    assert!(matches!(err, WorkflowValidationError::MissingApprovalIntent { .. }));
}

/// An approval control step naming `service.operation`.
fn approval_step(id: &str, control: &str, service: &str, operation: &str) -> Value {
    json!({
        "id": id,
        "call": { "service": "approvals", "operation": control, "args": { "service": service, "operation": operation } }
    })
}

#[test]
fn approval_steps_for_other_operations_do_not_count() {
    let err = compile_err(json!({
        "name": "w",
        "steps": [approval_step("ask", "status", "mail", "send"), step("offboard", "okta", "deactivate_user")]
    }));
    assert_eq!(err, WorkflowValidationError::MissingApprovalIntent {
        step: StepId::new("offboard"),
        operation: "okta.deactivate_user".to_string(),
    });

    let err = compile_err(json!({
        "name": "w",
        "steps": [step("list", "approvals", "list"), step("pay", "erp", "post_payment")]
    }));
    assert!(matches!(err, WorkflowValidationError::MissingApprovalIntent { ref step, .. } if step.as_str() == "pay"));

    let err = compile_err(json!({
        "name": "w",
        "steps": [approval_step("no", "deny", "erp", "post_payment"), step("pay", "erp", "post_payment")]
    }));
    assert!(matches!(err, WorkflowValidationError::MissingApprovalIntent { .. }));
}

#[test]
fn approval_steps_naming_the_risky_operation_count() {
    for control in ["request", "status", "approve"] {
        let ok = workflow(json!({
            "name": "w",
            "steps": [approval_step("ask", control, "okta", "deactivate_user"), step("offboard", "okta", "deactivate_user")]
        }))
        .unwrap();
        assert!(compile(ok, &registry().unwrap()).is_ok(), "{control} should license the risky step");
    }
}

#[test]
fn templates_must_reference_earlier_steps() {
    let mut first = step("first", "browser", "read");
    first["call"]["args"] = json!({"q": "${steps.second.view}"});
    let err = compile_err(json!({"name": "w", "steps": [first, step("second", "browser", "open")]}));
    assert!(matches!(err, WorkflowValidationError::InvalidTemplate { ref step, .. } if step.as_str() == "first"));

    let mut broken = step("a", "browser", "read");
    broken["call"]["args"] = json!({"q": "${steps.a"});
    let err = compile_err(json!({"name": "w", "steps": [broken]}));
    assert!(matches!(err, WorkflowValidationError::InvalidTemplate { .. }));

    let mut unknown_root = step("a", "browser", "read");
    unknown_root["call"]["args"] = json!({"q": "${env.HOME}"});
    let err = compile_err(json!({"name": "w", "steps": [unknown_root]}));
    assert!(matches!(err, WorkflowValidationError::InvalidTemplate { .. }));
}

#[test]
fn success_criteria_must_name_known_steps() {
    let err = compile_err(json!({
        "name": "w",
        "steps": [step("a", "browser", "read")],
        "success": [{ "kind": "step_succeeded", "step": "b" }]
    }));
    assert_eq!(err, WorkflowValidationError::UnknownCriterionStep(StepId::new("b")));
}

#[test]
fn toml_sources_compile() -> TestResult {
    let source = WorkflowSource::from_toml_str(
        r#"
name = "ticket-triage"
tags = ["it"]

[world.tickets]
list = [{ id = "T-1", title = "VPN down" }]

[[steps]]
id = "list"
call = { service = "tickets", operation = "list" }
expect = [{ kind = "field_present", field = "view" }]

[[steps]]
id = "comment"
on_failure = "continue"
call = { service = "tickets", operation = "add_comment", args = { ticket = "${steps.list.view.0.id}", body = "Looking" } }

[[success]]
kind = "all_steps_succeeded"
"#,
    )?;
    let compiled = compile(source, &registry()?)?;
    assert_eq!(compiled.name().as_str(), "ticket-triage");
    assert_eq!(compiled.step(&StepId::new("comment")).unwrap().on_failure, CompiledFailurePolicy::Continue);
    Ok(())
}

#[test]
fn invalid_documents_report_source_errors() {
    assert!(WorkflowSource::from_json_str("{").is_err());
    assert!(WorkflowSource::from_toml_str("steps = 3").is_err());
}
