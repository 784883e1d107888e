// crates/vei-core/src/runtime/template.rs
// ============================================================================
// Module: VEI Argument Templates
// Description: Parsing and resolution of `${...}` argument templates.
// Purpose: Let steps reference earlier step results and the world snapshot.
// Dependencies: serde_json, thiserror, crate::core
// ============================================================================

//! ## Overview
//! Two reference forms exist: `${steps.<id>.<path>}` reads the data of an
//! earlier step's latest result, and `${world.<path>}` reads the world
//! snapshot. A string that is exactly one template is replaced by the
//! referenced JSON value; templates embedded in longer strings are rendered
//! as text (strings verbatim, other values as compact JSON).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::StepId;
use crate::core::world::WorldSnapshot;
use crate::core::world::resolve_path;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One parsed template reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    /// Data of an earlier step's latest result.
    Step {
        /// Referenced step.
        step: StepId,
        /// Dotted path into the result data.
        path: String,
    },
    /// World snapshot value.
    World {
        /// Dotted path into the snapshot.
        path: String,
    },
}

/// Template errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// `${` without a closing brace.
    #[error("unterminated template in `{0}`")]
    Unterminated(String),
    /// Reference root is neither `steps` nor `world`.
    #[error("template `{0}` must start with steps.<id> or world")]
    UnknownRoot(String),
    /// Referenced value is not available.
    #[error("template `{0}` did not resolve")]
    Unresolved(String),
}

/// Values templates resolve against.
#[derive(Debug, Clone, Copy)]
pub struct TemplateScope<'a> {
    /// Latest result data per step.
    pub steps: &'a BTreeMap<StepId, Value>,
    /// World snapshot.
    pub world: &'a WorldSnapshot,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Splits a string into literal text and template bodies.
fn segments(input: &str) -> Result<Vec<(bool, &str)>, TemplateError> {
    let mut out = Vec::new();
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            out.push((false, &rest[.. start]));
        }
        let after = &rest[start + 2 ..];
        let end = after.find('}').ok_or_else(|| TemplateError::Unterminated(input.to_string()))?;
        out.push((true, &after[.. end]));
        rest = &after[end + 1 ..];
    }
    if !rest.is_empty() {
        out.push((false, rest));
    }
    Ok(out)
}

/// Parses one template body (`steps.a.b` or `world.x`).
fn parse_body(body: &str) -> Result<TemplateRef, TemplateError> {
    let body = body.trim();
    if body == "world" {
        return Ok(TemplateRef::World {
            path: String::new(),
        });
    }
    if let Some(path) = body.strip_prefix("world.") {
        return Ok(TemplateRef::World {
            path: path.to_string(),
        });
    }
    if let Some(rest) = body.strip_prefix("steps.") {
        let (step, path) = rest.split_once('.').unwrap_or((rest, ""));
        if !step.is_empty() {
            return Ok(TemplateRef::Step {
                step: StepId::new(step),
                path: path.to_string(),
            });
        }
    }
    Err(TemplateError::UnknownRoot(body.to_string()))
}

/// Returns every template reference found in string leaves of a value.
///
/// # Errors
///
/// Returns [`TemplateError`] for malformed templates.
pub fn references(value: &Value) -> Result<Vec<TemplateRef>, TemplateError> {
    let mut refs = Vec::new();
    collect(value, &mut refs)?;
    Ok(refs)
}

/// Walks a value collecting template references.
fn collect(value: &Value, refs: &mut Vec<TemplateRef>) -> Result<(), TemplateError> {
    match value {
        Value::String(text) => {
            for (is_template, body) in segments(text)? {
                if is_template {
                    refs.push(parse_body(body)?);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, refs)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect(item, refs)?;
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves every template in a value.
///
/// # Errors
///
/// Returns [`TemplateError::Unresolved`] when a reference has no value.
pub fn resolve(value: &Value, scope: TemplateScope<'_>) -> Result<Value, TemplateError> {
    match value {
        Value::String(text) => resolve_string(text, scope),
        Value::Array(items) => items.iter().map(|item| resolve(item, scope)).collect::<Result<Vec<_>, _>>().map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                out.insert(key.clone(), resolve(item, scope)?);
            }
            Ok(Value::Object(out))
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value.clone()),
    }
}

/// Resolves templates inside one string.
fn resolve_string(text: &str, scope: TemplateScope<'_>) -> Result<Value, TemplateError> {
    let parts = segments(text)?;
    if let [(true, body)] = parts.as_slice() {
        return lookup(body, scope).cloned();
    }
    let mut rendered = String::new();
    for (is_template, body) in parts {
        if !is_template {
            rendered.push_str(body);
            continue;
        }
        match lookup(body, scope)? {
            Value::String(inner) => rendered.push_str(inner),
            other => rendered.push_str(&other.to_string()),
        }
    }
    Ok(Value::String(rendered))
}

/// Looks up one template body.
fn lookup<'a>(body: &str, scope: TemplateScope<'a>) -> Result<&'a Value, TemplateError> {
    let found = match parse_body(body)? {
        TemplateRef::World {
            path,
        } => scope.world.resolve(&path),
        TemplateRef::Step {
            step,
            path,
        } => scope.steps.get(&step).and_then(|data| resolve_path(data, &path)),
    };
    found.ok_or_else(|| TemplateError::Unresolved(body.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
