// crates/vei-core/src/core/world.rs
// ============================================================================
// Module: VEI World State
// Description: Initial world snapshot and per-session write records.
// Purpose: Give simulators a deterministic, session-owned backing state.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A workflow declares the world it expects as a JSON snapshot keyed by
//! service. The session copies that snapshot into a [`WorldState`] and
//! simulators append write records to it. Nothing outside the session can
//! observe or mutate it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Immutable initial world declared by a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldSnapshot(Value);

impl WorldSnapshot {
    /// Wraps a JSON value.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns the snapshot value.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Returns the section for one service, if present.
    #[must_use]
    pub fn section(&self, service: &str) -> Option<&Value> {
        self.0.get(service)
    }

    /// Resolves a dotted path (`mail.inbox.0.subject`) against the snapshot.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        resolve_path(&self.0, path)
    }
}

/// Resolves a dotted path against a JSON value.
///
/// Path segments index objects by key and arrays by decimal position. An
/// empty path returns the value itself.
#[must_use]
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

// ============================================================================
// SECTION: Session World
// ============================================================================

/// Mutable world owned by one session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorldState {
    /// Initial snapshot.
    snapshot: WorldSnapshot,
    /// Write records appended by simulators, per service.
    records: BTreeMap<String, Vec<Value>>,
}

impl WorldState {
    /// Creates a world from a snapshot.
    #[must_use]
    pub fn new(snapshot: WorldSnapshot) -> Self {
        Self {
            snapshot,
            records: BTreeMap::new(),
        }
    }

    /// Returns the initial snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &WorldSnapshot {
        &self.snapshot
    }

    /// Returns the write records for a service.
    #[must_use]
    pub fn records(&self, service: &str) -> &[Value] {
        self.records.get(service).map_or(&[], Vec::as_slice)
    }

    /// Appends a write record for a service.
    pub fn append_record(&mut self, service: &str, record: Value) {
        self.records.entry(service.to_string()).or_default().push(record);
    }
}
