// crates/vei-core/src/core/envelope.rs
// ============================================================================
// Module: VEI Request Envelope
// Description: Normalized tool invocations and their fingerprints.
// Purpose: Turn a raw tool call into a canonical, hashable request.
// Dependencies: serde, serde_json, crate::core::hashing
// ============================================================================

//! ## Overview
//! A [`RequestEnvelope`] is built by the router for every dispatch. Its
//! [`Fingerprint`] is a pure function of the session seed, the call's
//! sequence number, and the canonical call body, and is the only key used by
//! replay. The [`CallDigest`] hashes the call body alone and lets approvals
//! and downstream deduplication recognize structurally identical calls.
//!
//! Normalization rules: `null` arguments become an empty object, any other
//! non-object value is rejected, and key order is fixed by RFC 8785 when the
//! call is hashed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::OperationId;
use crate::core::operation::OperationClass;

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Hex SHA-256 fingerprint of `(seed, sequence, call)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps a precomputed hex digest.
    #[must_use]
    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Hex SHA-256 digest of the call body without seed or sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallDigest(String);

impl CallDigest {
    /// Wraps a precomputed hex digest.
    #[must_use]
    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while building a request envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Arguments were not a JSON object.
    #[error("arguments for {operation} must be a JSON object, got {kind}")]
    InvalidArguments {
        /// Operation being called.
        operation: OperationId,
        /// JSON kind that was supplied.
        kind: &'static str,
    },
    /// Canonicalization failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes raw call arguments into an object.
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidArguments`] for non-object, non-null input.
pub fn normalize_args(operation: &OperationId, args: Value) -> Result<Map<String, Value>, EnvelopeError> {
    match args {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(EnvelopeError::InvalidArguments {
            operation: operation.clone(),
            kind: json_kind(&other),
        }),
    }
}

/// Returns the JSON kind label for error messages.
const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Canonical call body hashed into digests.
#[derive(Serialize)]
struct CallBody<'a> {
    /// Service name.
    service: &'a str,
    /// Operation name.
    operation: &'a str,
    /// Normalized arguments.
    args: &'a Map<String, Value>,
}

/// Fingerprint input.
#[derive(Serialize)]
struct FingerprintInput<'a> {
    /// Session seed.
    seed: u64,
    /// Per-session sequence number.
    sequence: u64,
    /// Canonical call body.
    call: CallBody<'a>,
}

/// Computes the call digest for an operation and normalized arguments.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn call_digest(operation: &OperationId, args: &Map<String, Value>) -> Result<CallDigest, HashError> {
    let body = CallBody {
        service: operation.service().as_str(),
        operation: operation.operation().as_str(),
        args,
    };
    Ok(CallDigest(hash_canonical_json(DEFAULT_HASH_ALGORITHM, &body)?.value))
}

/// Computes the fingerprint for a call at a given seed and sequence.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn fingerprint(
    seed: u64,
    sequence: u64,
    operation: &OperationId,
    args: &Map<String, Value>,
) -> Result<Fingerprint, HashError> {
    let input = FingerprintInput {
        seed,
        sequence,
        call: CallBody {
            service: operation.service().as_str(),
            operation: operation.operation().as_str(),
            args,
        },
    };
    Ok(Fingerprint(hash_canonical_json(DEFAULT_HASH_ALGORITHM, &input)?.value))
}

// ============================================================================
// SECTION: Request Envelope
// ============================================================================

/// A single normalized tool invocation.
///
/// # Invariants
/// - `fingerprint` equals [`fingerprint`] over `(seed, sequence, operation, args)`.
/// - Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Target operation.
    pub operation: OperationId,
    /// Gating class from the registry.
    pub operation_class: OperationClass,
    /// Normalized arguments.
    pub args: Map<String, Value>,
    /// Per-session sequence number, starting at 1.
    pub sequence: u64,
    /// Replay key.
    pub fingerprint: Fingerprint,
    /// Seed-free structural digest.
    pub call_digest: CallDigest,
}

impl RequestEnvelope {
    /// Builds an envelope from raw arguments.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when arguments are invalid or hashing fails.
    pub fn build(
        seed: u64,
        sequence: u64,
        operation: OperationId,
        operation_class: OperationClass,
        args: Value,
    ) -> Result<Self, EnvelopeError> {
        let args = normalize_args(&operation, args)?;
        let fingerprint = fingerprint(seed, sequence, &operation, &args)?;
        let call_digest = call_digest(&operation, &args)?;
        Ok(Self {
            operation,
            operation_class,
            args,
            sequence,
            fingerprint,
            call_digest,
        })
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> &str {
        self.operation.service().as_str()
    }

    /// Returns the operation name.
    #[must_use]
    pub fn operation_name(&self) -> &str {
        self.operation.operation().as_str()
    }
}
