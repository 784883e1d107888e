// crates/vei-core/src/core/identifiers.rs
// ============================================================================
// Module: VEI Identifiers
// Description: Opaque identifiers for services, operations, steps, and sessions.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque strings that serialize transparently. Validation
//! happens at registry, compiler, or configuration boundaries rather than in
//! the wrappers. [`OperationId`] is the composite `service.operation` key used
//! by the registry, the policy gate, and approval matching.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Declares a transparent string identifier with the standard accessors.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_identifier!(
    /// Service name (for example `mail` or `slack`).
    ServiceName
);

string_identifier!(
    /// Operation name within a service (for example `send`).
    OperationName
);

string_identifier!(
    /// Workflow step identifier, unique within one workflow.
    StepId
);

string_identifier!(
    /// Session identifier scoping one episode's receipts.
    SessionId
);

string_identifier!(
    /// Workflow name declared by the workflow source.
    WorkflowName
);

string_identifier!(
    /// Pending approval identifier, unique within one session.
    ApprovalId
);

// ============================================================================
// SECTION: Operation Identifier
// ============================================================================

/// Fully qualified `service.operation` key.
///
/// # Invariants
/// - Neither component is empty.
/// - The service component never contains `.`; the operation may.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationId {
    /// Owning service.
    service: ServiceName,
    /// Operation within the service.
    operation: OperationName,
}

/// Errors raised when parsing an [`OperationId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationIdError {
    /// The input lacks a `service.operation` separator or has an empty part.
    #[error("operation must be written as service.operation: {0}")]
    Malformed(String),
}

impl OperationId {
    /// Creates an operation identifier from its parts.
    #[must_use]
    pub fn new(service: impl Into<ServiceName>, operation: impl Into<OperationName>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
        }
    }

    /// Returns the service component.
    #[must_use]
    pub const fn service(&self) -> &ServiceName {
        &self.service
    }

    /// Returns the operation component.
    #[must_use]
    pub const fn operation(&self) -> &OperationName {
        &self.operation
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.operation)
    }
}

impl FromStr for OperationId {
    type Err = OperationIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let Some((service, operation)) = trimmed.split_once('.') else {
            return Err(OperationIdError::Malformed(value.to_string()));
        };
        if service.is_empty() || operation.is_empty() {
            return Err(OperationIdError::Malformed(value.to_string()));
        }
        Ok(Self::new(service, operation))
    }
}

impl TryFrom<String> for OperationId {
    type Error = OperationIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OperationId> for String {
    fn from(value: OperationId) -> Self {
        value.to_string()
    }
}
