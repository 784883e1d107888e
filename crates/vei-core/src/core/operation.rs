// crates/vei-core/src/core/operation.rs
// ============================================================================
// Module: VEI Operation Registry
// Description: Operation classes, route kinds, and the service operation registry.
// Purpose: Resolve `service.operation` names to their gating class and route.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every tool call names a `service.operation`. The [`OperationRegistry`]
//! maps that name to an [`OperationClass`] (which drives policy gating) and an
//! [`OperationRoute`] (adapter-backed or router-internal approval control).
//! The registry is built once and shared read-only by the router and the
//! workflow compiler. A registry that cannot be built is fatal for the
//! session.
//!
//! [`OperationRegistry::enterprise`] returns the built-in catalog of
//! simulated office services.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::OperationId;
use crate::core::identifiers::ServiceName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reserved service name for router-internal approval control operations.
pub const APPROVALS_SERVICE: &str = "approvals";

// ============================================================================
// SECTION: Operation Class
// ============================================================================

/// Risk classification used by the policy gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Observes state without side effects.
    Read,
    /// Reversible or low-impact write.
    WriteSafe,
    /// Irreversible or high-impact write that requires approval.
    WriteRisky,
}

impl OperationClass {
    /// Returns the stable label for the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::WriteSafe => "write_safe",
            Self::WriteRisky => "write_risky",
        }
    }

    /// Returns true when the class mutates backend state.
    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Routes
// ============================================================================

/// Approval control operations handled inside the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalControl {
    /// Enqueue an approval for a target operation.
    Request,
    /// Report the latest resolution for a target operation.
    Status,
    /// Resolve matching approvals as approved.
    Approve,
    /// Resolve matching approvals as denied.
    Deny,
    /// List every approval in the session.
    List,
}

/// Where the router sends an operation once it passes the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "control", rename_all = "snake_case")]
pub enum OperationRoute {
    /// Execute through the adapter resolved for the service.
    Adapter,
    /// Execute against the session approval queue.
    ApprovalControl(ApprovalControl),
}

/// Registry entry describing one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Fully qualified operation identifier.
    pub id: OperationId,
    /// Gating class.
    pub class: OperationClass,
    /// Route taken after gating.
    pub route: OperationRoute,
}

impl OperationSpec {
    /// Returns true when this operation targets the approval queue.
    #[must_use]
    pub const fn is_approval_control(&self) -> bool {
        matches!(self.route, OperationRoute::ApprovalControl(_))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry construction errors.
///
/// Any of these indicates a corrupt catalog and is fatal for the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The operation was registered twice.
    #[error("duplicate operation registration: {0}")]
    Duplicate(OperationId),
    /// An adapter-backed operation was registered under the reserved service.
    #[error("service `approvals` is reserved for approval control: {0}")]
    ReservedService(OperationId),
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Operation registry keyed by `service.operation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRegistry {
    /// Registered operations.
    operations: BTreeMap<OperationId, OperationSpec>,
}

impl OperationRegistry {
    /// Creates an empty registry containing only the approval control operations.
    #[must_use]
    pub fn new() -> Self {
        let mut operations = BTreeMap::new();
        for (name, control) in [
            ("request", ApprovalControl::Request),
            ("status", ApprovalControl::Status),
            ("approve", ApprovalControl::Approve),
            ("deny", ApprovalControl::Deny),
            ("list", ApprovalControl::List),
        ] {
            let id = OperationId::new(APPROVALS_SERVICE, name);
            operations.insert(
                id.clone(),
                OperationSpec {
                    id,
                    class: OperationClass::Read,
                    route: OperationRoute::ApprovalControl(control),
                },
            );
        }
        Self {
            operations,
        }
    }

    /// Registers an adapter-backed operation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] for duplicates or reserved service names.
    pub fn register(&mut self, id: OperationId, class: OperationClass) -> Result<(), RegistryError> {
        if id.service().as_str() == APPROVALS_SERVICE {
            return Err(RegistryError::ReservedService(id));
        }
        if self.operations.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.operations.insert(
            id.clone(),
            OperationSpec {
                id,
                class,
                route: OperationRoute::Adapter,
            },
        );
        Ok(())
    }

    /// Registers every `(service, operation, class)` entry in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`] encountered.
    pub fn register_all<'a>(
        &mut self,
        entries: impl IntoIterator<Item = (&'a str, &'a str, OperationClass)>,
    ) -> Result<(), RegistryError> {
        for (service, operation, class) in entries {
            self.register(OperationId::new(service, operation), class)?;
        }
        Ok(())
    }

    /// Returns the built-in enterprise catalog.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] only if the built-in catalog is inconsistent.
    pub fn enterprise() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register_all(ENTERPRISE_CATALOG.iter().copied())?;
        Ok(registry)
    }

    /// Looks up an operation.
    #[must_use]
    pub fn get(&self, id: &OperationId) -> Option<&OperationSpec> {
        self.operations.get(id)
    }

    /// Looks up an operation by its parts.
    #[must_use]
    pub fn lookup(&self, service: &str, operation: &str) -> Option<&OperationSpec> {
        self.operations.get(&OperationId::new(service, operation))
    }

    /// Returns true when the operation is registered.
    #[must_use]
    pub fn contains(&self, id: &OperationId) -> bool {
        self.operations.contains_key(id)
    }

    /// Returns the distinct services with adapter-backed operations.
    #[must_use]
    pub fn services(&self) -> Vec<ServiceName> {
        let mut services: Vec<ServiceName> = self
            .operations
            .values()
            .filter(|spec| !spec.is_approval_control())
            .map(|spec| spec.id.service().clone())
            .collect();
        services.dedup();
        services
    }

    /// Iterates over every registered operation in key order.
    pub fn iter(&self) -> impl Iterator<Item = &OperationSpec> {
        self.operations.values()
    }

    /// Returns the number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true when no operations are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Enterprise Catalog
// ============================================================================

/// Built-in catalog of simulated office services.
const ENTERPRISE_CATALOG: &[(&str, &str, OperationClass)] = &[
    ("browser", "open", OperationClass::Read),
    ("browser", "read", OperationClass::Read),
    ("browser", "find", OperationClass::Read),
    ("browser", "click", OperationClass::Read),
    ("browser", "back", OperationClass::Read),
    ("slack", "list_channels", OperationClass::Read),
    ("slack", "open_channel", OperationClass::Read),
    ("slack", "fetch_thread", OperationClass::Read),
    ("slack", "send_message", OperationClass::WriteSafe),
    ("slack", "post", OperationClass::WriteSafe),
    ("slack", "react", OperationClass::WriteSafe),
    ("mail", "list", OperationClass::Read),
    ("mail", "open", OperationClass::Read),
    ("mail", "compose", OperationClass::WriteSafe),
    ("mail", "reply", OperationClass::WriteSafe),
    ("mail", "send", OperationClass::WriteRisky),
    ("calendar", "list_events", OperationClass::Read),
    ("calendar", "create_event", OperationClass::WriteSafe),
    ("calendar", "accept", OperationClass::WriteSafe),
    ("calendar", "decline", OperationClass::WriteSafe),
    ("calendar", "update_event", OperationClass::WriteSafe),
    ("calendar", "cancel_event", OperationClass::WriteRisky),
    ("docs", "list", OperationClass::Read),
    ("docs", "read", OperationClass::Read),
    ("docs", "search", OperationClass::Read),
    ("docs", "create", OperationClass::WriteSafe),
    ("docs", "update", OperationClass::WriteSafe),
    ("tickets", "list", OperationClass::Read),
    ("tickets", "get", OperationClass::Read),
    ("tickets", "create", OperationClass::WriteSafe),
    ("tickets", "update", OperationClass::WriteSafe),
    ("tickets", "transition", OperationClass::WriteRisky),
    ("tickets", "add_comment", OperationClass::WriteSafe),
    ("db", "list_tables", OperationClass::Read),
    ("db", "describe_table", OperationClass::Read),
    ("db", "query", OperationClass::Read),
    ("db", "upsert", OperationClass::WriteRisky),
    ("erp", "list_pos", OperationClass::Read),
    ("erp", "get_po", OperationClass::Read),
    ("erp", "create_po", OperationClass::WriteSafe),
    ("erp", "receive_goods", OperationClass::WriteSafe),
    ("erp", "submit_invoice", OperationClass::WriteSafe),
    ("erp", "match_three_way", OperationClass::Read),
    ("erp", "post_payment", OperationClass::WriteRisky),
    ("crm", "list_contacts", OperationClass::Read),
    ("crm", "get_contact", OperationClass::Read),
    ("crm", "create_contact", OperationClass::WriteSafe),
    ("crm", "create_deal", OperationClass::WriteSafe),
    ("crm", "update_deal_stage", OperationClass::WriteSafe),
    ("crm", "log_activity", OperationClass::WriteSafe),
    ("okta", "list_users", OperationClass::Read),
    ("okta", "get_user", OperationClass::Read),
    ("okta", "list_groups", OperationClass::Read),
    ("okta", "assign_group", OperationClass::WriteSafe),
    ("okta", "suspend_user", OperationClass::WriteRisky),
    ("okta", "deactivate_user", OperationClass::WriteRisky),
    ("servicedesk", "list_requests", OperationClass::Read),
    ("servicedesk", "get_request", OperationClass::Read),
    ("servicedesk", "update_request", OperationClass::WriteSafe),
];
