// crates/vei-core/src/runtime/session.rs
// ============================================================================
// Module: VEI Session
// Description: Session construction and the public dispatch surface.
// Purpose: Bind a seed, world, approval queue, and router into one episode.
// Dependencies: serde, thiserror, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! A [`Session`] owns everything one episode mutates: the sequence counter,
//! the world, the approval queue, the receipt log, and the replay fixtures
//! recorded from adapter outcomes. Sessions share no mutable state and may
//! run on separate threads.
//!
//! [`SessionBuilder`] resolves adapters once per session from the connector
//! modes; the adapter for a service never changes afterwards.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::approval::ApprovalQueue;
use crate::core::approval::PendingApproval;
use crate::core::envelope::call_digest;
use crate::core::envelope::normalize_args;
use crate::core::identifiers::ApprovalId;
use crate::core::identifiers::OperationId;
use crate::core::identifiers::SessionId;
use crate::core::operation::APPROVALS_SERVICE;
use crate::core::operation::OperationRegistry;
use crate::core::operation::RegistryError;
use crate::core::policy::GateConfig;
use crate::core::receipt::Receipt;
use crate::core::redaction::Redactor;
use crate::core::result::ReplayFixtures;
use crate::core::world::WorldSnapshot;
use crate::core::world::WorldState;
use crate::interfaces::Clock;
use crate::interfaces::LiveBackend;
use crate::interfaces::ReceiptSink;
use crate::runtime::adapters::AdapterSet;
use crate::runtime::adapters::AdapterTable;
use crate::runtime::adapters::ConnectorModes;
use crate::runtime::adapters::LiveConfig;
use crate::runtime::adapters::SimulatorRegistry;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::gate::PolicyGate;
use crate::runtime::router::ConnectorRouter;
use crate::runtime::router::Dispatch;
use crate::runtime::router::RouterError;
use crate::runtime::router::SessionState;
use crate::runtime::store::LogicalClock;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 42_042;

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session identifier.
    pub session_id: SessionId,
    /// Seed for fingerprints and simulator randomness.
    pub seed: u64,
    /// Connector modes.
    pub modes: ConnectorModes,
    /// Policy gate configuration.
    pub gate: GateConfig,
    /// Live adapter guards.
    pub live: LiveConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: SessionId::new("session-1"),
            seed: DEFAULT_SEED,
            modes: ConnectorModes::default(),
            gate: GateConfig::default(),
            live: LiveConfig::default(),
        }
    }
}

/// Errors raised while building a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation registry could not be built.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Redaction patterns failed to compile.
    #[error("redaction rules invalid: {0}")]
    Redaction(String),
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for [`Session`].
pub struct SessionBuilder {
    /// Session configuration.
    config: SessionConfig,
    /// Operation registry; the enterprise catalog when absent.
    registry: Option<Arc<OperationRegistry>>,
    /// Simulators.
    simulators: SimulatorRegistry,
    /// Replay fixtures.
    fixtures: ReplayFixtures,
    /// Live backend override.
    live_backend: Option<Arc<dyn LiveBackend>>,
    /// Receipt clock.
    clock: Option<Arc<dyn Clock>>,
    /// External receipt sink.
    receipt_sink: Option<Arc<dyn ReceiptSink>>,
    /// Audit sink.
    audit: Option<Arc<dyn AuditSink>>,
    /// Initial world.
    world: WorldSnapshot,
}

impl SessionBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            registry: None,
            simulators: SimulatorRegistry::default(),
            fixtures: ReplayFixtures::new(),
            live_backend: None,
            clock: None,
            receipt_sink: None,
            audit: None,
            world: WorldSnapshot::default(),
        }
    }

    /// Sets the operation registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<OperationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the simulator registry.
    #[must_use]
    pub fn simulators(mut self, simulators: SimulatorRegistry) -> Self {
        self.simulators = simulators;
        self
    }

    /// Sets the replay fixtures.
    #[must_use]
    pub fn fixtures(mut self, fixtures: ReplayFixtures) -> Self {
        self.fixtures = fixtures;
        self
    }

    /// Sets the live backend.
    #[must_use]
    pub fn live_backend(mut self, backend: Arc<dyn LiveBackend>) -> Self {
        self.live_backend = Some(backend);
        self
    }

    /// Sets the receipt clock; a [`LogicalClock`] is used otherwise.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the external receipt sink.
    #[must_use]
    pub fn receipt_sink(mut self, sink: Arc<dyn ReceiptSink>) -> Self {
        self.receipt_sink = Some(sink);
        self
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Sets the initial world snapshot.
    #[must_use]
    pub fn world(mut self, world: WorldSnapshot) -> Self {
        self.world = world;
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the registry or redaction rules fail.
    pub fn build(self) -> Result<Session, SessionError> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(OperationRegistry::enterprise()?),
        };
        let redactor = Redactor::new().map_err(|err| SessionError::Redaction(err.to_string()))?;
        let adapters = AdapterTable::resolve(
            &self.config.modes,
            AdapterSet {
                simulators: self.simulators,
                fixtures: self.fixtures,
                live: self.config.live.clone(),
                live_backend: self.live_backend,
            },
        );
        let approvals = ApprovalQueue::new(self.config.gate.approval_match);
        let router = ConnectorRouter::new(
            registry,
            PolicyGate::new(self.config.gate.clone()),
            adapters,
            redactor,
            self.clock.unwrap_or_else(|| Arc::new(LogicalClock::new())),
            self.receipt_sink,
            self.audit.unwrap_or_else(|| Arc::new(NoopAuditSink)),
        );
        let state = SessionState::new(
            self.config.session_id.clone(),
            self.config.seed,
            WorldState::new(self.world),
            approvals,
        );
        Ok(Session {
            config: self.config,
            router,
            state,
        })
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Summary returned by [`Session::close`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Session identifier.
    pub session_id: SessionId,
    /// Number of receipts in the log.
    pub receipts: usize,
    /// Approvals expired by this close.
    pub expired: Vec<ApprovalId>,
}

/// One deterministic episode session.
pub struct Session {
    /// Configuration the session was built from.
    config: SessionConfig,
    /// Router.
    router: ConnectorRouter,
    /// Mutable state.
    state: SessionState,
}

impl Session {
    /// Builds a session with default collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when construction fails.
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        SessionBuilder::new(config).build()
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.state.session_id
    }

    /// Returns the seed.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.state.seed
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the last assigned sequence number.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.state.sequence
    }

    /// Returns the operation registry.
    #[must_use]
    pub fn registry(&self) -> &OperationRegistry {
        self.router.registry()
    }

    /// Returns the router.
    #[must_use]
    pub const fn router(&self) -> &ConnectorRouter {
        &self.router
    }

    /// Returns the world.
    #[must_use]
    pub const fn world(&self) -> &WorldState {
        &self.state.world
    }

    /// Returns the approval queue.
    #[must_use]
    pub const fn approvals(&self) -> &ApprovalQueue {
        &self.state.approvals
    }

    /// Returns unresolved approvals.
    #[must_use]
    pub fn pending_approvals(&self) -> Vec<&PendingApproval> {
        self.state.approvals.entries().iter().filter(|entry| !entry.resolution.is_terminal()).collect()
    }

    /// Returns the receipt log.
    #[must_use]
    pub fn receipts(&self) -> &[Receipt] {
        &self.state.receipts
    }

    /// Returns adapter outcomes recorded so far, keyed by fingerprint.
    #[must_use]
    pub const fn recorded_fixtures(&self) -> &ReplayFixtures {
        &self.state.fixtures
    }

    /// Returns true once the session is closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.state.closed
    }

    /// Dispatches one tool call.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] as documented on [`ConnectorRouter::dispatch`].
    pub fn dispatch(&mut self, service: &str, operation: &str, args: Value) -> Result<Dispatch, RouterError> {
        self.router.dispatch(&mut self.state, service, operation, args)
    }

    /// Dispatches `approvals.approve` for an operation.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] when the dispatch fails.
    pub fn approve(&mut self, operation: &OperationId) -> Result<Dispatch, RouterError> {
        self.resolve(operation, "approve", None)
    }

    /// Dispatches `approvals.deny` for an operation.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] when the dispatch fails.
    pub fn deny(&mut self, operation: &OperationId) -> Result<Dispatch, RouterError> {
        self.resolve(operation, "deny", None)
    }

    /// Dispatches `approvals.approve` for one specific call.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] when the dispatch fails.
    pub fn approve_call(&mut self, operation: &OperationId, args: Value) -> Result<Dispatch, RouterError> {
        self.resolve(operation, "approve", Some(args))
    }

    /// Dispatches `approvals.deny` for one specific call.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] when the dispatch fails.
    pub fn deny_call(&mut self, operation: &OperationId, args: Value) -> Result<Dispatch, RouterError> {
        self.resolve(operation, "deny", Some(args))
    }

    /// Builds and dispatches an approval control call.
    fn resolve(&mut self, operation: &OperationId, control: &str, args: Option<Value>) -> Result<Dispatch, RouterError> {
        let mut payload = json!({
            "service": operation.service().as_str(),
            "operation": operation.operation().as_str(),
        });
        if let (Some(args), Value::Object(map)) = (args, &mut payload) {
            map.insert("args".to_string(), args);
        }
        self.dispatch(APPROVALS_SERVICE, control, payload)
    }

    /// Returns the oldest unresolved approval covering a call.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidArguments`] or [`RouterError::Hash`]
    /// when the call cannot be digested.
    pub fn blocking_approval(&self, operation: &OperationId, args: &Value) -> Result<Option<&PendingApproval>, RouterError> {
        let args = normalize_args(operation, args.clone())?;
        let digest = call_digest(operation, &args).map_err(|err| RouterError::Hash(err.to_string()))?;
        Ok(self.state.approvals.unresolved_for(operation, &digest))
    }

    /// Looks up an approval by id.
    #[must_use]
    pub fn approval(&self, id: &ApprovalId) -> Option<&PendingApproval> {
        self.state.approvals.get(id)
    }

    /// Expires unresolved approvals, flushes receipts, and closes the session.
    ///
    /// Closing twice is a no-op that reports nothing expired.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ReceiptPersistence`] when the sink flush fails.
    pub fn close(&mut self) -> Result<SessionReport, RouterError> {
        let expired = if self.state.closed { Vec::new() } else { self.router.expire_approvals(&mut self.state) };
        self.state.closed = true;
        self.router.flush_receipts()?;
        Ok(SessionReport {
            session_id: self.state.session_id.clone(),
            receipts: self.state.receipts.len(),
            expired,
        })
    }
}
