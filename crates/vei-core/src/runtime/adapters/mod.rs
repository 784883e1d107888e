// crates/vei-core/src/runtime/adapters/mod.rs
// ============================================================================
// Module: VEI Connector Adapters
// Description: Sim, replay, and live adapters plus per-service selection.
// Purpose: Execute allowed requests against interchangeable backends.
// Dependencies: crate::{core, interfaces}, serde, thiserror
// ============================================================================

//! ## Overview
//! Adapters form a closed set ([`Adapter`]) chosen per service when a
//! session is built. Each returns either a [`RawResult`] or an
//! [`AdapterError`]; the router normalizes errors into result envelopes so
//! they never reach callers raw.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod live;
pub mod replay;
pub mod sim;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::envelope::RequestEnvelope;
use crate::core::result::AdapterErrorKind;
use crate::core::result::AdapterFailure;
use crate::core::result::RawResult;
use crate::core::result::ReplayFixtures;
use crate::interfaces::AdapterContext;
use crate::interfaces::LiveBackend;

pub use live::LiveAdapter;
pub use live::LiveConfig;
pub use live::SimulatedLiveBackend;
pub use replay::ReplayAdapter;
pub use sim::GenericSimulator;
pub use sim::SimAdapter;
pub use sim::SimulatorRegistry;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Adapter failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Replay table had no entry for the fingerprint.
    #[error("replay miss for fingerprint {0}")]
    ReplayMiss(String),
    /// Live adapter refused the call.
    #[error("live call blocked: {0}")]
    LiveBlocked(String),
    /// Simulator failed.
    #[error("simulator fault: {0}")]
    SimFault(String),
}

impl AdapterError {
    /// Returns the failure subkind.
    #[must_use]
    pub const fn kind(&self) -> AdapterErrorKind {
        match self {
            Self::ReplayMiss(_) => AdapterErrorKind::ReplayMiss,
            Self::LiveBlocked(_) => AdapterErrorKind::LiveBlocked,
            Self::SimFault(_) => AdapterErrorKind::SimFault,
        }
    }

    /// Returns the failure detail without the kind prefix.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::ReplayMiss(detail) | Self::LiveBlocked(detail) | Self::SimFault(detail) => detail,
        }
    }

    /// Converts into the serializable failure record.
    #[must_use]
    pub fn into_failure(self) -> AdapterFailure {
        let kind = self.kind();
        let message = match self {
            Self::ReplayMiss(detail) | Self::LiveBlocked(detail) | Self::SimFault(detail) => detail,
        };
        AdapterFailure {
            kind,
            message,
        }
    }

    /// Rebuilds an error from a recorded failure.
    #[must_use]
    pub fn from_failure(failure: &AdapterFailure) -> Self {
        let message = failure.message.clone();
        match failure.kind {
            AdapterErrorKind::ReplayMiss => Self::ReplayMiss(message),
            AdapterErrorKind::LiveBlocked => Self::LiveBlocked(message),
            AdapterErrorKind::SimFault => Self::SimFault(message),
        }
    }
}

// ============================================================================
// SECTION: Connector Mode
// ============================================================================

/// Backend family for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorMode {
    /// Deterministic simulator.
    #[default]
    Sim,
    /// Recorded fixtures.
    Replay,
    /// Live backend behind extra guards.
    Live,
}

impl ConnectorMode {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sim => "sim",
            Self::Replay => "replay",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for ConnectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised for unknown mode labels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown connector mode `{0}` (expected sim, replay, or live)")]
pub struct ConnectorModeError(pub String);

impl FromStr for ConnectorMode {
    type Err = ConnectorModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sim" => Ok(Self::Sim),
            "replay" => Ok(Self::Replay),
            "live" => Ok(Self::Live),
            _ => Err(ConnectorModeError(value.to_string())),
        }
    }
}

/// Default mode plus per-service overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorModes {
    /// Mode for services without an override.
    pub default: ConnectorMode,
    /// Per-service modes.
    pub services: BTreeMap<String, ConnectorMode>,
}

impl ConnectorModes {
    /// Creates modes with a single default.
    #[must_use]
    pub const fn uniform(default: ConnectorMode) -> Self {
        Self {
            default,
            services: BTreeMap::new(),
        }
    }

    /// Returns the mode for a service.
    #[must_use]
    pub fn mode_for(&self, service: &str) -> ConnectorMode {
        self.services.get(service).copied().unwrap_or(self.default)
    }
}

// ============================================================================
// SECTION: Adapter Variants
// ============================================================================

/// Closed set of adapters.
#[derive(Clone)]
pub enum Adapter {
    /// Deterministic simulator.
    Sim(SimAdapter),
    /// Recorded fixtures.
    Replay(ReplayAdapter),
    /// Live backend.
    Live(LiveAdapter),
}

impl Adapter {
    /// Returns the adapter's mode.
    #[must_use]
    pub const fn mode(&self) -> ConnectorMode {
        match self {
            Self::Sim(_) => ConnectorMode::Sim,
            Self::Replay(_) => ConnectorMode::Replay,
            Self::Live(_) => ConnectorMode::Live,
        }
    }

    /// Returns true when outcomes from this adapter belong in recorded fixtures.
    ///
    /// Replay outcomes come from fixtures already, so they are never recorded again.
    #[must_use]
    pub const fn records_fixtures(&self) -> bool {
        !matches!(self, Self::Replay(_))
    }

    /// Executes a request.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the backend cannot serve the request.
    pub fn execute(&self, request: &RequestEnvelope, ctx: &mut AdapterContext<'_>) -> Result<RawResult, AdapterError> {
        match self {
            Self::Sim(adapter) => adapter.execute(request, ctx),
            Self::Replay(adapter) => adapter.execute(request),
            Self::Live(adapter) => adapter.execute(request, ctx),
        }
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Adapter").field(&self.mode()).finish()
    }
}

// ============================================================================
// SECTION: Adapter Table
// ============================================================================

/// Inputs used to build an [`AdapterTable`].
#[derive(Clone, Default)]
pub struct AdapterSet {
    /// Simulators by service.
    pub simulators: SimulatorRegistry,
    /// Replay fixtures.
    pub fixtures: ReplayFixtures,
    /// Live adapter configuration.
    pub live: LiveConfig,
    /// Live backend; the simulator is used when absent.
    pub live_backend: Option<Arc<dyn LiveBackend>>,
}

/// Adapters resolved per service at session construction.
#[derive(Debug, Clone)]
pub struct AdapterTable {
    /// Adapter for services without an override.
    default: Adapter,
    /// Per-service adapters.
    services: BTreeMap<String, Adapter>,
}

impl AdapterTable {
    /// Resolves adapters for every mode in use.
    #[must_use]
    pub fn resolve(modes: &ConnectorModes, set: AdapterSet) -> Self {
        let sim = SimAdapter::new(set.simulators);
        let replay = ReplayAdapter::new(set.fixtures);
        let backend = set
            .live_backend
            .unwrap_or_else(|| Arc::new(SimulatedLiveBackend::new(sim.clone())));
        let live = LiveAdapter::new(set.live, backend);
        let pick = |mode: ConnectorMode| match mode {
            ConnectorMode::Sim => Adapter::Sim(sim.clone()),
            ConnectorMode::Replay => Adapter::Replay(replay.clone()),
            ConnectorMode::Live => Adapter::Live(live.clone()),
        };
        let services = modes.services.iter().map(|(service, mode)| (service.clone(), pick(*mode))).collect();
        Self {
            default: pick(modes.default),
            services,
        }
    }

    /// Returns the adapter for a service.
    #[must_use]
    pub fn adapter_for(&self, service: &str) -> &Adapter {
        self.services.get(service).unwrap_or(&self.default)
    }
}
