// crates/vei-config/src/config.rs
// ============================================================================
// Module: VEI Configuration
// Description: Configuration loading, overrides, and validation for VEI.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: vei-core, vei-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits,
//! then patched by `VEI_*` environment variables, then validated. Every
//! operation named in the file must exist in the enterprise catalog and
//! every sink path must be usable; anything else fails closed. A validated
//! [`VeiConfig`] builds the core [`SessionConfig`], [`RunnerConfig`], receipt
//! sink, and audit sink.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use vei_core::APPROVALS_SERVICE;
use vei_core::ApprovalMatch;
use vei_core::GateConfig;
use vei_core::OperationId;
use vei_core::OperationRegistry;
use vei_core::OverrideAction;
use vei_core::ReceiptSink;
use vei_core::SessionId;
use vei_core::runtime::AuditSink;
use vei_core::runtime::ConnectorMode;
use vei_core::runtime::ConnectorModes;
use vei_core::runtime::DEFAULT_SEED;
use vei_core::runtime::FileAuditSink;
use vei_core::runtime::JsonlReceiptSink;
use vei_core::runtime::LiveConfig;
use vei_core::runtime::NoopAuditSink;
use vei_core::runtime::RunnerConfig;
use vei_core::runtime::SessionBuilder;
use vei_core::runtime::SessionConfig;
use vei_core::runtime::StderrAuditSink;
use vei_store_sqlite::SqliteReceiptStore;
use vei_store_sqlite::SqliteStoreConfig;
use vei_store_sqlite::SqliteStoreMode;
use vei_store_sqlite::SqliteSyncMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "vei.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "VEI_CONFIG";
/// Environment variable overriding the default connector mode.
pub const CONNECTOR_MODE_ENV_VAR: &str = "VEI_CONNECTOR_MODE";
/// Environment variable overriding the session seed.
pub const SEED_ENV_VAR: &str = "VEI_SEED";
/// Environment variable enabling live safe writes.
pub const LIVE_ALLOW_WRITE_SAFE_ENV_VAR: &str = "VEI_LIVE_ALLOW_WRITE_SAFE";
/// Environment variable enabling live risky writes.
pub const LIVE_ALLOW_WRITE_RISKY_ENV_VAR: &str = "VEI_LIVE_ALLOW_WRITE_RISKY";
/// Environment variable listing live-blocked operations (comma-separated).
pub const LIVE_BLOCK_OPS_ENV_VAR: &str = "VEI_LIVE_BLOCK_OPS";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum session identifier length.
pub(crate) const MAX_SESSION_ID_LENGTH: usize = 128;
/// Maximum entries in any operation list or map.
pub(crate) const MAX_POLICY_ENTRIES: usize = 512;
/// Upper bound for the runner execution budget.
pub(crate) const MAX_STEP_EXECUTIONS: u32 = 100_000;
/// Default busy timeout for the sqlite receipt store (ms).
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// VEI configuration (`vei.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VeiConfig {
    /// Session identity, seed, and connector modes.
    #[serde(default)]
    pub session: SessionSettings,
    /// Policy gate configuration.
    #[serde(default)]
    pub policy: PolicySettings,
    /// Live adapter guards.
    #[serde(default)]
    pub live: LiveSettings,
    /// Approval matching.
    #[serde(default)]
    pub approvals: ApprovalSettings,
    /// Workflow runner limits.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Receipt persistence.
    #[serde(default)]
    pub receipts: ReceiptStoreConfig,
    /// Audit event sink.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl VeiConfig {
    /// Loads configuration from disk using the default resolution rules,
    /// applies `VEI_*` environment overrides, and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overriding, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.apply_overrides(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration text without overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the TOML is malformed.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// Recognized variables: [`CONNECTOR_MODE_ENV_VAR`], [`SEED_ENV_VAR`],
    /// [`LIVE_ALLOW_WRITE_SAFE_ENV_VAR`], [`LIVE_ALLOW_WRITE_RISKY_ENV_VAR`],
    /// and [`LIVE_BLOCK_OPS_ENV_VAR`]. Unset variables leave the file value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable cannot be parsed.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(raw) = lookup(CONNECTOR_MODE_ENV_VAR) {
            self.session.mode = raw
                .parse::<ConnectorMode>()
                .map_err(|err| ConfigError::Invalid(format!("{CONNECTOR_MODE_ENV_VAR}: {err}")))?;
        }
        if let Some(raw) = lookup(SEED_ENV_VAR) {
            self.session.seed = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid(format!("{SEED_ENV_VAR} must be an unsigned integer")))?;
        }
        if let Some(raw) = lookup(LIVE_ALLOW_WRITE_SAFE_ENV_VAR) {
            self.live.allow_write_safe = parse_flag(LIVE_ALLOW_WRITE_SAFE_ENV_VAR, &raw)?;
        }
        if let Some(raw) = lookup(LIVE_ALLOW_WRITE_RISKY_ENV_VAR) {
            self.live.allow_write_risky = parse_flag(LIVE_ALLOW_WRITE_RISKY_ENV_VAR, &raw)?;
        }
        if let Some(raw) = lookup(LIVE_BLOCK_OPS_ENV_VAR) {
            for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
                let operation = item
                    .parse::<OperationId>()
                    .map_err(|err| ConfigError::Invalid(format!("{LIVE_BLOCK_OPS_ENV_VAR}: {err}")))?;
                self.live.block_ops.insert(operation);
            }
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let registry = OperationRegistry::enterprise().map_err(|err| ConfigError::Invalid(err.to_string()))?;
        self.session.validate(&registry)?;
        self.policy.validate(&registry)?;
        self.live.validate(&registry)?;
        validate_runner(&self.runner)?;
        self.receipts.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Builds the core session configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            session_id: SessionId::new(self.session.id.trim()),
            seed: self.session.seed,
            modes: ConnectorModes {
                default: self.session.mode,
                services: self.session.service_modes.clone(),
            },
            gate: GateConfig {
                write_safe_enabled: self.policy.write_safe_enabled,
                hard_block: self.policy.hard_block.clone(),
                overrides: self.policy.overrides.clone(),
                pre_granted: self.policy.pre_granted.clone(),
                approval_match: self.approvals.matching,
            },
            live: LiveConfig {
                allow_write_safe: self.live.allow_write_safe,
                allow_write_risky: self.live.allow_write_risky,
                hard_block: self.live.block_ops.clone(),
            },
        }
    }

    /// Returns the workflow runner limits.
    #[must_use]
    pub const fn runner_config(&self) -> RunnerConfig {
        self.runner
    }

    /// Opens the configured receipt sink, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the sink cannot be opened.
    pub fn receipt_sink(&self) -> Result<Option<Arc<dyn ReceiptSink>>, ConfigError> {
        self.receipts.open()
    }

    /// Opens the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the audit file cannot be opened.
    pub fn audit_sink(&self) -> Result<Arc<dyn AuditSink>, ConfigError> {
        self.audit.open()
    }

    /// Returns a session builder wired with the configured sinks.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when a sink cannot be opened.
    pub fn session_builder(&self) -> Result<SessionBuilder, ConfigError> {
        self.attach_sinks(SessionBuilder::new(self.session_config()))
    }

    /// Attaches the configured receipt and audit sinks to `builder`.
    ///
    /// Used with [`vei_core::runtime::WorkflowRunner::session_builder`] so a
    /// workflow session keeps its seeded world.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when a sink cannot be opened.
    pub fn attach_sinks(&self, builder: SessionBuilder) -> Result<SessionBuilder, ConfigError> {
        let mut builder = builder.audit_sink(self.audit_sink()?);
        if let Some(sink) = self.receipt_sink()? {
            builder = builder.receipt_sink(sink);
        }
        Ok(builder)
    }
}

/// Session identity, seed, and connector modes (`[session]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSettings {
    /// Session identifier stamped on receipts.
    #[serde(default = "default_session_id")]
    pub id: String,
    /// Seed for fingerprints and simulator randomness.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Connector mode for services without an override.
    #[serde(default)]
    pub mode: ConnectorMode,
    /// Per-service connector modes (`[session.service_modes]`).
    #[serde(default)]
    pub service_modes: BTreeMap<String, ConnectorMode>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            id: default_session_id(),
            seed: default_seed(),
            mode: ConnectorMode::default(),
            service_modes: BTreeMap::new(),
        }
    }
}

impl SessionSettings {
    /// Validates the session section.
    fn validate(&self, registry: &OperationRegistry) -> Result<(), ConfigError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(ConfigError::Invalid("session.id must be non-empty".to_string()));
        }
        if id.len() > MAX_SESSION_ID_LENGTH {
            return Err(ConfigError::Invalid("session.id exceeds max length".to_string()));
        }
        let services = registry.services();
        for service in self.service_modes.keys() {
            if service == APPROVALS_SERVICE {
                return Err(ConfigError::Invalid(
                    "session.service_modes must not configure the approvals service".to_string(),
                ));
            }
            if !services.iter().any(|known| known.as_str() == service) {
                return Err(ConfigError::Invalid(format!("session.service_modes: unknown service {service}")));
            }
        }
        Ok(())
    }
}

/// Policy gate configuration (`[policy]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySettings {
    /// Allow safe writes without approval.
    #[serde(default = "default_true")]
    pub write_safe_enabled: bool,
    /// Operations denied regardless of approval state.
    #[serde(default)]
    pub hard_block: BTreeSet<OperationId>,
    /// Operations with a standing approval grant.
    #[serde(default)]
    pub pre_granted: BTreeSet<OperationId>,
    /// Per-operation overrides (`[policy.overrides]`).
    #[serde(default)]
    pub overrides: BTreeMap<OperationId, OverrideAction>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            write_safe_enabled: true,
            hard_block: BTreeSet::new(),
            pre_granted: BTreeSet::new(),
            overrides: BTreeMap::new(),
        }
    }
}

impl PolicySettings {
    /// Validates the policy section.
    fn validate(&self, registry: &OperationRegistry) -> Result<(), ConfigError> {
        validate_operations("policy.hard_block", self.hard_block.iter(), registry)?;
        validate_operations("policy.pre_granted", self.pre_granted.iter(), registry)?;
        validate_operations("policy.overrides", self.overrides.keys(), registry)?;
        if let Some(operation) = self.pre_granted.intersection(&self.hard_block).next() {
            return Err(ConfigError::Invalid(format!(
                "policy.pre_granted conflicts with policy.hard_block for {operation}"
            )));
        }
        Ok(())
    }
}

/// Live adapter guards (`[live]`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LiveSettings {
    /// Forward safe writes to the live backend.
    #[serde(default)]
    pub allow_write_safe: bool,
    /// Forward risky writes to the live backend.
    #[serde(default)]
    pub allow_write_risky: bool,
    /// Operations never forwarded to the live backend.
    #[serde(default)]
    pub block_ops: BTreeSet<OperationId>,
}

impl LiveSettings {
    /// Validates the live section.
    fn validate(&self, registry: &OperationRegistry) -> Result<(), ConfigError> {
        validate_operations("live.block_ops", self.block_ops.iter(), registry)
    }
}

/// Approval matching (`[approvals]`).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalSettings {
    /// Matching granularity between approvals and calls.
    #[serde(rename = "match", default)]
    pub matching: ApprovalMatch,
}

/// Receipt store configuration (`[receipts]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReceiptStoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: ReceiptStoreType,
    /// File path for the `jsonl` and `sqlite` backends.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds (`sqlite` only).
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for ReceiptStoreConfig {
    fn default() -> Self {
        Self {
            store_type: ReceiptStoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl ReceiptStoreConfig {
    /// Validates receipt store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            ReceiptStoreType::None => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("receipts type none must not set path".to_string()));
                }
                Ok(())
            }
            ReceiptStoreType::Jsonl | ReceiptStoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid(format!("{} receipts require path", self.store_type.as_str()))
                })?;
                validate_store_path(path)
            }
        }
    }

    /// Returns the sqlite store config when the backend is `sqlite`.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (ReceiptStoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Opens the configured sink.
    fn open(&self) -> Result<Option<Arc<dyn ReceiptSink>>, ConfigError> {
        match (self.store_type, &self.path) {
            (ReceiptStoreType::None, _) => Ok(None),
            (ReceiptStoreType::Jsonl, Some(path)) => {
                let sink = JsonlReceiptSink::open(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Some(Arc::new(sink)))
            }
            (ReceiptStoreType::Sqlite, Some(_)) => {
                let config = self.sqlite_config().ok_or_else(|| {
                    ConfigError::Invalid("sqlite receipts require path".to_string())
                })?;
                let store = SqliteReceiptStore::new(&config).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Some(Arc::new(store)))
            }
            (store_type, None) => {
                Err(ConfigError::Invalid(format!("{} receipts require path", store_type.as_str())))
            }
        }
    }
}

/// Receipt store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStoreType {
    /// Keep receipts only in the session log.
    #[default]
    None,
    /// Append canonical JSON lines to a file.
    Jsonl,
    /// Append hashed rows to a `SQLite` database.
    Sqlite,
}

impl ReceiptStoreType {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Jsonl => "jsonl",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Audit sink configuration (`[audit]`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink type.
    #[serde(rename = "type", default)]
    pub sink: AuditSinkType,
    /// JSON lines path for the `file` sink.
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, Some(path)) => validate_path_string("audit.path", path),
            (AuditSinkType::File, None) => Err(ConfigError::Invalid("file audit requires path".to_string())),
            (_, Some(_)) => Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string())),
            (_, None) => Ok(()),
        }
    }

    /// Opens the configured sink.
    fn open(&self) -> Result<Arc<dyn AuditSink>, ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::None, _) => Ok(Arc::new(NoopAuditSink)),
            (AuditSinkType::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
            (AuditSinkType::File, Some(path)) => {
                let sink = FileAuditSink::new(Path::new(path.trim()))
                    .map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
            (AuditSinkType::File, None) => Err(ConfigError::Invalid("file audit requires path".to_string())),
        }
    }
}

/// Audit sink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// Discard audit events.
    #[default]
    None,
    /// JSON lines on stderr.
    Stderr,
    /// JSON lines appended to a file.
    File,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration or opening sinks.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the default session identifier.
fn default_session_id() -> String {
    "session-1".to_string()
}

/// Returns the default seed.
const fn default_seed() -> u64 {
    DEFAULT_SEED
}

/// Returns `true` for serde defaults.
const fn default_true() -> bool {
    true
}

/// Returns the default busy timeout for the sqlite receipt store.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

/// Parses a boolean flag from an environment value.
fn parse_flag(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid(format!("{name} must be a boolean flag"))),
    }
}

/// Validates runner limits.
fn validate_runner(runner: &RunnerConfig) -> Result<(), ConfigError> {
    if runner.max_step_executions == 0 {
        return Err(ConfigError::Invalid("runner.max_step_executions must be greater than zero".to_string()));
    }
    if runner.max_step_executions > MAX_STEP_EXECUTIONS {
        return Err(ConfigError::Invalid(format!(
            "runner.max_step_executions exceeds limit ({MAX_STEP_EXECUTIONS})"
        )));
    }
    if runner.max_jumps > runner.max_step_executions {
        return Err(ConfigError::Invalid("runner.max_jumps must not exceed runner.max_step_executions".to_string()));
    }
    Ok(())
}

/// Validates that every listed operation is a known, non-approval operation.
fn validate_operations<'a>(
    field: &str,
    operations: impl ExactSizeIterator<Item = &'a OperationId>,
    registry: &OperationRegistry,
) -> Result<(), ConfigError> {
    if operations.len() > MAX_POLICY_ENTRIES {
        return Err(ConfigError::Invalid(format!("{field} exceeds max entries ({MAX_POLICY_ENTRIES})")));
    }
    for operation in operations {
        if operation.service().as_str() == APPROVALS_SERVICE {
            return Err(ConfigError::Invalid(format!("{field}: approval controls cannot be configured ({operation})")));
        }
        if !registry.contains(operation) {
            return Err(ConfigError::Invalid(format!("{field}: unknown operation {operation}")));
        }
    }
    Ok(())
}

/// Resolves the config path using CLI arg, env var, or default.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a receipt store path.
fn validate_store_path(path: &Path) -> Result<(), ConfigError> {
    validate_path_string("receipts.path", &path.to_string_lossy())?;
    if path.is_dir() {
        return Err(ConfigError::Invalid("receipts.path must be a file, not a directory".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn validate_path_string_rejects_whitespace_only() {
        let result = validate_path_string("test_path", "   ");
        assert!(result.unwrap_err().to_string().contains("test_path must be non-empty"));
    }

    #[test]
    fn validate_path_string_rejects_component_too_long() {
        let path = format!("./{}/x", "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1));
        let result = validate_path_string("test_path", &path);
        assert!(result.unwrap_err().to_string().contains("path component too long"));
    }

    #[test]
    fn validate_path_string_accepts_component_at_max() {
        let path = format!("./{}", "a".repeat(MAX_PATH_COMPONENT_LENGTH));
        assert!(validate_path_string("test_path", &path).is_ok());
    }

    #[test]
    fn validate_path_rejects_overlong_total() {
        let path = PathBuf::from("a/".repeat(MAX_TOTAL_PATH_LENGTH));
        assert!(validate_path(&path).unwrap_err().to_string().contains("config path exceeds max length"));
    }

    #[test]
    fn resolve_path_prefers_explicit_argument() {
        let resolved = resolve_path(Some(Path::new("explicit.toml"))).unwrap();
        assert_eq!(resolved, PathBuf::from("explicit.toml"));
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        for raw in ["1", "true", "YES", " on "] {
            assert!(parse_flag("FLAG", raw).unwrap());
        }
        for raw in ["0", "false", "No", "off", ""] {
            assert!(!parse_flag("FLAG", raw).unwrap());
        }
        assert!(parse_flag("FLAG", "maybe").unwrap_err().to_string().contains("FLAG must be a boolean flag"));
    }

    #[test]
    fn runner_limits_are_bounded() {
        let zero = RunnerConfig {
            max_step_executions: 0,
            ..RunnerConfig::default()
        };
        assert!(validate_runner(&zero).is_err());
        let huge = RunnerConfig {
            max_step_executions: MAX_STEP_EXECUTIONS + 1,
            ..RunnerConfig::default()
        };
        assert!(validate_runner(&huge).is_err());
        let jumpy = RunnerConfig {
            max_jumps: 10,
            max_step_executions: 5,
        };
        assert!(validate_runner(&jumpy).is_err());
        assert!(validate_runner(&RunnerConfig::default()).is_ok());
    }

    #[test]
    fn default_config_is_valid_and_fail_closed_for_live() {
        let config = VeiConfig::default();
        config.validate().unwrap();
        let session = config.session_config();
        assert_eq!(session.seed, DEFAULT_SEED);
        assert_eq!(session.modes.default, ConnectorMode::Sim);
        assert!(!session.live.allow_write_safe);
        assert!(!session.live.allow_write_risky);
        assert!(session.gate.write_safe_enabled);
    }
}
