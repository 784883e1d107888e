// crates/vei-core/src/runtime/adapters/sim.rs
// ============================================================================
// Module: VEI Sim Adapter
// Description: Deterministic simulator adapter with per-call seeded generators.
// Purpose: Produce reproducible results from (seed, service, operation, sequence).
// Dependencies: rand, rand_chacha, serde_json, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Every sim call derives a fresh ChaCha20 generator from the canonical hash
//! of `{seed, service, operation, sequence}`. Simulators draw all randomness
//! from that generator, so results depend only on the fingerprint inputs and
//! the session world, never on process state.
//!
//! [`GenericSimulator`] backs services without dedicated content: reads
//! return the world snapshot section and the session's write records, writes
//! append a record with a generated identifier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use rand::RngCore;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use super::AdapterError;
use crate::core::envelope::RequestEnvelope;
use crate::core::hashing::canonical_seed_bytes;
use crate::core::operation::OperationClass;
use crate::core::result::RawResult;
use crate::interfaces::AdapterContext;
use crate::interfaces::ServiceSimulator;
use crate::interfaces::SimContext;
use crate::interfaces::SimRng;
use crate::interfaces::SimulatorError;

// ============================================================================
// SECTION: Generator Derivation
// ============================================================================

/// Canonical seed input for a sim call.
#[derive(Serialize)]
struct SeedInput<'a> {
    /// Session seed.
    seed: u64,
    /// Service name.
    service: &'a str,
    /// Operation name.
    operation: &'a str,
    /// Request sequence.
    sequence: u64,
}

/// Derives the generator for one call.
///
/// # Errors
///
/// Returns [`AdapterError::SimFault`] when the seed input cannot be hashed.
pub fn derive_rng(seed: u64, request: &RequestEnvelope) -> Result<SimRng, AdapterError> {
    let input = SeedInput {
        seed,
        service: request.service(),
        operation: request.operation_name(),
        sequence: request.sequence,
    };
    let bytes = canonical_seed_bytes(&input).map_err(|err| AdapterError::SimFault(err.to_string()))?;
    Ok(SimRng::from_seed(bytes))
}

// ============================================================================
// SECTION: Simulator Registry
// ============================================================================

/// Simulators by service with an optional fallback.
#[derive(Clone)]
pub struct SimulatorRegistry {
    /// Dedicated simulators.
    simulators: BTreeMap<String, Arc<dyn ServiceSimulator>>,
    /// Simulator used for services without a dedicated one.
    fallback: Option<Arc<dyn ServiceSimulator>>,
}

impl Default for SimulatorRegistry {
    fn default() -> Self {
        Self {
            simulators: BTreeMap::new(),
            fallback: Some(Arc::new(GenericSimulator)),
        }
    }
}

impl SimulatorRegistry {
    /// Creates a registry with no simulators and no fallback.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            simulators: BTreeMap::new(),
            fallback: None,
        }
    }

    /// Registers a dedicated simulator for a service.
    pub fn register(&mut self, service: impl Into<String>, simulator: Arc<dyn ServiceSimulator>) {
        self.simulators.insert(service.into(), simulator);
    }

    /// Replaces the fallback simulator.
    pub fn set_fallback(&mut self, simulator: Option<Arc<dyn ServiceSimulator>>) {
        self.fallback = simulator;
    }

    /// Returns the simulator for a service.
    #[must_use]
    pub fn get(&self, service: &str) -> Option<&Arc<dyn ServiceSimulator>> {
        self.simulators.get(service).or(self.fallback.as_ref())
    }
}

// ============================================================================
// SECTION: Sim Adapter
// ============================================================================

/// Deterministic simulator adapter.
#[derive(Clone, Default)]
pub struct SimAdapter {
    /// Simulators by service.
    simulators: SimulatorRegistry,
}

impl SimAdapter {
    /// Creates a sim adapter.
    #[must_use]
    pub const fn new(simulators: SimulatorRegistry) -> Self {
        Self {
            simulators,
        }
    }

    /// Executes a request against the service simulator.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::SimFault`] when no simulator exists or it fails.
    pub fn execute(&self, request: &RequestEnvelope, ctx: &mut AdapterContext<'_>) -> Result<RawResult, AdapterError> {
        let simulator = self
            .simulators
            .get(request.service())
            .ok_or_else(|| AdapterError::SimFault(format!("no simulator for service {}", request.service())))?;
        let mut rng = derive_rng(ctx.seed, request)?;
        let mut sim_ctx = SimContext {
            rng: &mut rng,
            world: &mut *ctx.world,
        };
        let data = simulator
            .simulate(request, &mut sim_ctx)
            .map_err(|err: SimulatorError| AdapterError::SimFault(err.to_string()))?;
        let latency_ms: u32 = rng.gen_range(5..=250);
        let raw = json!({
            "adapter": "sim",
            "service": request.service(),
            "operation": request.operation_name(),
            "sequence": request.sequence,
            "latency_ms": latency_ms,
            "payload": data.clone(),
        });
        Ok(RawResult {
            data,
            raw,
        })
    }
}

// ============================================================================
// SECTION: Generic Simulator
// ============================================================================

/// Content-agnostic simulator for any registered service.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericSimulator;

impl ServiceSimulator for GenericSimulator {
    fn simulate(&self, request: &RequestEnvelope, ctx: &mut SimContext<'_>) -> Result<Value, SimulatorError> {
        let service = request.service();
        let operation = request.operation_name();
        match request.operation_class {
            OperationClass::Read => {
                let section = ctx.world.snapshot().section(service);
                let view = section.and_then(|value| value.get(operation)).or(section).cloned().unwrap_or(Value::Null);
                let records = ctx.world.records(service).to_vec();
                Ok(json!({
                    "service": service,
                    "operation": operation,
                    "view": view,
                    "count": records.len(),
                    "records": records,
                }))
            }
            OperationClass::WriteSafe | OperationClass::WriteRisky => {
                let id = format!("{service}-{:08x}", ctx.rng.next_u32());
                let record = json!({
                    "id": id,
                    "operation": operation,
                    "args": Value::Object(request.args.clone()),
                });
                ctx.world.append_record(service, record);
                Ok(json!({
                    "id": id,
                    "status": "accepted",
                    "service": service,
                    "operation": operation,
                    "record_count": ctx.world.records(service).len(),
                }))
            }
        }
    }
}
