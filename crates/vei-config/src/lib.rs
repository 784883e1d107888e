// crates/vei-config/src/lib.rs
// ============================================================================
// Module: VEI Config Library
// Description: Canonical config model, validation, and runtime construction.
// Purpose: Single source of truth for vei.toml semantics.
// Dependencies: vei-core, vei-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `vei-config` defines the canonical `vei.toml` model for VEI sessions and
//! workflow runs. It applies `VEI_*` environment overrides, validates
//! everything fail closed, and builds the core session, runner, receipt
//! sink, and audit sink from the validated model.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
