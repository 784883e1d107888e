// crates/vei-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Receipt Store
// Description: Durable ReceiptSink and replay fixture storage using SQLite WAL.
// Purpose: Persist receipt logs and recorded fixtures across processes.
// Dependencies: vei-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`vei_core::ReceiptSink`] that keeps
//! an append-only receipt table with a canonical JSON payload and a SHA-256
//! hash per row. The same database holds named replay fixture sets so a Sim
//! recording can be replayed by a later process. Loads verify every stored
//! hash and fail closed on corruption.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_RECORD_BYTES;
pub use store::SqliteReceiptStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
