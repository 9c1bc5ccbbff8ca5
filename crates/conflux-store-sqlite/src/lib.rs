// crates/conflux-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Config Store
// Description: Durable ConfigPersistence backend using SQLite WAL.
// Purpose: Persist gateway configuration across restarts.
// Dependencies: conflux-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`ConfigPersistence`] implementation.
//! Providers, keys, tool clients, client settings, provenance and the file
//! hash log live in relational tables; every commit is one transaction.
//!
//! [`ConfigPersistence`]: conflux_core::ConfigPersistence

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod codec;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteConfigStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
