// crates/conflux-config/src/lib.rs
// ============================================================================
// Module: Conflux Config Library
// Description: Config file loading, reconciliation and the runtime store.
// Purpose: Keep the file and the database consistent for every entity.
// Dependencies: conflux-core, serde, serde_json, toml
// ============================================================================

//! ## Overview
//! `conflux-config` owns the runtime configuration of the gateway. It reads
//! the declarative file, reconciles it entity by entity with the persisted
//! copy, and serves the result from an in-memory [`ConfigStore`] that also
//! accepts administrative mutations.
//!
//! Security posture: file contents and admin requests are untrusted. Secret
//! values never leave the store except through the raw read path used for
//! outbound provider requests.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod document;
pub mod reconcile;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::ConfigAuditEvent;
pub use audit::ConfigAuditSink;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use document::ConfigDocument;
pub use document::ConfigError;
pub use document::ConfigFormat;
pub use document::PassthroughSections;
pub use document::resolve_config_path;
pub use reconcile::Decision;
pub use reconcile::EntityOutcome;
pub use reconcile::EntityRef;
pub use reconcile::LoadPath;
pub use reconcile::LoadReport;
pub use reconcile::OutcomeStatus;
pub use store::ConfigStore;
pub use store::StoreOpError;
