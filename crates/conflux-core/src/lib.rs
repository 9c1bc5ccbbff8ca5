// crates/conflux-core/src/lib.rs
// ============================================================================
// Module: Conflux Core Library
// Description: Public API surface for the Conflux configuration core.
// Purpose: Expose the configuration model, hashing, redaction and provenance.
// Dependencies: crate::{model, hashing, redaction, env, provenance, secrets}
// ============================================================================

//! ## Overview
//! Conflux core holds everything about a gateway's runtime configuration that
//! does not involve files or databases: the typed model, content hashes used to
//! detect changes, the redaction codec, environment resolution, and the
//! provenance ledger that remembers which values came from the environment.
//! Storage and tool dispatch are reached through the traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod env;
pub mod hashing;
pub mod identifiers;
pub mod interfaces;
pub mod memory;
pub mod model;
pub mod provenance;
pub mod redaction;
pub mod secrets;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use env::EnvSource;
pub use env::ProcessEnv;
pub use env::ResolveError;
pub use env::StaticEnv;
pub use hashing::HashError;
pub use identifiers::KeyId;
pub use identifiers::ProviderName;
pub use identifiers::ToolClientId;
pub use interfaces::ConfigPersistence;
pub use interfaces::ConfigSnapshot;
pub use interfaces::DispatchError;
pub use interfaces::FileHashRecord;
pub use interfaces::PersistOp;
pub use interfaces::StoreError;
pub use interfaces::ToolDispatcher;
pub use memory::InMemoryConfigPersistence;
pub use model::AzureKeyConfig;
pub use model::BedrockKeyConfig;
pub use model::ClientConfig;
pub use model::ConcurrencyAndBufferSize;
pub use model::CustomProviderConfig;
pub use model::Key;
pub use model::KeyFamilyConfig;
pub use model::ModelError;
pub use model::NetworkConfig;
pub use model::ProviderConfig;
pub use model::ProxyConfig;
pub use model::ProxyType;
pub use model::ToolClientConfig;
pub use model::ToolConnection;
pub use model::ValueKind;
pub use model::VertexKeyConfig;
pub use provenance::ProvenanceEntry;
pub use provenance::ProvenanceLedger;
pub use provenance::ProvenanceOwner;
