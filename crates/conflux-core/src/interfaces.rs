// crates/conflux-core/src/interfaces.rs
// ============================================================================
// Module: Conflux Interfaces
// Description: Persistence and tool-dispatch contracts.
// Purpose: Keep storage backends and the dispatch engine behind traits.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`ConfigPersistence`] is the persistence gateway contract. Every mutation
//! is expressed as a slice of [`PersistOp`] values that a backend must apply
//! in a single all-or-nothing transaction, which is how a reconciliation
//! outcome and its file hash are committed together.
//!
//! [`ToolDispatcher`] is the external component that owns live tool-client
//! connections.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::identifiers::ProviderName;
use crate::model::ClientConfig;
use crate::model::ProviderConfig;
use crate::model::ToolClientConfig;
use crate::provenance::ProvenanceEntry;

// ============================================================================
// SECTION: Persistence Types
// ============================================================================

/// Complete persisted configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    /// Client settings, when ever saved.
    pub client_config: Option<ClientConfig>,
    /// Providers by name.
    pub providers: BTreeMap<ProviderName, ProviderConfig>,
    /// Tool clients in insertion order.
    pub tool_clients: Vec<ToolClientConfig>,
    /// Provenance entries.
    pub provenance: Vec<ProvenanceEntry>,
}

impl ConfigSnapshot {
    /// Returns true when no provider or tool client is stored.
    #[must_use]
    pub fn has_no_entities(&self) -> bool {
        self.providers.is_empty() && self.tool_clients.is_empty()
    }
}

/// One observed configuration file hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashRecord {
    /// Hex digest of the file bytes.
    pub hash: String,
    /// First sighting, unix milliseconds.
    pub created_at_ms: i64,
    /// Latest sighting, unix milliseconds.
    pub updated_at_ms: i64,
}

/// One write applied inside a persistence transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    /// Insert or replace a provider and all of its keys.
    UpsertProvider {
        /// Provider name.
        name: ProviderName,
        /// Provider content.
        config: ProviderConfig,
    },
    /// Delete a provider; its keys cascade.
    DeleteProvider(ProviderName),
    /// Insert or replace a tool client. The client must carry an id.
    UpsertToolClient(ToolClientConfig),
    /// Delete a tool client by name.
    DeleteToolClient(String),
    /// Replace the client settings.
    SaveClientConfig(ClientConfig),
    /// Replace the whole provenance table.
    ReplaceProvenance(Vec<ProvenanceEntry>),
    /// Insert a file hash or refresh its last-seen time.
    RecordFileHash(String),
}

// ============================================================================
// SECTION: Persistence Contract
// ============================================================================

/// Persistence errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("config store io error: {0}")]
    Io(String),
    /// Store data is corrupted.
    #[error("config store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("config store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data or request is invalid.
    #[error("config store invalid data: {0}")]
    Invalid(String),
    /// Backend reported an error.
    #[error("config store error: {0}")]
    Store(String),
}

/// Relational persistence for configuration entities.
pub trait ConfigPersistence: Send + Sync {
    /// Loads every persisted entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read or decoded.
    fn load(&self) -> Result<ConfigSnapshot, StoreError>;

    /// Returns the most recently seen file hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the hash log cannot be read.
    fn latest_file_hash(&self) -> Result<Option<FileHashRecord>, StoreError>;

    /// Returns every file hash, most recently seen first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the hash log cannot be read.
    fn file_hashes(&self) -> Result<Vec<FileHashRecord>, StoreError>;

    /// Applies the operations in order inside one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any operation fails; nothing is applied.
    fn commit(&self, ops: &[PersistOp]) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Tool Dispatch
// ============================================================================

/// Tool dispatch errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The dispatcher rejected or failed the request.
    #[error("tool dispatch failed: {0}")]
    DispatchFailed(String),
}

/// Component that owns live tool-client connections.
pub trait ToolDispatcher: Send + Sync {
    /// Connects a new client. Values are already resolved.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the client cannot be connected.
    fn add_client(&self, client: &ToolClientConfig) -> Result<(), DispatchError>;

    /// Disconnects a client.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the client cannot be removed.
    fn remove_client(&self, name: &str) -> Result<(), DispatchError>;

    /// Replaces a client's tool filters.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the filters cannot be applied.
    fn edit_client_tools(
        &self,
        name: &str,
        tools_to_execute: &[String],
        tools_to_skip: &[String],
    ) -> Result<(), DispatchError>;
}
