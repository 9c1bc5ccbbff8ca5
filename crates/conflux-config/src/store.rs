// crates/conflux-config/src/store.rs
// ============================================================================
// Module: Conflux Config Store
// Description: Process-wide configuration state with two lock domains.
// Purpose: Serve provider reads, reconcile the file, apply admin mutations.
// Dependencies: conflux-core, thiserror
// ============================================================================

//! ## Overview
//! [`ConfigStore`] is owned by the composition root and shared by reference.
//! It keeps two independent lock domains:
//! - the provider domain: client settings, providers with their keys, and the
//!   provenance ledger
//! - the tool domain: tool clients and the external [`ToolDispatcher`]
//!
//! Tool mutations call the dispatcher while holding only the tool lock, so a
//! slow dispatcher never stalls provider reads. When both locks are needed
//! the tool lock is always taken first.
//!
//! Every mutation computes its new state off to the side, commits it through
//! [`ConfigPersistence::commit`] in one transaction, and only then swaps it
//! into memory. A failed commit leaves memory untouched.
//!
//! Hot-path reads return `Arc<ProviderConfig>` with live secret values; the
//! shared value is immutable. Display reads return owned, redacted copies.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use conflux_core::ClientConfig;
use conflux_core::ConfigPersistence;
use conflux_core::ConfigSnapshot;
use conflux_core::DispatchError;
use conflux_core::EnvSource;
use conflux_core::FileHashRecord;
use conflux_core::HashError;
use conflux_core::Key;
use conflux_core::KeyId;
use conflux_core::ModelError;
use conflux_core::PersistOp;
use conflux_core::ProviderConfig;
use conflux_core::ProviderName;
use conflux_core::ProvenanceEntry;
use conflux_core::ProvenanceLedger;
use conflux_core::ProvenanceOwner;
use conflux_core::ResolveError;
use conflux_core::StoreError;
use conflux_core::ToolClientConfig;
use conflux_core::ToolClientId;
use conflux_core::ToolConnection;
use conflux_core::ToolDispatcher;
use conflux_core::hashing::file_hash;
use conflux_core::model::validate_tool_lists;
use conflux_core::provenance::tool_client_path;
use conflux_core::redaction::ValueForm;
use conflux_core::redaction::classify;
use conflux_core::secrets::SecretError;
use conflux_core::secrets::redact_provider;
use conflux_core::secrets::redact_tool_client;
use conflux_core::secrets::refresh_provider;
use conflux_core::secrets::refresh_tool_client;
use conflux_core::secrets::resolve_key;
use conflux_core::secrets::resolve_submitted_key;
use conflux_core::secrets::resolve_tool_client;
use conflux_core::secrets::restore_provider_references;
use conflux_core::secrets::restore_proxy_password;
use conflux_core::secrets::restore_tool_client_references;
use thiserror::Error;

use crate::audit::ConfigAuditEvent;
use crate::audit::ConfigAuditSink;
use crate::audit::NoopAuditSink;
use crate::document::ConfigDocument;
use crate::document::ConfigError;
use crate::document::PassthroughSections;
use crate::document::read_config_file;
use crate::reconcile::EntityOutcome;
use crate::reconcile::LoadPath;
use crate::reconcile::LoadReport;
use crate::reconcile::OutcomeStatus;
use crate::reconcile::detect_providers;
use crate::reconcile::merge;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreOpError {
    /// Malformed request; nothing was changed.
    #[error("invalid request: {0}")]
    Invalid(String),
    /// Entity already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// Entity does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// Tool mutation attempted before a dispatcher was registered.
    #[error("tool dispatcher not set")]
    DispatcherNotSet,
    /// Dispatcher rejected the change.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Persistence failed; the transaction rolled back.
    #[error(transparent)]
    Persistence(#[from] StoreError),
    /// Content could not be hashed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Environment reference could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Configuration file could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A lock was poisoned by a panicking holder.
    #[error("config store lock poisoned")]
    LockPoisoned,
}

impl From<ModelError> for StoreOpError {
    fn from(error: ModelError) -> Self {
        Self::Invalid(error.to_string())
    }
}

impl From<SecretError> for StoreOpError {
    fn from(error: SecretError) -> Self {
        match error {
            SecretError::Resolve(err) => Self::Resolve(err),
            SecretError::MaskedWithoutOrigin(path) => {
                Self::Invalid(format!("masked value at {path} has no stored value to restore"))
            }
        }
    }
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Provider lock domain.
#[derive(Debug, Default)]
struct ProviderState {
    /// Client settings.
    client_config: ClientConfig,
    /// Providers with live values, shared immutably with readers.
    providers: BTreeMap<ProviderName, Arc<ProviderConfig>>,
    /// Provenance of env-sourced values for providers and tool clients.
    ledger: ProvenanceLedger,
    /// Sections echoed on write-back.
    passthrough: PassthroughSections,
}

/// Tool lock domain.
#[derive(Default)]
struct ToolState {
    /// Tool clients with live values.
    clients: Vec<ToolClientConfig>,
    /// External dispatch component.
    dispatcher: Option<Arc<dyn ToolDispatcher>>,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Runtime configuration store.
///
/// # Invariants
/// - The tool lock is acquired before the provider lock.
/// - Memory reflects the last successful commit.
pub struct ConfigStore {
    /// Persistence gateway.
    persistence: Arc<dyn ConfigPersistence>,
    /// Environment used for `env.NAME` resolution.
    env: Arc<dyn EnvSource>,
    /// Audit sink.
    audit: Arc<dyn ConfigAuditSink>,
    /// Tool lock domain.
    tools: RwLock<ToolState>,
    /// Provider lock domain.
    state: RwLock<ProviderState>,
}

impl ConfigStore {
    /// Creates an empty store over a persistence backend.
    #[must_use]
    pub fn new(persistence: Arc<dyn ConfigPersistence>, env: Arc<dyn EnvSource>) -> Self {
        Self {
            persistence,
            env,
            audit: Arc::new(NoopAuditSink),
            tools: RwLock::new(ToolState::default()),
            state: RwLock::new(ProviderState::default()),
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn ConfigAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Registers the tool dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::LockPoisoned`] when the tool lock is poisoned.
    pub fn set_tool_dispatcher(&self, dispatcher: Arc<dyn ToolDispatcher>) -> Result<(), StoreOpError> {
        self.write_tools()?.dispatcher = Some(dispatcher);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------------

    /// Loads configuration, reconciling the file at `path` with persistence.
    ///
    /// Blocks both lock domains for the whole pass so no partially loaded
    /// state is ever visible.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError`] when the file is unreadable or unparsable, or
    /// persistence fails. Memory and the hash log are unchanged on error.
    pub fn load_configuration(&self, path: &Path) -> Result<LoadReport, StoreOpError> {
        let result = self.load_locked(path);
        match &result {
            Ok(report) => {
                self.emit("load", "config", report.load_path.as_str(), report.file_hash.clone());
                for outcome in &report.outcomes {
                    self.emit_outcome(outcome);
                }
                if report.refreshed_values > 0 {
                    self.emit(
                        "refresh",
                        "config",
                        "success",
                        Some(format!("{} values", report.refreshed_values)),
                    );
                }
            }
            Err(err) => self.emit("load", "config", "failure", Some(err.to_string())),
        }
        result
    }

    /// Runs the load state machine under both locks.
    fn load_locked(&self, path: &Path) -> Result<LoadReport, StoreOpError> {
        let mut tools = self.write_tools()?;
        let mut state = self.write_state()?;
        let persisted = self.persistence.load()?;
        let env = self.env.as_ref();

        let (mut snapshot, passthrough, mut report) = match read_config_file(path)? {
            None => {
                let (snapshot, outcomes) = self.bootstrap_without_file(persisted)?;
                (snapshot, PassthroughSections::default(), new_report(path, LoadPath::NoFile, None, outcomes))
            }
            Some(file) => {
                let hash = file_hash(&file.bytes);
                let latest = self.persistence.latest_file_hash()?;
                if latest.is_some_and(|record| record.hash == hash) {
                    self.persistence.commit(&[PersistOp::RecordFileHash(hash.clone())])?;
                    let passthrough = PassthroughSections::from_bytes(&file.path, &file.bytes);
                    (persisted, passthrough, new_report(path, LoadPath::FileUnchanged, Some(hash), Vec::new()))
                } else {
                    let document = file.parse()?;
                    let outcome = merge(&document, &persisted, env)?;
                    let mut ops = outcome.ops;
                    ops.push(PersistOp::RecordFileHash(hash.clone()));
                    self.persistence.commit(&ops)?;
                    (
                        outcome.snapshot,
                        document.passthrough,
                        new_report(path, LoadPath::FileChanged, Some(hash), outcome.outcomes),
                    )
                }
            }
        };

        let ledger = ProvenanceLedger::from_entries(snapshot.provenance.iter().cloned());
        for (name, config) in &mut snapshot.providers {
            report.refreshed_values += refresh_provider(name, config, &ledger, env);
        }
        for client in &mut snapshot.tool_clients {
            report.refreshed_values += refresh_tool_client(client, &ledger, env);
        }

        tools.clients = snapshot.tool_clients;
        *state = ProviderState {
            client_config: snapshot.client_config.unwrap_or_default(),
            providers: snapshot
                .providers
                .into_iter()
                .map(|(name, config)| (name, Arc::new(config)))
                .collect(),
            ledger,
            passthrough,
        };
        drop(state);
        drop(tools);
        Ok(report)
    }

    /// Handles the no-file state: persisted state, or bootstrap when empty.
    fn bootstrap_without_file(
        &self,
        persisted: ConfigSnapshot,
    ) -> Result<(ConfigSnapshot, Vec<EntityOutcome>), StoreOpError> {
        if !persisted.has_no_entities() {
            return Ok((persisted, Vec::new()));
        }
        let mut snapshot = persisted;
        let mut ops = Vec::new();
        if snapshot.client_config.is_none() {
            let client = ClientConfig::default();
            ops.push(PersistOp::SaveClientConfig(client.clone()));
            snapshot.client_config = Some(client);
        }
        let detected = detect_providers(self.env.as_ref());
        for (name, config) in detected.providers {
            ops.push(PersistOp::UpsertProvider {
                name: name.clone(),
                config: config.clone(),
            });
            snapshot.providers.insert(name, config);
        }
        if !detected.provenance.is_empty() {
            let mut ledger = ProvenanceLedger::from_entries(snapshot.provenance.iter().cloned());
            ledger.record_all(detected.provenance);
            snapshot.provenance = ledger.entries().cloned().collect();
            ops.push(PersistOp::ReplaceProvenance(snapshot.provenance.clone()));
        }
        if !ops.is_empty() {
            self.persistence.commit(&ops)?;
        }
        Ok((snapshot, detected.outcomes))
    }

    // ------------------------------------------------------------------------
    // Provider reads
    // ------------------------------------------------------------------------

    /// Returns the live provider configuration for request-time use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::NotFound`] for an unknown provider.
    pub fn provider_config_raw(&self, name: &ProviderName) -> Result<Arc<ProviderConfig>, StoreOpError> {
        self.read_state()?
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| StoreOpError::NotFound(format!("provider {name}")))
    }

    /// Returns a display-safe copy of a provider.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::NotFound`] for an unknown provider.
    pub fn provider_config_redacted(&self, name: &ProviderName) -> Result<ProviderConfig, StoreOpError> {
        let state = self.read_state()?;
        let config = state
            .providers
            .get(name)
            .ok_or_else(|| StoreOpError::NotFound(format!("provider {name}")))?;
        Ok(redact_provider(name, config, &state.ledger))
    }

    /// Lists configured provider names.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::LockPoisoned`] when the provider lock is poisoned.
    pub fn list_providers(&self) -> Result<Vec<ProviderName>, StoreOpError> {
        Ok(self.read_state()?.providers.keys().cloned().collect())
    }

    /// Returns the client settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::LockPoisoned`] when the provider lock is poisoned.
    pub fn client_config(&self) -> Result<ClientConfig, StoreOpError> {
        Ok(self.read_state()?.client_config.clone())
    }

    /// Returns every provenance entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::LockPoisoned`] when the provider lock is poisoned.
    pub fn provenance(&self) -> Result<Vec<ProvenanceEntry>, StoreOpError> {
        Ok(self.read_state()?.ledger.entries().cloned().collect())
    }

    /// Returns every observed file hash, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::Persistence`] when the hash log cannot be read.
    pub fn file_hash_log(&self) -> Result<Vec<FileHashRecord>, StoreOpError> {
        Ok(self.persistence.file_hashes()?)
    }

    // ------------------------------------------------------------------------
    // Provider mutations
    // ------------------------------------------------------------------------

    /// Adds a provider, resolving every `env.NAME` value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::AlreadyExists`] when the provider exists, or
    /// a validation, resolution or persistence error. Nothing changes on error.
    pub fn add_provider(&self, name: &ProviderName, config: ProviderConfig) -> Result<(), StoreOpError> {
        self.audited("add_provider", format!("provider:{name}"), || {
            config.validate(name)?;
            let mut state = self.write_state()?;
            if state.providers.contains_key(name) {
                return Err(StoreOpError::AlreadyExists(format!("provider {name}")));
            }
            let mut ledger = state.ledger.clone();
            ledger.remove_provider(name);
            let mut resolved = ProviderConfig {
                keys: Vec::with_capacity(config.keys.len()),
                config_hash: None,
                ..config.clone()
            };
            for key in &config.keys {
                let key = resolve_key(name, key, self.env.as_ref())?;
                ledger.record_all(key.provenance);
                resolved.keys.push(Key {
                    config_hash: None,
                    ..key.entity
                });
            }
            self.persistence.commit(&[
                PersistOp::UpsertProvider {
                    name: name.clone(),
                    config: resolved.clone(),
                },
                PersistOp::ReplaceProvenance(ledger.entries().cloned().collect()),
            ])?;
            state.providers.insert(name.clone(), Arc::new(resolved));
            state.ledger = ledger;
            drop(state);
            Ok(())
        })
    }

    /// Replaces a provider.
    ///
    /// Key values may be in display form: `env.NAME` is re-resolved and a
    /// masked value is restored from the stored key with the same id. A
    /// masked proxy password is restored from the stored provider.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::NotFound`] for an unknown provider, or a
    /// validation, resolution or persistence error. Nothing changes on error.
    pub fn update_provider(&self, name: &ProviderName, config: ProviderConfig) -> Result<(), StoreOpError> {
        self.audited("update_provider", format!("provider:{name}"), || {
            config.validate(name)?;
            let mut state = self.write_state()?;
            let current = state
                .providers
                .get(name)
                .cloned()
                .ok_or_else(|| StoreOpError::NotFound(format!("provider {name}")))?;
            let mut config = config;
            restore_proxy_password(name, &mut config, &current)?;
            let mut ledger = state.ledger.clone();
            let mut provenance = Vec::new();
            let mut keys = Vec::with_capacity(config.keys.len());
            for key in &config.keys {
                let existing = current.key(&key.id);
                let resolved =
                    resolve_submitted_key(name, key, existing, &state.ledger, self.env.as_ref())?;
                provenance.extend(resolved.provenance);
                keys.push(Key {
                    config_hash: existing.and_then(|key| key.config_hash.clone()),
                    ..resolved.entity
                });
            }
            ledger.remove_provider(name);
            ledger.record_all(provenance);
            let updated = ProviderConfig {
                keys,
                config_hash: current.config_hash.clone(),
                ..config
            };
            self.persistence.commit(&[
                PersistOp::UpsertProvider {
                    name: name.clone(),
                    config: updated.clone(),
                },
                PersistOp::ReplaceProvenance(ledger.entries().cloned().collect()),
            ])?;
            state.providers.insert(name.clone(), Arc::new(updated));
            state.ledger = ledger;
            drop(state);
            Ok(())
        })
    }

    /// Removes a provider, its keys and their provenance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::NotFound`] for an unknown provider or a
    /// persistence error.
    pub fn remove_provider(&self, name: &ProviderName) -> Result<(), StoreOpError> {
        self.audited("remove_provider", format!("provider:{name}"), || {
            let mut state = self.write_state()?;
            if !state.providers.contains_key(name) {
                return Err(StoreOpError::NotFound(format!("provider {name}")));
            }
            let mut ledger = state.ledger.clone();
            ledger.remove_provider(name);
            self.persistence.commit(&[
                PersistOp::DeleteProvider(name.clone()),
                PersistOp::ReplaceProvenance(ledger.entries().cloned().collect()),
            ])?;
            state.providers.remove(name);
            state.ledger = ledger;
            drop(state);
            Ok(())
        })
    }

    /// Removes one key and its provenance, leaving other keys untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::NotFound`] when the provider or key is unknown,
    /// or a persistence error.
    pub fn remove_key(&self, name: &ProviderName, key_id: &KeyId) -> Result<(), StoreOpError> {
        self.audited("remove_key", format!("key:{name}/{key_id}"), || {
            let mut state = self.write_state()?;
            let current = state
                .providers
                .get(name)
                .ok_or_else(|| StoreOpError::NotFound(format!("provider {name}")))?;
            if current.key(key_id).is_none() {
                return Err(StoreOpError::NotFound(format!("key {key_id} of provider {name}")));
            }
            let mut updated = ProviderConfig::clone(current);
            updated.keys.retain(|key| &key.id != key_id);
            let mut ledger = state.ledger.clone();
            ledger.remove_keys(name, &BTreeSet::from([key_id.clone()]));
            self.persistence.commit(&[
                PersistOp::UpsertProvider {
                    name: name.clone(),
                    config: updated.clone(),
                },
                PersistOp::ReplaceProvenance(ledger.entries().cloned().collect()),
            ])?;
            state.providers.insert(name.clone(), Arc::new(updated));
            state.ledger = ledger;
            drop(state);
            Ok(())
        })
    }

    /// Replaces the client settings.
    ///
    /// # Errors
    ///
    /// Returns a validation or persistence error.
    pub fn update_client_config(&self, config: ClientConfig) -> Result<(), StoreOpError> {
        self.audited("update_client_config", "client_config", || {
            config.validate()?;
            let mut state = self.write_state()?;
            let updated = ClientConfig {
                config_hash: state.client_config.config_hash.clone(),
                ..config
            };
            self.persistence.commit(&[PersistOp::SaveClientConfig(updated.clone())])?;
            state.client_config = updated;
            drop(state);
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Tool clients
    // ------------------------------------------------------------------------

    /// Returns tool clients with live values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::LockPoisoned`] when the tool lock is poisoned.
    pub fn tool_clients(&self) -> Result<Vec<ToolClientConfig>, StoreOpError> {
        Ok(self.read_tools()?.clients.clone())
    }

    /// Returns display-safe copies of the tool clients.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::LockPoisoned`] when a lock is poisoned.
    pub fn tool_clients_redacted(&self) -> Result<Vec<ToolClientConfig>, StoreOpError> {
        let tools = self.read_tools()?;
        let state = self.read_state()?;
        Ok(tools.clients.iter().map(|client| redact_tool_client(client, &state.ledger)).collect())
    }

    /// Connects and stores a new tool client.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::DispatcherNotSet`] without a dispatcher,
    /// [`StoreOpError::AlreadyExists`] for a duplicate name, or a validation,
    /// resolution, dispatch or persistence error. A persistence failure
    /// disconnects the client again.
    pub fn add_tool_client(&self, client: ToolClientConfig) -> Result<(), StoreOpError> {
        self.audited("add_tool_client", format!("tool_client:{}", client.name), || {
            client.validate()?;
            let mut tools = self.write_tools()?;
            let dispatcher = tools.dispatcher.clone().ok_or(StoreOpError::DispatcherNotSet)?;
            if tools.clients.iter().any(|existing| existing.name == client.name) {
                return Err(StoreOpError::AlreadyExists(format!("tool client {}", client.name)));
            }
            let resolved = resolve_tool_client(&client, self.env.as_ref())?;
            let mut entity = resolved.entity;
            entity.id = entity.id.take().or_else(|| Some(ToolClientId::generate()));
            entity.config_hash = None;
            dispatcher.add_client(&entity)?;

            let mut state = self.write_state()?;
            let mut ledger = state.ledger.clone();
            ledger.remove_tool_client(&entity.name);
            ledger.record_all(resolved.provenance);
            let committed = self.persistence.commit(&[
                PersistOp::UpsertToolClient(entity.clone()),
                PersistOp::ReplaceProvenance(ledger.entries().cloned().collect()),
            ]);
            if let Err(err) = committed {
                drop(state);
                let restored = dispatcher.remove_client(&entity.name);
                self.check_rollback("add_tool_client", &entity.name, restored);
                return Err(err.into());
            }
            state.ledger = ledger;
            drop(state);
            tools.clients.push(entity);
            drop(tools);
            Ok(())
        })
    }

    /// Disconnects and removes a tool client and its provenance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::DispatcherNotSet`] without a dispatcher,
    /// [`StoreOpError::NotFound`] for an unknown name, or a dispatch or
    /// persistence error. A persistence failure reconnects the client.
    pub fn remove_tool_client(&self, name: &str) -> Result<(), StoreOpError> {
        self.audited("remove_tool_client", format!("tool_client:{name}"), || {
            let mut tools = self.write_tools()?;
            let dispatcher = tools.dispatcher.clone().ok_or(StoreOpError::DispatcherNotSet)?;
            let index = tools
                .clients
                .iter()
                .position(|client| client.name == name)
                .ok_or_else(|| StoreOpError::NotFound(format!("tool client {name}")))?;
            dispatcher.remove_client(name)?;

            let mut state = self.write_state()?;
            let mut ledger = state.ledger.clone();
            ledger.remove_tool_client(name);
            let committed = self.persistence.commit(&[
                PersistOp::DeleteToolClient(name.to_string()),
                PersistOp::ReplaceProvenance(ledger.entries().cloned().collect()),
            ]);
            if let Err(err) = committed {
                drop(state);
                let restored = dispatcher.add_client(&tools.clients[index]);
                self.check_rollback("remove_tool_client", name, restored);
                return Err(err.into());
            }
            state.ledger = ledger;
            drop(state);
            tools.clients.remove(index);
            drop(tools);
            Ok(())
        })
    }

    /// Replaces a tool client's tool filters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::DispatcherNotSet`] without a dispatcher,
    /// [`StoreOpError::NotFound`] for an unknown name, or a validation,
    /// dispatch or persistence error. A persistence failure restores the
    /// previous filters on the dispatcher.
    pub fn edit_tool_client_tools(
        &self,
        name: &str,
        tools_to_execute: Vec<String>,
        tools_to_skip: Vec<String>,
    ) -> Result<(), StoreOpError> {
        self.audited("edit_tool_client_tools", format!("tool_client:{name}"), || {
            validate_tool_lists(&format!("tool_clients.{name}"), &tools_to_execute, &tools_to_skip)?;
            let mut tools = self.write_tools()?;
            let dispatcher = tools.dispatcher.clone().ok_or(StoreOpError::DispatcherNotSet)?;
            let index = tools
                .clients
                .iter()
                .position(|client| client.name == name)
                .ok_or_else(|| StoreOpError::NotFound(format!("tool client {name}")))?;
            let previous = tools.clients[index].clone();
            let updated = ToolClientConfig {
                tools_to_execute,
                tools_to_skip,
                ..previous.clone()
            };
            dispatcher.edit_client_tools(name, &updated.tools_to_execute, &updated.tools_to_skip)?;
            if let Err(err) = self.persistence.commit(&[PersistOp::UpsertToolClient(updated.clone())]) {
                let restored = dispatcher.edit_client_tools(
                    name,
                    &previous.tools_to_execute,
                    &previous.tools_to_skip,
                );
                self.check_rollback("edit_tool_client_tools", name, restored);
                return Err(err.into());
            }
            tools.clients[index] = updated;
            drop(tools);
            Ok(())
        })
    }

    /// Replaces a tool client's connection and headers, then reconnects it.
    ///
    /// Values may be `env.NAME` references; a masked header value keeps the
    /// stored value. Provenance is dropped only for the variables that fed
    /// the replaced fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::DispatcherNotSet`] without a dispatcher,
    /// [`StoreOpError::NotFound`] for an unknown name, or a validation,
    /// resolution, dispatch or persistence error. The previous connection is
    /// restored on the dispatcher when a later step fails.
    pub fn update_tool_client_connection(
        &self,
        name: &str,
        connection: ToolConnection,
        headers: BTreeMap<String, String>,
    ) -> Result<(), StoreOpError> {
        self.audited("update_tool_client_connection", format!("tool_client:{name}"), || {
            let mut tools = self.write_tools()?;
            let dispatcher = tools.dispatcher.clone().ok_or(StoreOpError::DispatcherNotSet)?;
            let index = tools
                .clients
                .iter()
                .position(|client| client.name == name)
                .ok_or_else(|| StoreOpError::NotFound(format!("tool client {name}")))?;
            let previous = tools.clients[index].clone();
            let mut submitted = ToolClientConfig {
                connection,
                headers,
                ..previous.clone()
            };
            for (header, value) in &mut submitted.headers {
                if matches!(classify(value), ValueForm::Masked) {
                    let Some(stored) = previous.headers.get(header) else {
                        return Err(StoreOpError::Invalid(format!(
                            "masked header {header} has no stored value to restore"
                        )));
                    };
                    value.clone_from(stored);
                }
            }
            submitted.validate()?;
            let resolved = resolve_tool_client(&submitted, self.env.as_ref())?;
            let entity = resolved.entity;

            dispatcher.remove_client(name)?;
            if let Err(err) = dispatcher.add_client(&entity) {
                let restored = dispatcher.add_client(&previous);
                self.check_rollback("update_tool_client_connection", name, restored);
                return Err(err.into());
            }

            let mut state = self.write_state()?;
            let mut replaced_paths = BTreeSet::from([tool_client_path(name, "connection_string")]);
            replaced_paths.extend(
                previous.headers.keys().map(|header| tool_client_path(name, &format!("headers.{header}"))),
            );
            let replaced_vars: BTreeSet<String> = replaced_paths
                .iter()
                .filter_map(|path| state.ledger.env_var_for(path))
                .map(str::to_string)
                .collect();
            let mut ledger = state.ledger.clone();
            ledger.remove_vars(ProvenanceOwner::ToolClient(name), &replaced_vars);
            ledger.record_all(resolved.provenance);
            let committed = self.persistence.commit(&[
                PersistOp::UpsertToolClient(entity.clone()),
                PersistOp::ReplaceProvenance(ledger.entries().cloned().collect()),
            ]);
            if let Err(err) = committed {
                drop(state);
                let restored =
                    dispatcher.remove_client(name).and_then(|()| dispatcher.add_client(&previous));
                self.check_rollback("update_tool_client_connection", name, restored);
                return Err(err.into());
            }
            state.ledger = ledger;
            drop(state);
            tools.clients[index] = entity;
            drop(tools);
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Write-back
    // ------------------------------------------------------------------------

    /// Builds the file form of the current configuration.
    ///
    /// Env-sourced values are restored to `env.NAME`; other secrets keep
    /// their true value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::LockPoisoned`] when a lock is poisoned.
    pub fn export_document(&self) -> Result<ConfigDocument, StoreOpError> {
        let tools = self.read_tools()?;
        let state = self.read_state()?;
        let providers = state
            .providers
            .iter()
            .map(|(name, config)| (name.clone(), restore_provider_references(name, config, &state.ledger)))
            .collect();
        let tool_clients = tools
            .clients
            .iter()
            .map(|client| restore_tool_client_references(client, &state.ledger))
            .collect();
        Ok(ConfigDocument {
            client: Some(state.client_config.clone()),
            providers,
            tool_clients,
            passthrough: state.passthrough.clone(),
        })
    }

    /// Writes the current configuration to a file, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpError::Config`] when the file cannot be written.
    pub fn write_config_file(&self, path: &Path) -> Result<PathBuf, StoreOpError> {
        let document = self.export_document()?;
        crate::document::write_config_file(path, &document)?;
        self.emit("write_config_file", path.display().to_string(), "success", None);
        Ok(path.to_path_buf())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Runs a mutation and records its outcome.
    fn audited<T>(
        &self,
        action: &'static str,
        entity: impl Into<String>,
        operation: impl FnOnce() -> Result<T, StoreOpError>,
    ) -> Result<T, StoreOpError> {
        let entity = entity.into();
        let result = operation();
        match &result {
            Ok(_) => self.emit(action, entity, "success", None),
            Err(err) => self.emit(action, entity, "failure", Some(err.to_string())),
        }
        result
    }

    /// Records one audit event.
    fn emit(
        &self,
        action: &'static str,
        entity: impl Into<String>,
        outcome: impl Into<String>,
        detail: Option<String>,
    ) {
        self.audit.record(&ConfigAuditEvent::new(action, entity, outcome, detail));
    }

    /// Records a failed dispatcher rollback; the dispatcher and the store
    /// disagree about the client afterwards.
    fn check_rollback(&self, action: &'static str, name: &str, restored: Result<(), DispatchError>) {
        if let Err(err) = restored {
            self.emit(action, format!("tool_client:{name}"), "rollback_failure", Some(err.to_string()));
        }
    }

    /// Records one reconciliation outcome.
    fn emit_outcome(&self, outcome: &EntityOutcome) {
        match &outcome.status {
            OutcomeStatus::Applied {
                decision,
            } => self.emit("reconcile", outcome.entity.to_string(), decision.as_str(), None),
            OutcomeStatus::Skipped {
                reason,
            } => self.emit("reconcile", outcome.entity.to_string(), "skipped", Some(reason.clone())),
        }
    }

    /// Acquires the provider lock for reading.
    fn read_state(&self) -> Result<RwLockReadGuard<'_, ProviderState>, StoreOpError> {
        self.state.read().map_err(|_| StoreOpError::LockPoisoned)
    }

    /// Acquires the provider lock for writing.
    fn write_state(&self) -> Result<RwLockWriteGuard<'_, ProviderState>, StoreOpError> {
        self.state.write().map_err(|_| StoreOpError::LockPoisoned)
    }

    /// Acquires the tool lock for reading.
    fn read_tools(&self) -> Result<RwLockReadGuard<'_, ToolState>, StoreOpError> {
        self.tools.read().map_err(|_| StoreOpError::LockPoisoned)
    }

    /// Acquires the tool lock for writing.
    fn write_tools(&self) -> Result<RwLockWriteGuard<'_, ToolState>, StoreOpError> {
        self.tools.write().map_err(|_| StoreOpError::LockPoisoned)
    }
}

/// Builds a load report with no refreshed values yet.
fn new_report(
    path: &Path,
    load_path: LoadPath,
    file_hash: Option<String>,
    outcomes: Vec<EntityOutcome>,
) -> LoadReport {
    LoadReport {
        path: path.to_path_buf(),
        load_path,
        file_hash,
        outcomes,
        refreshed_values: 0,
    }
}
