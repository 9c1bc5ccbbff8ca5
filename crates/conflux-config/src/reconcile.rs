// crates/conflux-config/src/reconcile.rs
// ============================================================================
// Module: Conflux Reconciliation Engine
// Description: Per-entity merge of the configuration file into persisted state.
// Purpose: Decide, for every entity, whether the file or the database wins.
// Dependencies: conflux-core, serde
// ============================================================================

//! ## Overview
//! [`merge`] is a pure function from (document, persisted snapshot,
//! environment) to a new snapshot, the persistence operations that produce it
//! and one [`EntityOutcome`] per entity considered. It never touches the
//! database or the in-memory store, so a failed commit leaves nothing to undo.
//!
//! Providers are decided on their provider-level hash and keys on their own
//! key hash, independently:
//! - unknown provider: inserted with its resolvable keys
//! - provider hash equal to the stored `config_hash`: stored provider-level
//!   fields kept, otherwise the file's fields adopted
//! - each file key is matched to a stored key by identifier, then display
//!   name, then stored key hash; an equal hash keeps the stored key, a
//!   different hash adopts the file key under the stored identifier
//! - stored keys matched by no file key are preserved
//!
//! Entities only present in persistence are never removed here.
//!
//! A key or tool client whose environment reference cannot be resolved is
//! skipped with a reason and contributes no provenance.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use conflux_core::ClientConfig;
use conflux_core::ConcurrencyAndBufferSize;
use conflux_core::ConfigSnapshot;
use conflux_core::EnvSource;
use conflux_core::HashError;
use conflux_core::Key;
use conflux_core::KeyId;
use conflux_core::PersistOp;
use conflux_core::ProviderConfig;
use conflux_core::ProviderName;
use conflux_core::ProvenanceEntry;
use conflux_core::ProvenanceLedger;
use conflux_core::ToolClientConfig;
use conflux_core::ToolClientId;
use conflux_core::ValueKind;
use conflux_core::hashing::client_config_hash;
use conflux_core::hashing::key_hash;
use conflux_core::hashing::provider_hash;
use conflux_core::hashing::tool_client_hash;
use conflux_core::provenance::key_path;
use conflux_core::secrets::resolve_key;
use conflux_core::secrets::resolve_tool_client;
use serde::Serialize;

use crate::document::ConfigDocument;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Providers detected from conventional variables when nothing is configured.
const AUTO_DETECT_PROVIDERS: &[(&str, &[&str])] = &[
    ("openai", &["OPENAI_API_KEY", "OPENAI_KEY"]),
    ("anthropic", &["ANTHROPIC_API_KEY", "ANTHROPIC_KEY"]),
    ("mistral", &["MISTRAL_API_KEY", "MISTRAL_KEY"]),
];

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Which branch of the load state machine ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPath {
    /// No configuration file; persisted state only.
    NoFile,
    /// File hash equals the most recent record; persisted state only.
    FileUnchanged,
    /// File parsed and merged into persisted state.
    FileChanged,
}

impl LoadPath {
    /// Returns the snake case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoFile => "no_file",
            Self::FileUnchanged => "file_unchanged",
            Self::FileChanged => "file_changed",
        }
    }
}

/// Entity a reconciliation outcome refers to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityRef {
    /// Client settings singleton.
    ClientConfig,
    /// Provider-level fields.
    Provider {
        /// Provider name.
        provider: ProviderName,
    },
    /// One key of a provider.
    Key {
        /// Provider name.
        provider: ProviderName,
        /// Key identifier.
        key_id: KeyId,
    },
    /// Tool client by name.
    ToolClient {
        /// Client name.
        name: String,
    },
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientConfig => f.write_str("client_config"),
            Self::Provider {
                provider,
            } => write!(f, "provider:{provider}"),
            Self::Key {
                provider,
                key_id,
            } => write!(f, "key:{provider}/{key_id}"),
            Self::ToolClient {
                name,
            } => write!(f, "tool_client:{name}"),
        }
    }
}

/// What reconciliation did with an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Created from the file.
    Inserted,
    /// Persisted content kept; the file copy was unchanged.
    Kept,
    /// File content adopted over persisted content.
    Updated,
    /// Persisted entity with no file counterpart retained.
    Preserved,
    /// Created from a conventional environment variable.
    AutoDetected,
}

impl Decision {
    /// Returns the snake case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Kept => "kept",
            Self::Updated => "updated",
            Self::Preserved => "preserved",
            Self::AutoDetected => "auto_detected",
        }
    }
}

/// Result for a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Entity applied with the given decision.
    Applied {
        /// Decision taken.
        decision: Decision,
    },
    /// Entity not applied; everything else continued.
    Skipped {
        /// Human-readable reason.
        reason: String,
    },
}

/// Reconciliation outcome for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityOutcome {
    /// Entity the outcome refers to.
    pub entity: EntityRef,
    /// Applied or skipped.
    pub status: OutcomeStatus,
}

impl EntityOutcome {
    /// Builds an applied outcome.
    #[must_use]
    pub const fn applied(entity: EntityRef, decision: Decision) -> Self {
        Self {
            entity,
            status: OutcomeStatus::Applied {
                decision,
            },
        }
    }

    /// Builds a skipped outcome.
    #[must_use]
    pub fn skipped(entity: EntityRef, reason: impl Into<String>) -> Self {
        Self {
            entity,
            status: OutcomeStatus::Skipped {
                reason: reason.into(),
            },
        }
    }

    /// Returns the decision when the entity was applied.
    #[must_use]
    pub const fn decision(&self) -> Option<Decision> {
        match &self.status {
            OutcomeStatus::Applied {
                decision,
            } => Some(*decision),
            OutcomeStatus::Skipped {
                ..
            } => None,
        }
    }
}

/// Batch outcome of one configuration load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Configuration file path consulted.
    pub path: PathBuf,
    /// Branch of the state machine that ran.
    pub load_path: LoadPath,
    /// Hash of the file bytes, when a file was present.
    pub file_hash: Option<String>,
    /// Per-entity outcomes in processing order.
    pub outcomes: Vec<EntityOutcome>,
    /// Env-sourced values refreshed from the environment.
    pub refreshed_values: usize,
}

impl LoadReport {
    /// Iterates the outcomes of skipped entities.
    pub fn skipped(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.decision().is_none())
    }

    /// Returns the decision recorded for an entity.
    #[must_use]
    pub fn decision_for(&self, entity: &EntityRef) -> Option<Decision> {
        self.outcomes.iter().find(|outcome| &outcome.entity == entity).and_then(EntityOutcome::decision)
    }
}

// ============================================================================
// SECTION: Merge
// ============================================================================

/// New state produced by a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Complete state after the merge.
    pub snapshot: ConfigSnapshot,
    /// Writes that turn the persisted state into `snapshot`.
    pub ops: Vec<PersistOp>,
    /// Per-entity outcomes.
    pub outcomes: Vec<EntityOutcome>,
}

/// Merges a parsed document into the persisted snapshot.
///
/// Only entities whose content changes produce operations; the caller
/// appends the file hash write to the same commit.
///
/// # Errors
///
/// Returns [`HashError`] when an entity cannot be hashed.
pub fn merge(
    document: &ConfigDocument,
    persisted: &ConfigSnapshot,
    env: &dyn EnvSource,
) -> Result<MergeOutcome, HashError> {
    let mut snapshot = persisted.clone();
    let mut ledger = ProvenanceLedger::from_entries(persisted.provenance.iter().cloned());
    let mut ops = Vec::new();
    let mut outcomes = Vec::new();

    if let Some(declared) = &document.client {
        let (config, decision) = merge_client_config(declared, persisted.client_config.as_ref())?;
        if decision != Decision::Kept {
            ops.push(PersistOp::SaveClientConfig(config.clone()));
            snapshot.client_config = Some(config);
        }
        outcomes.push(EntityOutcome::applied(EntityRef::ClientConfig, decision));
    }

    for (name, declared) in &document.providers {
        let stored = persisted.providers.get(name);
        let merged = merge_provider(name, declared, stored, &mut ledger, env, &mut outcomes)?;
        if stored != Some(&merged) {
            ops.push(PersistOp::UpsertProvider {
                name: name.clone(),
                config: merged.clone(),
            });
            snapshot.providers.insert(name.clone(), merged);
        }
    }

    for declared in &document.tool_clients {
        let stored = persisted.tool_clients.iter().find(|client| client.name == declared.name);
        let Some(merged) = merge_tool_client(declared, stored, &mut ledger, env, &mut outcomes)?
        else {
            continue;
        };
        ops.push(PersistOp::UpsertToolClient(merged.clone()));
        match snapshot.tool_clients.iter_mut().find(|client| client.name == merged.name) {
            Some(slot) => *slot = merged,
            None => snapshot.tool_clients.push(merged),
        }
    }

    let provenance: Vec<ProvenanceEntry> = ledger.entries().cloned().collect();
    if ProvenanceLedger::from_entries(persisted.provenance.iter().cloned()) != ledger {
        ops.push(PersistOp::ReplaceProvenance(provenance.clone()));
    }
    snapshot.provenance = provenance;

    Ok(MergeOutcome {
        snapshot,
        ops,
        outcomes,
    })
}

/// Decides the client settings.
fn merge_client_config(
    declared: &ClientConfig,
    stored: Option<&ClientConfig>,
) -> Result<(ClientConfig, Decision), HashError> {
    let hash = client_config_hash(declared)?;
    match stored {
        Some(stored) if stored.config_hash.as_deref() == Some(hash.as_str()) => {
            Ok((stored.clone(), Decision::Kept))
        }
        stored => {
            let mut config = declared.clone();
            config.config_hash = Some(hash);
            let decision = if stored.is_some() { Decision::Updated } else { Decision::Inserted };
            Ok((config, decision))
        }
    }
}

/// Decides one provider and all of its keys.
fn merge_provider(
    name: &ProviderName,
    declared: &ProviderConfig,
    stored: Option<&ProviderConfig>,
    ledger: &mut ProvenanceLedger,
    env: &dyn EnvSource,
    outcomes: &mut Vec<EntityOutcome>,
) -> Result<ProviderConfig, HashError> {
    let hash = provider_hash(name, declared)?;
    let provider_ref = EntityRef::Provider {
        provider: name.clone(),
    };
    let Some(stored) = stored else {
        ledger.remove_provider(name);
        let mut merged = without_keys(declared);
        merged.config_hash = Some(hash);
        outcomes.push(EntityOutcome::applied(provider_ref, Decision::Inserted));
        merged.keys = merge_keys(name, &declared.keys, &[], ledger, env, outcomes)?;
        return Ok(merged);
    };

    let (mut merged, decision) = if stored.config_hash.as_deref() == Some(hash.as_str()) {
        (without_keys(stored), Decision::Kept)
    } else {
        let mut adopted = without_keys(declared);
        adopted.config_hash = Some(hash);
        (adopted, Decision::Updated)
    };
    outcomes.push(EntityOutcome::applied(provider_ref, decision));
    merged.keys = merge_keys(name, &declared.keys, &stored.keys, ledger, env, outcomes)?;
    Ok(merged)
}

/// Returns a copy of the provider-level fields with no keys.
fn without_keys(config: &ProviderConfig) -> ProviderConfig {
    ProviderConfig {
        keys: Vec::new(),
        ..config.clone()
    }
}

/// Decides every key of a provider.
fn merge_keys(
    provider: &ProviderName,
    declared: &[Key],
    stored: &[Key],
    ledger: &mut ProvenanceLedger,
    env: &dyn EnvSource,
    outcomes: &mut Vec<EntityOutcome>,
) -> Result<Vec<Key>, HashError> {
    let stored_ids: BTreeSet<&KeyId> = stored.iter().map(|key| &key.id).collect();
    let mut matched = vec![false; stored.len()];
    let mut merged: Vec<Key> = Vec::new();

    for file_key in declared {
        let hash = key_hash(file_key)?;
        match find_match(file_key, &hash, stored, &matched) {
            Some(index) => {
                matched[index] = true;
                let existing = &stored[index];
                let key_ref = key_ref(provider, &existing.id);
                if existing.config_hash.as_deref() == Some(hash.as_str()) {
                    merged.push(existing.clone());
                    outcomes.push(EntityOutcome::applied(key_ref, Decision::Kept));
                    continue;
                }
                let mut candidate = file_key.clone();
                candidate.id = existing.id.clone();
                match resolve_key(provider, &candidate, env) {
                    Ok(resolved) => {
                        ledger.remove_keys(provider, &BTreeSet::from([existing.id.clone()]));
                        ledger.record_all(resolved.provenance);
                        let mut key = resolved.entity;
                        key.config_hash = Some(hash);
                        merged.push(key);
                        outcomes.push(EntityOutcome::applied(key_ref, Decision::Updated));
                    }
                    Err(err) => {
                        merged.push(existing.clone());
                        outcomes.push(EntityOutcome::skipped(key_ref, err.to_string()));
                    }
                }
            }
            None => {
                let mut candidate = file_key.clone();
                let taken = stored_ids.contains(&candidate.id)
                    || merged.iter().any(|key| key.id == candidate.id);
                if taken {
                    candidate.id = KeyId::generate();
                }
                let key_ref = key_ref(provider, &candidate.id);
                match resolve_key(provider, &candidate, env) {
                    Ok(resolved) => {
                        ledger.remove_keys(provider, &BTreeSet::from([candidate.id.clone()]));
                        ledger.record_all(resolved.provenance);
                        let mut key = resolved.entity;
                        key.config_hash = Some(hash);
                        merged.push(key);
                        outcomes.push(EntityOutcome::applied(key_ref, Decision::Inserted));
                    }
                    Err(err) => outcomes.push(EntityOutcome::skipped(key_ref, err.to_string())),
                }
            }
        }
    }

    for (key, was_matched) in stored.iter().zip(&matched) {
        if !was_matched {
            merged.push(key.clone());
            outcomes.push(EntityOutcome::applied(key_ref(provider, &key.id), Decision::Preserved));
        }
    }
    Ok(merged)
}

/// Finds the stored key a file key corresponds to.
///
/// Identifier matches take priority over name matches, which take priority
/// over hash matches. Already matched keys are never matched twice.
fn find_match(file_key: &Key, hash: &str, stored: &[Key], matched: &[bool]) -> Option<usize> {
    let free = |index: &usize| !matched[*index];
    let indices = || (0 .. stored.len()).filter(free);
    indices()
        .find(|&index| stored[index].id == file_key.id)
        .or_else(|| {
            file_key.name.as_ref().and_then(|name| {
                indices().find(|&index| stored[index].name.as_ref() == Some(name))
            })
        })
        .or_else(|| indices().find(|&index| stored[index].config_hash.as_deref() == Some(hash)))
}

/// Builds the outcome reference for a key.
fn key_ref(provider: &ProviderName, key_id: &KeyId) -> EntityRef {
    EntityRef::Key {
        provider: provider.clone(),
        key_id: key_id.clone(),
    }
}

/// Decides one tool client; `None` when nothing changes.
fn merge_tool_client(
    declared: &ToolClientConfig,
    stored: Option<&ToolClientConfig>,
    ledger: &mut ProvenanceLedger,
    env: &dyn EnvSource,
    outcomes: &mut Vec<EntityOutcome>,
) -> Result<Option<ToolClientConfig>, HashError> {
    let hash = tool_client_hash(declared)?;
    let client_ref = EntityRef::ToolClient {
        name: declared.name.clone(),
    };
    if let Some(stored) = stored
        && stored.config_hash.as_deref() == Some(hash.as_str())
    {
        outcomes.push(EntityOutcome::applied(client_ref, Decision::Kept));
        return Ok(None);
    }
    match resolve_tool_client(declared, env) {
        Ok(resolved) => {
            ledger.remove_tool_client(&declared.name);
            ledger.record_all(resolved.provenance);
            let mut client = resolved.entity;
            client.id = stored
                .and_then(|stored| stored.id.clone())
                .or_else(|| client.id.take())
                .or_else(|| Some(ToolClientId::generate()));
            client.config_hash = Some(hash);
            let decision = if stored.is_some() { Decision::Updated } else { Decision::Inserted };
            outcomes.push(EntityOutcome::applied(client_ref, decision));
            Ok(Some(client))
        }
        Err(err) => {
            outcomes.push(EntityOutcome::skipped(client_ref, err.to_string()));
            Ok(None)
        }
    }
}

// ============================================================================
// SECTION: Auto-Detection
// ============================================================================

/// Providers created from conventional environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedProviders {
    /// Providers with one key each.
    pub providers: Vec<(ProviderName, ProviderConfig)>,
    /// Provenance entries for the detected keys.
    pub provenance: Vec<ProvenanceEntry>,
    /// One outcome per detected provider.
    pub outcomes: Vec<EntityOutcome>,
}

/// Detects providers from conventional variables; the first set variable
/// per provider wins.
#[must_use]
pub fn detect_providers(env: &dyn EnvSource) -> DetectedProviders {
    let mut detected = DetectedProviders {
        providers: Vec::new(),
        provenance: Vec::new(),
        outcomes: Vec::new(),
    };
    for (provider, vars) in AUTO_DETECT_PROVIDERS {
        let found = vars
            .iter()
            .find_map(|var| env.var(var).filter(|value| !value.is_empty()).map(|value| (*var, value)));
        let Some((env_var, value)) = found else {
            continue;
        };
        let name = ProviderName::new(provider);
        let key = Key::new(value);
        detected.provenance.push(ProvenanceEntry {
            env_var: env_var.to_string(),
            config_path: key_path(&name, &key.id, None),
            provider: Some(name.clone()),
            kind: ValueKind::ApiKey,
            key_id: Some(key.id.clone()),
        });
        detected.outcomes.push(EntityOutcome::applied(
            EntityRef::Provider {
                provider: name.clone(),
            },
            Decision::AutoDetected,
        ));
        detected.providers.push((
            name,
            ProviderConfig {
                keys: vec![key],
                concurrency_and_buffer_size: Some(ConcurrencyAndBufferSize::default()),
                ..ProviderConfig::default()
            },
        ));
    }
    detected
}

// ============================================================================
// SECTION: Tests
// ============================================================================
