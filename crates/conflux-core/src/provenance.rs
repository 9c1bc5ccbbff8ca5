// crates/conflux-core/src/provenance.rs
// ============================================================================
// Module: Conflux Provenance Ledger
// Description: Map from environment variable to the configuration paths it feeds.
// Purpose: Support redaction, write-back restoration and safe cleanup.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The ledger is keyed by variable name; each variable lists the configuration
//! paths it supplied. A path is fed by at most one variable, so recording a
//! path replaces any previous entry for it. Every cleanup operation removes
//! entries matching its own predicate only, even when other entries share the
//! same variable, and variables left without entries are dropped.
//!
//! Paths:
//! - `providers.{provider}.keys[{key_id}]` for key values
//! - `providers.{provider}.keys[{key_id}].{section}.{field}` for family fields
//! - `tool_clients.{name}.{suffix}` for tool-client fields
//!
//! Tool-client names never contain `.`, so a client's path prefix matches
//! that client's entries only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::KeyId;
use crate::identifiers::ProviderName;
use crate::model::FamilyField;
use crate::model::ValueKind;

// ============================================================================
// SECTION: Entries
// ============================================================================

/// One environment-sourced configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    /// Variable name.
    pub env_var: String,
    /// Configuration path the variable supplied.
    pub config_path: String,
    /// Owning provider, `None` for tool-client values.
    pub provider: Option<ProviderName>,
    /// Kind of value.
    pub kind: ValueKind,
    /// Owning key, when the value belongs to a key.
    pub key_id: Option<KeyId>,
}

/// Owner of a group of ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvenanceOwner<'a> {
    /// Entries owned by a provider.
    Provider(&'a ProviderName),
    /// Entries under a tool client's path prefix.
    ToolClient(&'a str),
}

impl ProvenanceOwner<'_> {
    /// Returns true when the entry belongs to this owner.
    fn owns(&self, entry: &ProvenanceEntry) -> bool {
        match self {
            Self::Provider(provider) => entry.provider.as_ref() == Some(*provider),
            Self::ToolClient(name) => {
                entry.provider.is_none() && entry.config_path.starts_with(&tool_client_prefix(name))
            }
        }
    }
}

// ============================================================================
// SECTION: Paths
// ============================================================================

/// Returns the path of a key value or of one of its family fields.
#[must_use]
pub fn key_path(provider: &ProviderName, key_id: &KeyId, field: Option<FamilyField>) -> String {
    match field {
        None => format!("providers.{provider}.keys[{key_id}]"),
        Some(field) => {
            format!("providers.{provider}.keys[{key_id}].{}.{}", field.section, field.name)
        }
    }
}

/// Returns the path prefix shared by all fields of a tool client.
#[must_use]
pub fn tool_client_prefix(name: &str) -> String {
    format!("tool_clients.{name}.")
}

/// Returns the path of one tool-client field.
#[must_use]
pub fn tool_client_path(name: &str, suffix: &str) -> String {
    format!("tool_clients.{name}.{suffix}")
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// In-memory provenance ledger.
///
/// # Invariants
/// - Every `config_path` appears at most once across all variables.
/// - No variable maps to an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceLedger {
    /// Entries grouped by variable name.
    by_var: BTreeMap<String, Vec<ProvenanceEntry>>,
}

impl ProvenanceLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from persisted entries.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = ProvenanceEntry>) -> Self {
        let mut ledger = Self::new();
        ledger.record_all(entries);
        ledger
    }

    /// Records an entry, replacing any previous entry for the same path.
    pub fn record(&mut self, entry: ProvenanceEntry) {
        self.remove_path(&entry.config_path);
        self.by_var.entry(entry.env_var.clone()).or_default().push(entry);
    }

    /// Records several entries.
    pub fn record_all(&mut self, entries: impl IntoIterator<Item = ProvenanceEntry>) {
        for entry in entries {
            self.record(entry);
        }
    }

    /// Removes the entry for a path, returning it.
    pub fn remove_path(&mut self, path: &str) -> Option<ProvenanceEntry> {
        let mut removed = None;
        self.retain(|entry| {
            if entry.config_path == path {
                removed = Some(entry.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Returns the variable feeding a path.
    #[must_use]
    pub fn env_var_for(&self, path: &str) -> Option<&str> {
        self.entries().find(|entry| entry.config_path == path).map(|entry| entry.env_var.as_str())
    }

    /// Returns the entries recorded for a variable.
    #[must_use]
    pub fn entries_for(&self, env_var: &str) -> &[ProvenanceEntry] {
        self.by_var.get(env_var).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterates all entries ordered by variable name.
    pub fn entries(&self) -> impl Iterator<Item = &ProvenanceEntry> {
        self.by_var.values().flatten()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_var.values().map(Vec::len).sum()
    }

    /// Returns true when no entries are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_var.is_empty()
    }

    /// Removes every entry owned by a provider.
    pub fn remove_provider(&mut self, provider: &ProviderName) -> usize {
        let owner = ProvenanceOwner::Provider(provider);
        self.retain(|entry| !owner.owns(entry))
    }

    /// Removes every entry under a tool client's path prefix.
    pub fn remove_tool_client(&mut self, name: &str) -> usize {
        let owner = ProvenanceOwner::ToolClient(name);
        self.retain(|entry| !owner.owns(entry))
    }

    /// Removes the owner's entries for the listed variables only.
    pub fn remove_vars(&mut self, owner: ProvenanceOwner<'_>, vars: &BTreeSet<String>) -> usize {
        self.retain(|entry| !(vars.contains(&entry.env_var) && owner.owns(entry)))
    }

    /// Removes entries belonging to the listed keys of a provider.
    pub fn remove_keys(&mut self, provider: &ProviderName, key_ids: &BTreeSet<KeyId>) -> usize {
        self.retain(|entry| {
            let matches = entry.provider.as_ref() == Some(provider)
                && entry.key_id.as_ref().is_some_and(|id| key_ids.contains(id));
            !matches
        })
    }

    /// Keeps entries matching the predicate; returns how many were removed.
    fn retain(&mut self, mut keep: impl FnMut(&ProvenanceEntry) -> bool) -> usize {
        let mut removed = 0;
        for entries in self.by_var.values_mut() {
            let before = entries.len();
            entries.retain(|entry| keep(entry));
            removed += before - entries.len();
        }
        self.by_var.retain(|_, entries| !entries.is_empty());
        removed
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
