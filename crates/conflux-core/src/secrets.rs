// crates/conflux-core/src/secrets.rs
// ============================================================================
// Module: Conflux Entity Secrets
// Description: Entity-level resolution, redaction, restoration and refresh.
// Purpose: Apply the value resolver and redaction codec to whole entities.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Resolution is atomic per entity: [`resolve_key`] and
//! [`resolve_tool_client`] work on a copy and hand back the resolved entity
//! together with the provenance entries to record. A failure on any field
//! returns an error and nothing is staged, so the caller has nothing to roll
//! back.
//!
//! The remaining helpers read the ledger to produce the display form
//! ([`redact_provider`]), the write-back form ([`restore_provider_references`])
//! or to pick up rotated environment values ([`refresh_provider`]).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;

use crate::env::EnvSource;
use crate::env::ResolveError;
use crate::env::resolve;
use crate::identifiers::ProviderName;
use crate::model::Key;
use crate::model::ProviderConfig;
use crate::model::ToolClientConfig;
use crate::provenance::ProvenanceEntry;
use crate::provenance::ProvenanceLedger;
use crate::provenance::key_path;
use crate::provenance::tool_client_path;
use crate::redaction::ValueForm;
use crate::redaction::classify;
use crate::redaction::env_reference;
use crate::redaction::redact;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Entity with live values and the provenance it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntity<T> {
    /// Entity with every env reference replaced by its value.
    pub entity: T,
    /// Provenance entries to record for the entity.
    pub provenance: Vec<ProvenanceEntry>,
}

/// Failures resolving a key submitted through an administrative API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    /// Referenced variable is absent.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Masked value with no stored value to restore from.
    #[error("masked value at {0} has no stored value to restore")]
    MaskedWithoutOrigin(String),
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves every env reference in a key.
///
/// # Errors
///
/// Returns [`ResolveError`] for the first field whose variable is missing.
pub fn resolve_key(
    provider: &ProviderName,
    key: &Key,
    env: &dyn EnvSource,
) -> Result<ResolvedEntity<Key>, ResolveError> {
    let mut entity = key.clone();
    let key_id = entity.id.clone();
    let mut provenance = Vec::new();
    for field in entity.fields_mut() {
        let resolved = resolve(field.value.as_str(), env)?;
        if let Some(env_var) = resolved.env_var {
            provenance.push(ProvenanceEntry {
                env_var,
                config_path: key_path(provider, &key_id, field.family_field),
                provider: Some(provider.clone()),
                kind: field.kind,
                key_id: Some(key_id.clone()),
            });
        }
        *field.value = resolved.value;
    }
    Ok(ResolvedEntity {
        entity,
        provenance,
    })
}

/// Resolves every env reference in a tool client.
///
/// # Errors
///
/// Returns [`ResolveError`] for the first field whose variable is missing.
pub fn resolve_tool_client(
    client: &ToolClientConfig,
    env: &dyn EnvSource,
) -> Result<ResolvedEntity<ToolClientConfig>, ResolveError> {
    let mut entity = client.clone();
    let name = entity.name.clone();
    let mut provenance = Vec::new();
    for field in entity.fields_mut() {
        let resolved = resolve(field.value.as_str(), env)?;
        if let Some(env_var) = resolved.env_var {
            provenance.push(ProvenanceEntry {
                env_var,
                config_path: tool_client_path(&name, &field.suffix),
                provider: None,
                kind: field.kind,
                key_id: None,
            });
        }
        *field.value = resolved.value;
    }
    Ok(ResolvedEntity {
        entity,
        provenance,
    })
}

/// Resolves a key whose values may be in display form.
///
/// `env.NAME` values are resolved, masked values are restored from the
/// stored key with the same identifier (keeping its provenance), and literal
/// values are taken as-is.
///
/// # Errors
///
/// Returns [`SecretError`] when a variable is missing or a masked value has
/// no stored counterpart.
pub fn resolve_submitted_key(
    provider: &ProviderName,
    submitted: &Key,
    existing: Option<&Key>,
    ledger: &ProvenanceLedger,
    env: &dyn EnvSource,
) -> Result<ResolvedEntity<Key>, SecretError> {
    let stored = existing.map_or_else(BTreeMap::new, |key| stored_values(provider, key));
    let mut entity = submitted.clone();
    let key_id = entity.id.clone();
    let mut provenance = Vec::new();
    for field in entity.fields_mut() {
        let path = key_path(provider, &key_id, field.family_field);
        let (value, env_var) = match classify(field.value.as_str()) {
            ValueForm::Masked => {
                let Some(value) = stored.get(&path) else {
                    return Err(SecretError::MaskedWithoutOrigin(path));
                };
                (value.clone(), ledger.env_var_for(&path).map(str::to_string))
            }
            ValueForm::EnvReference(_) | ValueForm::Empty | ValueForm::Plain => {
                let resolved = resolve(field.value.as_str(), env)?;
                (resolved.value, resolved.env_var)
            }
        };
        if let Some(env_var) = env_var {
            provenance.push(ProvenanceEntry {
                env_var,
                config_path: path,
                provider: Some(provider.clone()),
                kind: field.kind,
                key_id: Some(key_id.clone()),
            });
        }
        *field.value = value;
    }
    Ok(ResolvedEntity {
        entity,
        provenance,
    })
}

/// Returns the stored value of every field of a key by path.
fn stored_values(provider: &ProviderName, key: &Key) -> BTreeMap<String, String> {
    let mut key = key.clone();
    let key_id = key.id.clone();
    key.fields_mut()
        .into_iter()
        .map(|field| (key_path(provider, &key_id, field.family_field), field.value.clone()))
        .collect()
}

/// Restores a masked proxy password from the stored provider.
///
/// # Errors
///
/// Returns [`SecretError::MaskedWithoutOrigin`] when the password is masked
/// and the stored provider has none.
pub fn restore_proxy_password(
    provider: &ProviderName,
    submitted: &mut ProviderConfig,
    stored: &ProviderConfig,
) -> Result<(), SecretError> {
    let Some(password) = submitted.proxy_config.as_mut().and_then(|proxy| proxy.password.as_mut())
    else {
        return Ok(());
    };
    if !matches!(classify(password.as_str()), ValueForm::Masked) {
        return Ok(());
    }
    let Some(original) = stored.proxy_config.as_ref().and_then(|proxy| proxy.password.as_ref())
    else {
        return Err(SecretError::MaskedWithoutOrigin(format!(
            "providers.{provider}.proxy_config.password"
        )));
    };
    password.clone_from(original);
    Ok(())
}

// ============================================================================
// SECTION: Display And Write-Back
// ============================================================================

/// Returns a display-safe copy of a provider.
///
/// Env-sourced values become `env.NAME`; other sensitive values are masked.
#[must_use]
pub fn redact_provider(
    name: &ProviderName,
    config: &ProviderConfig,
    ledger: &ProvenanceLedger,
) -> ProviderConfig {
    let mut out = config.clone();
    for key in &mut out.keys {
        let key_id = key.id.clone();
        for field in key.fields_mut() {
            let path = key_path(name, &key_id, field.family_field);
            if let Some(env_var) = ledger.env_var_for(&path) {
                *field.value = env_reference(env_var);
            } else if field.sensitive {
                *field.value = redact(field.value.as_str());
            }
        }
    }
    if let Some(password) = out.proxy_config.as_mut().and_then(|proxy| proxy.password.as_mut()) {
        *password = redact(password.as_str());
    }
    out
}

/// Returns a display-safe copy of a tool client.
#[must_use]
pub fn redact_tool_client(client: &ToolClientConfig, ledger: &ProvenanceLedger) -> ToolClientConfig {
    let mut out = client.clone();
    let name = out.name.clone();
    for field in out.fields_mut() {
        if let Some(env_var) = ledger.env_var_for(&tool_client_path(&name, &field.suffix)) {
            *field.value = env_reference(env_var);
        } else if field.sensitive {
            *field.value = redact(field.value.as_str());
        }
    }
    out
}

/// Returns a copy of a provider with env-sourced values restored to `env.NAME`.
#[must_use]
pub fn restore_provider_references(
    name: &ProviderName,
    config: &ProviderConfig,
    ledger: &ProvenanceLedger,
) -> ProviderConfig {
    let mut out = config.clone();
    for key in &mut out.keys {
        let key_id = key.id.clone();
        for field in key.fields_mut() {
            if let Some(env_var) = ledger.env_var_for(&key_path(name, &key_id, field.family_field))
            {
                *field.value = env_reference(env_var);
            }
        }
    }
    out
}

/// Returns a copy of a tool client with env-sourced values restored.
#[must_use]
pub fn restore_tool_client_references(
    client: &ToolClientConfig,
    ledger: &ProvenanceLedger,
) -> ToolClientConfig {
    let mut out = client.clone();
    let name = out.name.clone();
    for field in out.fields_mut() {
        if let Some(env_var) = ledger.env_var_for(&tool_client_path(&name, &field.suffix)) {
            *field.value = env_reference(env_var);
        }
    }
    out
}

// ============================================================================
// SECTION: Refresh
// ============================================================================

/// Re-reads env-sourced provider values; returns how many changed.
///
/// Variables that are now absent or empty keep the stored value.
pub fn refresh_provider(
    name: &ProviderName,
    config: &mut ProviderConfig,
    ledger: &ProvenanceLedger,
    env: &dyn EnvSource,
) -> usize {
    let mut changed = 0;
    for key in &mut config.keys {
        let key_id = key.id.clone();
        for field in key.fields_mut() {
            let path = key_path(name, &key_id, field.family_field);
            changed += usize::from(refresh_value(field.value, ledger.env_var_for(&path), env));
        }
    }
    changed
}

/// Re-reads env-sourced tool-client values; returns how many changed.
pub fn refresh_tool_client(
    client: &mut ToolClientConfig,
    ledger: &ProvenanceLedger,
    env: &dyn EnvSource,
) -> usize {
    let name = client.name.clone();
    let mut changed = 0;
    for field in client.fields_mut() {
        let path = tool_client_path(&name, &field.suffix);
        changed += usize::from(refresh_value(field.value, ledger.env_var_for(&path), env));
    }
    changed
}

/// Overwrites a value from its variable when set; returns true on change.
fn refresh_value(value: &mut String, env_var: Option<&str>, env: &dyn EnvSource) -> bool {
    let Some(current) = env_var.and_then(|name| env.var(name)).filter(|v| !v.is_empty()) else {
        return false;
    };
    if *value == current {
        return false;
    }
    *value = current;
    true
}

// ============================================================================
// SECTION: Tests
// ============================================================================
