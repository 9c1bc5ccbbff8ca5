// crates/conflux-core/src/env.rs
// ============================================================================
// Module: Conflux Value Resolver
// Description: Resolution of `env.NAME` references against an environment.
// Purpose: Turn declared configuration values into live values.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`resolve`] is a pure read: it never touches the provenance ledger. Callers
//! stage provenance entries only after a successful resolution and discard
//! them when a later field of the same entity fails.
//!
//! The environment is reached through [`EnvSource`] so the store can be driven
//! from a fixed map in tests and embedders.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;

use crate::redaction::ENV_PREFIX;

// ============================================================================
// SECTION: Environment Sources
// ============================================================================

/// Read-only view of environment variables.
pub trait EnvSource: Send + Sync {
    /// Returns the value of a variable, if set.
    fn var(&self, name: &str) -> Option<String>;
}

/// Process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed map of variables.
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    /// Variables by name.
    vars: BTreeMap<String, String>,
}

impl StaticEnv {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable, returning the updated environment.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl EnvSource for StaticEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Environment reference that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Variable absent or empty.
    #[error("environment variable {env_var} not found")]
    NotFound {
        /// Variable name.
        env_var: String,
    },
}

/// Successfully resolved value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Live value.
    pub value: String,
    /// Variable that supplied the value, if any.
    pub env_var: Option<String>,
}

/// Resolves a declared value.
///
/// Values without the `env.` prefix are returned unchanged.
///
/// # Errors
///
/// Returns [`ResolveError::NotFound`] carrying the variable name when the
/// referenced variable is absent or empty.
pub fn resolve(value: &str, env: &dyn EnvSource) -> Result<Resolved, ResolveError> {
    let Some(env_var) = value.strip_prefix(ENV_PREFIX) else {
        return Ok(Resolved {
            value: value.to_string(),
            env_var: None,
        });
    };
    match env.var(env_var) {
        Some(resolved) if !resolved.is_empty() => Ok(Resolved {
            value: resolved,
            env_var: Some(env_var.to_string()),
        }),
        _ => Err(ResolveError::NotFound {
            env_var: env_var.to_string(),
        }),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
