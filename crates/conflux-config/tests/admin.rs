// crates/conflux-config/tests/admin.rs
// ============================================================================
// Module: Admin Operation Tests
// Description: Provider, key and client-settings mutations on the store.
// Purpose: Ensure admin edits resolve secrets, keep provenance exact and
//          never leave partial state behind.
// Dependencies: conflux-config, conflux-core, tempfile
// ============================================================================

//! ## Overview
//! Exercises the administrative API of [`conflux_config::ConfigStore`]
//! against in-memory persistence with injectable commit failures.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use common::Harness;
use common::write_json;
use conflux_config::StoreOpError;
use conflux_core::ClientConfig;
use conflux_core::Key;
use conflux_core::ProviderConfig;
use conflux_core::ProviderName;
use conflux_core::ProxyConfig;
use conflux_core::ProxyType;
use conflux_core::StaticEnv;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn anthropic() -> ProviderName {
    ProviderName::new("anthropic")
}

fn env() -> StaticEnv {
    StaticEnv::new().with("ANTHROPIC_API_KEY", "sk-ant-live-1").with("ANTHROPIC_BACKUP", "sk-ant-live-2")
}

fn provider(values: &[&str]) -> ProviderConfig {
    ProviderConfig {
        keys: values.iter().map(|value| Key::new(*value)).collect(),
        ..ProviderConfig::default()
    }
}

// ============================================================================
// SECTION: Providers
// ============================================================================

#[test]
fn add_provider_resolves_references_and_rejects_duplicates() {
    let harness = Harness::new(env());

    harness.store.add_provider(&anthropic(), provider(&["env.ANTHROPIC_API_KEY"])).unwrap();

    let raw = harness.store.provider_config_raw(&anthropic()).unwrap();
    assert_eq!(raw.keys[0].value, "sk-ant-live-1");
    assert!(raw.config_hash.is_none());
    assert!(raw.keys[0].config_hash.is_none());
    let redacted = harness.store.provider_config_redacted(&anthropic()).unwrap();
    assert_eq!(redacted.keys[0].value, "env.ANTHROPIC_API_KEY");
    assert_eq!(harness.persisted().provenance.len(), 1);

    let duplicate = harness.store.add_provider(&anthropic(), provider(&["sk-other"]));
    assert!(matches!(duplicate, Err(StoreOpError::AlreadyExists(_))));
}

#[test]
fn add_provider_with_missing_variable_changes_nothing() {
    let harness = Harness::new(StaticEnv::new());

    let result = harness.store.add_provider(&anthropic(), provider(&["env.ANTHROPIC_API_KEY"]));

    assert!(matches!(result, Err(StoreOpError::Resolve(_))));
    assert!(harness.store.list_providers().unwrap().is_empty());
    assert!(harness.persistence.commits().is_empty());
}

#[test]
fn add_provider_rejects_invalid_config() {
    let harness = Harness::new(env());
    let mut config = provider(&["sk-ant-literal"]);
    config.keys[0].weight = -1.0;

    let result = harness.store.add_provider(&anthropic(), config);

    assert!(matches!(result, Err(StoreOpError::Invalid(_))));
}

#[test]
fn update_provider_restores_masked_values_from_stored_keys() {
    let harness = Harness::new(env());
    harness.store.add_provider(&anthropic(), provider(&["sk-ant-literal-0123456789"])).unwrap();

    let mut submitted = harness.store.provider_config_redacted(&anthropic()).unwrap();
    assert_ne!(submitted.keys[0].value, "sk-ant-literal-0123456789");
    submitted.keys[0].weight = 3.0;
    harness.store.update_provider(&anthropic(), submitted).unwrap();

    let raw = harness.store.provider_config_raw(&anthropic()).unwrap();
    assert_eq!(raw.keys[0].value, "sk-ant-literal-0123456789");
    assert!((raw.keys[0].weight - 3.0).abs() < f64::EPSILON);
}

#[test]
fn update_provider_re_resolves_references() {
    let harness = Harness::new(env());
    harness.store.add_provider(&anthropic(), provider(&["env.ANTHROPIC_API_KEY"])).unwrap();

    let mut submitted = harness.store.provider_config_redacted(&anthropic()).unwrap();
    submitted.keys[0].value = "env.ANTHROPIC_BACKUP".to_string();
    harness.store.update_provider(&anthropic(), submitted).unwrap();

    let raw = harness.store.provider_config_raw(&anthropic()).unwrap();
    assert_eq!(raw.keys[0].value, "sk-ant-live-2");
    let provenance = harness.store.provenance().unwrap();
    assert_eq!(provenance.len(), 1);
    assert_eq!(provenance[0].env_var, "ANTHROPIC_BACKUP");
}

#[test]
fn update_provider_rejects_masked_value_without_stored_key() {
    let harness = Harness::new(env());
    harness.store.add_provider(&anthropic(), provider(&["sk-ant-literal-0123456789"])).unwrap();

    let mut submitted = harness.store.provider_config_redacted(&anthropic()).unwrap();
    submitted.keys.push(Key::new("********"));
    let result = harness.store.update_provider(&anthropic(), submitted);

    assert!(matches!(result, Err(StoreOpError::Invalid(_))));
    assert_eq!(harness.store.provider_config_raw(&anthropic()).unwrap().keys.len(), 1);
}

fn with_proxy(mut config: ProviderConfig, password: &str) -> ProviderConfig {
    config.proxy_config = Some(ProxyConfig {
        proxy_type: ProxyType::Http,
        url: Some("http://proxy.internal:3128".to_string()),
        username: Some("gateway".to_string()),
        password: Some(password.to_string()),
    });
    config
}

#[test]
fn update_provider_restores_masked_proxy_password() {
    let harness = Harness::new(env());
    harness
        .store
        .add_provider(&anthropic(), with_proxy(provider(&["env.ANTHROPIC_API_KEY"]), "proxy-password-1"))
        .unwrap();

    let submitted = harness.store.provider_config_redacted(&anthropic()).unwrap();
    let shown = submitted.proxy_config.as_ref().and_then(|proxy| proxy.password.clone());
    assert_eq!(shown.as_deref(), Some("prox************************rd-1"));
    harness.store.update_provider(&anthropic(), submitted).unwrap();

    let raw = harness.store.provider_config_raw(&anthropic()).unwrap();
    let password = raw.proxy_config.as_ref().and_then(|proxy| proxy.password.as_deref());
    assert_eq!(password, Some("proxy-password-1"));
    let persisted = harness.persisted();
    let password = persisted.providers[&anthropic()]
        .proxy_config
        .as_ref()
        .and_then(|proxy| proxy.password.as_deref());
    assert_eq!(password, Some("proxy-password-1"));
}

#[test]
fn update_provider_rejects_masked_proxy_password_without_stored_value() {
    let harness = Harness::new(env());
    harness.store.add_provider(&anthropic(), provider(&["env.ANTHROPIC_API_KEY"])).unwrap();

    let submitted = with_proxy(harness.store.provider_config_redacted(&anthropic()).unwrap(), "********");
    let result = harness.store.update_provider(&anthropic(), submitted);

    assert!(matches!(result, Err(StoreOpError::Invalid(_))));
    assert!(harness.store.provider_config_raw(&anthropic()).unwrap().proxy_config.is_none());
}

#[test]
fn update_unknown_provider_is_not_found() {
    let harness = Harness::new(env());
    let result = harness.store.update_provider(&anthropic(), provider(&["sk-x"]));
    assert!(matches!(result, Err(StoreOpError::NotFound(_))));
}

#[test]
fn update_provider_keeps_file_hashes() {
    let temp = TempDir::new().unwrap();
    let document = json!({
        "providers": { "anthropic": { "keys": [{ "name": "main", "value": "env.ANTHROPIC_API_KEY" }] } }
    });
    let path = write_json(temp.path(), "conflux.json", &document);
    let harness = Harness::new(env());
    harness.store.load_configuration(&path).unwrap();
    let before = harness.store.provider_config_raw(&anthropic()).unwrap();

    let mut submitted = harness.store.provider_config_redacted(&anthropic()).unwrap();
    submitted.send_back_raw_response = true;
    harness.store.update_provider(&anthropic(), submitted).unwrap();

    let after = harness.store.provider_config_raw(&anthropic()).unwrap();
    assert!(after.send_back_raw_response);
    assert_eq!(after.config_hash, before.config_hash);
    assert_eq!(after.keys[0].config_hash, before.keys[0].config_hash);
}

#[test]
fn remove_key_drops_only_its_provenance() {
    let harness = Harness::new(env());
    harness
        .store
        .add_provider(&anthropic(), provider(&["env.ANTHROPIC_API_KEY", "env.ANTHROPIC_BACKUP"]))
        .unwrap();
    let removed = harness.store.provider_config_raw(&anthropic()).unwrap().keys[0].id.clone();

    harness.store.remove_key(&anthropic(), &removed).unwrap();

    let raw = harness.store.provider_config_raw(&anthropic()).unwrap();
    assert_eq!(raw.keys.len(), 1);
    assert_eq!(raw.keys[0].value, "sk-ant-live-2");
    let vars: Vec<_> = harness.store.provenance().unwrap().into_iter().map(|entry| entry.env_var).collect();
    assert_eq!(vars, vec!["ANTHROPIC_BACKUP"]);

    let again = harness.store.remove_key(&anthropic(), &removed);
    assert!(matches!(again, Err(StoreOpError::NotFound(_))));
}

#[test]
fn remove_provider_clears_keys_and_provenance() {
    let harness = Harness::new(env());
    harness.store.add_provider(&anthropic(), provider(&["env.ANTHROPIC_API_KEY"])).unwrap();

    harness.store.remove_provider(&anthropic()).unwrap();

    assert!(harness.store.list_providers().unwrap().is_empty());
    assert!(harness.store.provenance().unwrap().is_empty());
    assert!(harness.persisted().providers.is_empty());
    assert!(harness.persisted().provenance.is_empty());
    let again = harness.store.remove_provider(&anthropic());
    assert!(matches!(again, Err(StoreOpError::NotFound(_))));
}

#[test]
fn failed_commit_leaves_provider_state_untouched() {
    let harness = Harness::new(env());
    harness.store.add_provider(&anthropic(), provider(&["env.ANTHROPIC_API_KEY"])).unwrap();
    harness.persistence.fail_commits(true);

    let result = harness.store.remove_provider(&anthropic());

    assert!(matches!(result, Err(StoreOpError::Persistence(_))));
    assert_eq!(harness.store.list_providers().unwrap(), vec![anthropic()]);
    assert_eq!(harness.store.provenance().unwrap().len(), 1);
    let events = harness.audit.events();
    let last = events.last().unwrap();
    assert_eq!(last.action, "remove_provider");
    assert_eq!(last.outcome, "failure");
}

// ============================================================================
// SECTION: Client Settings
// ============================================================================

#[test]
fn update_client_config_persists_and_keeps_file_hash() {
    let temp = TempDir::new().unwrap();
    let path = write_json(temp.path(), "conflux.json", &json!({ "client": { "initial_pool_size": 10 } }));
    let harness = Harness::new(env());
    harness.store.load_configuration(&path).unwrap();
    let loaded = harness.store.client_config().unwrap();
    assert_eq!(loaded.initial_pool_size, 10);
    assert!(loaded.config_hash.is_some());

    harness
        .store
        .update_client_config(ClientConfig {
            initial_pool_size: 20,
            ..ClientConfig::default()
        })
        .unwrap();

    let updated = harness.persisted().client_config.unwrap();
    assert_eq!(updated.initial_pool_size, 20);
    assert_eq!(updated.config_hash, loaded.config_hash);
}

#[test]
fn update_client_config_rejects_zero_pool() {
    let harness = Harness::new(env());
    let result = harness.store.update_client_config(ClientConfig {
        initial_pool_size: 0,
        ..ClientConfig::default()
    });
    assert!(matches!(result, Err(StoreOpError::Invalid(_))));
    assert!(harness.persisted().client_config.is_none());
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

#[test]
fn readers_see_whole_provider_versions_during_updates() {
    let harness = Arc::new(Harness::new(env()));
    harness.store.add_provider(&anthropic(), provider(&["sk-version-a", "sk-version-a"])).unwrap();

    std::thread::scope(|scope| {
        let writer = Arc::clone(&harness);
        scope.spawn(move || {
            for round in 0 .. 50 {
                let value = if round % 2 == 0 { "sk-version-b" } else { "sk-version-a" };
                writer.store.update_provider(&anthropic(), provider(&[value, value])).unwrap();
            }
        });
        for _ in 0 .. 4 {
            let reader = Arc::clone(&harness);
            scope.spawn(move || {
                for _ in 0 .. 200 {
                    let raw = reader.store.provider_config_raw(&anthropic()).unwrap();
                    assert_eq!(raw.keys.len(), 2);
                    assert_eq!(raw.keys[0].value, raw.keys[1].value);
                }
            });
        }
    });
}
