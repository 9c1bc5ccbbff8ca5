// crates/conflux-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Validate SQLite ConfigPersistence behavior.
// Purpose: Ensure durable persistence, cascades, hash log order and atomicity.
// Dependencies: conflux-store-sqlite, conflux-core, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Conformance tests for the SQLite-backed configuration store. Exercises
//! durability across reopen, key cascades, the file hash log and
//! all-or-nothing commits.

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

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use conflux_core::ClientConfig;
use conflux_core::ConfigPersistence;
use conflux_core::ConfigSnapshot;
use conflux_core::Key;
use conflux_core::KeyId;
use conflux_core::PersistOp;
use conflux_core::ProviderConfig;
use conflux_core::ProviderName;
use conflux_core::ProvenanceEntry;
use conflux_core::StoreError;
use conflux_core::ToolClientConfig;
use conflux_core::ToolClientId;
use conflux_core::ToolConnection;
use conflux_core::ValueKind;
use conflux_store_sqlite::SqliteConfigStore;
use conflux_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn open(path: &Path) -> SqliteConfigStore {
    SqliteConfigStore::new(&SqliteStoreConfig::new(path)).unwrap()
}

fn key(id: &str, value: &str) -> Key {
    let mut key = Key::new(value);
    key.id = KeyId::new(id);
    key.config_hash = Some(format!("hash-{id}"));
    key
}

fn provider(keys: Vec<Key>) -> ProviderConfig {
    ProviderConfig {
        keys,
        config_hash: Some("provider-hash".to_string()),
        ..ProviderConfig::default()
    }
}

fn tool_client(id: &str, name: &str) -> ToolClientConfig {
    ToolClientConfig {
        id: Some(ToolClientId::new(id)),
        name: name.to_string(),
        connection: ToolConnection::Http {
            connection_string: "https://tools.example.com/mcp".to_string(),
        },
        tools_to_execute: vec!["search".to_string()],
        tools_to_skip: Vec::new(),
        headers: BTreeMap::from([("Authorization".to_string(), "Bearer t".to_string())]),
        config_hash: None,
    }
}

fn provenance(var: &str, provider: &str, key_id: &str) -> ProvenanceEntry {
    ProvenanceEntry {
        env_var: var.to_string(),
        config_path: format!("providers.{provider}.keys[{key_id}]"),
        provider: Some(ProviderName::new(provider)),
        kind: ValueKind::ApiKey,
        key_id: Some(KeyId::new(key_id)),
    }
}

fn sample_snapshot() -> ConfigSnapshot {
    ConfigSnapshot {
        client_config: Some(ClientConfig {
            drop_excess_requests: true,
            config_hash: Some("client-hash".to_string()),
            ..ClientConfig::default()
        }),
        providers: BTreeMap::from([
            (ProviderName::new("openai"), provider(vec![key("k1", "sk-one"), key("k2", "sk-two")])),
            (ProviderName::new("anthropic"), provider(vec![key("k3", "sk-three")])),
        ]),
        tool_clients: vec![tool_client("c1", "search"), tool_client("c2", "files")],
        provenance: vec![provenance("OPENAI_API_KEY", "openai", "k1")],
    }
}

/// Operations that write a whole snapshot into an empty store.
fn snapshot_ops(snapshot: &ConfigSnapshot) -> Vec<PersistOp> {
    let mut ops: Vec<PersistOp> =
        snapshot.client_config.iter().cloned().map(PersistOp::SaveClientConfig).collect();
    ops.extend(snapshot.providers.iter().map(|(name, config)| PersistOp::UpsertProvider {
        name: name.clone(),
        config: config.clone(),
    }));
    ops.extend(snapshot.tool_clients.iter().cloned().map(PersistOp::UpsertToolClient));
    ops.push(PersistOp::ReplaceProvenance(snapshot.provenance.clone()));
    ops
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn committed_snapshot_round_trips() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("config.db"));
    let snapshot = sample_snapshot();
    store.commit(&snapshot_ops(&snapshot)).unwrap();
    assert_eq!(store.load().unwrap(), snapshot);
}

#[test]
fn snapshot_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.db");
    {
        let store = open(&path);
        let mut ops = snapshot_ops(&sample_snapshot());
        ops.push(PersistOp::RecordFileHash("abc".to_string()));
        store.commit(&ops).unwrap();
    }
    let store = open(&path);
    assert_eq!(store.load().unwrap(), sample_snapshot());
    assert_eq!(store.latest_file_hash().unwrap().unwrap().hash, "abc");
}

#[test]
fn key_order_is_preserved() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("config.db"));
    let name = ProviderName::new("openai");
    let config = provider(vec![key("z", "sk-z"), key("a", "sk-a"), key("m", "sk-m")]);
    store
        .commit(&[PersistOp::UpsertProvider {
            name: name.clone(),
            config,
        }])
        .unwrap();
    let loaded = store.load().unwrap();
    let ids: Vec<_> = loaded.providers[&name].keys.iter().map(|k| k.id.as_str().to_string()).collect();
    assert_eq!(ids, vec!["z", "a", "m"]);
}

#[test]
fn deleting_provider_cascades_to_keys() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.db");
    let store = open(&path);
    store.commit(&snapshot_ops(&sample_snapshot())).unwrap();
    store.commit(&[PersistOp::DeleteProvider(ProviderName::new("openai"))]).unwrap();
    drop(store);

    let connection = rusqlite::Connection::open(&path).unwrap();
    let remaining: i64 = connection
        .query_row("SELECT COUNT(*) FROM provider_keys WHERE provider = 'openai'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(remaining, 0);
    let loaded = open(&path).load().unwrap();
    assert_eq!(loaded.providers.len(), 1);
}

#[test]
fn upsert_replaces_provider_keys() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("config.db"));
    let name = ProviderName::new("openai");
    store.commit(&snapshot_ops(&sample_snapshot())).unwrap();
    store
        .commit(&[PersistOp::UpsertProvider {
            name: name.clone(),
            config: provider(vec![key("k2", "sk-two-rotated")]),
        }])
        .unwrap();
    let loaded = store.load().unwrap();
    let keys = &loaded.providers[&name].keys;
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].value, "sk-two-rotated");
}

#[test]
fn tool_client_update_keeps_position() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("config.db"));
    store.commit(&snapshot_ops(&sample_snapshot())).unwrap();
    let mut updated = tool_client("c1", "search");
    updated.tools_to_skip = vec!["delete".to_string()];
    store.commit(&[PersistOp::UpsertToolClient(updated.clone())]).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(loaded.tool_clients[0], updated);
    assert_eq!(loaded.tool_clients[1].name, "files");
}

#[test]
fn hash_log_orders_by_last_sighting() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("config.db"));
    for hash in ["first", "second", "first"] {
        store.commit(&[PersistOp::RecordFileHash(hash.to_string())]).unwrap();
    }
    let log = store.file_hashes().unwrap();
    let hashes: Vec<_> = log.iter().map(|record| record.hash.as_str()).collect();
    assert_eq!(hashes, vec!["first", "second"]);
    assert!(log[0].updated_at_ms >= log[0].created_at_ms);
    assert_eq!(store.latest_file_hash().unwrap().unwrap().hash, "first");
}

#[test]
fn failed_commit_rolls_back_entities_and_hash() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("config.db"));
    store.commit(&snapshot_ops(&sample_snapshot())).unwrap();

    // Same name under a different id violates the unique name constraint.
    let err = store
        .commit(&[
            PersistOp::DeleteProvider(ProviderName::new("anthropic")),
            PersistOp::RecordFileHash("never-recorded".to_string()),
            PersistOp::UpsertToolClient(tool_client("c9", "search")),
        ])
        .unwrap_err();
    assert!(matches!(err, StoreError::Store(_)));

    assert_eq!(store.load().unwrap(), sample_snapshot());
    assert!(store.latest_file_hash().unwrap().is_none());
}

#[test]
fn tool_client_without_id_is_invalid() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp.path().join("config.db"));
    let mut client = tool_client("c1", "search");
    client.id = None;
    let err = store.commit(&[PersistOp::UpsertToolClient(client)]).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}

#[test]
fn schema_version_mismatch_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.db");
    drop(open(&path));
    let connection = rusqlite::Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = 99", []).unwrap();
    drop(connection);

    let result = SqliteConfigStore::new(&SqliteStoreConfig::new(&path));
    assert!(matches!(
        result,
        Err(conflux_store_sqlite::SqliteStoreError::VersionMismatch(_))
    ));
}

#[test]
fn directory_path_is_rejected() {
    let temp = TempDir::new().unwrap();
    let result = SqliteConfigStore::new(&SqliteStoreConfig::new(temp.path()));
    assert!(matches!(result, Err(conflux_store_sqlite::SqliteStoreError::Invalid(_))));
}

#[test]
fn corrupt_blob_surfaces_as_corrupt_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.db");
    let store = open(&path);
    store.commit(&snapshot_ops(&sample_snapshot())).unwrap();
    drop(store);
    let connection = rusqlite::Connection::open(&path).unwrap();
    connection.execute("UPDATE provider_keys SET models_json = 'not json'", []).unwrap();
    drop(connection);

    let err = open(&path).load().unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}
