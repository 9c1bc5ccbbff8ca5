// crates/conflux-config/tests/tool_clients.rs
// ============================================================================
// Module: Tool Client Tests
// Description: Tool-client lifecycle through the dispatcher and persistence.
// Purpose: Ensure dispatcher and store stay in step, including on failure.
// Dependencies: conflux-config, conflux-core, tempfile
// ============================================================================

//! ## Overview
//! Tool-client mutations call the dispatcher first and persist second; a
//! persistence failure must undo the dispatcher change.

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

use std::collections::BTreeMap;
use std::sync::Arc;

use common::Harness;
use common::write_json;
use conflux_config::ConfigStore;
use conflux_config::Decision;
use conflux_config::EntityRef;
use conflux_config::LoadPath;
use conflux_config::StoreOpError;
use conflux_core::InMemoryConfigPersistence;
use conflux_core::StaticEnv;
use conflux_core::ToolClientConfig;
use conflux_core::ToolConnection;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

type TestResult = Result<(), String>;

fn env() -> StaticEnv {
    StaticEnv::new()
        .with("DOCS_URL", "https://docs.internal/mcp")
        .with("DOCS_TOKEN", "Bearer docs-token-1")
        .with("DOCS_TOKEN_V2", "Bearer docs-token-2")
        .with("WIKI_URL", "https://wiki.internal/mcp")
}

fn docs_client() -> ToolClientConfig {
    ToolClientConfig {
        id: None,
        name: "docs".to_string(),
        connection: ToolConnection::Http {
            connection_string: "env.DOCS_URL".to_string(),
        },
        tools_to_execute: vec!["search".to_string()],
        tools_to_skip: Vec::new(),
        headers: BTreeMap::from([
            ("Authorization".to_string(), "env.DOCS_TOKEN".to_string()),
            ("X-Team".to_string(), "team-secret-value-42".to_string()),
        ]),
        config_hash: None,
    }
}

fn http_client(name: &str, url: &str) -> ToolClientConfig {
    ToolClientConfig {
        name: name.to_string(),
        connection: ToolConnection::Http {
            connection_string: url.to_string(),
        },
        tools_to_execute: Vec::new(),
        headers: BTreeMap::new(),
        ..docs_client()
    }
}

fn provenance_paths(harness: &Harness) -> Vec<String> {
    harness.store.provenance().unwrap().into_iter().map(|entry| entry.config_path).collect()
}

fn find<'a>(clients: &'a [ToolClientConfig], name: &str) -> Result<&'a ToolClientConfig, String> {
    clients.iter().find(|client| client.name == name).ok_or_else(|| format!("missing client {name}"))
}

// ============================================================================
// SECTION: Add / Remove
// ============================================================================

#[test]
fn tool_mutations_require_dispatcher() {
    let store = ConfigStore::new(Arc::new(InMemoryConfigPersistence::new()), Arc::new(env()));
    let result = store.add_tool_client(docs_client());
    assert!(matches!(result, Err(StoreOpError::DispatcherNotSet)));
    let result = store.remove_tool_client("docs");
    assert!(matches!(result, Err(StoreOpError::DispatcherNotSet)));
}

#[test]
fn add_tool_client_resolves_and_connects() -> TestResult {
    let harness = Harness::new(env());

    harness.store.add_tool_client(docs_client()).map_err(|err| err.to_string())?;

    assert_eq!(harness.dispatcher.calls(), vec!["add:docs"]);
    let raw = harness.store.tool_clients().map_err(|err| err.to_string())?;
    let docs = find(&raw, "docs")?;
    assert!(docs.id.is_some());
    assert_eq!(docs.connection, ToolConnection::Http {
        connection_string: "https://docs.internal/mcp".to_string(),
    });
    assert_eq!(docs.headers["Authorization"], "Bearer docs-token-1");

    let redacted = harness.store.tool_clients_redacted().map_err(|err| err.to_string())?;
    let docs = find(&redacted, "docs")?;
    assert_eq!(docs.connection, ToolConnection::Http {
        connection_string: "env.DOCS_URL".to_string(),
    });
    assert_eq!(docs.headers["Authorization"], "env.DOCS_TOKEN");
    assert_ne!(docs.headers["X-Team"], "team-secret-value-42");
    assert_eq!(harness.persisted().tool_clients.len(), 1);
    assert_eq!(harness.persisted().provenance.len(), 2);
    Ok(())
}

#[test]
fn duplicate_tool_client_is_rejected_before_dispatch() {
    let harness = Harness::new(env());
    harness.store.add_tool_client(docs_client()).unwrap();

    let result = harness.store.add_tool_client(docs_client());

    assert!(matches!(result, Err(StoreOpError::AlreadyExists(_))));
    assert_eq!(harness.dispatcher.calls(), vec!["add:docs"]);
}

#[test]
fn dispatcher_rejection_stores_nothing() {
    let harness = Harness::new(env());
    harness.dispatcher.fail(true);

    let result = harness.store.add_tool_client(docs_client());

    assert!(matches!(result, Err(StoreOpError::Dispatch(_))));
    assert!(harness.store.tool_clients().unwrap().is_empty());
    assert!(harness.persistence.commits().is_empty());
}

#[test]
fn failed_commit_disconnects_new_client() {
    let harness = Harness::new(env());
    harness.persistence.fail_commits(true);

    let result = harness.store.add_tool_client(docs_client());

    assert!(matches!(result, Err(StoreOpError::Persistence(_))));
    assert_eq!(harness.dispatcher.calls(), vec!["add:docs", "remove:docs"]);
    assert!(harness.store.tool_clients().unwrap().is_empty());
    assert!(harness.store.provenance().unwrap().is_empty());
}

#[test]
fn remove_tool_client_disconnects_and_clears_provenance() {
    let harness = Harness::new(env());
    harness.store.add_tool_client(docs_client()).unwrap();

    harness.store.remove_tool_client("docs").unwrap();

    assert_eq!(harness.dispatcher.calls(), vec!["add:docs", "remove:docs"]);
    assert!(harness.store.tool_clients().unwrap().is_empty());
    assert!(harness.persisted().tool_clients.is_empty());
    assert!(harness.persisted().provenance.is_empty());
    let again = harness.store.remove_tool_client("docs");
    assert!(matches!(again, Err(StoreOpError::NotFound(_))));
}

#[test]
fn dotted_tool_client_name_is_rejected_before_dispatch() {
    let harness = Harness::new(env());

    let result = harness.store.add_tool_client(http_client("docs.v2", "env.WIKI_URL"));

    assert!(matches!(result, Err(StoreOpError::Invalid(_))));
    assert!(harness.dispatcher.calls().is_empty());
    assert!(harness.store.provenance().unwrap().is_empty());
}

#[test]
fn removing_a_client_keeps_provenance_of_similarly_named_clients() {
    let harness = Harness::new(env());
    harness.store.add_tool_client(http_client("docs", "env.DOCS_URL")).unwrap();
    harness.store.add_tool_client(http_client("docs-wiki", "env.WIKI_URL")).unwrap();

    harness.store.remove_tool_client("docs").unwrap();

    assert_eq!(provenance_paths(&harness), vec!["tool_clients.docs-wiki.connection_string"]);
    let redacted = harness.store.tool_clients_redacted().unwrap();
    assert_eq!(redacted[0].connection, ToolConnection::Http {
        connection_string: "env.WIKI_URL".to_string(),
    });
}

#[test]
fn failed_commit_reconnects_removed_client() {
    let harness = Harness::new(env());
    harness.store.add_tool_client(docs_client()).unwrap();
    harness.persistence.fail_commits(true);

    let result = harness.store.remove_tool_client("docs");

    assert!(matches!(result, Err(StoreOpError::Persistence(_))));
    assert_eq!(harness.dispatcher.calls(), vec!["add:docs", "remove:docs", "add:docs"]);
    assert_eq!(harness.store.tool_clients().unwrap().len(), 1);
}

#[test]
fn failed_rollback_is_recorded_in_audit() {
    let harness = Harness::new(env());
    harness.store.add_tool_client(docs_client()).unwrap();
    harness.persistence.fail_commits(true);
    harness.dispatcher.fail_after(1);

    let result = harness.store.remove_tool_client("docs");

    assert!(matches!(result, Err(StoreOpError::Persistence(_))));
    assert_eq!(harness.dispatcher.calls(), vec!["add:docs", "remove:docs"]);
    let events = harness.audit.events();
    let rollback = events
        .iter()
        .find(|event| event.outcome == "rollback_failure")
        .expect("rollback failure event");
    assert_eq!(rollback.action, "remove_tool_client");
    assert_eq!(rollback.entity, "tool_client:docs");
    assert!(rollback.detail.as_deref().is_some_and(|detail| detail.contains("add:docs")));
    assert_eq!(events.last().unwrap().outcome, "failure");
}

// ============================================================================
// SECTION: Edits
// ============================================================================

#[test]
fn edit_tools_validates_and_applies() {
    let harness = Harness::new(env());
    harness.store.add_tool_client(docs_client()).unwrap();

    let overlap = harness.store.edit_tool_client_tools(
        "docs",
        vec!["search".to_string()],
        vec!["search".to_string()],
    );
    assert!(matches!(overlap, Err(StoreOpError::Invalid(_))));

    harness
        .store
        .edit_tool_client_tools("docs", vec!["search".to_string(), "fetch".to_string()], vec![
            "delete".to_string(),
        ])
        .unwrap();

    let raw = harness.store.tool_clients().unwrap();
    assert_eq!(raw[0].tools_to_execute, vec!["search", "fetch"]);
    assert_eq!(raw[0].tools_to_skip, vec!["delete"]);
    assert_eq!(harness.persisted().tool_clients[0].tools_to_skip, vec!["delete"]);
    assert_eq!(harness.dispatcher.calls().last().map(String::as_str), Some("edit:docs:search,fetch:delete"));
}

#[test]
fn failed_commit_restores_previous_tool_filters() {
    let harness = Harness::new(env());
    harness.store.add_tool_client(docs_client()).unwrap();
    harness.persistence.fail_commits(true);

    let result = harness.store.edit_tool_client_tools("docs", Vec::new(), vec!["search".to_string()]);

    assert!(matches!(result, Err(StoreOpError::Persistence(_))));
    assert_eq!(harness.dispatcher.calls(), vec!["add:docs", "edit:docs::search", "edit:docs:search:"]);
    assert_eq!(harness.store.tool_clients().unwrap()[0].tools_to_execute, vec!["search"]);
}

#[test]
fn connection_update_restores_masked_headers_and_replaces_provenance() -> TestResult {
    let harness = Harness::new(env());
    harness.store.add_tool_client(docs_client()).map_err(|err| err.to_string())?;
    let redacted = harness.store.tool_clients_redacted().map_err(|err| err.to_string())?;
    let mut headers = find(&redacted, "docs")?.headers.clone();
    headers.insert("Authorization".to_string(), "env.DOCS_TOKEN_V2".to_string());

    harness
        .store
        .update_tool_client_connection(
            "docs",
            ToolConnection::Sse {
                connection_string: "https://docs.internal/sse".to_string(),
            },
            headers,
        )
        .map_err(|err| err.to_string())?;

    let raw = harness.store.tool_clients().map_err(|err| err.to_string())?;
    let docs = find(&raw, "docs")?;
    assert_eq!(docs.connection, ToolConnection::Sse {
        connection_string: "https://docs.internal/sse".to_string(),
    });
    assert_eq!(docs.headers["Authorization"], "Bearer docs-token-2");
    assert_eq!(docs.headers["X-Team"], "team-secret-value-42");
    assert_eq!(docs.tools_to_execute, vec!["search"]);

    let vars: Vec<_> = harness
        .store
        .provenance()
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(|entry| entry.env_var)
        .collect();
    assert_eq!(vars, vec!["DOCS_TOKEN_V2"]);
    assert_eq!(harness.dispatcher.calls(), vec!["add:docs", "remove:docs", "add:docs"]);
    Ok(())
}

#[test]
fn connection_update_with_unknown_masked_header_is_invalid() {
    let harness = Harness::new(env());
    harness.store.add_tool_client(docs_client()).unwrap();
    let headers = BTreeMap::from([("X-New".to_string(), "****".to_string())]);

    let result = harness.store.update_tool_client_connection(
        "docs",
        ToolConnection::Http {
            connection_string: "https://docs.internal/mcp".to_string(),
        },
        headers,
    );

    assert!(matches!(result, Err(StoreOpError::Invalid(_))));
    assert_eq!(harness.dispatcher.calls(), vec!["add:docs"]);
}

// ============================================================================
// SECTION: File
// ============================================================================

#[test]
fn file_tool_clients_load_without_dispatching() -> TestResult {
    let temp = TempDir::new().map_err(|err| err.to_string())?;
    let document = json!({
        "tool_clients": [{
            "name": "docs",
            "connection": { "type": "http", "connection_string": "env.DOCS_URL" },
            "headers": { "Authorization": "env.DOCS_TOKEN" }
        }]
    });
    let path = write_json(temp.path(), "conflux.json", &document);
    let harness = Harness::new(env());

    harness.store.load_configuration(&path).map_err(|err| err.to_string())?;
    let raw = harness.store.tool_clients().map_err(|err| err.to_string())?;
    let docs = find(&raw, "docs")?;
    assert_eq!(docs.headers["Authorization"], "Bearer docs-token-1");
    assert!(harness.dispatcher.calls().is_empty());

    let mut edited = document.clone();
    edited["tool_clients"][0]["tools_to_skip"] = json!(["delete"]);
    write_json(temp.path(), "conflux.json", &edited);
    let report = harness.store.load_configuration(&path).map_err(|err| err.to_string())?;
    assert_eq!(report.load_path, LoadPath::FileChanged);
    assert_eq!(report.outcomes[0].decision(), Some(Decision::Updated));
    let snapshot = harness.persisted();
    let persisted = &snapshot.tool_clients[0];
    assert_eq!(persisted.id, docs.id);
    assert_eq!(persisted.tools_to_skip, vec!["delete"]);
    Ok(())
}

#[test]
fn unresolvable_file_tool_client_is_skipped_and_stored_client_kept() -> TestResult {
    let temp = TempDir::new().map_err(|err| err.to_string())?;
    let document = json!({
        "tool_clients": [{
            "name": "docs",
            "connection": { "type": "http", "connection_string": "env.DOCS_URL" },
            "headers": { "Authorization": "env.DOCS_TOKEN" }
        }]
    });
    let path = write_json(temp.path(), "conflux.json", &document);
    let harness = Harness::new(env());
    harness.store.load_configuration(&path).map_err(|err| err.to_string())?;
    let before = harness.persisted();

    let mut edited = document.clone();
    edited["tool_clients"][0]["headers"]["Authorization"] = json!("env.DOCS_TOKEN_MISSING");
    edited["tool_clients"].as_array_mut().unwrap().push(json!({
        "name": "tracker",
        "connection": { "type": "http", "connection_string": "env.TRACKER_URL" }
    }));
    write_json(temp.path(), "conflux.json", &edited);
    let report = harness.store.load_configuration(&path).map_err(|err| err.to_string())?;

    let skipped: Vec<_> = report.skipped().map(|outcome| outcome.entity.clone()).collect();
    assert_eq!(skipped, vec![
        EntityRef::ToolClient {
            name: "docs".to_string(),
        },
        EntityRef::ToolClient {
            name: "tracker".to_string(),
        },
    ]);
    let raw = harness.store.tool_clients().map_err(|err| err.to_string())?;
    assert_eq!(raw.len(), 1);
    assert_eq!(find(&raw, "docs")?.headers["Authorization"], "Bearer docs-token-1");
    let after = harness.persisted();
    assert_eq!(after.tool_clients, before.tool_clients);
    assert_eq!(after.provenance, before.provenance);
    assert_eq!(provenance_paths(&harness), vec![
        "tool_clients.docs.headers.Authorization",
        "tool_clients.docs.connection_string",
    ]);
    Ok(())
}
