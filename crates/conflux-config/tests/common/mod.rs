// crates/conflux-config/tests/common/mod.rs
// =============================================================================
// Module: Config Store Test Helpers
// Description: Shared fixtures for config store integration tests.
// Purpose: Reduce duplication across reconciliation and admin suites.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use conflux_config::ConfigStore;
use conflux_config::MemoryAuditSink;
use conflux_core::ConfigPersistence;
use conflux_core::ConfigSnapshot;
use conflux_core::DispatchError;
use conflux_core::FileHashRecord;
use conflux_core::InMemoryConfigPersistence;
use conflux_core::PersistOp;
use conflux_core::StaticEnv;
use conflux_core::StoreError;
use conflux_core::ToolClientConfig;
use conflux_core::ToolDispatcher;
use serde_json::Value;

// ============================================================================
// SECTION: Persistence
// ============================================================================

/// In-memory persistence whose commits can be made to fail.
#[derive(Default)]
pub struct FlakyPersistence {
    /// Backing store.
    inner: InMemoryConfigPersistence,
    /// When set, every commit fails without applying.
    fail_commits: AtomicBool,
    /// Every committed batch, in order.
    commits: Mutex<Vec<Vec<PersistOp>>>,
}

impl FlakyPersistence {
    /// Creates an empty store that accepts commits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles commit failure.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Returns the batches committed so far.
    pub fn commits(&self) -> Vec<Vec<PersistOp>> {
        self.commits.lock().unwrap().clone()
    }

    /// Forgets the recorded batches.
    pub fn clear_commits(&self) {
        self.commits.lock().unwrap().clear();
    }
}

impl ConfigPersistence for FlakyPersistence {
    fn load(&self) -> Result<ConfigSnapshot, StoreError> {
        self.inner.load()
    }

    fn latest_file_hash(&self) -> Result<Option<FileHashRecord>, StoreError> {
        self.inner.latest_file_hash()
    }

    fn file_hashes(&self) -> Result<Vec<FileHashRecord>, StoreError> {
        self.inner.file_hashes()
    }

    fn commit(&self, ops: &[PersistOp]) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Store("injected commit failure".to_string()));
        }
        self.inner.commit(ops)?;
        self.commits.lock().unwrap().push(ops.to_vec());
        Ok(())
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Dispatcher that records calls and can reject them.
#[derive(Default)]
pub struct RecordingDispatcher {
    /// Call log such as `add:fs` or `remove:fs`.
    calls: Mutex<Vec<String>>,
    /// When set, every call fails.
    fail: AtomicBool,
    /// Calls still accepted before rejection starts, when limited.
    remaining: Mutex<Option<usize>>,
}

impl RecordingDispatcher {
    /// Creates a dispatcher that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles call rejection.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Accepts the next `calls` calls and rejects every call after them.
    pub fn fail_after(&self, calls: usize) {
        *self.remaining.lock().unwrap() = Some(calls);
    }

    /// Returns the accepted calls.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Logs a call unless rejection is on.
    fn record(&self, call: String) -> Result<(), DispatchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispatchError::DispatchFailed(format!("rejected {call}")));
        }
        if let Some(remaining) = self.remaining.lock().unwrap().as_mut() {
            if *remaining == 0 {
                return Err(DispatchError::DispatchFailed(format!("rejected {call}")));
            }
            *remaining -= 1;
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl ToolDispatcher for RecordingDispatcher {
    fn add_client(&self, client: &ToolClientConfig) -> Result<(), DispatchError> {
        self.record(format!("add:{}", client.name))
    }

    fn remove_client(&self, name: &str) -> Result<(), DispatchError> {
        self.record(format!("remove:{name}"))
    }

    fn edit_client_tools(
        &self,
        name: &str,
        tools_to_execute: &[String],
        tools_to_skip: &[String],
    ) -> Result<(), DispatchError> {
        self.record(format!("edit:{name}:{}:{}", tools_to_execute.join(","), tools_to_skip.join(",")))
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Store wired to flaky persistence, a recording dispatcher and a memory
/// audit sink.
pub struct Harness {
    /// Store under test.
    pub store: ConfigStore,
    /// Persistence behind the store.
    pub persistence: Arc<FlakyPersistence>,
    /// Tool dispatcher registered with the store.
    pub dispatcher: Arc<RecordingDispatcher>,
    /// Audit sink registered with the store.
    pub audit: Arc<MemoryAuditSink>,
}

impl Harness {
    /// Builds a harness over fresh persistence.
    pub fn new(env: StaticEnv) -> Self {
        Self::with_persistence(env, Arc::new(FlakyPersistence::new()))
    }

    /// Builds a harness over existing persistence, as after a restart.
    pub fn with_persistence(env: StaticEnv, persistence: Arc<FlakyPersistence>) -> Self {
        let audit = Arc::new(MemoryAuditSink::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let store = ConfigStore::new(persistence.clone(), Arc::new(env)).with_audit(audit.clone());
        store.set_tool_dispatcher(dispatcher.clone()).unwrap();
        Self {
            store,
            persistence,
            dispatcher,
            audit,
        }
    }

    /// Returns the persisted snapshot.
    pub fn persisted(&self) -> ConfigSnapshot {
        self.persistence.load().unwrap()
    }
}

// ============================================================================
// SECTION: Files
// ============================================================================

/// Writes a JSON document as a config file.
pub fn write_json(dir: &Path, name: &str, document: &Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(document).unwrap()).unwrap();
    path
}

/// Document with one openai key sourced from `OPENAI_API_KEY`.
pub fn openai_document() -> Value {
    serde_json::json!({
        "providers": {
            "OpenAI": {
                "keys": [
                    { "name": "primary", "value": "env.OPENAI_API_KEY", "models": ["gpt-4o"] }
                ],
                "concurrency_and_buffer_size": { "concurrency": 4, "buffer_size": 40 }
            }
        }
    })
}

/// Environment with the openai variable set.
pub fn openai_env() -> StaticEnv {
    StaticEnv::new().with("OPENAI_API_KEY", "sk-test-123")
}
