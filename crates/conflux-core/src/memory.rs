// crates/conflux-core/src/memory.rs
// ============================================================================
// Module: Conflux In-Memory Persistence
// Description: Volatile ConfigPersistence backend.
// Purpose: Run the store without a database in tests and local tooling.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryConfigPersistence`] applies each commit to a copy of its state
//! and swaps the copy in only when every operation succeeded, matching the
//! transactional contract of relational backends. It is not durable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::interfaces::ConfigPersistence;
use crate::interfaces::ConfigSnapshot;
use crate::interfaces::FileHashRecord;
use crate::interfaces::PersistOp;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Persisted state held in memory.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// Entity snapshot.
    snapshot: ConfigSnapshot,
    /// Hash log keyed by hash, with a sighting sequence for ordering.
    hashes: BTreeMap<String, (FileHashRecord, u64)>,
    /// Next sighting sequence.
    next_seq: u64,
}

/// In-memory configuration persistence.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConfigPersistence {
    /// Shared state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryConfigPersistence {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with a snapshot.
    #[must_use]
    pub fn with_snapshot(snapshot: ConfigSnapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                snapshot,
                ..MemoryState::default()
            })),
        }
    }
}

impl ConfigPersistence for InMemoryConfigPersistence {
    fn load(&self) -> Result<ConfigSnapshot, StoreError> {
        let guard = self.state.lock().map_err(|_| StoreError::Store("mutex poisoned".to_string()))?;
        Ok(guard.snapshot.clone())
    }

    fn latest_file_hash(&self) -> Result<Option<FileHashRecord>, StoreError> {
        Ok(self.file_hashes()?.into_iter().next())
    }

    fn file_hashes(&self) -> Result<Vec<FileHashRecord>, StoreError> {
        let guard = self.state.lock().map_err(|_| StoreError::Store("mutex poisoned".to_string()))?;
        let mut records: Vec<_> = guard.hashes.values().cloned().collect();
        records.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(records.into_iter().map(|(record, _)| record).collect())
    }

    fn commit(&self, ops: &[PersistOp]) -> Result<(), StoreError> {
        let mut guard =
            self.state.lock().map_err(|_| StoreError::Store("mutex poisoned".to_string()))?;
        let mut next = guard.clone();
        for op in ops {
            apply(&mut next, op)?;
        }
        *guard = next;
        drop(guard);
        Ok(())
    }
}

/// Applies one operation to a working copy.
fn apply(state: &mut MemoryState, op: &PersistOp) -> Result<(), StoreError> {
    let snapshot = &mut state.snapshot;
    match op {
        PersistOp::UpsertProvider {
            name,
            config,
        } => {
            snapshot.providers.insert(name.clone(), config.clone());
        }
        PersistOp::DeleteProvider(name) => {
            snapshot.providers.remove(name);
        }
        PersistOp::UpsertToolClient(client) => {
            if client.id.is_none() {
                return Err(StoreError::Invalid(format!("tool client {} has no id", client.name)));
            }
            match snapshot.tool_clients.iter_mut().find(|c| c.name == client.name) {
                Some(existing) => *existing = client.clone(),
                None => snapshot.tool_clients.push(client.clone()),
            }
        }
        PersistOp::DeleteToolClient(name) => snapshot.tool_clients.retain(|c| &c.name != name),
        PersistOp::SaveClientConfig(config) => snapshot.client_config = Some(config.clone()),
        PersistOp::ReplaceProvenance(entries) => snapshot.provenance.clone_from(entries),
        PersistOp::RecordFileHash(hash) => {
            let now = unix_millis();
            let seq = state.next_seq;
            state.next_seq += 1;
            state
                .hashes
                .entry(hash.clone())
                .and_modify(|(record, record_seq)| {
                    record.updated_at_ms = now;
                    *record_seq = seq;
                })
                .or_insert_with(|| {
                    (
                        FileHashRecord {
                            hash: hash.clone(),
                            created_at_ms: now,
                            updated_at_ms: now,
                        },
                        seq,
                    )
                });
        }
    }
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
