// crates/conflux-config/src/audit.rs
// ============================================================================
// Module: Conflux Audit Logging
// Description: Structured audit events for reconciliation and admin changes.
// Purpose: Emit secret-free audit logs without hard dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every load path decision, per-entity reconciliation outcome and
//! administrative mutation is reported as a [`ConfigAuditEvent`]. Events name
//! entities and environment variables but never carry secret values. Sinks
//! write JSON lines so deployments can route them to their own pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Configuration audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Action label (for example `load` or `add_provider`).
    pub action: &'static str,
    /// Entity label (for example `provider:openai`).
    pub entity: String,
    /// Outcome label.
    pub outcome: String,
    /// Optional detail, never a secret value.
    pub detail: Option<String>,
}

impl ConfigAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(
        action: &'static str,
        entity: impl Into<String>,
        outcome: impl Into<String>,
        detail: Option<String>,
    ) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "config_audit",
            timestamp_ms,
            action,
            entity: entity.into(),
            outcome: outcome.into(),
            detail,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for configuration events.
pub trait ConfigAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &ConfigAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl ConfigAuditSink for StderrAuditSink {
    fn record(&self, event: &ConfigAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl ConfigAuditSink for FileAuditSink {
    fn record(&self, event: &ConfigAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl ConfigAuditSink for NoopAuditSink {
    fn record(&self, _event: &ConfigAuditEvent) {}
}

/// Audit sink that keeps events in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<ConfigAuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<ConfigAuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl ConfigAuditSink for MemoryAuditSink {
    fn record(&self, event: &ConfigAuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn file_sink_appends_json_lines() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("audit.log");
        let sink = FileAuditSink::new(&path).unwrap();
        sink.record(&ConfigAuditEvent::new("load", "config", "file_changed", None));
        sink.record(&ConfigAuditEvent::new(
            "add_provider",
            "provider:openai",
            "success",
            Some("1 key".to_string()),
        ));
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["entity"], "provider:openai");
        assert_eq!(second["event"], "config_audit");
    }

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        sink.record(&ConfigAuditEvent::new("load", "a", "ok", None));
        sink.record(&ConfigAuditEvent::new("load", "b", "ok", None));
        let entities: Vec<_> = sink.events().into_iter().map(|event| event.entity).collect();
        assert_eq!(entities, vec!["a", "b"]);
    }
}
