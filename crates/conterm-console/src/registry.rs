//! Session-wide registry of console processes.
//!
//! Owns every live [`ConsoleProcess`] in creation order and drives the
//! whole-session suspend/resume cycle. Individual snapshot failures never
//! abort a bulk operation; the bad entry is logged and skipped.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{info, warn};

use conterm_common::{ConsoleHandle, SnapshotError};

use crate::process::ConsoleProcess;
use crate::snapshot::ConsoleProcessSnapshot;

#[derive(Default)]
pub struct ConsoleRegistry {
    // Creation order is preserved; clients enumerate consoles in it.
    procs: Mutex<Vec<Arc<ConsoleProcess>>>,
}

impl ConsoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<ConsoleProcess>>> {
        self.procs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a process. Re-adding the same handle is a no-op.
    pub fn add(&self, proc: Arc<ConsoleProcess>) {
        let mut procs = self.lock();
        let handle = proc.handle();
        if procs.iter().any(|p| p.handle() == handle) {
            warn!(handle = %handle, "console already registered");
            return;
        }
        procs.push(proc);
    }

    pub fn find(&self, handle: &ConsoleHandle) -> Option<Arc<ConsoleProcess>> {
        self.lock().iter().find(|p| &p.handle() == handle).cloned()
    }

    /// Remove and return a process; the caller decides whether to interrupt
    /// it first.
    pub fn remove(&self, handle: &ConsoleHandle) -> Option<Arc<ConsoleProcess>> {
        let mut procs = self.lock();
        let index = procs.iter().position(|p| &p.handle() == handle)?;
        Some(procs.remove(index))
    }

    pub fn list(&self) -> Vec<Arc<ConsoleProcess>> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Ordered client-facing summaries, one JSON object per console. Used
    /// by session-restore surfaces that only need the attribute set, not
    /// the full snapshot.
    pub fn as_summaries(&self) -> Vec<Value> {
        self.list()
            .iter()
            .filter_map(|p| serde_json::to_value(p.info()).ok())
            .collect()
    }

    /// Request a logical stop of every registered process.
    pub fn interrupt_all(&self) {
        for proc in self.list() {
            proc.interrupt();
        }
    }

    /// Serialize every registered process into one JSON array, in creation
    /// order. A process that fails to serialize is skipped with a warning
    /// rather than sinking the whole suspend.
    pub fn suspend_all(&self) -> String {
        let procs = self.list();
        let mut entries = Vec::with_capacity(procs.len());
        for proc in procs {
            let snapshot = proc.on_suspend();
            match serde_json::to_value(&snapshot) {
                Ok(value) => entries.push(value),
                Err(e) => {
                    warn!(handle = %snapshot.info.handle, error = %e, "skipping unserializable console");
                }
            }
        }
        info!(count = entries.len(), "suspended console processes");
        Value::Array(entries).to_string()
    }

    /// Rebuild the registry from a serialized session. Malformed entries
    /// are skipped with a warning; the rest are restored in order. A
    /// malformed outer document is an error since nothing can be recovered
    /// from it.
    pub fn restore_all(&self, json: &str) -> Result<usize, SnapshotError> {
        let entries: Vec<Value> = serde_json::from_str(json)
            .map_err(|e| SnapshotError::Malformed(format!("session document: {e}")))?;

        let mut restored = 0;
        for entry in entries {
            let snapshot: ConsoleProcessSnapshot = match serde_json::from_value(entry) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "skipping malformed console snapshot");
                    continue;
                }
            };
            match ConsoleProcess::from_snapshot(snapshot) {
                Ok(proc) => {
                    self.add(proc);
                    restored += 1;
                }
                Err(e) => warn!(error = %e, "skipping unrestorable console snapshot"),
            }
        }
        info!(count = restored, "restored console processes");
        Ok(restored)
    }
}

// =============================================================================
// TESTS
// =============================================================================
