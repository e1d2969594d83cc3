//! Lineage tracking: an ordered, timestamped trace of orchestration steps
//! for one top-level call tree.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Process-monotonic source of tracker ids.
static NEXT_TRACKER_ID: AtomicU64 = AtomicU64::new(0);

/// One recorded orchestration step.
#[derive(Debug, Clone, Serialize)]
pub struct TraceNode {
    /// Step name ("query", "query_valid", "improve", ...).
    pub name: String,

    /// When the step was recorded.
    pub timestamp: DateTime<Utc>,

    /// Opaque step metadata, e.g. transport usage figures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Append-only trace of one orchestration call tree.
///
/// Created lazily by any public operation when the caller supplies none;
/// every nested step appends to it. Appends are mutex-guarded so the trace
/// stays coherent under multi-threaded executors. There is no process-wide
/// registry: callers wanting cross-call aggregation keep their own
/// collection of trackers.
#[derive(Debug)]
pub struct Tracker {
    id: u64,
    nodes: Mutex<Vec<TraceNode>>,
}

impl Tracker {
    /// Create an empty tracker with a process-unique id.
    pub fn new() -> Self {
        Self {
            id: NEXT_TRACKER_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Mutex::new(Vec::new()),
        }
    }

    /// Process-unique id of this tracker.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Append a step to the trace.
    pub fn add_node(&self, name: &str, details: Option<serde_json::Value>) {
        let node = TraceNode {
            name: name.to_string(),
            timestamp: Utc::now(),
            details,
        };
        self.lock_nodes().push(node);
    }

    /// Snapshot of the recorded steps, in append order.
    pub fn nodes(&self) -> Vec<TraceNode> {
        self.lock_nodes().clone()
    }

    /// Number of recorded steps with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.lock_nodes().iter().filter(|node| node.name == name).count()
    }

    fn lock_nodes(&self) -> std::sync::MutexGuard<'_, Vec<TraceNode>> {
        // A poisoned trace is still a trace; keep appending.
        self.nodes.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}
