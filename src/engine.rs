//! OntologyEngine — the facade owning the materialized view, the
//! persistence backend, the collaborator callbacks and the advisory
//! lock board.
//!
//! Each operation runs as an independent single-writer request: it
//! reads the shared view, accumulates writes through one
//! `BoundedBatchWriter`, and flushes before returning. Operations over
//! overlapping subtrees are NOT serialized against each other — the
//! backend's per-document atomicity gives per-field last-write-wins,
//! and a descendant may end up reflecting whichever concurrent
//! ancestor edit committed last. That trade-off is deliberate.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, warn};

use crate::batch::BoundedBatchWriter;
use crate::collab::{AutoConfirm, Collaborator};
use crate::error::{OntologyError, Result};
use crate::graph::GraphStore;
use crate::locks::AdvisoryLockBoard;
use crate::model::{ChangeRecord, Node};
use crate::patch::NodePatch;
use crate::store::{DocumentStore, MemoryBackend};

pub struct OntologyEngine {
    store: Arc<GraphStore>,
    backend: Arc<dyn DocumentStore>,
    collaborator: Arc<dyn Collaborator>,
    locks: AdvisoryLockBoard,
}

impl OntologyEngine {
    /// Open an engine over `backend`, materializing its node snapshot.
    pub fn new(
        backend: Arc<dyn DocumentStore>,
        collaborator: Arc<dyn Collaborator>,
    ) -> Result<Self> {
        let nodes = backend.load_nodes()?;
        let store = Arc::new(GraphStore::from_nodes(nodes));
        let locks = AdvisoryLockBoard::new(backend.clone());
        Ok(Self {
            store,
            backend,
            collaborator,
            locks,
        })
    }

    /// Ephemeral engine over an empty in-memory backend.
    pub fn in_memory() -> Self {
        let backend: Arc<dyn DocumentStore> = Arc::new(MemoryBackend::new());
        Self {
            store: Arc::new(GraphStore::new()),
            backend: backend.clone(),
            collaborator: Arc::new(AutoConfirm),
            locks: AdvisoryLockBoard::new(backend),
        }
    }

    /// The shared materialized view.
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// The advisory lock board. Orthogonal to the write path.
    pub fn locks(&self) -> &AdvisoryLockBoard {
        &self.locks
    }

    /// Toggle the node-level `locked` flag.
    pub fn set_node_lock(&self, id: &str, locked: bool) -> Result<()> {
        let node = self.node(id)?;
        if node.locked == locked {
            return Ok(());
        }
        let mut batch = self.writer();
        batch.enqueue(id, NodePatch::new().locked(locked))?;
        batch.flush()
    }

    pub(crate) fn writer(&self) -> BoundedBatchWriter<'_> {
        BoundedBatchWriter::new(&*self.backend, &self.store)
    }

    pub(crate) fn node(&self, id: &str) -> Result<Node> {
        self.store
            .get(id)
            .ok_or_else(|| OntologyError::NodeNotFound(id.to_string()))
    }

    pub(crate) fn collaborator(&self) -> &dyn Collaborator {
        &*self.collaborator
    }

    /// Append to the change log and mirror into the usage audit. A
    /// change-log write failure must not abort the edit that caused it.
    pub(crate) fn record_change(&self, record: ChangeRecord) {
        if let Err(e) = self.backend.append_change(&record) {
            warn!(node = %record.node_id, error = %e, "change-log append failed");
        }
        self.collaborator.record_audit_entry(json!({
            "node": record.node_id,
            "changeType": record.change_type,
            "property": record.modified_property,
            "modifiedBy": record.modified_by,
        }));
    }

    /// Flush after a walk, surfacing retryable failures to the user
    /// while keeping whatever partial state was already committed.
    pub(crate) fn finish_walk(
        &self,
        mut batch: BoundedBatchWriter<'_>,
        walk: Result<()>,
        actor: &str,
    ) -> Result<()> {
        let flush = batch.flush();
        let result = walk.and(flush);
        if let Err(e) = &result {
            error!(error = %e, code = e.code(), "operation left partial state");
            if e.is_retryable() {
                self.collaborator.notify_users(
                    "Update incomplete",
                    "Some of your changes were not saved, please retry.",
                    actor,
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeChange;

    #[test]
    fn test_new_materializes_backend_snapshot() {
        let backend = Arc::new(MemoryBackend::with_nodes(vec![
            Node::new("a", "Activity"),
            Node::new("b", "Actor"),
        ]));
        let engine = OntologyEngine::new(backend, Arc::new(AutoConfirm)).unwrap();
        assert_eq!(engine.store().node_count(), 2);
    }

    #[test]
    fn test_node_lookup_reports_missing() {
        let engine = OntologyEngine::in_memory();
        let err = engine.node("ghost").unwrap_err();
        assert_eq!(err.code(), "NODE_NOT_FOUND");
    }

    #[test]
    fn test_set_node_lock_round_trip() {
        let engine = OntologyEngine::in_memory();
        engine
            .store()
            .apply(NodeChange::Upsert(Node::new("n1", "Task")));

        engine.set_node_lock("n1", true).unwrap();
        assert!(engine.store().get("n1").unwrap().locked);

        engine.set_node_lock("n1", false).unwrap();
        assert!(!engine.store().get("n1").unwrap().locked);
    }
}
