//! Bounded write batches against the document store.
//!
//! A batch is a write group capped at a fixed mutation count — NOT an
//! ACID transaction. The writer accumulates pending writes, commits and
//! reopens when the soft limit is crossed, and materializes every write
//! into the in-memory view as it is enqueued so the initiating walk
//! reads its own writes. `flush` must be called when the initiating
//! operation finishes, even after a partial failure.

use tracing::warn;

use crate::error::{OntologyError, Result};
use crate::graph::GraphStore;
use crate::model::Node;
use crate::patch::NodePatch;
use crate::store::{DocumentStore, PendingWrite};

/// Hard mutation capacity of one commit.
pub const BATCH_CAPACITY: usize = 500;

/// Commit threshold, leaving headroom for the commit's own bookkeeping
/// writes below `BATCH_CAPACITY`.
pub const BATCH_SOFT_LIMIT: usize = 498;

/// Accumulates per-node writes and commits them in bounded groups.
pub struct BoundedBatchWriter<'a> {
    backend: &'a dyn DocumentStore,
    view: &'a GraphStore,
    pending: Vec<PendingWrite>,
    commits: usize,
    writes: usize,
}

impl<'a> BoundedBatchWriter<'a> {
    pub(crate) fn new(backend: &'a dyn DocumentStore, view: &'a GraphStore) -> Self {
        Self {
            backend,
            view,
            pending: Vec::new(),
            commits: 0,
            writes: 0,
        }
    }

    /// Enqueue a full document write (node creation).
    pub fn put(&mut self, node: Node) -> Result<()> {
        self.view
            .apply(crate::graph::NodeChange::Upsert(node.clone()));
        self.pending.push(PendingWrite::Put(node));
        self.writes += 1;
        self.maybe_commit()
    }

    /// Enqueue a field-level patch. Empty patches are dropped, which is
    /// what makes repeated propagation walks idempotent.
    pub fn enqueue(&mut self, node: &str, patch: NodePatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        self.view.apply_patch(node, &patch);
        self.pending.push(PendingWrite::Patch {
            node: node.to_string(),
            patch,
        });
        self.writes += 1;
        self.maybe_commit()
    }

    /// Commit whatever is pending. Must run at the end of the
    /// initiating operation regardless of walk errors.
    pub fn flush(&mut self) -> Result<()> {
        self.commit_pending()
    }

    /// Successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Total writes enqueued (puts + non-empty patches).
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Writes accumulated but not yet committed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn maybe_commit(&mut self) -> Result<()> {
        if self.pending.len() > BATCH_SOFT_LIMIT {
            self.commit_pending()
        } else {
            Ok(())
        }
    }

    fn commit_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        if let Err(first) = self.backend.commit(&batch) {
            warn!(
                error = %first,
                writes = batch.len(),
                "batch commit failed, retrying once"
            );
            self.backend
                .commit(&batch)
                .map_err(|e| OntologyError::BatchCommitFailure(e.to_string()))?;
        }
        self.commits += 1;
        Ok(())
    }
}

impl Drop for BoundedBatchWriter<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                writes = self.pending.len(),
                "batch writer dropped with uncommitted writes"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeChange;
    use crate::model::PropertyValue;
    use crate::store::MemoryBackend;

    fn seeded(view: &GraphStore, count: usize) {
        for i in 0..count {
            view.apply(NodeChange::Upsert(Node::new(format!("n{i}"), "Task")));
        }
    }

    #[test]
    fn test_empty_patches_do_not_count() {
        let backend = MemoryBackend::new();
        let view = GraphStore::new();
        seeded(&view, 1);

        let mut writer = BoundedBatchWriter::new(&backend, &view);
        writer.enqueue("n0", NodePatch::new()).unwrap();
        writer.flush().unwrap();

        assert_eq!(writer.write_count(), 0);
        assert_eq!(backend.commit_count(), 0);
    }

    #[test]
    fn test_commits_split_at_soft_limit() {
        let backend = MemoryBackend::new();
        let view = GraphStore::new();
        seeded(&view, 1001);

        let mut writer = BoundedBatchWriter::new(&backend, &view);
        for i in 0..1001 {
            let patch =
                NodePatch::new().property("notes", PropertyValue::Text(format!("v{i}")));
            writer.enqueue(&format!("n{i}"), patch).unwrap();
        }
        writer.flush().unwrap();

        assert_eq!(backend.commit_count(), 3);
        assert_eq!(backend.batch_sizes(), vec![499, 499, 3]);
        assert!(backend.max_batch_size() <= BATCH_CAPACITY);
    }

    #[test]
    fn test_failed_commit_retried_once() {
        let backend = MemoryBackend::new();
        let view = GraphStore::new();
        seeded(&view, 1);

        backend.fail_next_commits(1);
        let mut writer = BoundedBatchWriter::new(&backend, &view);
        writer
            .enqueue("n0", NodePatch::new().title("Renamed"))
            .unwrap();
        writer.flush().unwrap();

        assert_eq!(backend.commit_count(), 1);
        assert_eq!(backend.node("n0").unwrap().title, "Renamed");
    }

    #[test]
    fn test_double_failure_surfaces_batch_commit_failure() {
        let backend = MemoryBackend::new();
        let view = GraphStore::new();
        seeded(&view, 1);

        backend.fail_next_commits(2);
        let mut writer = BoundedBatchWriter::new(&backend, &view);
        writer
            .enqueue("n0", NodePatch::new().title("Renamed"))
            .unwrap();

        let err = writer.flush().unwrap_err();
        assert_eq!(err.code(), "BATCH_COMMIT_FAILURE");
        assert!(err.is_retryable());
        // the view already materialized the write — partial state is tolerated
        assert_eq!(view.get("n0").unwrap().title, "Renamed");
    }
}
