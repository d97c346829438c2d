//! Ephemeral in-memory backend.
//!
//! Used by tests and short-lived tooling. Instrumented with commit
//! counters so batch-boundary behavior can be asserted, and with a
//! failure injector for exercising the retry path.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use tracing::warn;

use crate::error::Result;
use crate::model::{ChangeRecord, LockSignal, Node, NodeId};
use crate::store::{DocumentStore, PendingWrite};

#[derive(Default)]
struct Inner {
    nodes: HashMap<NodeId, Node>,
    changes: Vec<ChangeRecord>,
    locks: Vec<LockSignal>,
    commits: usize,
    batch_sizes: Vec<usize>,
    failures_left: usize,
}

/// In-memory `DocumentStore`.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded backend.
    pub fn with_nodes(nodes: Vec<Node>) -> Self {
        let backend = Self::new();
        {
            let mut inner = backend.inner.lock().unwrap();
            for node in nodes {
                inner.nodes.insert(node.id.clone(), node);
            }
        }
        backend
    }

    /// Make the next `n` commits fail with an IO error.
    pub fn fail_next_commits(&self, n: usize) {
        self.inner.lock().unwrap().failures_left = n;
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.inner.lock().unwrap().commits
    }

    /// Mutation counts of the successful commits, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.inner.lock().unwrap().batch_sizes.clone()
    }

    /// Largest committed batch, 0 if none.
    pub fn max_batch_size(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .batch_sizes
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
    }

    /// Committed state of one node document.
    pub fn node(&self, id: &str) -> Option<Node> {
        self.inner.lock().unwrap().nodes.get(id).cloned()
    }

    /// All lock documents, released ones included.
    pub fn locks(&self) -> Vec<LockSignal> {
        self.inner.lock().unwrap().locks.clone()
    }
}

impl DocumentStore for MemoryBackend {
    fn load_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.inner.lock().unwrap().nodes.values().cloned().collect())
    }

    fn commit(&self, batch: &[PendingWrite]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failures_left > 0 {
            inner.failures_left -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "injected commit failure").into());
        }
        for write in batch {
            match write {
                PendingWrite::Put(node) => {
                    inner.nodes.insert(node.id.clone(), node.clone());
                }
                PendingWrite::Patch { node, patch } => match inner.nodes.get_mut(node) {
                    Some(doc) => patch.apply(doc),
                    // Per-document last-write-wins: a patch for a document
                    // another writer removed is dropped, not fatal.
                    None => warn!(node = %node, "patch for unknown document dropped"),
                },
            }
        }
        inner.commits += 1;
        inner.batch_sizes.push(batch.len());
        Ok(())
    }

    fn append_change(&self, entry: &ChangeRecord) -> Result<()> {
        self.inner.lock().unwrap().changes.push(entry.clone());
        Ok(())
    }

    fn changes(&self) -> Result<Vec<ChangeRecord>> {
        Ok(self.inner.lock().unwrap().changes.clone())
    }

    fn put_lock(&self, lock: &LockSignal) -> Result<()> {
        self.inner.lock().unwrap().locks.push(lock.clone());
        Ok(())
    }

    fn release_lock(&self, node: &str, field: &str, actor: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for lock in inner.locks.iter_mut() {
            if lock.node == node && lock.field == field && lock.actor == actor {
                lock.deleted = true;
            }
        }
        Ok(())
    }
}
