//! Document-oriented persistence seam.
//!
//! The engine reads and writes three collections: `nodes`, `locks` and
//! the append-only `change-log`. `DocumentStore` is the trait boundary
//! the batched writer commits through; `MemoryBackend` is the ephemeral
//! implementation used in tests, `DeltaLogBackend` the disk-backed one.

pub mod delta;
pub mod memory;

pub use delta::DeltaLogBackend;
pub use memory::MemoryBackend;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{ChangeRecord, LockSignal, Node, NodeId};
use crate::patch::NodePatch;

/// One mutation of a bounded write batch: a full document write or a
/// sparse field-level patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingWrite {
    Put(Node),
    Patch { node: NodeId, patch: NodePatch },
}

impl PendingWrite {
    pub fn node_id(&self) -> &str {
        match self {
            PendingWrite::Put(node) => &node.id,
            PendingWrite::Patch { node, .. } => node,
        }
    }
}

/// Backend storage for the three collections.
///
/// `commit` is atomic per document only — a batch is a bounded write
/// group, not an ACID transaction. Implementations must be safe to
/// share across request threads.
pub trait DocumentStore: Send + Sync {
    /// Load every node document, tombstones included.
    fn load_nodes(&self) -> Result<Vec<Node>>;

    /// Apply a bounded batch of writes to the `nodes` collection.
    fn commit(&self, batch: &[PendingWrite]) -> Result<()>;

    /// Append one entry to the `change-log` collection.
    fn append_change(&self, entry: &ChangeRecord) -> Result<()>;

    /// All change-log entries in append order.
    fn changes(&self) -> Result<Vec<ChangeRecord>>;

    /// Upsert an advisory lock signal in the `locks` collection.
    fn put_lock(&self, lock: &LockSignal) -> Result<()>;

    /// Flag a lock released (`deleted = true`), never removing it.
    fn release_lock(&self, node: &str, field: &str, actor: &str) -> Result<()>;
}
