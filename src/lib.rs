//! Ontograph — collaborative ontology graph engine.
//!
//! A shared, mutable knowledge graph of nodes connected by
//! generalization/specialization edges. Each node carries typed
//! properties that are either set locally or inherited from an
//! ancestor along the generalization chain; editing a property
//! propagates the change to every descendant still inheriting it,
//! while overriding descendants are left untouched.
//!
//! The crate is organized around:
//! - [`graph::GraphStore`] — the in-memory materialized view fed by a
//!   change feed;
//! - [`engine::OntologyEngine`] — the operation facade: property
//!   edits, inheritance policy changes, link/category maintenance,
//!   node lifecycle;
//! - [`batch::BoundedBatchWriter`] — bounded write batches against a
//!   [`store::DocumentStore`] backend (not ACID transactions);
//! - [`locks::AdvisoryLockBoard`] — cooperative "being edited" signals
//!   the write path never depends on.
//!
//! Propagation is deliberately not atomic across a subtree: a failure
//! below one descendant leaves sibling writes committed, and the
//! operation is surfaced to the user as retryable.

pub mod batch;
pub mod collab;
pub mod engine;
pub mod error;
pub mod graph;
pub mod id_gen;
pub mod locks;
pub mod model;
pub mod patch;
pub mod store;

pub use batch::{BoundedBatchWriter, BATCH_CAPACITY, BATCH_SOFT_LIMIT};
pub use collab::{AutoConfirm, Collaborator};
pub use engine::OntologyEngine;
pub use error::{OntologyError, Result};
pub use graph::links::Relation;
pub use graph::{GraphStore, NodeChange};
pub use locks::{AdvisoryLockBoard, LockEvent};
pub use model::{
    ChangeRecord, ChangeType, Inheritance, InheritancePolicy, LinkMap, LinkRef, LockSignal, Node,
    NodeId, PropertyValue, MAIN_CATEGORY,
};
pub use patch::NodePatch;
pub use store::{DeltaLogBackend, DocumentStore, MemoryBackend, PendingWrite};
