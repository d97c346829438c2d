//! In-memory materialized view of the ontology graph.
//!
//! `GraphStore` indexes all non-deleted nodes by id and is the single
//! source of truth engine operations read from. It is kept current by
//! the change-feed absorber (`apply`) and by the batch writer's local
//! materialization; readers never block each other and may observe a
//! node mid-propagation — the view is eventually consistent.

pub mod categories;
pub mod inheritance;
pub mod lifecycle;
pub mod links;

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::model::{Node, NodeId};
use crate::patch::NodePatch;

/// One change-feed event absorbed into the view.
#[derive(Debug, Clone)]
pub enum NodeChange {
    Upsert(Node),
    Remove(NodeId),
}

type Predicate = Box<dyn Fn(&Node) -> bool + Send + Sync>;

struct Subscriber {
    predicate: Predicate,
    tx: Sender<Node>,
}

/// Id-indexed view of all live nodes.
pub struct GraphStore {
    nodes: RwLock<HashMap<NodeId, Node>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Build the view from a backend snapshot, skipping tombstones.
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        let store = Self::new();
        {
            let mut index = store.nodes.write().unwrap();
            index.reserve(nodes.len());
            for node in nodes {
                if !node.deleted {
                    index.insert(node.id.clone(), node);
                }
            }
        }
        store
    }

    /// Point lookup by id. O(1).
    pub fn get(&self, id: &str) -> Option<Node> {
        self.nodes.read().unwrap().get(id).cloned()
    }

    /// True if a live node with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.read().unwrap().contains_key(id)
    }

    /// Snapshot of every live node. No ordering guarantee.
    pub fn all(&self) -> Vec<Node> {
        self.nodes.read().unwrap().values().cloned().collect()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.read().unwrap().len()
    }

    /// Absorb one change-feed event.
    ///
    /// An upsert carrying `deleted = true` evicts the node from the
    /// index; subscribers still see the tombstoned document so UI
    /// consumers can react to the deletion.
    pub fn apply(&self, change: NodeChange) {
        match change {
            NodeChange::Upsert(node) => {
                {
                    let mut index = self.nodes.write().unwrap();
                    if node.deleted {
                        index.remove(&node.id);
                    } else {
                        index.insert(node.id.clone(), node.clone());
                    }
                }
                self.notify(&node);
            }
            NodeChange::Remove(id) => {
                let removed = self.nodes.write().unwrap().remove(&id);
                if let Some(mut node) = removed {
                    node.deleted = true;
                    self.notify(&node);
                }
            }
        }
    }

    /// Merge a patch into the indexed node. Returns false when the node
    /// is not in the view (deleted or never seen).
    pub(crate) fn apply_patch(&self, id: &str, patch: &NodePatch) -> bool {
        let updated = {
            let mut index = self.nodes.write().unwrap();
            match index.get_mut(id) {
                Some(node) => {
                    patch.apply(node);
                    let evict = node.deleted;
                    let snapshot = node.clone();
                    if evict {
                        index.remove(id);
                    }
                    Some(snapshot)
                }
                None => None,
            }
        };
        match updated {
            Some(node) => {
                self.notify(&node);
                true
            }
            None => {
                debug!(node = %id, "patch skipped, node not in view");
                false
            }
        }
    }

    /// Register a consumer for nodes matching `predicate`.
    ///
    /// Every absorbed change whose node matches is delivered on the
    /// returned channel. Disconnected consumers are pruned lazily.
    pub fn subscribe<F>(&self, predicate: F) -> Receiver<Node>
    where
        F: Fn(&Node) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(Subscriber {
            predicate: Box::new(predicate),
            tx,
        });
        rx
    }

    fn notify(&self, node: &Node) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|sub| {
            if (sub.predicate)(node) {
                sub.tx.send(node.clone()).is_ok()
            } else {
                true
            }
        });
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
