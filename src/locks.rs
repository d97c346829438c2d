//! Advisory per-node-per-field edit locks.
//!
//! Purely cooperative: signals are broadcast alongside edits so UIs can
//! render a "locked" indicator, but the write path never consults them
//! — engine correctness must not depend on lock state. Releases flag
//! the lock document `deleted` rather than removing it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::error::Result;
use crate::model::{now_millis, LockSignal, NodeId};
use crate::store::DocumentStore;

/// One lock transition broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum LockEvent {
    Acquired(LockSignal),
    Released {
        node: NodeId,
        field: String,
        actor: String,
    },
}

/// Board of currently-signalled locks.
pub struct AdvisoryLockBoard {
    backend: Arc<dyn DocumentStore>,
    active: Mutex<HashMap<(NodeId, String), LockSignal>>,
    subscribers: Mutex<Vec<Sender<LockEvent>>>,
}

impl AdvisoryLockBoard {
    pub(crate) fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self {
            backend,
            active: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Signal that `actor` is editing `field` of `node`. A newer signal
    /// for the same field replaces the previous holder — advisory locks
    /// never block.
    pub fn acquire(&self, node: &str, field: &str, actor: &str) -> Result<LockSignal> {
        let signal = LockSignal {
            node: node.to_string(),
            field: field.to_string(),
            actor: actor.to_string(),
            created_at: now_millis(),
            deleted: false,
        };
        self.backend.put_lock(&signal)?;
        self.active
            .lock()
            .unwrap()
            .insert((signal.node.clone(), signal.field.clone()), signal.clone());
        self.broadcast(LockEvent::Acquired(signal.clone()));
        debug!(node, field, actor, "lock signalled");
        Ok(signal)
    }

    /// Clear the signal on save or cancel. Only the actor who set a
    /// lock clears it; anyone else's release is a no-op returning
    /// false.
    pub fn release(&self, node: &str, field: &str, actor: &str) -> Result<bool> {
        let key = (node.to_string(), field.to_string());
        {
            let mut active = self.active.lock().unwrap();
            match active.get(&key) {
                Some(holder) if holder.actor == actor => {
                    active.remove(&key);
                }
                _ => return Ok(false),
            }
        }
        self.backend.release_lock(node, field, actor)?;
        self.broadcast(LockEvent::Released {
            node: node.to_string(),
            field: field.to_string(),
            actor: actor.to_string(),
        });
        Ok(true)
    }

    /// Current holder of a field lock, if any.
    pub fn holder(&self, node: &str, field: &str) -> Option<LockSignal> {
        self.active
            .lock()
            .unwrap()
            .get(&(node.to_string(), field.to_string()))
            .cloned()
    }

    /// Subscribe to lock transitions.
    pub fn subscribe(&self) -> Receiver<LockEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn broadcast(&self, event: LockEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
