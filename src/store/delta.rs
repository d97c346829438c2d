//! Disk-backed delta-log persistence.
//!
//! Every commit, change-log entry and lock signal is appended as one
//! JSON line. Opening a log replays it into memory; reads are served
//! from the replayed state. Documents carry self-describing value
//! shapes (a property is either text or a category map), so the log
//! format must be self-describing too. Compaction is a deliberate
//! non-feature: the log is the audit trail.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{now_millis, ChangeRecord, LockSignal, Node, NodeId};
use crate::store::{DocumentStore, PendingWrite};

#[derive(Debug, Serialize, Deserialize)]
enum LogRecord {
    Commit(Vec<PendingWrite>),
    Change(ChangeRecord),
    Lock(LockSignal),
    LockRelease {
        node: NodeId,
        field: String,
        actor: String,
        released_at: u64,
    },
}

#[derive(Default)]
struct Replayed {
    nodes: HashMap<NodeId, Node>,
    changes: Vec<ChangeRecord>,
    locks: Vec<LockSignal>,
}

impl Replayed {
    fn absorb(&mut self, record: LogRecord) {
        match record {
            LogRecord::Commit(batch) => {
                for write in batch {
                    match write {
                        PendingWrite::Put(node) => {
                            self.nodes.insert(node.id.clone(), node);
                        }
                        PendingWrite::Patch { node, patch } => {
                            match self.nodes.get_mut(&node) {
                                Some(doc) => patch.apply(doc),
                                None => warn!(node = %node, "replayed patch for unknown document"),
                            }
                        }
                    }
                }
            }
            LogRecord::Change(entry) => self.changes.push(entry),
            LogRecord::Lock(lock) => self.locks.push(lock),
            LogRecord::LockRelease {
                node, field, actor, ..
            } => {
                for lock in self.locks.iter_mut() {
                    if lock.node == node && lock.field == field && lock.actor == actor {
                        lock.deleted = true;
                    }
                }
            }
        }
    }
}

/// Append-only file-backed `DocumentStore`.
pub struct DeltaLogBackend {
    path: PathBuf,
    file: Mutex<File>,
    state: Mutex<Replayed>,
}

impl DeltaLogBackend {
    /// Open (or create) the delta log at `path` and replay it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = Replayed::default();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let mut replayed = 0usize;
            for line in reader.lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                state.absorb(serde_json::from_str(&line)?);
                replayed += 1;
            }
            debug!(path = %path.display(), records = replayed, "delta log replayed");
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            state: Mutex::new(state),
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &LogRecord) -> Result<()> {
        let mut payload = serde_json::to_vec(record)?;
        payload.push(b'\n');
        let mut file = self.file.lock().unwrap();
        file.write_all(&payload)?;
        file.flush()?;
        Ok(())
    }
}

impl DocumentStore for DeltaLogBackend {
    fn load_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.state.lock().unwrap().nodes.values().cloned().collect())
    }

    fn commit(&self, batch: &[PendingWrite]) -> Result<()> {
        self.append(&LogRecord::Commit(batch.to_vec()))?;
        self.state
            .lock()
            .unwrap()
            .absorb(LogRecord::Commit(batch.to_vec()));
        Ok(())
    }

    fn append_change(&self, entry: &ChangeRecord) -> Result<()> {
        self.append(&LogRecord::Change(entry.clone()))?;
        self.state.lock().unwrap().changes.push(entry.clone());
        Ok(())
    }

    fn changes(&self) -> Result<Vec<ChangeRecord>> {
        Ok(self.state.lock().unwrap().changes.clone())
    }

    fn put_lock(&self, lock: &LockSignal) -> Result<()> {
        self.append(&LogRecord::Lock(lock.clone()))?;
        self.state.lock().unwrap().locks.push(lock.clone());
        Ok(())
    }

    fn release_lock(&self, node: &str, field: &str, actor: &str) -> Result<()> {
        let release = LogRecord::LockRelease {
            node: node.to_string(),
            field: field.to_string(),
            actor: actor.to_string(),
            released_at: now_millis(),
        };
        self.append(&release)?;
        self.state.lock().unwrap().absorb(release);
        Ok(())
    }
}
