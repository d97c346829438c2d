//! Deterministic document id generation.
//!
//! Ids are derived from a BLAKE3 hash of the creation context plus a
//! nanosecond timestamp, truncated to the 20-character form the
//! document store uses.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::model::NodeId;

const ID_LEN: usize = 20;

/// Generate a fresh node id from a creation-context seed
/// (e.g. `"<parent-id>:<title>"`).
pub fn new_node_id(seed: &str) -> NodeId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed.as_bytes());
    hasher.update(&now_nanos().to_le_bytes());
    let hash = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash.as_bytes()[..16]);
    let mut id = format!("{:032x}", u128::from_le_bytes(bytes));
    id.truncate(ID_LEN);
    id
}

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_shape() {
        let id = new_node_id("root:New Task");
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_are_unique_per_call() {
        let a = new_node_id("root:New Task");
        let b = new_node_id("root:New Task");
        assert_ne!(a, b);
    }
}
