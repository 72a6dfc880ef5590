//! State Backend (C9)
//!
//! A keyed, single-writer state store with logical checkpoint/restore.
//! Generic over the stored value so the stream processor can keep one
//! backend for per-user window state and another for per-channel state,
//! without duplicating the snapshot machinery.
//!
//! Checkpoints are copy-on-write: `checkpoint()` clones the current map
//! behind the lock (cheap — `Arc`-free clone of a small map) and hands back
//! an opaque id; `restore()` swaps the whole map back in atomically. This
//! matches the "quiesce briefly or copy-on-write" guidance for capturing a
//! consistent cut.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::ModerationError;

pub struct StateBackend<V: Clone> {
    name: &'static str,
    store: RwLock<HashMap<String, V>>,
    checkpoints: RwLock<HashMap<u64, HashMap<String, V>>>,
    next_checkpoint_id: RwLock<u64>,
}

impl<V: Clone> StateBackend<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            store: RwLock::new(HashMap::new()),
            checkpoints: RwLock::new(HashMap::new()),
            next_checkpoint_id: RwLock::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.store.read().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: V) -> Result<(), ModerationError> {
        self.store.write().insert(key.to_string(), value);
        Ok(())
    }

    pub fn clear(&self, key: &str) {
        self.store.write().remove(key);
    }

    /// Evicts keys for which `predicate` returns true. Used by the
    /// background sweep to drop idle per-user window state.
    pub fn retain(&self, predicate: impl Fn(&str, &V) -> bool) {
        self.store.write().retain(|k, v| predicate(k, v));
    }

    /// Mutates every value in place without removing keys. Used by the
    /// background sweep to prune stale entries out of otherwise-live window
    /// state (e.g. messages older than the retention window), as distinct
    /// from `retain`, which drops whole keys.
    pub fn prune_all(&self, mut prune: impl FnMut(&mut V)) {
        for value in self.store.write().values_mut() {
            prune(value);
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    /// Takes a logical snapshot, returning an opaque checkpoint id.
    pub fn checkpoint(&self) -> u64 {
        let snapshot = self.store.read().clone();
        let mut next_id = self.next_checkpoint_id.write();
        let id = *next_id;
        *next_id += 1;
        self.checkpoints.write().insert(id, snapshot);
        id
    }

    /// Restores the entire backend atomically from a prior checkpoint.
    pub fn restore(&self, id: u64) -> Result<(), ModerationError> {
        let snapshot = self
            .checkpoints
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| ModerationError::StateUnavailable {
                key: self.name.to_string(),
                reason: format!("no checkpoint with id {id}"),
            })?;
        *self.store.write() = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let backend: StateBackend<u32> = StateBackend::new("test");
        backend.put("k1", 42).unwrap();
        assert_eq!(backend.get("k1"), Some(42));
    }

    #[test]
    fn checkpoint_restore_replay_yields_identical_state() {
        let backend: StateBackend<u32> = StateBackend::new("test");
        backend.put("k1", 1).unwrap();
        let cp = backend.checkpoint();
        backend.put("k1", 2).unwrap();
        backend.put("k2", 99).unwrap();
        backend.restore(cp).unwrap();
        assert_eq!(backend.get("k1"), Some(1));
        assert_eq!(backend.get("k2"), None);
    }

    #[test]
    fn restore_of_unknown_checkpoint_is_state_unavailable() {
        let backend: StateBackend<u32> = StateBackend::new("test");
        let err = backend.restore(999).unwrap_err();
        assert!(matches!(err, ModerationError::StateUnavailable { .. }));
    }

    #[test]
    fn prune_all_mutates_every_value_in_place() {
        let backend: StateBackend<Vec<u32>> = StateBackend::new("test");
        backend.put("a", vec![1, 2, 3]).unwrap();
        backend.put("b", vec![4, 5]).unwrap();
        backend.prune_all(|v| v.retain(|x| *x % 2 == 0));
        assert_eq!(backend.get("a"), Some(vec![2]));
        assert_eq!(backend.get("b"), Some(vec![4]));
    }

    #[test]
    fn retain_evicts_matching_entries() {
        let backend: StateBackend<u32> = StateBackend::new("test");
        backend.put("stale", 1).unwrap();
        backend.put("fresh", 2).unwrap();
        backend.retain(|k, _| k != "stale");
        assert_eq!(backend.get("stale"), None);
        assert_eq!(backend.get("fresh"), Some(2));
    }
}
