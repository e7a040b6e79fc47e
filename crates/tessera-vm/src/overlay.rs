//! Per-invocation storage overlay.
//!
//! Writes and deletes stay local to the invocation and are handed to the
//! commit layer as a [`StateChanges`] set. Reads fall through to the backing
//! store whenever the key has no local write.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_types::Address;

use crate::error::HostError;
use crate::primitives::SENTINEL;
use crate::storage::{BackingStore, StateKey, WriteOutcome, MAX_STORAGE_KEY_LEN};

/// Everything an invocation did to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateChanges {
    /// Final value of every key written and not deleted afterwards.
    pub writes: HashMap<StateKey, Vec<u8>>,
    /// Whether the first observation of each read key found a value.
    pub reads: HashMap<StateKey, bool>,
    /// Keys whose final state is deleted.
    pub deletes: HashMap<StateKey, bool>,
}

impl StateChanges {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.reads.is_empty() && self.deletes.is_empty()
    }
}

/// Write/read/delete tracking for one contract over a backing store.
pub struct StorageOverlay {
    contract: Address,
    store: Arc<dyn BackingStore>,
    max_key_len: u32,
    writes: HashMap<StateKey, Vec<u8>>,
    reads: HashMap<StateKey, bool>,
    deletes: HashMap<StateKey, bool>,
}

impl StorageOverlay {
    pub fn new(contract: Address, store: Arc<dyn BackingStore>) -> Self {
        Self {
            contract,
            store,
            max_key_len: MAX_STORAGE_KEY_LEN,
            writes: HashMap::new(),
            reads: HashMap::new(),
            deletes: HashMap::new(),
        }
    }

    pub fn with_max_key_len(mut self, max_key_len: u32) -> Self {
        self.max_key_len = max_key_len;
        self
    }

    pub fn contract(&self) -> &Address {
        &self.contract
    }

    pub fn state_key(&self, key: &[u8]) -> StateKey {
        StateKey::new(&self.contract, key)
    }

    /// Write `value` under `key`, or delete it when `value` is `None`.
    ///
    /// The outcome only reflects what this invocation wrote earlier; the
    /// backing store is never consulted.
    pub fn set_storage(&mut self, key: &[u8], value: Option<Vec<u8>>, take_old: bool) -> WriteOutcome {
        let state_key = self.state_key(key);

        let outcome = match self.writes.remove(&state_key) {
            None => WriteOutcome::New,
            Some(prior) if take_old => WriteOutcome::Taken(prior),
            Some(prior) => WriteOutcome::overwritten(&prior),
        };

        match value {
            Some(value) => {
                self.deletes.remove(&state_key);
                self.writes.insert(state_key, value);
            }
            // Deleting a key this invocation never wrote changes nothing.
            None if matches!(outcome, WriteOutcome::New) => {}
            None => {
                self.deletes.insert(state_key, true);
            }
        }

        outcome
    }

    /// Current value of `key`: the local write if any, otherwise the backing store.
    ///
    /// Local deletes only remove local writes, so a deleted key reads through
    /// to the committed value. The first observation of each key is recorded
    /// in the read set.
    pub fn get_storage(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, HostError> {
        let state_key = self.state_key(key);

        if let Some(value) = self.writes.get(&state_key) {
            let value = value.clone();
            self.reads.entry(state_key).or_insert(true);
            return Ok(Some(value));
        }

        let value = self
            .store
            .get_state(&state_key)
            .map_err(|e| HostError::Storage(e.to_string()))?;
        tracing::trace!(key = %state_key, found = value.is_some(), "backing store read");
        self.reads.entry(state_key).or_insert(value.is_some());
        Ok(value)
    }

    /// Length of the current value, 0 when absent.
    pub fn get_storage_size(&mut self, key: &[u8]) -> Result<u32, HostError> {
        Ok(self
            .get_storage(key)?
            .map(|value| u32::try_from(value.len()).unwrap_or(u32::MAX))
            .unwrap_or(0))
    }

    /// Length of the current value, [`SENTINEL`] when absent.
    pub fn contains_storage(&mut self, key: &[u8]) -> Result<u32, HostError> {
        Ok(self
            .get_storage(key)?
            .map(|value| u32::try_from(value.len()).unwrap_or(u32::MAX))
            .unwrap_or(SENTINEL))
    }

    pub fn clear_storage(&mut self, key: &[u8]) -> WriteOutcome {
        self.set_storage(key, None, false)
    }

    /// Delete `key` and hand back what this invocation had written under it.
    pub fn take_storage(&mut self, key: &[u8]) -> Result<WriteOutcome, HostError> {
        if key.len() > self.max_key_len as usize {
            return Err(HostError::DecodingFailed);
        }
        Ok(self.set_storage(key, None, true))
    }

    pub fn writes(&self) -> &HashMap<StateKey, Vec<u8>> {
        &self.writes
    }

    pub fn reads(&self) -> &HashMap<StateKey, bool> {
        &self.reads
    }

    pub fn deletes(&self) -> &HashMap<StateKey, bool> {
        &self.deletes
    }

    /// Snapshot of the change set.
    pub fn changes(&self) -> StateChanges {
        StateChanges {
            writes: self.writes.clone(),
            reads: self.reads.clone(),
            deletes: self.deletes.clone(),
        }
    }

    pub fn into_changes(self) -> StateChanges {
        StateChanges {
            writes: self.writes,
            reads: self.reads,
            deletes: self.deletes,
        }
    }
}

impl std::fmt::Debug for StorageOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageOverlay")
            .field("contract", &self.contract)
            .field("writes", &self.writes.len())
            .field("reads", &self.reads.len())
            .field("deletes", &self.deletes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, StoreError};
    use proptest::prelude::*;

    const CONTRACT: Address = Address::from_bytes([0x11; 32]);

    fn overlay_with(entries: &[(&[u8], &[u8])]) -> StorageOverlay {
        let store = InMemoryStore::new();
        for (key, value) in entries {
            store.insert(StateKey::new(&CONTRACT, key), value.to_vec());
        }
        StorageOverlay::new(CONTRACT, Arc::new(store))
    }

    struct FailingStore;

    impl BackingStore for FailingStore {
        fn get_state(&self, _key: &StateKey) -> Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn test_write_then_read() {
        let mut overlay = overlay_with(&[]);
        assert_eq!(overlay.set_storage(b"k", Some(b"v".to_vec()), false), WriteOutcome::New);
        assert_eq!(overlay.get_storage(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(overlay.reads()[&overlay.state_key(b"k")]);
    }

    #[test]
    fn test_outcome_ignores_backing_store() {
        let mut overlay = overlay_with(&[(b"k", b"committed")]);
        assert_eq!(overlay.set_storage(b"k", Some(vec![1]), false), WriteOutcome::New);
        assert_eq!(
            overlay.set_storage(b"k", Some(vec![2, 2]), false),
            WriteOutcome::Overwritten { prior_len: 1, is_zero: false }
        );
    }

    #[test]
    fn test_delete_of_unwritten_key_is_noop() {
        let mut overlay = overlay_with(&[(b"k", b"committed")]);
        assert_eq!(overlay.clear_storage(b"k"), WriteOutcome::New);
        assert!(overlay.changes().is_empty());
        assert_eq!(overlay.get_storage(b"k").unwrap(), Some(b"committed".to_vec()));
        assert!(overlay.reads()[&overlay.state_key(b"k")]);
    }

    #[test]
    fn test_take_backing_only_key_records_nothing() {
        let mut overlay = overlay_with(&[(b"k", b"committed")]);
        assert_eq!(overlay.take_storage(b"k").unwrap(), WriteOutcome::New);
        let changes = overlay.changes();
        assert!(changes.deletes.is_empty());
        assert!(changes.writes.is_empty());
    }

    #[test]
    fn test_delete_of_local_write_reads_through() {
        let mut overlay = overlay_with(&[(b"k", b"committed")]);
        overlay.set_storage(b"k", Some(vec![1]), false);
        assert_eq!(
            overlay.clear_storage(b"k"),
            WriteOutcome::Overwritten { prior_len: 1, is_zero: false }
        );
        assert!(overlay.deletes().contains_key(&overlay.state_key(b"k")));
        assert_eq!(overlay.get_storage(b"k").unwrap(), Some(b"committed".to_vec()));

        let mut fresh = overlay_with(&[]);
        fresh.set_storage(b"k", Some(vec![1]), false);
        fresh.clear_storage(b"k");
        assert_eq!(fresh.contains_storage(b"k").unwrap(), SENTINEL);
    }

    #[test]
    fn test_write_after_delete_revives_key() {
        let mut overlay = overlay_with(&[]);
        overlay.set_storage(b"k", Some(vec![2]), false);
        overlay.clear_storage(b"k");
        assert_eq!(overlay.deletes().len(), 1);
        overlay.set_storage(b"k", Some(vec![3]), false);
        let changes = overlay.changes();
        assert!(changes.deletes.is_empty());
        assert_eq!(changes.writes[&overlay.state_key(b"k")], vec![3]);
    }

    #[test]
    fn test_take_storage() {
        let mut overlay = overlay_with(&[]);
        overlay.set_storage(b"k", Some(b"value".to_vec()), false);
        assert_eq!(overlay.take_storage(b"k").unwrap(), WriteOutcome::Taken(b"value".to_vec()));
        assert_eq!(overlay.take_storage(b"k").unwrap(), WriteOutcome::New);
        assert_eq!(overlay.get_storage(b"k").unwrap(), None);
        assert_eq!(overlay.deletes().len(), 1);
    }

    #[test]
    fn test_take_storage_key_too_long() {
        let mut overlay = overlay_with(&[]).with_max_key_len(4);
        assert_eq!(overlay.take_storage(&[0u8; 5]), Err(HostError::DecodingFailed));
        assert!(overlay.take_storage(&[0u8; 4]).is_ok());
    }

    #[test]
    fn test_sizes() {
        let mut overlay = overlay_with(&[(b"a", b"four")]);
        assert_eq!(overlay.get_storage_size(b"a").unwrap(), 4);
        assert_eq!(overlay.contains_storage(b"a").unwrap(), 4);
        assert_eq!(overlay.get_storage_size(b"missing").unwrap(), 0);
        assert_eq!(overlay.contains_storage(b"missing").unwrap(), SENTINEL);
        overlay.set_storage(b"empty", Some(Vec::new()), false);
        assert_eq!(overlay.contains_storage(b"empty").unwrap(), 0);
    }

    #[test]
    fn test_backing_store_error() {
        let mut overlay = StorageOverlay::new(CONTRACT, Arc::new(FailingStore));
        assert!(matches!(overlay.get_storage(b"k"), Err(HostError::Storage(_))));
        assert!(overlay.reads().is_empty());

        // Local state never reaches the store.
        overlay.set_storage(b"k", Some(vec![1]), false);
        assert_eq!(overlay.get_storage(b"k").unwrap(), Some(vec![1]));
    }

    #[test]
    fn test_first_read_wins() {
        let mut overlay = overlay_with(&[]);
        assert_eq!(overlay.get_storage(b"k").unwrap(), None);
        overlay.set_storage(b"k", Some(vec![1]), false);
        assert_eq!(overlay.get_storage(b"k").unwrap(), Some(vec![1]));
        assert!(!overlay.reads()[&overlay.state_key(b"k")]);
    }

    #[test]
    fn test_into_changes() {
        let mut overlay = overlay_with(&[(b"r", b"x")]);
        overlay.set_storage(b"w", Some(vec![1]), false);
        overlay.get_storage(b"r").unwrap();
        overlay.set_storage(b"d", Some(vec![1]), false);
        overlay.clear_storage(b"d");
        overlay.clear_storage(b"never_written");
        let snapshot = overlay.changes();
        let changes = overlay.into_changes();
        assert_eq!(snapshot, changes);
        assert_eq!(changes.writes.len(), 1);
        assert_eq!(changes.reads.len(), 1);
        assert_eq!(changes.deletes.len(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Set(u8, Vec<u8>),
        Clear(u8),
        Get(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4, proptest::collection::vec(any::<u8>(), 0..8)).prop_map(|(k, v)| Op::Set(k, v)),
            (0u8..4).prop_map(Op::Clear),
            (0u8..4).prop_map(Op::Get),
        ]
    }

    proptest! {
        #[test]
        fn prop_overlay_locality(
            committed in proptest::collection::vec(any::<u8>(), 1..8),
            value in proptest::collection::vec(any::<u8>(), 0..8),
        ) {
            let mut overlay = overlay_with(&[(b"k", committed.as_slice())]);
            overlay.set_storage(b"k", Some(value.clone()), false);
            prop_assert_eq!(overlay.get_storage(b"k").unwrap(), Some(value));
        }

        #[test]
        fn prop_idempotent_delete(times in 2usize..6, written in any::<bool>()) {
            let mut overlay = overlay_with(&[(b"k", b"committed")]);
            if written {
                overlay.set_storage(b"k", Some(vec![1]), false);
            }
            overlay.clear_storage(b"k");
            let once = overlay.changes();
            for _ in 1..times {
                prop_assert_eq!(overlay.clear_storage(b"k"), WriteOutcome::New);
            }
            let key = overlay.state_key(b"k");
            prop_assert_eq!(overlay.changes(), once);
            prop_assert_eq!(overlay.deletes().contains_key(&key), written);
            prop_assert!(!overlay.writes().contains_key(&key));
        }

        #[test]
        fn prop_sentinel_roundtrip(
            first in proptest::collection::vec(any::<u8>(), 0..8),
            second in proptest::collection::vec(any::<u8>(), 0..8),
        ) {
            let mut overlay = overlay_with(&[]);
            prop_assert_eq!(
                overlay.set_storage(b"k", Some(first.clone()), false).old_len_with_sentinel(),
                SENTINEL
            );
            let expected = if first.iter().all(|b| *b == 0) { 0 } else { first.len() as u32 };
            prop_assert_eq!(
                overlay.set_storage(b"k", Some(second), false).old_len_with_sentinel(),
                expected
            );
        }

        #[test]
        fn prop_read_once_audit(
            committed in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..8)),
            ops in proptest::collection::vec(op(), 0..16),
        ) {
            // Ops address keys 0..4, so they keep touching the audited key.
            const KEY: &[u8] = &[0];
            let entries: Vec<(&[u8], &[u8])> =
                committed.iter().map(|v| (KEY, v.as_slice())).collect();
            let mut overlay = overlay_with(&entries);
            let first = overlay.get_storage(KEY).unwrap().is_some();
            prop_assert_eq!(first, committed.is_some());

            for op in ops {
                match op {
                    Op::Set(k, v) => { overlay.set_storage(&[k], Some(v), false); }
                    Op::Clear(k) => { overlay.clear_storage(&[k]); }
                    Op::Get(k) => { overlay.get_storage(&[k]).unwrap(); }
                }
                overlay.get_storage(KEY).unwrap();
                prop_assert_eq!(overlay.reads()[&overlay.state_key(KEY)], first);
            }
        }

        #[test]
        fn prop_final_state_is_write_xor_delete(ops in proptest::collection::vec(op(), 0..32)) {
            let mut overlay = overlay_with(&[]);
            for op in ops {
                match op {
                    Op::Set(k, v) => { overlay.set_storage(&[k], Some(v), false); }
                    Op::Clear(k) => { overlay.clear_storage(&[k]); }
                    Op::Get(k) => { overlay.get_storage(&[k]).unwrap(); }
                }
            }
            let changes = overlay.changes();
            for key in changes.writes.keys() {
                prop_assert!(!changes.deletes.contains_key(key));
            }
        }
    }
}
