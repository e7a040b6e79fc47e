//! Contract storage keys, write outcomes and the backing store interface.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use tessera_types::Address;
use thiserror::Error;

use crate::overlay::StateChanges;
use crate::primitives::SENTINEL;

/// Length of a `Fixed` storage key.
pub const FIXED_KEY_LEN: u32 = 32;

/// Default upper bound for variable-length keys.
pub const MAX_STORAGE_KEY_LEN: u32 = 128;

/// How a host function received its storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Exactly [`FIXED_KEY_LEN`] bytes.
    Fixed,
    /// Length passed explicitly by the guest.
    Variable(u32),
}

impl KeyType {
    pub fn len(&self) -> u32 {
        match self {
            KeyType::Fixed => FIXED_KEY_LEN,
            KeyType::Variable(len) => *len,
        }
    }
}

/// A storage key scoped to the contract that owns it.
///
/// Encoded as `<hex(contract address)>/<hex(raw key)>`, so two contracts never
/// collide on the same raw key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(String);

impl StateKey {
    pub fn new(contract: &Address, key: &[u8]) -> Self {
        Self(format!("{}/{}", contract.to_hex(), hex::encode(key)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKey({})", self.0)
    }
}

/// What a write replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Nothing was written under the key in this invocation.
    New,
    /// A value was replaced. `is_zero` is set when every byte of it was zero.
    Overwritten { prior_len: u32, is_zero: bool },
    /// A value was replaced and handed back to the caller.
    Taken(Vec<u8>),
}

impl WriteOutcome {
    pub(crate) fn overwritten(prior: &[u8]) -> Self {
        WriteOutcome::Overwritten {
            prior_len: len_u32(prior),
            is_zero: is_all_zero(prior),
        }
    }

    /// Size of the replaced value, 0 for `New`.
    pub fn old_len(&self) -> u32 {
        match self {
            WriteOutcome::New => 0,
            WriteOutcome::Overwritten { prior_len, .. } => *prior_len,
            WriteOutcome::Taken(value) => len_u32(value),
        }
    }

    /// Size of the replaced value as reported to the guest.
    ///
    /// `New` maps to [`SENTINEL`]. A prior value made only of zero bytes
    /// reports length 0.
    pub fn old_len_with_sentinel(&self) -> u32 {
        match self {
            WriteOutcome::New => SENTINEL,
            WriteOutcome::Overwritten { is_zero: true, .. } => 0,
            WriteOutcome::Overwritten { prior_len, .. } => *prior_len,
            WriteOutcome::Taken(value) if is_all_zero(value) => 0,
            WriteOutcome::Taken(value) => len_u32(value),
        }
    }
}

fn is_all_zero(value: &[u8]) -> bool {
    value.iter().all(|b| *b == 0)
}

fn len_u32(value: &[u8]) -> u32 {
    u32::try_from(value.len()).unwrap_or(u32::MAX)
}

/// Errors reported by a [`BackingStore`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupted entry for {key}: {reason}")]
    Corrupted { key: String, reason: String },
}

/// The committed chain state the overlay reads through to.
///
/// Lookups block the calling thread.
pub trait BackingStore: Send + Sync {
    fn get_state(&self, key: &StateKey) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Reference store backed by a hash map.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<HashMap<StateKey, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: StateKey, value: Vec<u8>) {
        self.state.write().insert(key, value);
    }

    pub fn get(&self, key: &StateKey) -> Option<Vec<u8>> {
        self.state.read().get(key).cloned()
    }

    pub fn remove(&self, key: &StateKey) -> Option<Vec<u8>> {
        self.state.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    /// Commit an invocation's writes and deletes.
    pub fn apply(&self, changes: &StateChanges) {
        let mut state = self.state.write();
        for key in changes.deletes.keys() {
            state.remove(key);
        }
        for (key, value) in &changes.writes {
            state.insert(key.clone(), value.clone());
        }
    }
}

impl BackingStore for InMemoryStore {
    fn get_state(&self, key: &StateKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.get(key))
    }
}
