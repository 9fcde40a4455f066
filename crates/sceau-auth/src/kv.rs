//! Injected durable key-value store boundary.
//!
//! The engine treats persistence as an external service: a small string/u64
//! slot store with an atomic batch apply. The encrypted token blob and its
//! plaintext metadata are always written through one [`Batch`] so readers
//! never observe metadata without its blob (or vice versa).
//!
//! [`MemoryStore`] is the in-process implementation used by tests and as a
//! default backend for hosts without platform storage.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;

/// A single mutation inside a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Write a string slot.
    PutString(String, String),
    /// Write a numeric slot.
    PutU64(String, u64),
    /// Remove a slot of either type.
    Remove(String),
}

/// An ordered set of mutations applied atomically.
#[derive(Debug, Default, Clone)]
#[must_use]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a string write.
    pub fn put_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(BatchOp::PutString(key.into(), value.into()));
        self
    }

    /// Queue a numeric write.
    pub fn put_u64(mut self, key: impl Into<String>, value: u64) -> Self {
        self.ops.push(BatchOp::PutU64(key.into(), value));
        self
    }

    /// Queue a removal.
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.ops.push(BatchOp::Remove(key.into()));
        self
    }

    /// The queued operations, in application order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Whether the batch holds no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Durable key-value store contract.
///
/// Implementations must apply a [`Batch`] atomically with respect to
/// concurrent readers and must be callable from worker threads
/// (synchronous from the engine's point of view).
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read a string slot.
    fn get_string(&self, key: &str) -> Option<String>;

    /// Write a string slot. Returns `false` if the write was rejected.
    fn put_string(&self, key: &str, value: &str) -> bool;

    /// Read a numeric slot.
    fn get_u64(&self, key: &str) -> Option<u64>;

    /// Write a numeric slot. Returns `false` if the write was rejected.
    fn put_u64(&self, key: &str, value: u64) -> bool;

    /// Remove a slot of either type. Returns `false` if the removal failed.
    fn remove(&self, key: &str) -> bool;

    /// Apply all operations atomically. Returns `false` if nothing was
    /// applied (implementations must not partially apply).
    fn apply(&self, batch: Batch) -> bool;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Slot value — string or number.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Text(String),
    Number(u64),
}

/// In-memory [`KeyValueStore`] backed by an `RwLock`ed map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        let slots = self.slots.read().ok()?;
        match slots.get(key) {
            Some(Slot::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn put_string(&self, key: &str, value: &str) -> bool {
        self.slots.write().map_or(false, |mut slots| {
            slots.insert(key.to_owned(), Slot::Text(value.to_owned()));
            true
        })
    }

    fn get_u64(&self, key: &str) -> Option<u64> {
        let slots = self.slots.read().ok()?;
        match slots.get(key) {
            Some(Slot::Number(value)) => Some(*value),
            _ => None,
        }
    }

    fn put_u64(&self, key: &str, value: u64) -> bool {
        self.slots.write().map_or(false, |mut slots| {
            slots.insert(key.to_owned(), Slot::Number(value));
            true
        })
    }

    fn remove(&self, key: &str) -> bool {
        self.slots.write().map_or(false, |mut slots| {
            slots.remove(key);
            true
        })
    }

    fn apply(&self, batch: Batch) -> bool {
        // One write guard for the whole batch — readers see all or nothing.
        self.slots.write().map_or(false, |mut slots| {
            for op in batch.ops() {
                match op {
                    BatchOp::PutString(key, value) => {
                        slots.insert(key.clone(), Slot::Text(value.clone()));
                    }
                    BatchOp::PutU64(key, value) => {
                        slots.insert(key.clone(), Slot::Number(*value));
                    }
                    BatchOp::Remove(key) => {
                        slots.remove(key);
                    }
                }
            }
            true
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
