//! Insert-once resolution memo.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::resolver::{ResolutionKey, ResolutionResult};

/// Map from resolution key to result, written at most once per key.
///
/// Concurrent resolution of the same key is harmless: results for a fixed
/// store snapshot are identical, and the first writer wins.
#[derive(Debug, Default)]
pub struct ResolutionMemo {
    // Entries are never mutated after insert, so a poisoned lock still
    // guards consistent data.
    entries: RwLock<HashMap<ResolutionKey, ResolutionResult>>,
}

impl ResolutionMemo {
    /// Creates an empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored result for a key.
    #[must_use]
    pub fn get(&self, key: &ResolutionKey) -> Option<ResolutionResult> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Stores `result` unless the key is already present, and returns the
    /// stored value.
    pub fn insert_once(&self, key: ResolutionKey, result: ResolutionResult) -> ResolutionResult {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(result)
            .clone()
    }

    /// Returns the stored result, computing and storing it on a miss.
    ///
    /// `resolve` runs outside the lock.
    pub fn get_or_resolve<F>(&self, key: &ResolutionKey, resolve: F) -> ResolutionResult
    where
        F: FnOnce(&ResolutionKey) -> ResolutionResult,
    {
        if let Some(hit) = self.get(key) {
            return hit;
        }
        let result = resolve(key);
        self.insert_once(key.clone(), result)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the memo, returning the underlying map.
    #[must_use]
    pub fn into_map(self) -> HashMap<ResolutionKey, ResolutionResult> {
        self.entries.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
