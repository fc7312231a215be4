//! Ordered string-keyed map with an optional read-only parent
//!
//! Lookups that miss locally fall through to the parent chain. Mutations only
//! ever touch the local level.

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

/// Insertion-ordered string map with parent fallback
#[derive(Debug, Clone)]
pub struct ScopedMap<V> {
    entries: IndexMap<String, V, FxBuildHasher>,
    parent: Option<Arc<ScopedMap<V>>>,
}

impl<V> Default for ScopedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ScopedMap<V> {
    /// Empty map without a parent
    pub fn new() -> Self {
        Self {
            entries: IndexMap::with_hasher(FxBuildHasher),
            parent: None,
        }
    }

    /// Empty map that falls back to `parent`
    pub fn with_parent(parent: Arc<ScopedMap<V>>) -> Self {
        Self {
            entries: IndexMap::with_hasher(FxBuildHasher),
            parent: Some(parent),
        }
    }

    /// Look up `key` here, then in the parent chain
    pub fn get(&self, key: &str) -> Option<&V> {
        match self.entries.get(key) {
            Some(value) => Some(value),
            None => self.parent.as_deref().and_then(|p| p.get(key)),
        }
    }

    /// Look up `key` at this level only
    pub fn get_local(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    /// Mutable lookup at this level only
    pub fn get_local_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    /// Whether `key` resolves anywhere in the chain
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert if absent locally
    ///
    /// Returns the stored value, or gives `value` back if the key is taken.
    pub fn put(&mut self, key: impl Into<String>, value: V) -> Result<&mut V, V> {
        match self.entries.entry(key.into()) {
            indexmap::map::Entry::Occupied(_) => Err(value),
            indexmap::map::Entry::Vacant(slot) => Ok(slot.insert(value)),
        }
    }

    /// Remove a local entry, keeping the order of the rest
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.shift_remove(key)
    }

    /// Number of local entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no local entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Local entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Local entries in insertion order, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut V)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }
}
