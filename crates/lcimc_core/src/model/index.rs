use std::hash::Hash;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::ids::{ActivityKey, FlowKey};

/// Bijection between semantic keys and matrix positions.
///
/// Positions are assigned in insertion order. Serialized as the key list in
/// position order, so position `i` is the `i`-th element on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    from = "Vec<K>",
    into = "Vec<K>",
    bound(
        serialize = "K: Serialize + Clone",
        deserialize = "K: Deserialize<'de> + Eq + Hash + Clone"
    )
)]
pub struct IndexDict<K: Eq + Hash> {
    keys: Vec<K>,
    lookup: FxHashMap<K, usize>,
}

impl<K: Eq + Hash + Clone> IndexDict<K> {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            lookup: FxHashMap::default(),
        }
    }

    /// Insert a key, returning its position; existing keys keep theirs
    pub fn insert(&mut self, key: K) -> usize {
        if let Some(&idx) = self.lookup.get(&key) {
            return idx;
        }
        let idx = self.keys.len();
        self.lookup.insert(key.clone(), idx);
        self.keys.push(key);
        idx
    }

    pub fn get(&self, key: &K) -> Option<usize> {
        self.lookup.get(key).copied()
    }

    pub fn key(&self, idx: usize) -> Option<&K> {
        self.keys.get(idx)
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lookup.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for IndexDict<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> From<Vec<K>> for IndexDict<K> {
    fn from(keys: Vec<K>) -> Self {
        let mut dict = IndexDict::new();
        for key in keys {
            dict.insert(key);
        }
        dict
    }
}

impl<K: Eq + Hash> From<IndexDict<K>> for Vec<K> {
    fn from(dict: IndexDict<K>) -> Self {
        dict.keys
    }
}

impl<K: Eq + Hash> PartialEq for IndexDict<K> {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

/// Canonical index dictionaries of one job, fixed before sampling starts
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReferenceIndex {
    /// Activity -> column of A and B
    pub activities: IndexDict<ActivityKey>,
    /// Product -> row of A
    pub products: IndexDict<ActivityKey>,
    /// Elementary flow -> row of B
    pub flows: IndexDict<FlowKey>,
}
