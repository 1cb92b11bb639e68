// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The counting window: per-key event counts accumulated between recomputes.

use std::{borrow::Borrow, fmt, hash::Hash};

use hashbrown::HashTable;

/// Event counts per key, iterated in the order keys were first seen.
///
/// The iteration order is part of the contract: [`AverageSampleRate`] hands leftover budget to
/// keys in this order, so changing it changes the computed rates.
///
/// [`AverageSampleRate`]: crate::policy::AverageSampleRate
#[derive(Clone)]
pub struct CountTable<K> {
    // indexes into `entries`
    index: HashTable<usize>,
    entries: Vec<(K, u64)>,
    hasher: ahash::RandomState,
}

impl<K> Default for CountTable<K> {
    fn default() -> Self {
        Self {
            index: HashTable::new(),
            entries: Vec::new(),
            hasher: ahash::RandomState::new(),
        }
    }
}

impl<K> CountTable<K> {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys seen.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no event has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of events recorded across every key.
    pub fn total(&self) -> u64 {
        self.entries
            .iter()
            .fold(0u64, |total, (_, count)| total.saturating_add(*count))
    }

    /// Iterate `(key, count)` pairs in first-seen order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&K, u64)> + '_ {
        self.entries.iter().map(|(key, count)| (key, *count))
    }
}

impl<K: Hash + Eq> CountTable<K> {
    /// Count one event for `key`, returning the key's count in this window.
    ///
    /// The owned key is only created the first time `key` is seen.
    ///
    /// ```
    /// use dynsampler::window::CountTable;
    ///
    /// let mut window = CountTable::<String>::new();
    /// window.record("checkout");
    /// window.record("search");
    /// assert_eq!(window.record("checkout"), 2);
    ///
    /// let keys: Vec<_> = window.iter().map(|(key, _)| key.as_str()).collect();
    /// assert_eq!(keys, ["checkout", "search"]);
    /// ```
    pub fn record<Q>(&mut self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        match self.position(hash, key) {
            Some(i) => self.bump(i, 1),
            None => self.push(hash, key.to_owned(), 1),
        }
    }

    /// The count for `key`, if it was seen in this window.
    pub fn get<Q>(&self, key: &Q) -> Option<u64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        self.position(hash, key).map(|i| self.entries[i].1)
    }

    fn position<Q>(&self, hash: u64, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index
            .find(hash, |&i| <K as Borrow<Q>>::borrow(&self.entries[i].0) == key)
            .copied()
    }

    fn bump(&mut self, i: usize, count: u64) -> u64 {
        let slot = &mut self.entries[i].1;
        *slot = slot.saturating_add(count);
        *slot
    }

    fn push(&mut self, hash: u64, key: K, count: u64) -> u64 {
        let i = self.entries.len();
        self.entries.push((key, count));
        let (entries, hasher) = (&self.entries, &self.hasher);
        // `Borrow` guarantees an owned key hashes like its borrowed form
        self.index
            .insert_unique(hash, i, |&i| hasher.hash_one(&entries[i].0));
        count
    }
}

impl<K: Hash + Eq> FromIterator<(K, u64)> for CountTable<K> {
    /// Build a window from `(key, count)` pairs. Repeated keys have their counts summed and keep
    /// the position of their first occurrence.
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let mut window = Self::new();
        for (key, count) in iter {
            let hash = window.hasher.hash_one(&key);
            match window.position(hash, &key) {
                Some(i) => window.bump(i, count),
                None => window.push(hash, key, count),
            };
        }
        window
    }
}

impl<K> IntoIterator for CountTable<K> {
    type Item = (K, u64);
    type IntoIter = std::vec::IntoIter<(K, u64)>;

    /// Consume the window, yielding `(key, count)` pairs in first-seen order.
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: fmt::Debug> fmt::Debug for CountTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
