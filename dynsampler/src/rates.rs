// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The published sample rates, read on every call to
//! [`Sampler::record_and_get_rate`](crate::Sampler::record_and_get_rate).

use std::{borrow::Borrow, fmt, hash::Hash};

use ahash::HashMap;

/// Sample rates per key, as computed by the last recompute.
///
/// A rate of `n` means "keep one in `n` events". Tables are built by a [`Policy`] and published
/// as a whole; they are never mutated after that.
///
/// [`Policy`]: crate::policy::Policy
pub struct RateTable<K> {
    rates: HashMap<K, f64>,
}

impl<K> Default for RateTable<K> {
    fn default() -> Self {
        Self {
            rates: HashMap::default(),
        }
    }
}

impl<K> RateTable<K> {
    /// Number of keys with a computed rate.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Returns `true` if no key has a computed rate.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Iterate `(key, rate)` pairs in arbitrary order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&K, f64)> + '_ {
        self.rates.iter().map(|(key, rate)| (key, *rate))
    }
}

impl<K: Hash + Eq> RateTable<K> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            rates: HashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub(crate) fn insert(&mut self, key: K, rate: f64) {
        debug_assert!(rate.is_finite() && rate >= 1.0, "bad sample rate {rate}");
        self.rates.insert(key, rate);
    }

    /// The computed rate for `key`, if it had any traffic in the last window.
    pub fn get<Q>(&self, key: &Q) -> Option<f64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.rates.get(key).copied()
    }

    /// The computed rate for `key`, or 1 (keep everything) for unknown keys.
    pub fn rate_or_default<Q>(&self, key: &Q) -> f64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).unwrap_or(1.0)
    }
}

impl<K: fmt::Debug> fmt::Debug for RateTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::RateTable;

    #[test]
    fn unknown_keys_default_to_one() {
        let mut rates = RateTable::<String>::with_capacity(1);
        rates.insert("hot".to_string(), 12.0);

        assert_eq!(rates.get("hot"), Some(12.0));
        assert_eq!(rates.get("cold"), None);
        assert_eq!(rates.rate_or_default("hot"), 12.0);
        assert_eq!(rates.rate_or_default("cold"), 1.0);
        assert_eq!(rates.len(), 1);
        assert!(!rates.is_empty());
        assert!(RateTable::<String>::default().is_empty());
    }
}
