// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    hash::Hash,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{config, error::SamplerError, rates::RateTable, window::CountTable};

/// Aims for one overall sample rate across all keys, while being gentler on quiet keys.
///
/// Each window, the policy wants to keep `total events / goal_sample_rate` events. That budget is
/// split between keys in proportion to the base-10 logarithm of their counts, so a key with ten
/// times the traffic only gets one "share" more of the budget. Keys are then visited in the order
/// they were first seen in the window:
///
/// 1. the key's goal is its share (at least 1), plus an even split of the budget left over by
///    earlier keys;
/// 2. a key that fits under its goal is not throttled at all (rate 1), and the unused part of
///    its goal is left over for the keys after it;
/// 3. otherwise the key gets the smallest whole rate that brings it under its goal, and whatever
///    that rounding leaves unused is left over for the keys after it.
///
/// Because leftover budget only flows forward, the rates depend on the order keys were first
/// seen. That order is kept by [`CountTable`] and must not change.
///
/// Until the first window with any traffic has been recomputed, every key is handed
/// `goal_sample_rate`: the policy assumes heavy throttling until it has real data.
#[derive(Debug)]
pub struct AverageSampleRate {
    goal_sample_rate: f64,
    has_received_traffic: AtomicBool,
}

impl AverageSampleRate {
    /// Create a policy aiming to keep one in `goal_sample_rate` events overall.
    ///
    /// ```
    /// use dynsampler::policy::AverageSampleRate;
    /// use dynsampler::window::CountTable;
    ///
    /// let policy = AverageSampleRate::new(10.0).unwrap();
    /// let window: CountTable<&str> =
    ///     [("a", 1000), ("b", 100), ("c", 10), ("d", 1)].into_iter().collect();
    /// let rates = policy.compute(window);
    /// assert_eq!(rates.get("a"), Some(19.0));
    /// assert_eq!(rates.get("b"), Some(3.0));
    /// assert_eq!(rates.get("c"), Some(1.0));
    /// assert_eq!(rates.get("d"), Some(1.0));
    /// ```
    pub fn new(goal_sample_rate: f64) -> Result<Self, SamplerError> {
        Ok(Self {
            goal_sample_rate: config::validate_goal_sample_rate(goal_sample_rate)?,
            has_received_traffic: AtomicBool::new(false),
        })
    }

    /// The overall sample rate this policy aims for.
    pub fn goal_sample_rate(&self) -> f64 {
        self.goal_sample_rate
    }

    /// Whether rates computed from a window with traffic have been published yet.
    pub fn has_received_traffic(&self) -> bool {
        self.has_received_traffic.load(Ordering::Acquire)
    }

    // Returns true only for the call that flipped the flag.
    pub(crate) fn mark_received_traffic(&self) -> bool {
        !self.has_received_traffic.swap(true, Ordering::AcqRel)
    }

    /// Compute the rate for every key in `window`.
    ///
    /// This is a pure function of the window (and its order); it does not touch
    /// [`has_received_traffic`](Self::has_received_traffic).
    pub fn compute<K: Hash + Eq>(&self, window: CountTable<K>) -> RateTable<K> {
        if window.is_empty() {
            return RateTable::default();
        }

        let keys = window.len();
        let (sum_events, log_sum) = window
            .iter()
            .fold((0.0, 0.0), |(sum, log_sum), (_, count)| {
                let count = count as f64;
                (sum + count, log_sum + count.log10())
            });
        let goal_count = sum_events / self.goal_sample_rate;
        // log_sum is only zero when every key was seen exactly once
        let goal_ratio = (log_sum > 0.0).then(|| goal_count / log_sum);
        let even_share = (goal_count / keys as f64).max(1.0);

        let mut rates = RateTable::with_capacity(keys);
        let mut extra = 0.0;
        let mut keys_remaining = keys;
        for (key, count) in window {
            let count = count as f64;
            let share = match goal_ratio {
                Some(goal_ratio) => (count.log10() * goal_ratio).max(1.0),
                None => even_share,
            };
            let mut goal_for_key = super::finite_or(share, even_share);

            let extra_for_key = extra / keys_remaining as f64;
            goal_for_key += extra_for_key;
            extra -= extra_for_key;
            keys_remaining -= 1;

            if count <= goal_for_key {
                rates.insert(key, 1.0);
                extra += goal_for_key - count;
            } else {
                let rate = super::finite_or((count / goal_for_key).ceil(), self.goal_sample_rate);
                rates.insert(key, rate);
                extra += goal_for_key - count / rate;
            }
        }
        rates
    }
}
