// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{hash::Hash, time::Duration};

use crate::{config, error::SamplerError, rates::RateTable, window::CountTable};

/// Gives every key the same budget of kept events per second, however busy it is.
///
/// A key that saw `count` events in the last window gets rate
/// `max(1, count / (per_key_throughput_sec * clear_frequency_sec))`. Keys never affect each
/// other's rate, so a hot key still keeps more events in total than a cold one; it just keeps
/// them at the same capped rate.
///
/// Rates are not rounded. Callers that decimate by counting may want to round them up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerKeyThroughput {
    per_key_throughput_sec: f64,
    target_per_window: f64,
}

impl PerKeyThroughput {
    /// Create a policy keeping `per_key_throughput_sec` events per key per second, for windows
    /// that are `clear_frequency` long.
    ///
    /// ```
    /// use std::time::Duration;
    /// use dynsampler::policy::PerKeyThroughput;
    /// use dynsampler::window::CountTable;
    ///
    /// let policy = PerKeyThroughput::new(5.0, Duration::from_secs(30)).unwrap();
    /// let window: CountTable<&str> = [("hot", 1500), ("cold", 20)].into_iter().collect();
    /// let rates = policy.compute(window);
    /// assert_eq!(rates.get("hot"), Some(10.0));
    /// assert_eq!(rates.get("cold"), Some(1.0));
    /// ```
    pub fn new(per_key_throughput_sec: f64, clear_frequency: Duration) -> Result<Self, SamplerError> {
        let per_key_throughput_sec =
            config::positive("per_key_throughput_sec", per_key_throughput_sec)?;
        let clear_frequency_sec =
            config::positive("clear_frequency_sec", clear_frequency.as_secs_f64())?;
        let target_per_window = per_key_throughput_sec * clear_frequency_sec;
        // guards against a product that overflows to infinity
        let target_per_window = config::positive("per_key_throughput_sec", target_per_window)?;
        Ok(Self {
            per_key_throughput_sec,
            target_per_window,
        })
    }

    /// Events kept per key per second.
    pub fn per_key_throughput_sec(&self) -> f64 {
        self.per_key_throughput_sec
    }

    /// Events each key may keep per window.
    pub fn target_per_window(&self) -> f64 {
        self.target_per_window
    }

    /// Compute the rate for every key in `window`.
    pub fn compute<K: Hash + Eq>(&self, window: CountTable<K>) -> RateTable<K> {
        let mut rates = RateTable::with_capacity(window.len());
        for (key, count) in window {
            let rate = super::finite_or(count as f64 / self.target_per_window, 1.0).max(1.0);
            rates.insert(key, rate);
        }
        rates
    }
}
