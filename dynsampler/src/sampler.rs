// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    borrow::Borrow,
    fmt,
    hash::Hash,
    mem,
    ops::ControlFlow,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use arc_swap::ArcSwap;
use dynsampler_schedule::Schedule;
use rand::Rng;

use crate::{
    config::{PolicyConfig, SamplerConfig},
    error::SamplerError,
    policy::Policy,
    rates::RateTable,
    window::CountTable,
};

/// A builder for [Sampler]
#[derive(Debug, Clone, Default)]
pub struct SamplerBuilder {
    config: SamplerConfig,
    name: Option<String>,
}

impl SamplerBuilder {
    /// Start from the default configuration: a 30 second clear frequency and no rate policy.
    ///
    /// The key type is chosen when the sampler is built:
    ///
    /// ```
    /// use dynsampler::{Sampler, SamplerBuilder};
    ///
    /// let sampler: Sampler<u64> = SamplerBuilder::new()
    ///     .goal_sample_rate(10.0)
    ///     .build_unscheduled()
    ///     .unwrap();
    /// assert_eq!(sampler.record_and_get_rate(&7), 10.0);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines how often, in seconds, the counting window is turned into new rates.
    ///
    /// Short intervals react quickly to traffic changes but see few events per key, which makes
    /// rates for quiet keys noisy. Defaults to 30 seconds.
    pub fn clear_frequency_sec(mut self, clear_frequency_sec: f64) -> Self {
        self.config.clear_frequency_sec = clear_frequency_sec;
        self
    }

    /// Use the [per-key throughput](crate::policy::PerKeyThroughput) policy, keeping up to
    /// `per_key_throughput_sec` events per key per second.
    pub fn per_key_throughput_sec(mut self, per_key_throughput_sec: f64) -> Self {
        self.config.policy = PolicyConfig::PerKeyThroughput {
            per_key_throughput_sec,
        };
        self
    }

    /// Use the [average sample rate](crate::policy::AverageSampleRate) policy, keeping roughly
    /// one in `goal_sample_rate` events overall.
    pub fn goal_sample_rate(mut self, goal_sample_rate: f64) -> Self {
        self.config.policy = PolicyConfig::AverageSampleRate { goal_sample_rate };
        self
    }

    /// Replace the whole configuration, e.g. with one loaded from a file.
    pub fn config(mut self, config: SamplerConfig) -> Self {
        self.config = config;
        self
    }

    /// Name this sampler in its log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Validate the configuration, build the sampler and register its recompute with `schedule`.
    ///
    /// The recompute runs once every clear frequency until every handle to the sampler has been
    /// dropped, or until a recompute fails.
    pub fn build<K>(self, schedule: impl Schedule) -> Result<Sampler<K>, SamplerError>
    where
        K: Hash + Eq + Send + Sync + 'static,
    {
        let sampler = self.build_unscheduled()?;
        let clear_frequency = sampler.shared.clear_frequency;
        let shared = Arc::downgrade(&sampler.shared);
        schedule.every(clear_frequency, Box::new(move || recompute_task(&shared)))?;
        Ok(sampler)
    }

    /// Validate the configuration and build the sampler without a schedule.
    ///
    /// The host is then responsible for calling [`Sampler::recompute`] once every clear
    /// frequency.
    pub fn build_unscheduled<K>(self) -> Result<Sampler<K>, SamplerError> {
        self.config.validate()?;
        let clear_frequency = self.config.clear_frequency()?;
        let policy = Policy::from_config(&self.config)?;
        tracing::debug!(
            name = ?self.name,
            policy = policy.name(),
            ?clear_frequency,
            "created new sampler"
        );
        Ok(Sampler {
            shared: Arc::new(Shared {
                name: self.name,
                config: self.config,
                clear_frequency,
                policy,
                counts: Mutex::default(),
                rates: ArcSwap::from_pointee(RateTable::default()),
            }),
        })
    }
}

fn recompute_task<K: Hash + Eq>(shared: &Weak<Shared<K>>) -> ControlFlow<()> {
    let Some(shared) = shared.upgrade() else {
        tracing::debug!("sampler dropped, stopping rate recompute");
        return ControlFlow::Break(());
    };
    match shared.recompute() {
        Ok(()) => ControlFlow::Continue(()),
        Err(err) => {
            tracing::error!(name = ?shared.name, %err, "rate recompute failed, stopping it");
            ControlFlow::Break(())
        }
    }
}

/// Hands out a sample rate per key, based on how busy each key was in the previous window.
///
/// Callers report every event they would like to record with [`Sampler::record_and_get_rate`]
/// and keep one in `rate` of them (or let [`Sampler::sample`] decide). Once per clear frequency,
/// the counts collected since the last recompute are turned into new rates by the configured
/// [`Policy`] and the counts start over.
///
/// Keys the sampler has no rate for are not throttled (rate 1), except that an
/// [`AverageSampleRate`](crate::policy::AverageSampleRate) sampler hands out its goal rate until
/// it has seen any traffic.
///
/// `Sampler` is a cheap handle; clones share the same counts and rates.
///
/// ```
/// use dynsampler::Sampler;
/// use dynsampler_schedule::fakes::ManualSchedule;
///
/// let schedule = ManualSchedule::new();
/// let sampler: Sampler<String> = Sampler::builder()
///     .per_key_throughput_sec(5.0)
///     .build(&schedule)
///     .unwrap();
///
/// for _ in 0..1500 {
///     assert_eq!(sampler.record_and_get_rate("my-key"), 1.0);
/// }
/// schedule.tick();
/// assert_eq!(sampler.record_and_get_rate("my-key"), 10.0);
/// ```
pub struct Sampler<K> {
    shared: Arc<Shared<K>>,
}

struct Shared<K> {
    name: Option<String>,
    config: SamplerConfig,
    clear_frequency: Duration,
    policy: Policy,
    counts: Mutex<CountTable<K>>,
    rates: ArcSwap<RateTable<K>>,
}

impl<K> Clone for Sampler<K> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<K> fmt::Debug for Sampler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .field("policy", &self.shared.policy)
            .finish_non_exhaustive()
    }
}

impl Sampler<()> {
    /// Start building a [`Sampler`]; the same as [`SamplerBuilder::new`].
    pub fn builder() -> SamplerBuilder {
        SamplerBuilder::new()
    }
}

impl<K> Sampler<K> {
    /// The configuration this sampler was built with.
    pub fn config(&self) -> &SamplerConfig {
        &self.shared.config
    }

    /// The interval between recomputes.
    pub fn clear_frequency(&self) -> Duration {
        self.shared.clear_frequency
    }

    /// The rate policy run on every recompute.
    pub fn policy(&self) -> &Policy {
        &self.shared.policy
    }

    /// The name given with [`SamplerBuilder::name`].
    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    /// The rates published by the last recompute.
    pub fn rates(&self) -> Arc<RateTable<K>> {
        self.shared.rates.load_full()
    }
}

impl<K: Hash + Eq + Send + Sync + 'static> Sampler<K> {
    /// Build a sampler from `config` and register its recompute with `schedule`.
    ///
    /// Shorthand for `Sampler::builder().config(config).build(schedule)`.
    pub fn new(config: SamplerConfig, schedule: impl Schedule) -> Result<Self, SamplerError> {
        SamplerBuilder::new().config(config).build(schedule)
    }
}

impl<K: Hash + Eq> Sampler<K> {
    /// Count one event for `key` and return the rate to sample it at.
    ///
    /// A rate of `n` means "keep one in `n`". This never fails and always returns a finite
    /// number that is at least 1.
    pub fn record_and_get_rate<Q>(&self, key: &Q) -> f64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.shared.counts().record(key);
        let published = self.shared.rates.load().get(key);
        self.shared.policy.sample_rate(published)
    }

    /// Count one event for `key` and decide at random whether to keep it.
    ///
    /// Returns `Some(rate)` with probability `1 / rate` so a kept event can be weighted up by
    /// `rate`, and `None` when the event should be dropped.
    pub fn sample<Q>(&self, key: &Q) -> Option<f64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.sample_with_rng(key, &mut rand::rng())
    }

    /// Like [`Sampler::sample`], but also specify the random number generator.
    ///
    /// This is useful to seed the RNG for deterministic tests.
    pub fn sample_with_rng<Q, R>(&self, key: &Q, rng: &mut R) -> Option<f64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        R: Rng,
    {
        let rate = self.record_and_get_rate(key);
        if rate <= 1.0 || rng.random::<f64>() < rate.recip() {
            Some(rate)
        } else {
            None
        }
    }

    /// Turn the counts collected since the last recompute into new rates and start a new window.
    ///
    /// Schedulers call this once every clear frequency. Fails with
    /// [`SamplerError::MisconfiguredPolicy`] (leaving the counts untouched) if the sampler has no
    /// rate policy.
    pub fn recompute(&self) -> Result<(), SamplerError> {
        self.shared.recompute()
    }
}

impl<K> Shared<K> {
    // A panic can't leave the window half-updated, so a poisoned lock is still usable.
    fn counts(&self) -> MutexGuard<'_, CountTable<K>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Hash + Eq> Shared<K> {
    fn recompute(&self) -> Result<(), SamplerError> {
        if !self.policy.is_configured() {
            return Err(SamplerError::MisconfiguredPolicy);
        }

        let window = mem::take(&mut *self.counts());
        let had_traffic = !window.is_empty();
        if had_traffic {
            tracing::debug!(
                name = ?self.name,
                keys = window.len(),
                events = window.total(),
                "recomputing sample rates"
            );
        } else {
            tracing::trace!(name = ?self.name, "no traffic in the last window, clearing sample rates");
        }

        let rates = self.policy.recompute(window)?;
        self.rates.store(Arc::new(rates));

        if had_traffic && self.policy.observed_traffic() {
            tracing::debug!(name = ?self.name, "first traffic seen, using computed sample rates");
        }
        Ok(())
    }
}
