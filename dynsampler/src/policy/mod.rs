// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Rate policies, which turn a window of per-key counts into per-key sample rates.
//!
//! Currently, contains the following policies:
//!
//! 1. [PerKeyThroughput], which lets every key keep the same number of events per second.
//! 2. [AverageSampleRate], which targets one overall sample rate, throttling busy keys harder
//!    than quiet ones and handing budget that quiet keys don't use to the keys after them.
//!
//! A sampler picks exactly one of these through [Policy].

use std::hash::Hash;

use crate::{
    config::{PolicyConfig, SamplerConfig},
    error::SamplerError,
    rates::RateTable,
    window::CountTable,
};

mod average;
mod per_key;

pub use average::AverageSampleRate;
pub use per_key::PerKeyThroughput;

/// The rate policy a [`Sampler`](crate::Sampler) runs on every recompute.
#[derive(Debug)]
#[non_exhaustive]
pub enum Policy {
    /// No policy: every key gets rate 1, and every recompute fails with
    /// [`SamplerError::MisconfiguredPolicy`].
    Unconfigured,
    /// See [`PerKeyThroughput`].
    PerKeyThroughput(PerKeyThroughput),
    /// See [`AverageSampleRate`].
    AverageSampleRate(AverageSampleRate),
}

impl Policy {
    /// Build the policy selected by `config`, validating its parameters.
    pub fn from_config(config: &SamplerConfig) -> Result<Self, SamplerError> {
        Ok(match config.policy {
            PolicyConfig::Unconfigured => Self::Unconfigured,
            PolicyConfig::PerKeyThroughput {
                per_key_throughput_sec,
            } => Self::PerKeyThroughput(PerKeyThroughput::new(
                per_key_throughput_sec,
                config.clear_frequency()?,
            )?),
            PolicyConfig::AverageSampleRate { goal_sample_rate } => {
                Self::AverageSampleRate(AverageSampleRate::new(goal_sample_rate)?)
            }
        })
    }

    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::PerKeyThroughput(_) => "per_key_throughput",
            Self::AverageSampleRate(_) => "average_sample_rate",
        }
    }

    /// Returns `false` for [`Policy::Unconfigured`].
    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::Unconfigured)
    }

    /// Compute the rates for a completed window.
    ///
    /// An empty window yields an empty table, which resets every key to rate 1.
    pub fn recompute<K: Hash + Eq>(
        &self,
        window: CountTable<K>,
    ) -> Result<RateTable<K>, SamplerError> {
        match self {
            Self::Unconfigured => Err(SamplerError::MisconfiguredPolicy),
            Self::PerKeyThroughput(policy) => Ok(policy.compute(window)),
            Self::AverageSampleRate(policy) => Ok(policy.compute(window)),
        }
    }

    /// The rate to hand out for a key, given the key's rate in the published table (if any).
    pub fn sample_rate(&self, published: Option<f64>) -> f64 {
        match self {
            Self::AverageSampleRate(policy) if !policy.has_received_traffic() => {
                policy.goal_sample_rate()
            }
            _ => published.unwrap_or(1.0),
        }
    }

    // Called once a table computed from a non-empty window has been published.
    pub(crate) fn observed_traffic(&self) -> bool {
        match self {
            Self::AverageSampleRate(policy) => policy.mark_received_traffic(),
            _ => false,
        }
    }
}

// Computed rates never leave a policy as NaN or infinity.
fn finite_or(rate: f64, fallback: f64) -> f64 {
    if rate.is_finite() {
        rate
    } else {
        tracing::warn!(rate, fallback, "non-finite sample rate computed, using fallback");
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_policy_fails_recompute() {
        let policy = Policy::from_config(&SamplerConfig::default()).unwrap();
        assert!(!policy.is_configured());
        let window: CountTable<&str> = [("a", 1)].into_iter().collect();
        assert!(matches!(
            policy.recompute(window),
            Err(SamplerError::MisconfiguredPolicy)
        ));
        assert_eq!(policy.sample_rate(None), 1.0);
    }

    #[test]
    fn average_policy_hands_out_goal_until_traffic() {
        let policy = Policy::from_config(&SamplerConfig {
            policy: PolicyConfig::average_sample_rate(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(policy.name(), "average_sample_rate");
        assert_eq!(policy.sample_rate(None), 10.0);
        assert_eq!(policy.sample_rate(Some(3.0)), 10.0);

        assert!(policy.observed_traffic());
        assert!(!policy.observed_traffic());
        assert_eq!(policy.sample_rate(None), 1.0);
        assert_eq!(policy.sample_rate(Some(3.0)), 3.0);
    }

    #[test]
    fn from_config_validates() {
        let config = SamplerConfig {
            clear_frequency_sec: 30.0,
            policy: PolicyConfig::PerKeyThroughput {
                per_key_throughput_sec: -5.0,
            },
        };
        assert!(matches!(
            Policy::from_config(&config),
            Err(SamplerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn finite_or_replaces_non_finite() {
        assert_eq!(finite_or(4.0, 1.0), 4.0);
        assert_eq!(finite_or(f64::INFINITY, 1.0), 1.0);
        assert_eq!(finite_or(f64::NAN, 2.0), 2.0);
    }
}
