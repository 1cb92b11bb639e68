// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Sampler configuration.
//!
//! All values are validated eagerly when a [`Sampler`](crate::Sampler) is built; nothing falls
//! back to a default once a value has been supplied.

use std::time::Duration;

use crate::error::{InvalidConfig, SamplerError};

/// Default interval between rate recomputes, in seconds.
pub const DEFAULT_CLEAR_FREQUENCY_SEC: f64 = 30.0;
/// Default number of events kept per key per second by [`PolicyConfig::PerKeyThroughput`].
pub const DEFAULT_PER_KEY_THROUGHPUT_SEC: f64 = 5.0;
/// Default overall sample rate targeted by [`PolicyConfig::AverageSampleRate`].
pub const DEFAULT_GOAL_SAMPLE_RATE: f64 = 10.0;

/// Configuration for a [`Sampler`](crate::Sampler).
///
/// With the `serde` feature (on by default) this can be loaded from a host's own configuration:
///
/// ```
/// use dynsampler::config::{PolicyConfig, SamplerConfig};
///
/// let config: SamplerConfig = serde_json::from_str(
///     r#"{ "clear_frequency_sec": 60, "policy": { "type": "average_sample_rate" } }"#,
/// ).unwrap();
/// assert_eq!(config.clear_frequency_sec, 60.0);
/// assert_eq!(config.policy, PolicyConfig::AverageSampleRate { goal_sample_rate: 10.0 });
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct SamplerConfig {
    /// How often the counting window is turned into new sample rates, in seconds.
    pub clear_frequency_sec: f64,
    /// Which rate policy to run on every recompute.
    pub policy: PolicyConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            clear_frequency_sec: DEFAULT_CLEAR_FREQUENCY_SEC,
            policy: PolicyConfig::default(),
        }
    }
}

/// Selects and parameterizes the rate policy.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum PolicyConfig {
    /// No policy. Such a sampler hands out rate 1 for every key and fails every recompute with
    /// [`SamplerError::MisconfiguredPolicy`].
    #[default]
    Unconfigured,
    /// Every key may keep up to `per_key_throughput_sec` events per second.
    PerKeyThroughput {
        /// Events kept per key per second.
        #[cfg_attr(feature = "serde", serde(default = "default_per_key_throughput_sec"))]
        per_key_throughput_sec: f64,
    },
    /// Keep roughly one in `goal_sample_rate` events overall, throttling busy keys harder than
    /// quiet ones.
    AverageSampleRate {
        /// Overall sample rate to aim for.
        #[cfg_attr(feature = "serde", serde(default = "default_goal_sample_rate"))]
        goal_sample_rate: f64,
    },
}

#[cfg(feature = "serde")]
fn default_per_key_throughput_sec() -> f64 {
    DEFAULT_PER_KEY_THROUGHPUT_SEC
}

#[cfg(feature = "serde")]
fn default_goal_sample_rate() -> f64 {
    DEFAULT_GOAL_SAMPLE_RATE
}

impl PolicyConfig {
    /// [`PolicyConfig::PerKeyThroughput`] with the default throughput.
    pub fn per_key_throughput() -> Self {
        Self::PerKeyThroughput {
            per_key_throughput_sec: DEFAULT_PER_KEY_THROUGHPUT_SEC,
        }
    }

    /// [`PolicyConfig::AverageSampleRate`] with the default goal rate.
    pub fn average_sample_rate() -> Self {
        Self::AverageSampleRate {
            goal_sample_rate: DEFAULT_GOAL_SAMPLE_RATE,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), InvalidConfig> {
        match *self {
            Self::Unconfigured => Ok(()),
            Self::PerKeyThroughput {
                per_key_throughput_sec,
            } => positive("per_key_throughput_sec", per_key_throughput_sec).map(drop),
            Self::AverageSampleRate { goal_sample_rate } => {
                validate_goal_sample_rate(goal_sample_rate).map(drop)
            }
        }
    }
}

impl SamplerConfig {
    /// Check every value, returning the first one that is rejected.
    ///
    /// ```
    /// use dynsampler::config::SamplerConfig;
    ///
    /// let config = SamplerConfig { clear_frequency_sec: 0.0, ..Default::default() };
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), SamplerError> {
        self.clear_frequency()?;
        self.policy.validate()?;
        Ok(())
    }

    /// The recompute interval as a [`Duration`].
    pub fn clear_frequency(&self) -> Result<Duration, SamplerError> {
        let secs = positive("clear_frequency_sec", self.clear_frequency_sec)?;
        let clear_frequency = Duration::try_from_secs_f64(secs).map_err(|_| {
            InvalidConfig::new(
                "clear_frequency_sec",
                secs,
                "is too large to be represented as a duration",
            )
        })?;
        if clear_frequency.is_zero() {
            return Err(InvalidConfig::new(
                "clear_frequency_sec",
                secs,
                "is too small to be represented as a duration",
            )
            .into());
        }
        Ok(clear_frequency)
    }
}

pub(crate) fn positive(field: &'static str, value: f64) -> Result<f64, InvalidConfig> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(InvalidConfig::new(
            field,
            value,
            "must be a positive, finite number",
        ))
    }
}

pub(crate) fn validate_goal_sample_rate(value: f64) -> Result<f64, InvalidConfig> {
    if value.is_finite() && value >= 1.0 {
        Ok(value)
    } else {
        Err(InvalidConfig::new(
            "goal_sample_rate",
            value,
            "must be a finite number no smaller than 1",
        ))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults() {
        let config = SamplerConfig::default();
        assert_eq!(config.clear_frequency_sec, 30.0);
        assert_eq!(config.policy, PolicyConfig::Unconfigured);
        assert_eq!(config.clear_frequency().unwrap(), Duration::from_secs(30));
        assert_eq!(
            PolicyConfig::per_key_throughput(),
            PolicyConfig::PerKeyThroughput {
                per_key_throughput_sec: 5.0
            }
        );
        assert_eq!(
            PolicyConfig::average_sample_rate(),
            PolicyConfig::AverageSampleRate {
                goal_sample_rate: 10.0
            }
        );
    }

    #[rstest]
    #[case(0.0)]
    #[case(-30.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(1e300)]
    #[case(1e-12)]
    fn rejects_bad_clear_frequency(#[case] clear_frequency_sec: f64) {
        let config = SamplerConfig {
            clear_frequency_sec,
            ..Default::default()
        };
        match config.validate() {
            Err(SamplerError::InvalidConfig(err)) => {
                assert_eq!(err.field(), "clear_frequency_sec")
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[rstest]
    #[case(PolicyConfig::PerKeyThroughput { per_key_throughput_sec: 0.0 }, "per_key_throughput_sec")]
    #[case(PolicyConfig::PerKeyThroughput { per_key_throughput_sec: f64::NAN }, "per_key_throughput_sec")]
    #[case(PolicyConfig::AverageSampleRate { goal_sample_rate: 0.5 }, "goal_sample_rate")]
    #[case(PolicyConfig::AverageSampleRate { goal_sample_rate: f64::INFINITY }, "goal_sample_rate")]
    fn rejects_bad_policy_values(#[case] policy: PolicyConfig, #[case] field: &str) {
        let config = SamplerConfig {
            policy,
            ..Default::default()
        };
        match config.validate() {
            Err(SamplerError::InvalidConfig(err)) => assert_eq!(err.field(), field),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn rejects_clear_frequency_below_one_nanosecond() {
        let config = SamplerConfig {
            clear_frequency_sec: 1e-12,
            ..Default::default()
        };
        match config.clear_frequency() {
            Err(SamplerError::InvalidConfig(err)) => {
                assert_eq!(err.reason(), "is too small to be represented as a duration")
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
        let config = SamplerConfig {
            clear_frequency_sec: 0.001,
            ..Default::default()
        };
        assert_eq!(config.clear_frequency().unwrap(), Duration::from_millis(1));
    }

    #[test]
    fn accepts_fractional_values() {
        let config = SamplerConfig {
            clear_frequency_sec: 0.5,
            policy: PolicyConfig::PerKeyThroughput {
                per_key_throughput_sec: 0.25,
            },
        };
        config.validate().unwrap();
        assert_eq!(config.clear_frequency().unwrap(), Duration::from_millis(500));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_with_defaults() {
        let config: SamplerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SamplerConfig::default());

        let config: SamplerConfig = serde_json::from_str(
            r#"{ "policy": { "type": "per_key_throughput", "per_key_throughput_sec": 2 } }"#,
        )
        .unwrap();
        assert_eq!(
            config.policy,
            PolicyConfig::PerKeyThroughput {
                per_key_throughput_sec: 2.0
            }
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn rejects_unknown_fields() {
        let err = serde_json::from_str::<SamplerConfig>(r#"{ "clear_frequency": 30 }"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("unknown field"), "{err}");
    }
}
