// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Errors returned when building a sampler or recomputing its rates.

use std::{fmt, io};

/// The error cases for building a [`Sampler`](crate::Sampler) and recomputing its rates.
///
/// None of these are ever returned from [`Sampler::record_and_get_rate`], which always succeeds.
///
/// [`Sampler::record_and_get_rate`]: crate::Sampler::record_and_get_rate
#[derive(Debug)]
#[non_exhaustive]
pub enum SamplerError {
    /// A configuration value was rejected at construction.
    InvalidConfig(InvalidConfig),
    /// Rates were recomputed on a sampler that has no rate policy.
    MisconfiguredPolicy,
    /// The recompute task couldn't be registered with its [`Schedule`](crate::Schedule).
    Schedule(io::Error),
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(err) => fmt::Display::fmt(err, f),
            Self::MisconfiguredPolicy => f.write_str(
                "sampler has no rate policy; configure a per-key throughput or average sample rate policy",
            ),
            Self::Schedule(err) => write!(f, "couldn't schedule rate recompute: {err}"),
        }
    }
}

impl std::error::Error for SamplerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidConfig(err) => Some(err),
            Self::MisconfiguredPolicy => None,
            Self::Schedule(err) => Some(err),
        }
    }
}

impl From<InvalidConfig> for SamplerError {
    fn from(value: InvalidConfig) -> Self {
        Self::InvalidConfig(value)
    }
}

impl From<io::Error> for SamplerError {
    fn from(value: io::Error) -> Self {
        Self::Schedule(value)
    }
}

/// Describes which configuration value was rejected, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidConfig {
    field: &'static str,
    value: f64,
    reason: &'static str,
}

impl InvalidConfig {
    pub(crate) fn new(field: &'static str, value: f64, reason: &'static str) -> Self {
        Self {
            field,
            value,
            reason,
        }
    }

    /// Name of the rejected configuration field.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// The rejected value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Why the value was rejected.
    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

impl fmt::Display for InvalidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid sampler config: `{}` = {} {}",
            self.field, self.value, self.reason
        )
    }
}

impl std::error::Error for InvalidConfig {}
