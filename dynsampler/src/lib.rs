// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod policy;
pub mod rates;
mod sampler;
pub mod window;

pub use config::{PolicyConfig, SamplerConfig};
pub use error::{InvalidConfig, SamplerError};
pub use policy::Policy;
pub use rates::RateTable;
pub use sampler::{Sampler, SamplerBuilder};
pub use window::CountTable;

pub use dynsampler_schedule::{Schedule, ThreadSchedule};
