// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Throttles a skewed stream of request log lines with an average sample rate sampler.
//!
//! Run with `RUST_LOG=debug` to also see the sampler's own recompute logs.

use std::{
    collections::BTreeMap,
    thread,
    time::{Duration, Instant},
};

use dynsampler::{Sampler, SamplerBuilder, ThreadSchedule};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{EnvFilter, fmt};

const ROUTES: [(&str, u32); 5] = [
    ("GET /health", 600),
    ("GET /products", 250),
    ("POST /checkout", 100),
    ("GET /admin", 40),
    ("DELETE /account", 10),
];

fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let sampler: Sampler<String> = SamplerBuilder::new()
        .name("request-logs")
        .clear_frequency_sec(1.0)
        .goal_sample_rate(20.0)
        .build(ThreadSchedule::new().thread_name("request-logs-recompute"))?;

    let weight_total: u32 = ROUTES.iter().map(|(_, weight)| weight).sum();
    let mut rng = ChaCha8Rng::seed_from_u64(17);

    for second in 0..4 {
        let mut seen: BTreeMap<&str, u64> = BTreeMap::new();
        let mut kept: BTreeMap<&str, u64> = BTreeMap::new();
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            let mut pick = rng.random_range(0..weight_total);
            let route = ROUTES
                .iter()
                .find(|(_, weight)| {
                    let hit = pick < *weight;
                    pick = pick.saturating_sub(*weight);
                    hit
                })
                .map_or(ROUTES[0].0, |(route, _)| *route);

            *seen.entry(route).or_default() += 1;
            if sampler.sample_with_rng(route, &mut rng).is_some() {
                *kept.entry(route).or_default() += 1;
            }
            thread::sleep(Duration::from_micros(50));
        }

        for (route, seen) in &seen {
            let kept = kept.get(route).copied().unwrap_or(0);
            tracing::info!(second, route, seen, kept, "window summary");
        }
    }

    let rates = sampler.rates();
    let mut rates: Vec<_> = rates.iter().collect();
    rates.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (route, rate) in rates {
        println!("{route:>18}: keep 1 in {rate}");
    }
    Ok(())
}
