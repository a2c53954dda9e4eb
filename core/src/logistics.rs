//! Logistics simulation engine: Monte Carlo ETA distribution.
//!
//! One trial:
//!   transit  ~ LogNormal(median = base_transit_days, σ = transit_sigma)
//!   customs  ~ Bernoulli(customs_delay_probability)
//!              × Exponential(mean = customs_delay_mean_days)
//!   total    = transit + customs
//!
//! RULES:
//!   - One explicit seed per run. Trials are split into fixed-size chunks;
//!     chunk c draws from stream (seed, LogisticsChunk, c).
//!   - Chunks run in parallel and are concatenated in chunk order, so the
//!     sample vector is identical for any worker count.
//!   - The simulator never sees cost fields.

use crate::{
    config::{LogisticsConfig, RouteProfile},
    error::{TradeError, TradeResult},
    rng::{RngBank, StreamRng, StreamSlot},
    types::{Route, TransportMode},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const MIN_TRIALS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaDistribution {
    pub route: Route,
    pub mode: TransportMode,
    pub seed: u64,
    /// Total transit days per trial, in trial order.
    pub samples: Vec<f64>,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub target_days: f64,
    /// Empirical P(total ≤ target_days).
    pub service_level: f64,
}

impl EtaDistribution {
    pub fn trial_count(&self) -> usize {
        self.samples.len()
    }

    /// Empirical fraction of trials that arrived within `target_days`.
    pub fn service_level_probability(&self, target_days: f64) -> f64 {
        fraction_within(&self.samples, target_days)
    }

    /// Nearest-rank percentile, q in [0, 1].
    pub fn percentile(&self, q: f64) -> f64 {
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        nearest_rank(&sorted, q)
    }
}

pub struct LogisticsSimulator<'a> {
    config: &'a LogisticsConfig,
}

impl<'a> LogisticsSimulator<'a> {
    pub fn new(config: &'a LogisticsConfig) -> Self {
        Self { config }
    }

    pub fn simulate(
        &self,
        route: Route,
        mode: TransportMode,
        trial_count: usize,
        target_days: f64,
        seed: u64,
    ) -> TradeResult<EtaDistribution> {
        if !target_days.is_finite() || target_days <= 0.0 {
            return Err(TradeError::InvalidParameter {
                name: "target_days",
                reason: format!("must be a positive number of days, got {target_days}"),
            });
        }
        if trial_count < self.config.min_trials {
            return Err(TradeError::InsufficientTrials {
                available: trial_count,
                required: self.config.min_trials,
            });
        }
        if trial_count > self.config.max_trials {
            return Err(TradeError::TrialBudgetExceeded {
                requested: trial_count,
                budget: self.config.max_trials,
            });
        }
        let profile = self.config.profile(route, mode)?;

        let chunk_size = self.config.chunk_size;
        let chunks = trial_count.div_ceil(chunk_size);
        let bank = RngBank::new(seed);

        let samples: Vec<f64> = (0..chunks)
            .into_par_iter()
            .map(|c| {
                let mut rng = bank.for_stream(StreamSlot::LogisticsChunk, c as u64);
                let len = chunk_size.min(trial_count - c * chunk_size);
                (0..len).map(|_| sample_trial(profile, &mut rng)).collect::<Vec<f64>>()
            })
            .collect::<Vec<Vec<f64>>>()
            .into_iter()
            .flatten()
            .collect();

        if samples.is_empty() {
            return Err(TradeError::EmptyInput { what: "logistics samples" });
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let service_level = fraction_within(&samples, target_days);

        log::debug!(
            "logistics: {route} by {mode}, {trial_count} trials in {chunks} chunks, seed={seed}, mean={mean:.2}d, sl={service_level:.3}"
        );

        Ok(EtaDistribution {
            route,
            mode,
            seed,
            mean,
            p50: nearest_rank(&sorted, 0.50),
            p90: nearest_rank(&sorted, 0.90),
            p95: nearest_rank(&sorted, 0.95),
            target_days,
            service_level,
            samples,
        })
    }
}

fn sample_trial(profile: &RouteProfile, rng: &mut StreamRng) -> f64 {
    let transit = rng.lognormal(profile.base_transit_days, profile.transit_sigma);
    let customs = if rng.chance(profile.customs_delay_probability) {
        rng.exponential(profile.customs_delay_mean_days)
    } else {
        0.0
    };
    transit + customs
}

fn fraction_within(samples: &[f64], target_days: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().filter(|s| **s <= target_days).count() as f64 / samples.len() as f64
}

fn nearest_rank(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (q.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}
