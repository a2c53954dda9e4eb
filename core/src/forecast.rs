//! Forecast engine: monthly demand forecast per (product, market).
//!
//! Model: additive decomposition fitted on clean months only.
//!   demand(t) = intercept + slope·t + season[calendar month] + noise
//!
//!   1. Months inside a configured AnomalyWindow are masked out of the fit.
//!   2. Linear trend by ordinary least squares on the clean months.
//!   3. Seasonal index per calendar month = mean detrended residual,
//!      centered so the twelve indices sum to zero.
//!   4. Residual spread σ sets a prediction interval that widens with
//!      distance from the fitted window.
//!
//! Forecast months that fall inside an anomaly window are scaled by the
//! window's multiplier, so shock behaviour is explicit and testable.

use crate::{
    config::ForecastConfig,
    error::{TradeError, TradeResult},
    types::{Market, ProductCategory, ProductMarket},
};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

// ── Reference data ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRecord {
    /// First day of the month the quantity belongs to.
    pub month: NaiveDate,
    pub product: ProductCategory,
    pub market: Market,
    pub quantity: f64,
}

/// Multi-year monthly demand history. Treated as immutable once built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalSeries {
    records: Vec<DemandRecord>,
}

impl HistoricalSeries {
    pub fn new(mut records: Vec<DemandRecord>) -> Self {
        records.sort_by(|a, b| {
            (a.product, a.market, a.month).cmp(&(b.product, b.market, b.month))
        });
        Self { records }
    }

    pub fn records(&self) -> &[DemandRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every (month, quantity) observation for one pair, in month order.
    pub fn slice(&self, product: ProductCategory, market: Market) -> Vec<(NaiveDate, f64)> {
        self.records
            .iter()
            .filter(|r| r.product == product && r.market == market)
            .map(|r| (r.month, r.quantity))
            .collect()
    }

    /// Distinct pairs present in the history, sorted.
    pub fn pairs(&self) -> Vec<ProductMarket> {
        let mut pairs: Vec<ProductMarket> =
            self.records.iter().map(|r| (r.product, r.market)).collect();
        pairs.dedup();
        pairs
    }
}

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub month: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandPoint {
    pub month: NaiveDate,
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub product: ProductCategory,
    pub market: Market,
    pub point_forecast: Vec<ForecastPoint>,
    pub confidence_band: Vec<BandPoint>,
    /// Filled in when the forecast is produced alongside a segmentation.
    pub segment_id: Option<usize>,
    // Fit diagnostics
    pub trend_slope: f64,
    /// Index 0 = January.
    pub seasonal_indices: [f64; 12],
    pub residual_std: f64,
    pub fitted_months: usize,
    pub excluded_months: usize,
    // Growth summary
    pub last_value: f64,
    pub future_mean: f64,
    /// (future_mean − last_value) / last_value; 0 when last_value ≤ 0.
    pub growth_ratio: f64,
}

// ── Forecast ─────────────────────────────────────────────────────────────────

pub fn forecast_series(
    product: ProductCategory,
    market: Market,
    series: &[(NaiveDate, f64)],
    horizon_months: usize,
    config: &ForecastConfig,
) -> TradeResult<ForecastResult> {
    if horizon_months == 0 || horizon_months > config.max_horizon_months {
        return Err(TradeError::InvalidParameter {
            name: "horizon_months",
            reason: format!(
                "must be between 1 and {}, got {horizon_months}",
                config.max_horizon_months
            ),
        });
    }

    let malformed = |reason: String| TradeError::MalformedSeries {
        product: product.code().to_string(),
        market: market.code().to_string(),
        reason,
    };

    let mut obs: Vec<(NaiveDate, f64)> = series.to_vec();
    obs.sort_by_key(|(m, _)| *m);
    for (month, q) in &obs {
        if month.day() != 1 {
            return Err(malformed(format!("month {month} is not the first of a month")));
        }
        if !q.is_finite() || *q < 0.0 {
            return Err(malformed(format!("quantity {q} at {month} is not a non-negative number")));
        }
    }
    for w in obs.windows(2) {
        match month_number(w[1].0) - month_number(w[0].0) {
            0 => return Err(malformed(format!("duplicate month {}", w[0].0))),
            1 => {}
            _ => return Err(malformed(format!("gap after {}", w[0].0))),
        }
    }

    let n = obs.len();
    let clean: Vec<bool> = obs
        .iter()
        .map(|(m, _)| !config.anomaly_windows.iter().any(|w| w.contains(*m)))
        .collect();
    let n_clean = clean.iter().filter(|c| **c).count();
    if n_clean < config.min_history_months.max(3) {
        return Err(TradeError::InsufficientHistory {
            available: n_clean,
            required: config.min_history_months.max(3),
        });
    }

    // 1. Linear trend on clean months
    let clean_points: Vec<(f64, f64, u32)> = obs
        .iter()
        .enumerate()
        .filter(|(i, _)| clean[*i])
        .map(|(i, (m, q))| (i as f64, *q, m.month0()))
        .collect();
    let nc = n_clean as f64;
    let t_mean = clean_points.iter().map(|p| p.0).sum::<f64>() / nc;
    let y_mean = clean_points.iter().map(|p| p.1).sum::<f64>() / nc;
    let sxx: f64 = clean_points.iter().map(|p| (p.0 - t_mean).powi(2)).sum();
    let sxy: f64 = clean_points
        .iter()
        .map(|p| (p.0 - t_mean) * (p.1 - y_mean))
        .sum();
    if sxx <= 0.0 {
        return Err(TradeError::Numerical {
            context: "forecast trend",
            reason: "clean months have no spread in time".into(),
        });
    }
    let slope = sxy / sxx;
    let intercept = y_mean - slope * t_mean;
    let trend = |t: f64| intercept + slope * t;

    // 2. Seasonal indices from detrended residuals
    let mut season_sum = [0.0; 12];
    let mut season_count = [0usize; 12];
    for (t, y, m0) in &clean_points {
        season_sum[*m0 as usize] += y - trend(*t);
        season_count[*m0 as usize] += 1;
    }
    let mut seasonal = [0.0; 12];
    let mut observed_months = 0usize;
    for m in 0..12 {
        if season_count[m] > 0 {
            seasonal[m] = season_sum[m] / season_count[m] as f64;
            observed_months += 1;
        }
    }
    let center = seasonal.iter().sum::<f64>() / observed_months as f64;
    for m in 0..12 {
        if season_count[m] > 0 {
            seasonal[m] -= center;
        }
    }

    // 3. Residual spread
    let sse: f64 = clean_points
        .iter()
        .map(|(t, y, m0)| (y - trend(*t) - seasonal[*m0 as usize]).powi(2))
        .sum();
    let dof = n_clean.saturating_sub(2).max(1) as f64;
    let sigma = (sse / dof).sqrt();

    // 4. Project forward
    let last_month = obs[n - 1].0;
    let mut point_forecast = Vec::with_capacity(horizon_months);
    let mut confidence_band = Vec::with_capacity(horizon_months);
    for h in 1..=horizon_months {
        let month = last_month
            .checked_add_months(Months::new(h as u32))
            .ok_or_else(|| TradeError::Numerical {
                context: "forecast calendar",
                reason: format!("cannot advance {last_month} by {h} months"),
            })?;
        let t = (n - 1 + h) as f64;
        let multiplier = config
            .anomaly_windows
            .iter()
            .find(|w| w.contains(month))
            .map(|w| w.multiplier)
            .unwrap_or(1.0);

        let raw = (trend(t) + seasonal[month.month0() as usize]) * multiplier;
        let value = raw.max(0.0);
        let half_width = config.confidence_z
            * sigma
            * (1.0 + 1.0 / nc + (t - t_mean).powi(2) / sxx).sqrt()
            * multiplier;

        point_forecast.push(ForecastPoint { month, value });
        confidence_band.push(BandPoint {
            month,
            low: (raw - half_width).max(0.0),
            high: (raw + half_width).max(value),
        });
    }

    let last_value = obs[n - 1].1;
    let future_mean =
        point_forecast.iter().map(|p| p.value).sum::<f64>() / point_forecast.len() as f64;
    let growth_ratio = if last_value <= 0.0 {
        0.0
    } else {
        (future_mean - last_value) / last_value
    };

    log::debug!(
        "forecast: {product}/{market} fitted on {n_clean}/{n} months, slope={slope:.3}, sigma={sigma:.3}"
    );

    Ok(ForecastResult {
        product,
        market,
        point_forecast,
        confidence_band,
        segment_id: None,
        trend_slope: slope,
        seasonal_indices: seasonal,
        residual_std: sigma,
        fitted_months: n_clean,
        excluded_months: n - n_clean,
        last_value,
        future_mean,
        growth_ratio,
    })
}

fn month_number(d: NaiveDate) -> i64 {
    d.year() as i64 * 12 + d.month0() as i64
}
