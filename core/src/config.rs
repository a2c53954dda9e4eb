use crate::{
    error::{TradeError, TradeResult},
    logistics::MIN_TRIALS,
    risk::{LOW_MEDIUM_THRESHOLD, MEDIUM_HIGH_THRESHOLD},
    types::{Market, Route, TransportMode},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Landed cost ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Insurance as a fraction of declared value.
    pub insurance_rate: Decimal,
    /// Floor applied to the computed insurance premium.
    pub insurance_minimum: Decimal,
    /// Flat per-shipment fees. Reported as `handling`, outside the
    /// dutiable total.
    pub handling_fee: Decimal,
    pub documentation_fee: Decimal,
    pub warehouse_fee: Decimal,
}

impl CostConfig {
    /// Sum of the flat per-shipment fees.
    pub fn ancillary_fees(&self) -> Decimal {
        self.handling_fee + self.documentation_fee + self.warehouse_fee
    }
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            insurance_rate: Decimal::new(2, 2), // 2%
            insurance_minimum: Decimal::ZERO,
            handling_fee: Decimal::from(120),
            documentation_fee: Decimal::from(50),
            warehouse_fee: Decimal::from(25),
        }
    }
}

// ── Risk scoring ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Probabilities below this are Low.
    pub low_medium: f64,
    /// Probabilities at or above this are High.
    pub medium_high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low_medium: LOW_MEDIUM_THRESHOLD,
            medium_high: MEDIUM_HIGH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub min_samples_per_class: usize,
    /// Gradient descent iteration budget.
    pub max_iterations: usize,
    pub learning_rate: f64,
    pub l2_penalty: f64,
    /// Stop early once the largest weight update falls below this.
    pub tolerance: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_samples_per_class: 10,
            max_iterations: 2_000,
            learning_rate: 0.5,
            l2_penalty: 1e-3,
            tolerance: 1e-7,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskConfig {
    pub thresholds: RiskThresholds,
    pub training: TrainingConfig,
}

// ── Forecasting ────────────────────────────────────────────────────

/// A documented historical demand shock. Months inside the window are
/// excluded from model fitting; forecast months inside it are scaled
/// by `multiplier`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyWindow {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub multiplier: f64,
}

impl AnomalyWindow {
    pub fn contains(&self, month: NaiveDate) -> bool {
        month >= self.start && month <= self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Clean (non-anomalous) months required before fitting.
    pub min_history_months: usize,
    pub max_horizon_months: usize,
    /// Normal quantile for the confidence band (1.96 ≈ 95%).
    pub confidence_z: f64,
    pub anomaly_windows: Vec<AnomalyWindow>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history_months: 24,
            max_horizon_months: 24,
            confidence_z: 1.96,
            anomaly_windows: vec![AnomalyWindow {
                label: "covid-19 demand shock".into(),
                start: NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date"),
                end: NaiveDate::from_ymd_opt(2021, 12, 1).expect("valid date"),
                multiplier: 1.0,
            }],
        }
    }
}

// ── Segmentation ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Requested number of segments. Reduced when fewer distinct pairs exist.
    pub k: usize,
    pub seed: u64,
    /// Independent k-means++ initialisations; the lowest inertia wins.
    pub restarts: usize,
    /// Lloyd iteration budget per restart.
    pub max_iterations: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            k: 3,
            seed: 42,
            restarts: 10,
            max_iterations: 300,
        }
    }
}

// ── Logistics ──────────────────────────────────────────────────────

/// Transit and freight characteristics of one (route, mode) lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteProfile {
    pub route: Route,
    pub mode: TransportMode,
    /// Median door-to-gateway transit time.
    pub base_transit_days: f64,
    /// Log-space spread of transit time.
    pub transit_sigma: f64,
    pub customs_delay_probability: f64,
    pub customs_delay_mean_days: f64,
    pub base_freight: Decimal,
    pub freight_per_kg: Decimal,
    /// Cost incurred when a customs delay occurs.
    pub delay_cost: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticsConfig {
    pub min_trials: usize,
    /// Trial budget: the most a single call may request.
    pub max_trials: usize,
    /// Trials per parallel chunk. Changing it changes the sample stream.
    pub chunk_size: usize,
    /// Service-level target per destination market, in days.
    pub default_target_days: BTreeMap<Market, f64>,
    pub routes: Vec<RouteProfile>,
}

impl LogisticsConfig {
    pub fn profile(&self, route: Route, mode: TransportMode) -> TradeResult<&RouteProfile> {
        self.routes
            .iter()
            .find(|p| p.route == route && p.mode == mode)
            .ok_or_else(|| TradeError::UnknownRouteProfile {
                route: route.code().to_string(),
                mode: mode.code().to_string(),
            })
    }

    pub fn modes_for(&self, route: Route) -> Vec<TransportMode> {
        let mut modes: Vec<TransportMode> = self
            .routes
            .iter()
            .filter(|p| p.route == route)
            .map(|p| p.mode)
            .collect();
        modes.sort();
        modes.dedup();
        modes
    }

    pub fn target_days_for(&self, market: Market) -> TradeResult<f64> {
        self.default_target_days
            .get(&market)
            .copied()
            .ok_or_else(|| TradeError::InvalidParameter {
                name: "default_target_days",
                reason: format!("no target configured for market {market}"),
            })
    }
}

fn lane(
    route: Route,
    mode: TransportMode,
    days: f64,
    sigma: f64,
    delay_p: f64,
    freight: i64,
    per_kg_cents: i64,
) -> RouteProfile {
    RouteProfile {
        route,
        mode,
        base_transit_days: days,
        transit_sigma: sigma,
        customs_delay_probability: delay_p,
        customs_delay_mean_days: 3.0,
        base_freight: Decimal::from(freight),
        freight_per_kg: Decimal::new(per_kg_cents, 2),
        delay_cost: Decimal::from(400),
    }
}

impl Default for LogisticsConfig {
    fn default() -> Self {
        use TransportMode::*;
        Self {
            min_trials: MIN_TRIALS,
            max_trials: 2_000_000,
            chunk_size: 4_096,
            default_target_days: [(Market::De, 20.0), (Market::Nl, 21.0)].into(),
            routes: vec![
                lane(Route::TrDe, Sea, 16.0, 0.12, 0.22, 1_600, 15),
                lane(Route::TrDe, Road, 9.0, 0.15, 0.16, 1_000, 35),
                lane(Route::TrDe, Air, 4.0, 0.10, 0.05, 3_600, 450),
                lane(Route::TrNl, Sea, 18.0, 0.12, 0.25, 1_800, 15),
                lane(Route::TrNl, Road, 10.0, 0.15, 0.18, 1_100, 35),
                lane(Route::TrNl, Air, 4.0, 0.10, 0.05, 3_800, 450),
            ],
        }
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeConfig {
    pub cost: CostConfig,
    pub risk: RiskConfig,
    pub forecast: ForecastConfig,
    pub segmentation: SegmentationConfig,
    pub logistics: LogisticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct EngineFile {
    #[serde(default)]
    cost: CostConfig,
    #[serde(default)]
    risk: RiskConfig,
    #[serde(default)]
    forecast: ForecastConfig,
    #[serde(default)]
    segmentation: SegmentationConfig,
    min_trials: usize,
    max_trials: usize,
    chunk_size: usize,
    default_target_days: BTreeMap<Market, f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RoutesFile {
    routes: Vec<RouteProfile>,
}

impl TradeConfig {
    /// Load from the data/ directory.
    /// In tests, use TradeConfig::default().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let engine_path = format!("{data_dir}/config/engine.json");
        let engine_content = std::fs::read_to_string(&engine_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {engine_path}: {e}"))?;
        let engine: EngineFile = serde_json::from_str(&engine_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {engine_path}: {e}"))?;

        let routes_path = format!("{data_dir}/config/routes.json");
        let routes_content = std::fs::read_to_string(&routes_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {routes_path}: {e}"))?;
        let routes_file: RoutesFile = serde_json::from_str(&routes_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {routes_path}: {e}"))?;

        let config = Self {
            cost: engine.cost,
            risk: engine.risk,
            forecast: engine.forecast,
            segmentation: engine.segmentation,
            logistics: LogisticsConfig {
                min_trials: engine.min_trials,
                max_trials: engine.max_trials,
                chunk_size: engine.chunk_size,
                default_target_days: engine.default_target_days,
                routes: routes_file.routes,
            },
        };
        config.validate()?;

        log::info!(
            "config: loaded {} route profiles from {data_dir}",
            config.logistics.routes.len()
        );
        Ok(config)
    }

    /// Reject settings that would make every later call fail or misbehave.
    pub fn validate(&self) -> TradeResult<()> {
        let t = &self.risk.thresholds;
        if !(0.0 < t.low_medium && t.low_medium < t.medium_high && t.medium_high < 1.0) {
            return Err(TradeError::InvalidParameter {
                name: "risk.thresholds",
                reason: format!(
                    "need 0 < low_medium < medium_high < 1, got {} and {}",
                    t.low_medium, t.medium_high
                ),
            });
        }
        if self.cost.insurance_rate < Decimal::ZERO || self.cost.insurance_minimum < Decimal::ZERO {
            return Err(TradeError::InvalidParameter {
                name: "cost.insurance_rate",
                reason: "insurance settings must be non-negative".into(),
            });
        }
        let c = &self.cost;
        if [c.handling_fee, c.documentation_fee, c.warehouse_fee]
            .iter()
            .any(|fee| *fee < Decimal::ZERO)
        {
            return Err(TradeError::InvalidParameter {
                name: "cost.fees",
                reason: "handling, documentation and warehouse fees must be non-negative".into(),
            });
        }
        if self.logistics.chunk_size == 0 {
            return Err(TradeError::InvalidParameter {
                name: "logistics.chunk_size",
                reason: "must be positive".into(),
            });
        }
        if self.logistics.min_trials < MIN_TRIALS {
            return Err(TradeError::InvalidParameter {
                name: "logistics.min_trials",
                reason: format!(
                    "{} is below the floor of {MIN_TRIALS} trials",
                    self.logistics.min_trials
                ),
            });
        }
        if self.logistics.max_trials < self.logistics.min_trials {
            return Err(TradeError::InvalidParameter {
                name: "logistics.max_trials",
                reason: format!(
                    "budget {} is below the minimum trial count {}",
                    self.logistics.max_trials, self.logistics.min_trials
                ),
            });
        }
        for p in &self.logistics.routes {
            let valid = p.base_transit_days > 0.0
                && p.transit_sigma >= 0.0
                && (0.0..=1.0).contains(&p.customs_delay_probability)
                && p.customs_delay_mean_days >= 0.0;
            if !valid {
                return Err(TradeError::InvalidParameter {
                    name: "logistics.routes",
                    reason: format!("profile {} by {} has out-of-range parameters", p.route, p.mode),
                });
            }
        }
        Ok(())
    }
}
