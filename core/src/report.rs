//! Report aggregator: joins every engine's output for one shipment.
//!
//! Recommendation rules:
//!   risk Low     → ProceedLowRisk
//!   risk Medium  → AddDocumentation
//!   risk High    → ReviewAlternativeRoutes
//!   growth  > DEMAND_GROWTH_THRESHOLD       → DemandGrowth
//!   growth  < DEMAND_DECLINE_THRESHOLD      → DemandDecline
//!   service level < SERVICE_LEVEL_FLOOR     → ServiceLevelAtRisk
//!
//! Nothing here recomputes a number; the summary only copies and tags.

use crate::{
    context::TradeContext,
    error::{TradeError, TradeResult},
    forecast::ForecastResult,
    landed_cost::{expected_cost, expected_duration, profitability_margin, LandedCostBreakdown},
    logistics::EtaDistribution,
    risk::{RiskAssessment, RiskCategory},
    types::{Route, Shipment, TransportMode},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEMAND_GROWTH_THRESHOLD: f64 = 0.10;
pub const DEMAND_DECLINE_THRESHOLD: f64 = -0.05;
pub const SERVICE_LEVEL_FLOOR: f64 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    ProceedLowRisk,
    AddDocumentation,
    ReviewAlternativeRoutes,
    DemandGrowth,
    DemandDecline,
    ServiceLevelAtRisk,
}

pub fn recommend(risk: RiskCategory, growth_ratio: f64, service_level: f64) -> Vec<Recommendation> {
    let mut out = vec![match risk {
        RiskCategory::Low => Recommendation::ProceedLowRisk,
        RiskCategory::Medium => Recommendation::AddDocumentation,
        RiskCategory::High => Recommendation::ReviewAlternativeRoutes,
    }];
    if growth_ratio > DEMAND_GROWTH_THRESHOLD {
        out.push(Recommendation::DemandGrowth);
    } else if growth_ratio < DEMAND_DECLINE_THRESHOLD {
        out.push(Recommendation::DemandDecline);
    }
    if service_level < SERVICE_LEVEL_FLOOR {
        out.push(Recommendation::ServiceLevelAtRisk);
    }
    out
}

/// ETA distribution without the raw samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaSummary {
    pub route:         Route,
    pub mode:          TransportMode,
    pub seed:          u64,
    pub trial_count:   usize,
    pub mean:          f64,
    pub p50:           f64,
    pub p90:           f64,
    pub p95:           f64,
    pub target_days:   f64,
    pub service_level: f64,
}

impl From<&EtaDistribution> for EtaSummary {
    fn from(d: &EtaDistribution) -> Self {
        Self {
            route:         d.route,
            mode:          d.mode,
            seed:          d.seed,
            trial_count:   d.trial_count(),
            mean:          d.mean,
            p50:           d.p50,
            p90:           d.p90,
            p95:           d.p95,
            target_days:   d.target_days,
            service_level: d.service_level,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSummary {
    pub report_id:       Uuid,
    pub generated_at:    DateTime<Utc>,
    pub shipment:        Shipment,
    pub risk:            RiskAssessment,
    pub forecast:        ForecastResult,
    pub landed_cost:     LandedCostBreakdown,
    pub eta:             EtaSummary,
    pub recommendations: Vec<Recommendation>,
}

impl TradeSummary {
    pub fn assemble(
        shipment: Shipment,
        risk: RiskAssessment,
        forecast: ForecastResult,
        landed_cost: LandedCostBreakdown,
        eta: &EtaDistribution,
    ) -> Self {
        let recommendations = recommend(risk.category, forecast.growth_ratio, eta.service_level);
        Self {
            report_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            shipment,
            risk,
            forecast,
            landed_cost,
            eta: EtaSummary::from(eta),
            recommendations,
        }
    }
}

// ── Scenario ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRequest {
    pub shipment:       Shipment,
    pub horizon_months: usize,
    pub trial_count:    usize,
    /// None → the destination market's configured target.
    pub target_days:    Option<f64>,
    /// None → a fresh seed, recorded on the ETA summary.
    pub seed:           Option<u64>,
}

/// Run every engine for one shipment and assemble the summary.
pub fn run_scenario(ctx: &TradeContext, request: &ScenarioRequest) -> TradeResult<TradeSummary> {
    let s = &request.shipment;
    let risk = ctx.score_risk(s)?;
    let forecast = ctx.forecast_demand(s.product_category, s.destination_market, request.horizon_months)?;
    let landed_cost = ctx.compute_landed_cost(s)?;
    let eta = ctx.simulate_logistics(s.route, s.mode, request.trial_count, request.target_days, request.seed)?;

    log::info!(
        "report: {}/{} by {} risk={:?} total={} sl={:.3}",
        s.product_category,
        s.destination_market,
        s.mode,
        risk.category,
        landed_cost.total,
        eta.service_level
    );
    Ok(TradeSummary::assemble(s.clone(), risk, forecast, landed_cost, &eta))
}

// ── Route comparison ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOption {
    pub mode:              TransportMode,
    pub landed_cost:       LandedCostBreakdown,
    pub eta:               EtaSummary,
    /// All-in landed cost plus the lane's delay cost weighted by delay
    /// probability.
    pub expected_cost:     Decimal,
    /// Lane median transit plus the expected customs delay.
    pub expected_days:     f64,
}

impl RouteOption {
    /// Margin per expected transit day at a given sale price.
    pub fn margin_per_day(&self, price: Decimal) -> Option<f64> {
        profitability_margin(price, self.expected_cost, self.expected_days)
    }
}

/// Landed cost and ETA for every mode with a profile on the shipment's
/// route, cheapest first. Every mode is simulated with the same seed.
pub fn compare_routes(
    ctx: &TradeContext,
    shipment: &Shipment,
    trial_count: usize,
    target_days: Option<f64>,
    seed: u64,
) -> TradeResult<Vec<RouteOption>> {
    let modes = ctx.config.logistics.modes_for(shipment.route);
    if modes.is_empty() {
        return Err(TradeError::InvalidParameter {
            name: "route",
            reason: format!("no transport mode has a profile on route {}", shipment.route),
        });
    }

    let mut options = modes
        .into_iter()
        .map(|mode| -> TradeResult<RouteOption> {
            let candidate = Shipment { mode, ..shipment.clone() };
            let lane = ctx.config.logistics.profile(candidate.route, mode)?;
            let landed_cost = ctx.compute_landed_cost(&candidate)?;
            let eta = ctx.simulate_logistics(candidate.route, mode, trial_count, target_days, Some(seed))?;
            Ok(RouteOption {
                mode,
                expected_cost: expected_cost(
                    landed_cost.all_in_total,
                    lane.customs_delay_probability,
                    lane.delay_cost,
                )?,
                expected_days: expected_duration(
                    lane.base_transit_days,
                    lane.customs_delay_probability,
                    lane.customs_delay_mean_days,
                ),
                eta: EtaSummary::from(&eta),
                landed_cost,
            })
        })
        .collect::<TradeResult<Vec<_>>>()?;

    options.sort_by(|a, b| a.landed_cost.total.cmp(&b.landed_cost.total).then(a.mode.cmp(&b.mode)));
    log::debug!("report: compared {} modes on {}", options.len(), shipment.route);
    Ok(options)
}
