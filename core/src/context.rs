//! TradeContext: the single entry point for every decision-support call.
//!
//! A context owns configuration, reference data, the historical aggregates,
//! the trained risk model and the segmentation of the demand history. It is immutable after `build()`: every
//! operation takes `&self`, so one context can serve any number of threads.
//!
//! RULES:
//!   - Reference data changes mean building a new context, then swapping it
//!     in through a ContextHandle. Readers holding the old Arc are unaffected.
//!   - Every random draw comes from an explicit seed. An unseeded simulation
//!     draws one fresh seed here, at the boundary, and records it.

use crate::{
    config::{SegmentationConfig, TradeConfig},
    encoder::{FeatureEncoder, HistoricalAggregates},
    error::TradeResult,
    forecast::{forecast_series, ForecastResult},
    landed_cost::{CostOverrides, LandedCostBreakdown, LandedCostCalculator},
    logistics::{EtaDistribution, LogisticsSimulator},
    reference::ReferenceData,
    risk::{build_training_set, RiskAssessment, RiskModel},
    segment::{segment_pairs, PairFeatures, Segmentation},
    types::{Market, ProductCategory, ProductMarket, Route, Shipment, TransportMode},
};
use parking_lot::RwLock;
use std::sync::Arc;

pub struct TradeContext {
    pub config:     TradeConfig,
    pub reference:  ReferenceData,
    pub aggregates: HistoricalAggregates,
    pub model:      RiskModel,
    /// Every history pair, segmented once at build time.
    pub segmentation: Segmentation,
}

impl TradeContext {
    /// Validate the config, aggregate customs history, train the risk model
    /// and segment the demand history.
    pub fn build(config: TradeConfig, reference: ReferenceData) -> TradeResult<Self> {
        config.validate()?;
        let aggregates = HistoricalAggregates::from_records(&reference.customs_records);
        let training_set = build_training_set(&reference.customs_records, &aggregates)?;
        let model = RiskModel::train(&training_set, &config.risk.training)?;
        Self::assemble(config, reference, aggregates, model)
    }

    /// Build around an already trained model (e.g. one deserialized from
    /// another process). No training happens.
    pub fn with_model(
        config: TradeConfig,
        reference: ReferenceData,
        model: RiskModel,
    ) -> TradeResult<Self> {
        config.validate()?;
        model.validate()?;
        let aggregates = HistoricalAggregates::from_records(&reference.customs_records);
        Self::assemble(config, reference, aggregates, model)
    }

    fn assemble(
        config: TradeConfig,
        reference: ReferenceData,
        aggregates: HistoricalAggregates,
        model: RiskModel,
    ) -> TradeResult<Self> {
        let pairs = reference.history.pairs();
        let segmentation = segment_history(&config, &reference, &pairs, config.segmentation.k)?;

        log::info!(
            "context: built with {} customs records, {} history pairs in {} segments",
            reference.customs_records.len(),
            pairs.len(),
            segmentation.effective_k
        );
        Ok(Self { config, reference, aggregates, model, segmentation })
    }

    pub fn score_risk(&self, shipment: &Shipment) -> TradeResult<RiskAssessment> {
        let features = FeatureEncoder::encode(shipment, Some(&self.aggregates))?;
        self.model.score(&features, &self.config.risk.thresholds)
    }

    /// Forecast one pair, tagged with the pair's segment id.
    pub fn forecast_demand(
        &self,
        product: ProductCategory,
        market: Market,
        horizon_months: usize,
    ) -> TradeResult<ForecastResult> {
        let series = self.reference.history.slice(product, market);
        let mut result =
            forecast_series(product, market, &series, horizon_months, &self.config.forecast)?;

        result.segment_id = self.segmentation.segment_of((product, market)).map(|s| s.id);
        Ok(result)
    }

    /// Segment the given pairs with the configured K.
    pub fn segment_markets(&self, pairs: &[ProductMarket]) -> TradeResult<Segmentation> {
        self.segment_markets_with_k(pairs, self.config.segmentation.k)
    }

    pub fn segment_markets_with_k(
        &self,
        pairs: &[ProductMarket],
        k: usize,
    ) -> TradeResult<Segmentation> {
        segment_history(&self.config, &self.reference, pairs, k)
    }

    pub fn compute_landed_cost(&self, shipment: &Shipment) -> TradeResult<LandedCostBreakdown> {
        self.calculator().compute(shipment, &self.reference.duty_rates)
    }

    pub fn compute_landed_cost_with(
        &self,
        shipment: &Shipment,
        overrides: &CostOverrides,
    ) -> TradeResult<LandedCostBreakdown> {
        self.calculator()
            .compute_with(shipment, &self.reference.duty_rates, overrides)
    }

    /// `target_days = None` uses the route market's default target.
    pub fn simulate_logistics(
        &self,
        route: Route,
        mode: TransportMode,
        trial_count: usize,
        target_days: Option<f64>,
        seed: Option<u64>,
    ) -> TradeResult<EtaDistribution> {
        let target = match target_days {
            Some(t) => t,
            None => self.config.logistics.target_days_for(route.market())?,
        };
        let seed = seed.unwrap_or_else(|| {
            let fresh = rand::random::<u64>();
            log::warn!("logistics: unseeded simulation for {route} by {mode}, drew seed={fresh}");
            fresh
        });
        LogisticsSimulator::new(&self.config.logistics).simulate(route, mode, trial_count, target, seed)
    }

    fn calculator(&self) -> LandedCostCalculator<'_> {
        LandedCostCalculator::new(&self.config.cost, &self.config.logistics)
    }
}

fn segment_history(
    config: &TradeConfig,
    reference: &ReferenceData,
    pairs: &[ProductMarket],
    k: usize,
) -> TradeResult<Segmentation> {
    let features = pairs
        .iter()
        .map(|&(product, market)| {
            let series = reference.history.slice(product, market);
            PairFeatures::from_series((product, market), &series)
        })
        .collect::<TradeResult<Vec<_>>>()?;
    let config = SegmentationConfig {
        k,
        ..config.segmentation.clone()
    };
    segment_pairs(&features, &config)
}

// ── Hot swap ─────────────────────────────────────────────────────────────────

/// Shared, replaceable context. Readers take a snapshot `Arc` and keep
/// working on it even if a new context is swapped in mid-call.
pub struct ContextHandle {
    current: RwLock<Arc<TradeContext>>,
}

impl ContextHandle {
    pub fn new(context: TradeContext) -> Self {
        Self { current: RwLock::new(Arc::new(context)) }
    }

    pub fn snapshot(&self) -> Arc<TradeContext> {
        self.current.read().clone()
    }

    /// Swap in a new context; returns the one it replaced.
    pub fn replace(&self, context: TradeContext) -> Arc<TradeContext> {
        let next = Arc::new(context);
        let previous = std::mem::replace(&mut *self.current.write(), next);
        log::info!("context: replaced");
        previous
    }

    /// Rebuild from fresh reference data and swap it in. On failure the
    /// current context stays in place.
    pub fn reload(&self, config: TradeConfig, reference: ReferenceData) -> TradeResult<()> {
        let context = TradeContext::build(config, reference)?;
        self.replace(context);
        Ok(())
    }
}

impl From<TradeContext> for ContextHandle {
    fn from(context: TradeContext) -> Self {
        Self::new(context)
    }
}

const _: fn() = || {
    fn is_send_sync<T: Send + Sync>() {}
    is_send_sync::<TradeContext>();
    is_send_sync::<ContextHandle>();
};

impl std::fmt::Debug for TradeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeContext")
            .field("duty_categories", &self.reference.duty_rates.len())
            .field("history_records", &self.reference.history.len())
            .field("customs_records", &self.reference.customs_records.len())
            .field("model_iterations", &self.model.iterations)
            .field("segments", &self.segmentation.effective_k)
            .finish()
    }
}

