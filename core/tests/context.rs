//! TradeContext operations, the hot-swap handle and the report layer.

mod common;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;
use tradedesk_core::{
    config::TradeConfig,
    context::{ContextHandle, TradeContext},
    error::TradeError,
    forecast::{DemandRecord, HistoricalSeries},
    report::{compare_routes, recommend, run_scenario, Recommendation, ScenarioRequest},
    risk::RiskCategory,
    types::{Market, ProductCategory, Route, TransportMode},
};

#[test]
fn context_exposes_every_operation() {
    let ctx = common::context();
    let s = common::ship(ProductCategory::Phone, Market::De, TransportMode::Sea, "CN", 4, dec!(10000));

    let risk = ctx.score_risk(&s).unwrap();
    assert!((0.0..=1.0).contains(&risk.probability));

    let cost = ctx.compute_landed_cost(&s).unwrap();
    assert_eq!(cost.cif_value, cost.goods_value + cost.freight + cost.insurance);

    let eta = ctx.simulate_logistics(Route::TrDe, TransportMode::Sea, 1_000, None, Some(3)).unwrap();
    assert_eq!(eta.target_days, 20.0, "DE default target should apply");
    assert_eq!(eta.seed, 3);

    let forecast = ctx.forecast_demand(ProductCategory::Computer, Market::Nl, 6).unwrap();
    assert_eq!(forecast.point_forecast.len(), 6);
    assert_eq!(forecast.segment_id, Some(1), "computers sit in the middle segment");

    let seg = ctx.segment_markets(&[
        (ProductCategory::Phone, Market::De),
        (ProductCategory::Cable, Market::De),
    ]).unwrap();
    assert_eq!(seg.effective_k, 2);
}

/// An unseeded run draws a seed and records it, so it can be replayed.
#[test]
fn unseeded_simulation_records_its_seed() {
    let ctx = common::context();
    let first = ctx.simulate_logistics(Route::TrNl, TransportMode::Road, 500, Some(12.0), None).unwrap();
    let replay = ctx
        .simulate_logistics(Route::TrNl, TransportMode::Road, 500, Some(12.0), Some(first.seed))
        .unwrap();
    assert_eq!(first.samples, replay.samples);
}

#[test]
fn forecast_for_unknown_pair_reports_missing_history() {
    let ctx = common::context();
    assert!(matches!(
        ctx.forecast_demand(ProductCategory::Tablet, Market::De, 6),
        Err(TradeError::InsufficientHistory { available: 0, .. })
    ));
}

#[test]
fn training_preconditions_surface_at_build() {
    let mut reference = common::reference_data();
    reference.customs_records.retain(|r| !r.penalized);
    assert!(matches!(
        TradeContext::build(TradeConfig::default(), reference),
        Err(TradeError::InsufficientTrainingData { .. })
    ));
}

/// A history pair too short to segment fails the build; forecasts are never
/// returned without their segment.
#[test]
fn unsegmentable_history_surfaces_at_build() {
    let mut records = common::demand_history().records().to_vec();
    records.push(DemandRecord {
        month: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        product: ProductCategory::Tablet,
        market: Market::De,
        quantity: 40.0,
    });
    let mut reference = common::reference_data();
    reference.history = HistoricalSeries::new(records);

    assert!(matches!(
        TradeContext::build(TradeConfig::default(), reference),
        Err(TradeError::InsufficientHistory { available: 1, required: 2 })
    ));

    let ctx = common::context();
    assert_eq!(ctx.segmentation.effective_k, 3);
    for (product, market) in ctx.reference.history.pairs() {
        let forecast = ctx.forecast_demand(product, market, 3).unwrap();
        assert_eq!(
            forecast.segment_id,
            ctx.segmentation.segment_of((product, market)).map(|s| s.id)
        );
        assert!(forecast.segment_id.is_some());
    }
}

/// Readers keep their snapshot while a replacement is swapped in.
#[test]
fn handle_swaps_context_atomically() {
    let handle = Arc::new(ContextHandle::new(common::context()));
    let before = handle.snapshot();

    let mut config = TradeConfig::default();
    config.logistics.default_target_days.insert(Market::De, 30.0);
    let replacement = TradeContext::with_model(config, common::reference_data(), before.model.clone()).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let h = Arc::clone(&handle);
            thread::spawn(move || {
                let ctx = h.snapshot();
                ctx.simulate_logistics(Route::TrDe, TransportMode::Air, 200, None, Some(1))
                    .unwrap()
                    .target_days
            })
        })
        .collect();
    let previous = handle.replace(replacement);
    for r in readers {
        let target = r.join().unwrap();
        assert!(target == 20.0 || target == 30.0, "unexpected target {target}");
    }

    assert!(Arc::ptr_eq(&previous, &before));
    assert_eq!(before.config.logistics.target_days_for(Market::De).unwrap(), 20.0);
    assert_eq!(handle.snapshot().config.logistics.target_days_for(Market::De).unwrap(), 30.0);
}

#[test]
fn failed_reload_keeps_current_context() {
    let handle = ContextHandle::new(common::context());
    let before = handle.snapshot();

    let mut config = TradeConfig::default();
    config.logistics.chunk_size = 0;
    assert!(handle.reload(config, common::reference_data()).is_err());
    assert!(Arc::ptr_eq(&before, &handle.snapshot()));
}

#[test]
fn scenario_summary_carries_every_engine() {
    let ctx = common::context();
    let request = ScenarioRequest {
        shipment: common::ship(ProductCategory::Phone, Market::Nl, TransportMode::Road, "TR", 9, dec!(4000)),
        horizon_months: 12,
        trial_count: 2_000,
        target_days: Some(15.0),
        seed: Some(11),
    };
    let summary = run_scenario(&ctx, &request).unwrap();

    assert_eq!(summary.eta.trial_count, 2_000);
    assert_eq!(summary.eta.target_days, 15.0);
    assert_eq!(summary.forecast.product, ProductCategory::Phone);
    assert_eq!(summary.landed_cost, ctx.compute_landed_cost(&request.shipment).unwrap());
    assert!(!summary.recommendations.is_empty());

    let json = serde_json::to_string(&summary).unwrap();
    assert!(json.contains("\"report_id\""));
}

#[test]
fn recommendations_follow_risk_and_demand() {
    assert_eq!(recommend(RiskCategory::Low, 0.0, 0.95), vec![Recommendation::ProceedLowRisk]);
    assert_eq!(
        recommend(RiskCategory::Medium, 0.25, 0.95),
        vec![Recommendation::AddDocumentation, Recommendation::DemandGrowth]
    );
    assert_eq!(
        recommend(RiskCategory::High, -0.10, 0.50),
        vec![
            Recommendation::ReviewAlternativeRoutes,
            Recommendation::DemandDecline,
            Recommendation::ServiceLevelAtRisk,
        ]
    );
    // Boundaries are exclusive.
    assert_eq!(recommend(RiskCategory::Low, 0.10, 0.80), vec![Recommendation::ProceedLowRisk]);
    assert_eq!(recommend(RiskCategory::Low, -0.05, 0.80), vec![Recommendation::ProceedLowRisk]);
}

/// Every mode on the corridor, cheapest landed cost first.
#[test]
fn route_comparison_is_sorted_by_total() {
    let ctx = common::context();
    let s = common::ship(ProductCategory::Computer, Market::De, TransportMode::Sea, "VN", 6, dec!(15000));
    let options = compare_routes(&ctx, &s, 1_000, None, 5).unwrap();

    assert_eq!(options.len(), 3);
    for w in options.windows(2) {
        assert!(w[0].landed_cost.total <= w[1].landed_cost.total);
    }
    let air = options.iter().find(|o| o.mode == TransportMode::Air).unwrap();
    assert!(air.expected_days < options.iter().find(|o| o.mode == TransportMode::Sea).unwrap().expected_days);
    assert!(options.iter().all(|o| o.expected_cost >= o.landed_cost.all_in_total));
    assert!(options.iter().all(|o| o.landed_cost.all_in_total > o.landed_cost.total));
    assert!(air.margin_per_day(dec!(30000)).is_some());
}
