//! Shared fixtures for the integration tests. Everything is built in
//! memory and deterministically, so no test touches the data directory.
#![allow(dead_code)]

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tradedesk_core::{
    config::TradeConfig,
    context::TradeContext,
    encoder::CustomsRecord,
    forecast::{DemandRecord, HistoricalSeries},
    landed_cost::{DutyRateTable, DutyRates},
    reference::ReferenceData,
    types::{Market, ProductCategory, Route, Shipment, TransportMode},
};

pub fn route_for(market: Market) -> Route {
    match market {
        Market::De => Route::TrDe,
        Market::Nl => Route::TrNl,
    }
}

pub fn ship(
    category: ProductCategory,
    market: Market,
    mode: TransportMode,
    origin: &str,
    month: u32,
    value: Decimal,
) -> Shipment {
    Shipment {
        product_category: category,
        origin_country: origin.to_string(),
        destination_market: market,
        declared_value: value,
        weight_kg: 80.0,
        route: route_for(market),
        mode,
        ship_date: NaiveDate::from_ymd_opt(2023, month, 10).unwrap(),
    }
}

/// 240 labeled records covering every category, market, mode, season and
/// route. Phones, cameras and components from CN are always penalized.
pub fn customs_records() -> Vec<CustomsRecord> {
    let origins = ["CN", "TR", "VN"];
    let risky = [
        ProductCategory::Phone,
        ProductCategory::Camera,
        ProductCategory::ElectronicsComponent,
    ];
    (0..240usize)
        .map(|i| {
            let category = ProductCategory::ALL[i % 10];
            let mode = TransportMode::ALL[(i / 10) % 3];
            let market = Market::ALL[(i / 30) % 2];
            let origin = origins[(i / 7) % 3];
            let month = (i % 12) as u32 + 1;
            let value = Decimal::from(1_000 + (i as i64 * 37) % 9_000);
            let penalized = (risky.contains(&category) && origin == "CN")
                || (mode == TransportMode::Sea && i % 4 == 0)
                || i % 11 == 0;
            CustomsRecord {
                shipment: ship(category, market, mode, origin, month, value),
                penalized,
            }
        })
        .collect()
}

fn month_at(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .checked_add_months(Months::new(i as u32))
        .unwrap()
}

/// 48 months (2020-01..2023-12) for three clearly different profiles:
/// phones high and stable, computers mid-volume and growing, cables low
/// and volatile.
pub fn demand_history() -> HistoricalSeries {
    let mut records = Vec::new();
    for (market, scale) in [(Market::De, 1.0), (Market::Nl, 0.95)] {
        for i in 0..48 {
            let month = month_at(i);
            let seasonal = 1.0 + 0.05 * (month.month0() as f64 * std::f64::consts::PI / 6.0).sin();
            let swing = if i % 2 == 0 { 1.4 } else { 0.6 };
            for (product, quantity) in [
                (ProductCategory::Phone, 5_000.0 * seasonal),
                (ProductCategory::Computer, 1_500.0 * 1.015f64.powi(i as i32) * seasonal),
                (ProductCategory::Cable, 200.0 * swing),
            ] {
                records.push(DemandRecord {
                    month,
                    product,
                    market,
                    quantity: quantity * scale,
                });
            }
        }
    }
    HistoricalSeries::new(records)
}

pub fn duty_rates() -> DutyRateTable {
    let rates = ProductCategory::ALL
        .iter()
        .map(|c| {
            (
                *c,
                DutyRates {
                    duty_rate: dec!(0.05),
                    vat_rate: dec!(0.19),
                    market_vat_rates: BTreeMap::from([(Market::Nl, dec!(0.21))]),
                },
            )
        })
        .collect();
    DutyRateTable::new(rates).unwrap()
}

pub fn reference_data() -> ReferenceData {
    ReferenceData::new(duty_rates(), demand_history(), customs_records())
}

pub fn context() -> TradeContext {
    let _ = env_logger::builder().is_test(true).try_init();
    TradeContext::build(TradeConfig::default(), reference_data()).unwrap()
}
