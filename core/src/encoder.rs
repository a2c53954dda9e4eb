//! Feature encoder: shipment validation and fixed-order numeric encoding.
//!
//! Shared by:
//!   - the risk scoring engine (encode)
//!   - the landed cost calculator (validate)
//!
//! Encoding is pure: no I/O, no randomness, same input → same vector.

use crate::{
    error::{TradeError, TradeResult},
    types::{Market, ProductCategory, Route, Season, Shipment, TransportMode},
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Feature layout. Index i of every RiskFeatureVector is FEATURE_NAMES[i].
/// NEVER reorder: trained models store weights by position.
pub const FEATURE_NAMES: [&str; 27] = [
    // one-hot product category (10)
    "category=electronics",
    "category=electronics_component",
    "category=electronics_accessory",
    "category=phone",
    "category=computer",
    "category=tablet",
    "category=camera",
    "category=headphones",
    "category=charger",
    "category=cable",
    // one-hot market (2)
    "market=DE",
    "market=NL",
    // one-hot mode (3)
    "mode=air",
    "mode=sea",
    "mode=road",
    // one-hot season (4)
    "season=winter",
    "season=spring",
    "season=summer",
    "season=autumn",
    // one-hot route (2)
    "route=TR-DE",
    "route=TR-NL",
    // numeric
    "log_declared_value",
    "weight_kg",
    "log_value_per_kg",
    "category_violation_rate",
    "origin_violation_rate",
    "history_available",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Features [0, INDICATOR_COUNT) are 0/1 indicators.
pub const INDICATOR_COUNT: usize = 21;

const CATEGORY_OFFSET: usize = 0;
const MARKET_OFFSET: usize = 10;
const MODE_OFFSET: usize = 12;
const SEASON_OFFSET: usize = 15;
const ROUTE_OFFSET: usize = 19;
const NUMERIC_OFFSET: usize = INDICATOR_COUNT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFeatureVector {
    pub values: Vec<f64>,
}

impl RiskFeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A past shipment and whether customs penalised or delayed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomsRecord {
    pub shipment: Shipment,
    pub penalized: bool,
}

/// Historical violation rates, add-one smoothed so that a single
/// observation never produces a rate of exactly 0 or 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalAggregates {
    pub category_violation_rate: BTreeMap<ProductCategory, f64>,
    pub origin_violation_rate: BTreeMap<String, f64>,
}

impl HistoricalAggregates {
    pub fn from_records(records: &[CustomsRecord]) -> Self {
        let mut by_category: BTreeMap<ProductCategory, (usize, usize)> = BTreeMap::new();
        let mut by_origin: BTreeMap<String, (usize, usize)> = BTreeMap::new();

        for r in records {
            let c = by_category.entry(r.shipment.product_category).or_default();
            c.0 += usize::from(r.penalized);
            c.1 += 1;
            let o = by_origin.entry(r.shipment.origin_country.clone()).or_default();
            o.0 += usize::from(r.penalized);
            o.1 += 1;
        }

        let smoothed = |(hits, total): (usize, usize)| (hits as f64 + 1.0) / (total as f64 + 2.0);
        Self {
            category_violation_rate: by_category.into_iter().map(|(k, v)| (k, smoothed(v))).collect(),
            origin_violation_rate: by_origin.into_iter().map(|(k, v)| (k, smoothed(v))).collect(),
        }
    }

    fn category_rate(&self, category: ProductCategory) -> TradeResult<f64> {
        self.category_violation_rate
            .get(&category)
            .copied()
            .ok_or_else(|| TradeError::MissingAggregate {
                kind: "category",
                key: category.code().to_string(),
            })
    }

    fn origin_rate(&self, origin: &str) -> TradeResult<f64> {
        self.origin_violation_rate
            .get(origin)
            .copied()
            .ok_or_else(|| TradeError::MissingAggregate {
                kind: "origin",
                key: origin.to_string(),
            })
    }
}

pub struct FeatureEncoder;

impl FeatureEncoder {
    /// Structural checks shared by every consumer of a Shipment.
    pub fn validate(shipment: &Shipment) -> TradeResult<()> {
        let origin = &shipment.origin_country;
        if origin.len() != 2 || !origin.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(TradeError::MalformedShipment {
                field: "origin_country",
                reason: format!("must be a two-letter ISO code, got '{origin}'"),
            });
        }
        if shipment.declared_value < Decimal::ZERO {
            return Err(TradeError::MalformedShipment {
                field: "declared_value",
                reason: format!("must be non-negative, got {}", shipment.declared_value),
            });
        }
        if !shipment.weight_kg.is_finite() || shipment.weight_kg < 0.0 {
            return Err(TradeError::MalformedShipment {
                field: "weight_kg",
                reason: format!("must be a finite non-negative number, got {}", shipment.weight_kg),
            });
        }
        if shipment.route.market() != shipment.destination_market {
            return Err(TradeError::MalformedShipment {
                field: "route",
                reason: format!(
                    "route {} does not serve destination market {}",
                    shipment.route, shipment.destination_market
                ),
            });
        }
        Ok(())
    }

    /// Encode a shipment. Without aggregates the two rate features are 0
    /// and `history_available` is 0.
    pub fn encode(
        shipment: &Shipment,
        aggregates: Option<&HistoricalAggregates>,
    ) -> TradeResult<RiskFeatureVector> {
        Self::validate(shipment)?;

        let mut values = vec![0.0; FEATURE_COUNT];
        values[CATEGORY_OFFSET + shipment.product_category.index()] = 1.0;
        values[MARKET_OFFSET + shipment.destination_market.index()] = 1.0;
        values[MODE_OFFSET + shipment.mode.index()] = 1.0;
        values[SEASON_OFFSET + shipment.season().index()] = 1.0;
        values[ROUTE_OFFSET + shipment.route.index()] = 1.0;

        let declared = shipment.declared_value.to_f64().ok_or_else(|| TradeError::Numerical {
            context: "feature encoding",
            reason: format!("declared value {} not representable", shipment.declared_value),
        })?;
        values[NUMERIC_OFFSET] = declared.ln_1p();
        values[NUMERIC_OFFSET + 1] = shipment.weight_kg;
        values[NUMERIC_OFFSET + 2] = if shipment.weight_kg > 0.0 {
            (declared / shipment.weight_kg).ln_1p()
        } else {
            0.0
        };

        if let Some(agg) = aggregates {
            values[NUMERIC_OFFSET + 3] = agg.category_rate(shipment.product_category)?;
            values[NUMERIC_OFFSET + 4] = agg.origin_rate(&shipment.origin_country)?;
            values[NUMERIC_OFFSET + 5] = 1.0;
        }

        Ok(RiskFeatureVector { values })
    }
}

// Compile-time check that the one-hot blocks fill the indicator range.
const _: () = assert!(
    ROUTE_OFFSET + Route::ALL.len() == INDICATOR_COUNT
        && SEASON_OFFSET + Season::ALL.len() == ROUTE_OFFSET
        && MODE_OFFSET + TransportMode::ALL.len() == SEASON_OFFSET
        && MARKET_OFFSET + Market::ALL.len() == MODE_OFFSET
        && CATEGORY_OFFSET + ProductCategory::ALL.len() == MARKET_OFFSET
);
