//! Landed cost calculator: deterministic cost-to-destination.
//!
//!   goods     = declared value
//!   freight   = lane base freight + per-kg rate × weight   (or override)
//!   insurance = max(rate × declared value, minimum)        (or override)
//!   CIF       = goods + freight + insurance
//!   duty      = CIF × duty_rate(category)
//!   VAT       = (CIF + duty) × vat_rate(category, market)
//!   total     = CIF + duty + VAT
//!   handling  = handling + documentation + warehouse fees
//!   all-in    = total + handling
//!
//! All arithmetic is exact Decimal. Rounding happens once per reported
//! total, to CURRENCY_DP places, half away from zero. The flat fees are
//! not dutiable and never enter `total`.
//!
//! A shipment declared at zero value has nothing dutiable: duty and VAT
//! are zero and the total is freight plus insurance.

use crate::{
    config::{CostConfig, LogisticsConfig},
    encoder::FeatureEncoder,
    error::{TradeError, TradeResult},
    types::{Market, ProductCategory, Shipment},
};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CURRENCY_DP: u32 = 2;

pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}

// ── Duty rate table ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutyRates {
    pub duty_rate: Decimal,
    /// VAT used when the destination market has no override.
    pub vat_rate: Decimal,
    #[serde(default)]
    pub market_vat_rates: BTreeMap<Market, Decimal>,
}

impl DutyRates {
    pub fn vat_rate_for(&self, market: Market) -> Decimal {
        self.market_vat_rates
            .get(&market)
            .copied()
            .unwrap_or(self.vat_rate)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DutyRateEntry {
    pub category: ProductCategory,
    #[serde(flatten)]
    pub rates: DutyRates,
}

/// Static reference data: category → duty and VAT rates.
/// A category without an entry is an error, never a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DutyRateTable {
    rates: BTreeMap<ProductCategory, DutyRates>,
}

impl DutyRateTable {
    pub fn new(rates: BTreeMap<ProductCategory, DutyRates>) -> TradeResult<Self> {
        let unit = Decimal::ONE;
        for (category, r) in &rates {
            let all_rates = std::iter::once(r.duty_rate)
                .chain(std::iter::once(r.vat_rate))
                .chain(r.market_vat_rates.values().copied());
            for rate in all_rates {
                if rate < Decimal::ZERO || rate > unit {
                    return Err(TradeError::InvalidParameter {
                        name: "duty_rates",
                        reason: format!("rate {rate} for {category} is outside [0, 1]"),
                    });
                }
            }
        }
        Ok(Self { rates })
    }

    pub fn from_entries(entries: Vec<DutyRateEntry>) -> TradeResult<Self> {
        let mut rates = BTreeMap::new();
        for e in entries {
            if rates.insert(e.category, e.rates).is_some() {
                return Err(TradeError::InvalidParameter {
                    name: "duty_rates",
                    reason: format!("duplicate entry for {}", e.category),
                });
            }
        }
        Self::new(rates)
    }

    pub fn get(&self, category: ProductCategory) -> TradeResult<&DutyRates> {
        self.rates
            .get(&category)
            .ok_or_else(|| TradeError::UnknownDutyCategory {
                category: category.code().to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

// ── Breakdown ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandedCostBreakdown {
    pub goods_value: Decimal,
    pub freight: Decimal,
    pub insurance: Decimal,
    /// goods + freight + insurance
    pub cif_value: Decimal,
    pub duty: Decimal,
    pub vat: Decimal,
    /// cif_value + duty + vat, rounded to CURRENCY_DP.
    pub total: Decimal,
    /// Flat per-shipment fees: handling, documentation, warehouse.
    pub handling: Decimal,
    /// total + handling, rounded to CURRENCY_DP.
    pub all_in_total: Decimal,
}

/// Caller-supplied replacements for estimated components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostOverrides {
    pub freight: Option<Decimal>,
    pub insurance: Option<Decimal>,
}

pub struct LandedCostCalculator<'a> {
    cost: &'a CostConfig,
    logistics: &'a LogisticsConfig,
}

impl<'a> LandedCostCalculator<'a> {
    pub fn new(cost: &'a CostConfig, logistics: &'a LogisticsConfig) -> Self {
        Self { cost, logistics }
    }

    pub fn compute(
        &self,
        shipment: &Shipment,
        table: &DutyRateTable,
    ) -> TradeResult<LandedCostBreakdown> {
        self.compute_with(shipment, table, &CostOverrides::default())
    }

    pub fn compute_with(
        &self,
        shipment: &Shipment,
        table: &DutyRateTable,
        overrides: &CostOverrides,
    ) -> TradeResult<LandedCostBreakdown> {
        FeatureEncoder::validate(shipment)?;
        let rates = table.get(shipment.product_category)?;

        for (name, value) in [("freight", overrides.freight), ("insurance", overrides.insurance)] {
            if matches!(value, Some(v) if v < Decimal::ZERO) {
                return Err(TradeError::InvalidParameter {
                    name: "cost_overrides",
                    reason: format!("{name} override must be non-negative"),
                });
            }
        }

        let goods_value = shipment.declared_value;
        let freight = match overrides.freight {
            Some(f) => f,
            None => self.estimate_freight(shipment)?,
        };
        let insurance = match overrides.insurance {
            Some(i) => i,
            None => (goods_value * self.cost.insurance_rate).max(self.cost.insurance_minimum),
        };
        let cif_value = goods_value + freight + insurance;

        let (duty, vat) = if goods_value.is_zero() {
            (Decimal::ZERO, Decimal::ZERO)
        } else {
            let duty = cif_value * rates.duty_rate;
            let vat = (cif_value + duty) * rates.vat_rate_for(shipment.destination_market);
            (duty, vat)
        };

        let handling = self.cost.ancillary_fees();
        Ok(LandedCostBreakdown {
            goods_value,
            freight,
            insurance,
            cif_value,
            duty,
            vat,
            total: round_currency(cif_value + duty + vat),
            handling,
            all_in_total: round_currency(cif_value + duty + vat + handling),
        })
    }

    fn estimate_freight(&self, shipment: &Shipment) -> TradeResult<Decimal> {
        let lane = self.logistics.profile(shipment.route, shipment.mode)?;
        let weight = Decimal::from_f64(shipment.weight_kg).ok_or_else(|| TradeError::Numerical {
            context: "freight estimate",
            reason: format!("weight {} not representable", shipment.weight_kg),
        })?;
        Ok(lane.base_freight + lane.freight_per_kg * weight)
    }
}

// ── Expected values under delay risk ─────────────────────────────────────────

fn probability_decimal(p: f64) -> TradeResult<Decimal> {
    if !(0.0..=1.0).contains(&p) {
        return Err(TradeError::InvalidParameter {
            name: "delay_probability",
            reason: format!("must be within [0, 1], got {p}"),
        });
    }
    Decimal::from_f64(p).ok_or_else(|| TradeError::Numerical {
        context: "expected cost",
        reason: format!("probability {p} not representable"),
    })
}

/// cost + p(delay) × extra delay cost
pub fn expected_cost(cost: Decimal, delay_probability: f64, extra_cost: Decimal) -> TradeResult<Decimal> {
    Ok(cost + probability_decimal(delay_probability)? * extra_cost)
}

/// days + p(delay) × extra delay days
pub fn expected_duration(days: f64, delay_probability: f64, extra_days: f64) -> f64 {
    days + delay_probability * extra_days
}

/// Margin earned per day in transit. None when the duration is not positive.
pub fn profitability_margin(price: Decimal, expected_cost: Decimal, expected_days: f64) -> Option<f64> {
    if expected_days <= 0.0 {
        return None;
    }
    (price - expected_cost).to_f64().map(|m| m / expected_days)
}
