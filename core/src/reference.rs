//! Reference data: the read-only inputs every context is built from.
//!
//! Files under `{data_dir}/reference/`:
//!   duty_rates.json          [{ category, duty_rate, vat_rate, market_vat_rates? }]
//!   demand_history.json      [{ month, product, market, quantity }]
//!   customs_records.json     [{ shipment: RawShipment, penalized }]

use crate::{
    encoder::CustomsRecord,
    forecast::{DemandRecord, HistoricalSeries},
    landed_cost::{DutyRateEntry, DutyRateTable},
    types::{RawShipment, Shipment},
};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub duty_rates:      DutyRateTable,
    pub history:         HistoricalSeries,
    pub customs_records: Vec<CustomsRecord>,
}

#[derive(Debug, Deserialize)]
struct RawCustomsRecord {
    shipment:  RawShipment,
    penalized: bool,
}

impl ReferenceData {
    pub fn new(
        duty_rates: DutyRateTable,
        history: HistoricalSeries,
        customs_records: Vec<CustomsRecord>,
    ) -> Self {
        Self { duty_rates, history, customs_records }
    }

    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let dir = format!("{data_dir}/reference");

        let entries: Vec<DutyRateEntry> = read_json(&format!("{dir}/duty_rates.json"))?;
        let duty_rates = DutyRateTable::from_entries(entries)
            .with_context(|| format!("Invalid duty rate table in {dir}"))?;

        let demand: Vec<DemandRecord> = read_json(&format!("{dir}/demand_history.json"))?;
        let history = HistoricalSeries::new(demand);

        let raw_records: Vec<RawCustomsRecord> =
            read_json(&format!("{dir}/customs_records.json"))?;
        let customs_records = raw_records
            .into_iter()
            .enumerate()
            .map(|(i, r)| -> anyhow::Result<CustomsRecord> {
                let shipment = Shipment::try_from(r.shipment)
                    .with_context(|| format!("customs record #{i} in {dir}"))?;
                Ok(CustomsRecord { shipment, penalized: r.penalized })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        log::info!(
            "reference: {} duty categories, {} demand records, {} customs records",
            duty_rates.len(),
            history.len(),
            customs_records.len()
        );

        Ok(Self { duty_rates, history, customs_records })
    }
}

fn read_json<T: DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("Cannot parse {path}"))
}
