//! trade-runner: headless decision-support runner for TradeDesk.
//!
//! Usage:
//!   trade-runner --data-dir ./data --product phone --market DE --mode sea
//!   trade-runner --seed 7 --trials 20000 --value 25000 --weight 180 --compare
//!
//! Loads config and reference data, trains the risk model, runs one
//! scenario and prints the summary as JSON on stdout.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::env;
use tradedesk_core::{
    config::TradeConfig,
    context::{ContextHandle, TradeContext},
    reference::ReferenceData,
    report::{compare_routes, run_scenario, RouteOption, ScenarioRequest, TradeSummary},
    types::{Market, ProductCategory, Route, Shipment, TransportMode},
};

#[derive(serde::Serialize)]
struct RunnerOutput {
    summary: TradeSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    route_comparison: Option<Vec<RouteOption>>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let trials = parse_arg(&args, "--trials", 10_000usize);
    let horizon = parse_arg(&args, "--horizon", 12usize);
    let weight = parse_arg(&args, "--weight", 120.0f64);
    let compare = args.iter().any(|a| a == "--compare");
    let data_dir = arg_str(&args, "--data-dir", "./data");

    let product: ProductCategory = arg_str(&args, "--product", "phone").parse()?;
    let market: Market = arg_str(&args, "--market", "DE").parse()?;
    let mode: TransportMode = arg_str(&args, "--mode", "sea").parse()?;
    let origin = arg_str(&args, "--origin", "CN");
    let value: Decimal = arg_str(&args, "--value", "10000")
        .parse()
        .context("--value must be a decimal amount")?;
    let ship_date = NaiveDate::parse_from_str(arg_str(&args, "--ship-date", "2024-03-15"), "%Y-%m-%d")
        .context("--ship-date must be YYYY-MM-DD")?;
    let target_days = args
        .windows(2)
        .find(|w| w[0] == "--target-days")
        .map(|w| w[1].parse::<f64>())
        .transpose()
        .context("--target-days must be a number")?;

    let route = Route::ALL
        .into_iter()
        .find(|r| r.market() == market)
        .with_context(|| format!("no route serves market {market}"))?;

    eprintln!("TradeDesk: trade-runner");
    eprintln!("  seed:      {seed}");
    eprintln!("  trials:    {trials}");
    eprintln!("  data_dir:  {data_dir}");
    eprintln!("  shipment:  {product} → {market} via {route} by {mode}");
    eprintln!();

    let config = TradeConfig::load(data_dir)?;
    let reference = ReferenceData::load(data_dir)?;
    let handle = ContextHandle::new(TradeContext::build(config, reference)?);
    let ctx = handle.snapshot();

    let shipment = Shipment {
        product_category: product,
        origin_country: origin.trim().to_ascii_uppercase(),
        destination_market: market,
        declared_value: value,
        weight_kg: weight,
        route,
        mode,
        ship_date,
    };

    let request = ScenarioRequest {
        shipment: shipment.clone(),
        horizon_months: horizon,
        trial_count: trials,
        target_days,
        seed: Some(seed),
    };
    let summary = run_scenario(&ctx, &request)?;
    log::info!("runner: report {} generated", summary.report_id);
    let route_comparison = if compare {
        Some(compare_routes(&ctx, &shipment, trials, target_days, seed)?)
    } else {
        None
    };

    let output = RunnerOutput { summary, route_comparison };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn arg_str<'a>(args: &'a [String], flag: &str, default: &'a str) -> &'a str {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
        .unwrap_or(default)
}
