//! Demand forecast: trend and season recovery, anomaly masking, series
//! validation and horizon limits.

use chrono::{Months, NaiveDate};
use tradedesk_core::{
    config::{AnomalyWindow, ForecastConfig},
    error::{TradeError, TradeResult},
    forecast::{forecast_series, DemandRecord, ForecastResult, HistoricalSeries},
    types::{Market, ProductCategory},
};

fn date(y: i32, m: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, 1).unwrap()
}

/// Monthly series from 2020-01 with `f(t)` as the quantity at index t.
fn series(months: usize, f: impl Fn(usize) -> f64) -> Vec<(NaiveDate, f64)> {
    (0..months)
        .map(|t| (date(2020, 1).checked_add_months(Months::new(t as u32)).unwrap(), f(t)))
        .collect()
}

fn run(s: &[(NaiveDate, f64)], horizon: usize, config: &ForecastConfig) -> TradeResult<ForecastResult> {
    forecast_series(ProductCategory::Phone, Market::De, s, horizon, config)
}

/// A pure linear series is extrapolated exactly; the shock window
/// (2020–2021) is left out of the fit.
#[test]
fn linear_trend_is_recovered() {
    let s = series(48, |t| 100.0 + 2.0 * t as f64);
    let r = run(&s, 12, &ForecastConfig::default()).unwrap();

    assert!((r.trend_slope - 2.0).abs() < 1e-9, "slope was {}", r.trend_slope);
    assert_eq!(r.fitted_months, 24);
    assert_eq!(r.excluded_months, 24);
    assert_eq!(r.point_forecast.len(), 12);
    assert_eq!(r.point_forecast[0].month, date(2024, 1));
    assert_eq!(r.point_forecast[11].month, date(2024, 12));
    for (h, p) in r.point_forecast.iter().enumerate() {
        let truth = 100.0 + 2.0 * (48 + h) as f64;
        assert!((p.value - truth).abs() < 1e-6, "month {}: {} vs {truth}", p.month, p.value);
    }
    assert!(r.growth_ratio > 0.0, "growing series should report growth");
}

/// The seasonal peak and trough survive into the forecast.
#[test]
fn seasonal_pattern_is_projected() {
    let s = series(48, |t| match t % 12 {
        11 => 560.0,
        5 => 440.0,
        _ => 500.0,
    });
    let r = run(&s, 12, &ForecastConfig::default()).unwrap();

    let june = r.point_forecast[5].value;
    let december = r.point_forecast[11].value;
    assert!(
        (december - june - 120.0).abs() < 1e-6,
        "December {december:.2} should sit 120 above June {june:.2}"
    );
    let sum: f64 = r.seasonal_indices.iter().sum();
    assert!(sum.abs() < 1e-9, "seasonal indices should be centered, sum={sum}");
}

/// Whatever happens inside the anomaly window does not move the forecast.
#[test]
fn anomaly_window_is_excluded_from_fit() {
    let clean = series(48, |t| 100.0 + 2.0 * t as f64);
    let shocked = series(48, |t| {
        let base = 100.0 + 2.0 * t as f64;
        if t < 24 { base * 0.1 } else { base }
    });
    let config = ForecastConfig::default();
    let a = run(&clean, 6, &config).unwrap();
    let b = run(&shocked, 6, &config).unwrap();
    for (x, y) in a.point_forecast.iter().zip(&b.point_forecast) {
        assert!((x.value - y.value).abs() < 1e-6, "shock leaked into {}", x.month);
    }
}

/// Forecast months inside a window are scaled by its multiplier.
#[test]
fn future_window_multiplier_scales_forecast() {
    let s = series(48, |t| 100.0 + 2.0 * t as f64);
    let base = ForecastConfig::default();
    let mut shocked = base.clone();
    shocked.anomaly_windows.push(AnomalyWindow {
        label: "port strike".into(),
        start: date(2024, 3),
        end: date(2024, 5),
        multiplier: 0.5,
    });

    let a = run(&s, 6, &base).unwrap();
    let b = run(&s, 6, &shocked).unwrap();
    for (x, y) in a.point_forecast.iter().zip(&b.point_forecast) {
        let expected = if (date(2024, 3)..=date(2024, 5)).contains(&x.month) {
            x.value * 0.5
        } else {
            x.value
        };
        assert!((y.value - expected).abs() < 1e-6, "{}: {} vs {expected}", x.month, y.value);
    }
}

#[test]
fn too_few_clean_months_is_rejected() {
    let s = series(30, |t| 100.0 + t as f64);
    match run(&s, 6, &ForecastConfig::default()) {
        Err(TradeError::InsufficientHistory { available, required }) => {
            assert_eq!(available, 6);
            assert_eq!(required, 24);
        }
        other => panic!("Expected InsufficientHistory, got {other:?}"),
    }
}

#[test]
fn malformed_series_are_rejected() {
    let config = ForecastConfig::default();

    let mut gap = series(48, |t| 100.0 + t as f64);
    gap.remove(30);
    assert!(matches!(run(&gap, 6, &config), Err(TradeError::MalformedSeries { .. })));

    let mut dup = series(48, |t| 100.0 + t as f64);
    dup.push(dup[40]);
    assert!(matches!(run(&dup, 6, &config), Err(TradeError::MalformedSeries { .. })));

    let mut mid_month = series(48, |t| 100.0 + t as f64);
    mid_month[10].0 = NaiveDate::from_ymd_opt(2020, 11, 15).unwrap();
    assert!(matches!(run(&mid_month, 6, &config), Err(TradeError::MalformedSeries { .. })));

    let mut negative = series(48, |t| 100.0 + t as f64);
    negative[40].1 = -1.0;
    assert!(matches!(run(&negative, 6, &config), Err(TradeError::MalformedSeries { .. })));
}

#[test]
fn horizon_outside_limits_is_rejected() {
    let s = series(48, |t| 100.0 + t as f64);
    let config = ForecastConfig::default();
    assert!(matches!(run(&s, 0, &config), Err(TradeError::InvalidParameter { .. })));
    assert!(matches!(run(&s, 25, &config), Err(TradeError::InvalidParameter { .. })));
    assert!(run(&s, 24, &config).is_ok());
}

/// A collapsing series never forecasts negative demand.
#[test]
fn forecast_and_band_are_clamped_at_zero() {
    let s = series(48, |t| (1_000.0 - 25.0 * t as f64).max(0.0) + (t % 3) as f64);
    let r = run(&s, 24, &ForecastConfig::default()).unwrap();
    for (p, b) in r.point_forecast.iter().zip(&r.confidence_band) {
        assert!(p.value >= 0.0, "negative forecast at {}", p.month);
        assert!(b.low >= 0.0 && b.low <= p.value && p.value <= b.high);
    }
}

/// Bands widen with distance from the fitted window.
#[test]
fn band_widens_with_horizon() {
    let s = series(48, |t| 300.0 + t as f64 + [0.0, 6.0, -3.0, 4.0, -7.0][t % 5]);
    let r = run(&s, 12, &ForecastConfig::default()).unwrap();
    let width = |i: usize| r.confidence_band[i].high - r.confidence_band[i].low;
    assert!(r.residual_std > 0.0);
    assert!(width(11) > width(0), "band should widen: {} vs {}", width(0), width(11));
}

#[test]
fn historical_series_slices_by_pair() {
    let records = vec![
        DemandRecord { month: date(2020, 2), product: ProductCategory::Cable, market: Market::Nl, quantity: 2.0 },
        DemandRecord { month: date(2020, 1), product: ProductCategory::Cable, market: Market::Nl, quantity: 1.0 },
        DemandRecord { month: date(2020, 1), product: ProductCategory::Phone, market: Market::De, quantity: 9.0 },
    ];
    let h = HistoricalSeries::new(records);
    assert_eq!(h.len(), 3);
    assert_eq!(
        h.pairs(),
        vec![(ProductCategory::Phone, Market::De), (ProductCategory::Cable, Market::Nl)]
    );
    let slice = h.slice(ProductCategory::Cable, Market::Nl);
    assert_eq!(slice, vec![(date(2020, 1), 1.0), (date(2020, 2), 2.0)]);
}
