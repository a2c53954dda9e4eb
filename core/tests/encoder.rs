//! Feature encoder and boundary parsing.

mod common;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use tradedesk_core::{
    encoder::{FeatureEncoder, HistoricalAggregates, FEATURE_COUNT, FEATURE_NAMES},
    error::TradeError,
    types::{Market, ProductCategory, RawShipment, Route, Season, Shipment, TransportMode},
};

fn index_of(name: &str) -> usize {
    FEATURE_NAMES.iter().position(|n| *n == name).unwrap()
}

fn raw() -> RawShipment {
    RawShipment {
        product_category: "phone".into(),
        origin_country: "cn".into(),
        destination_market: "NL".into(),
        declared_value: dec!(2500),
        weight_kg: 12.5,
        route: "TR-NL".into(),
        mode: "air".into(),
        ship_date: NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(),
    }
}

#[test]
fn encoding_is_fixed_order_and_one_hot() {
    let s = Shipment::try_from(raw()).unwrap();
    let v = FeatureEncoder::encode(&s, None).unwrap();

    assert_eq!(v.len(), FEATURE_COUNT);
    for name in ["category=phone", "market=NL", "mode=air", "season=winter", "route=TR-NL"] {
        assert_eq!(v.values[index_of(name)], 1.0, "{name} should be set");
    }
    let indicators_set = v.values[..21].iter().filter(|x| **x == 1.0).count();
    assert_eq!(indicators_set, 5, "exactly one indicator per block");

    assert!((v.values[index_of("log_declared_value")] - 2501f64.ln()).abs() < 1e-12);
    assert_eq!(v.values[index_of("weight_kg")], 12.5);
    assert!((v.values[index_of("log_value_per_kg")] - 201f64.ln()).abs() < 1e-12);
}

/// Without aggregates the rate features and the history flag are zero.
#[test]
fn absent_history_zeroes_rate_features() {
    let s = Shipment::try_from(raw()).unwrap();
    let v = FeatureEncoder::encode(&s, None).unwrap();
    assert_eq!(v.values[index_of("category_violation_rate")], 0.0);
    assert_eq!(v.values[index_of("origin_violation_rate")], 0.0);
    assert_eq!(v.values[index_of("history_available")], 0.0);

    let aggregates = HistoricalAggregates::from_records(&common::customs_records());
    let v = FeatureEncoder::encode(&s, Some(&aggregates)).unwrap();
    assert_eq!(v.values[index_of("history_available")], 1.0);
    let rate = v.values[index_of("origin_violation_rate")];
    assert!(rate > 0.0 && rate < 1.0, "smoothed rate out of range: {rate}");
}

#[test]
fn unknown_origin_in_aggregates_is_an_error() {
    let aggregates = HistoricalAggregates::from_records(&common::customs_records());
    let s = common::ship(ProductCategory::Phone, Market::De, TransportMode::Sea, "BR", 3, dec!(100));
    assert!(matches!(
        FeatureEncoder::encode(&s, Some(&aggregates)),
        Err(TradeError::MissingAggregate { kind: "origin", .. })
    ));
}

#[test]
fn encoding_is_pure() {
    let s = Shipment::try_from(raw()).unwrap();
    let aggregates = HistoricalAggregates::from_records(&common::customs_records());
    let a = FeatureEncoder::encode(&s, Some(&aggregates)).unwrap();
    let b = FeatureEncoder::encode(&s, Some(&aggregates)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn boundary_strings_fail_loudly() {
    let mut bad = raw();
    bad.product_category = "toaster".into();
    assert!(matches!(
        Shipment::try_from(bad),
        Err(TradeError::InvalidCategory { ref value }) if value == "toaster"
    ));

    let mut bad = raw();
    bad.mode = "rail".into();
    assert!(matches!(
        Shipment::try_from(bad),
        Err(TradeError::InvalidEnumValue { field: "mode", .. })
    ));

    let mut bad = raw();
    bad.destination_market = "FR".into();
    assert!(matches!(
        Shipment::try_from(bad),
        Err(TradeError::InvalidEnumValue { field: "destination_market", .. })
    ));

    assert_eq!("tr-de".parse::<Route>().unwrap(), Route::TrDe);
    assert!(Season::from_month(13).is_err());
}

#[test]
fn structural_checks() {
    let mut s = Shipment::try_from(raw()).unwrap();
    s.origin_country = "CHN".into();
    assert!(matches!(
        FeatureEncoder::validate(&s),
        Err(TradeError::MalformedShipment { field: "origin_country", .. })
    ));

    let mut s = Shipment::try_from(raw()).unwrap();
    s.route = Route::TrDe;
    assert!(matches!(
        FeatureEncoder::validate(&s),
        Err(TradeError::MalformedShipment { field: "route", .. })
    ));

    let mut s = Shipment::try_from(raw()).unwrap();
    s.weight_kg = -1.0;
    assert!(FeatureEncoder::encode(&s, None).is_err());
}

#[test]
fn seasons_follow_meteorological_months() {
    let cases = [(12, Season::Winter), (2, Season::Winter), (3, Season::Spring), (8, Season::Summer), (11, Season::Autumn)];
    for (month, season) in cases {
        assert_eq!(Season::from_month(month).unwrap(), season, "month {month}");
    }
}

/// JSON shipments are parsed and checked like any other boundary input.
#[test]
fn deserialized_shipments_are_validated() {
    let valid = Shipment::try_from(raw()).unwrap();
    let json = serde_json::to_value(&valid).unwrap();
    assert_eq!(serde_json::from_value::<Shipment>(json.clone()).unwrap(), valid);

    let mut mismatched = json.clone();
    mismatched["route"] = serde_json::json!("TR-DE");
    let err = serde_json::from_value::<Shipment>(mismatched).unwrap_err();
    assert!(err.to_string().contains("route"), "unexpected error: {err}");

    let mut bad_origin = json.clone();
    bad_origin["origin_country"] = serde_json::json!("CHN");
    assert!(serde_json::from_value::<Shipment>(bad_origin).is_err());

    let mut negative = json;
    negative["weight_kg"] = serde_json::json!(-4.0);
    assert!(serde_json::from_value::<Shipment>(negative).is_err());

    let mut raw_mismatch = raw();
    raw_mismatch.route = "TR-DE".into();
    assert!(matches!(
        Shipment::try_from(raw_mismatch),
        Err(TradeError::MalformedShipment { field: "route", .. })
    ));
}
