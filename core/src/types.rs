//! Shared domain types: closed enumerations and the shipment record.
//!
//! RULE: Category, market, route, mode and season only ever exist as these
//! enums inside the core. Strings are parsed once, at the boundary, and
//! fail loudly when they do not match.

use crate::{
    encoder::FeatureEncoder,
    error::{TradeError, TradeResult},
};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Product category ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Electronics,
    ElectronicsComponent,
    ElectronicsAccessory,
    Phone,
    Computer,
    Tablet,
    Camera,
    Headphones,
    Charger,
    Cable,
}

impl ProductCategory {
    /// Declaration order; also the one-hot order in the feature vector.
    pub const ALL: [ProductCategory; 10] = [
        Self::Electronics,
        Self::ElectronicsComponent,
        Self::ElectronicsAccessory,
        Self::Phone,
        Self::Computer,
        Self::Tablet,
        Self::Camera,
        Self::Headphones,
        Self::Charger,
        Self::Cable,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Electronics => "electronics",
            Self::ElectronicsComponent => "electronics_component",
            Self::ElectronicsAccessory => "electronics_accessory",
            Self::Phone => "phone",
            Self::Computer => "computer",
            Self::Tablet => "tablet",
            Self::Camera => "camera",
            Self::Headphones => "headphones",
            Self::Charger => "charger",
            Self::Cable => "cable",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl FromStr for ProductCategory {
    type Err = TradeError;

    fn from_str(s: &str) -> TradeResult<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.code() == wanted)
            .ok_or_else(|| TradeError::InvalidCategory { value: s.to_string() })
    }
}

// ── Market ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "DE")]
    De,
    #[serde(rename = "NL")]
    Nl,
}

impl Market {
    pub const ALL: [Market; 2] = [Self::De, Self::Nl];

    pub fn code(&self) -> &'static str {
        match self {
            Self::De => "DE",
            Self::Nl => "NL",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl FromStr for Market {
    type Err = TradeError;

    fn from_str(s: &str) -> TradeResult<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.code() == wanted)
            .ok_or_else(|| TradeError::InvalidEnumValue {
                field: "destination_market",
                value: s.to_string(),
            })
    }
}

// ── Transport mode ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Air,
    Sea,
    Road,
}

impl TransportMode {
    pub const ALL: [TransportMode; 3] = [Self::Air, Self::Sea, Self::Road];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Air => "air",
            Self::Sea => "sea",
            Self::Road => "road",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl FromStr for TransportMode {
    type Err = TradeError;

    fn from_str(s: &str) -> TradeResult<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.code() == wanted)
            .ok_or_else(|| TradeError::InvalidEnumValue {
                field: "mode",
                value: s.to_string(),
            })
    }
}

// ── Route ────────────────────────────────────────────────────────────────────

/// Shipping corridor from the origin hub to a destination gateway.
/// Transit behaviour depends on (route, mode); see `RouteProfile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Route {
    /// Istanbul → Hamburg.
    #[serde(rename = "TR-DE")]
    TrDe,
    /// Istanbul → Rotterdam.
    #[serde(rename = "TR-NL")]
    TrNl,
}

impl Route {
    pub const ALL: [Route; 2] = [Self::TrDe, Self::TrNl];

    pub fn code(&self) -> &'static str {
        match self {
            Self::TrDe => "TR-DE",
            Self::TrNl => "TR-NL",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Market served by the corridor's gateway port.
    pub fn market(&self) -> Market {
        match self {
            Self::TrDe => Market::De,
            Self::TrNl => Market::Nl,
        }
    }
}

impl FromStr for Route {
    type Err = TradeError;

    fn from_str(s: &str) -> TradeResult<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.code() == wanted)
            .ok_or_else(|| TradeError::InvalidEnumValue {
                field: "route",
                value: s.to_string(),
            })
    }
}

// ── Season ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub const ALL: [Season; 4] = [Self::Winter, Self::Spring, Self::Summer, Self::Autumn];

    /// Meteorological seasons: Dec–Feb is winter.
    pub fn from_month(month: u32) -> TradeResult<Self> {
        match month {
            12 | 1 | 2 => Ok(Self::Winter),
            3..=5 => Ok(Self::Spring),
            6..=8 => Ok(Self::Summer),
            9..=11 => Ok(Self::Autumn),
            other => Err(TradeError::InvalidEnumValue {
                field: "ship_month",
                value: other.to_string(),
            }),
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Winter => "winter",
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Autumn => "autumn",
        }
    }
}

macro_rules! display_via_code {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.code())
            }
        })*
    };
}

display_via_code!(ProductCategory, Market, TransportMode, Route, Season);

// ── Shipment ─────────────────────────────────────────────────────────────────

/// A validated shipment. Never mutated after construction.
///
/// Deserializing goes through `RawShipment`, so a shipment read from JSON
/// has passed the same parsing and structural checks as one converted by
/// hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawShipment")]
pub struct Shipment {
    pub product_category:   ProductCategory,
    pub origin_country:     String,
    pub destination_market: Market,
    pub declared_value:     Decimal,
    pub weight_kg:          f64,
    pub route:              Route,
    pub mode:               TransportMode,
    pub ship_date:          NaiveDate,
}

impl Shipment {
    pub fn season(&self) -> Season {
        // chrono months are always 1..=12
        Season::from_month(self.ship_date.month()).unwrap_or(Season::Winter)
    }
}

/// Shipment as it arrives from an external collaborator: every closed
/// enumeration is still a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawShipment {
    pub product_category:   String,
    pub origin_country:     String,
    pub destination_market: String,
    pub declared_value:     Decimal,
    pub weight_kg:          f64,
    pub route:              String,
    pub mode:               String,
    pub ship_date:          NaiveDate,
}

impl TryFrom<RawShipment> for Shipment {
    type Error = TradeError;

    fn try_from(raw: RawShipment) -> TradeResult<Self> {
        let shipment = Self {
            product_category:   raw.product_category.parse()?,
            origin_country:     raw.origin_country.trim().to_ascii_uppercase(),
            destination_market: raw.destination_market.parse()?,
            declared_value:     raw.declared_value,
            weight_kg:          raw.weight_kg,
            route:              raw.route.parse()?,
            mode:               raw.mode.parse()?,
            ship_date:          raw.ship_date,
        };
        FeatureEncoder::validate(&shipment)?;
        Ok(shipment)
    }
}

/// A (product, market) pair: the unit of forecasting and segmentation.
pub type ProductMarket = (ProductCategory, Market);
