//! tradedesk-core: quantitative decision support for electronics importers.
//!
//! Leaf-first:
//!   encoder        shipment validation and fixed-order feature vectors
//!   risk           customs-risk classifier
//!   forecast       monthly demand forecast per (product, market)
//!   segment        k-means segmentation of (product, market) pairs
//!   landed_cost    CIF + duty + VAT in exact decimals
//!   logistics      Monte Carlo ETA distribution
//!   report         summary record and route comparison
//!   context        immutable, hot-swappable owner of all of the above

pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod forecast;
pub mod landed_cost;
pub mod logistics;
pub mod reference;
pub mod report;
pub mod risk;
pub mod rng;
pub mod segment;
pub mod types;
