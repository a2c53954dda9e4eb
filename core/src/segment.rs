//! Market segmentation: k-means over (product, market) demand profiles.
//!
//! Each pair is described by three aggregate features:
//!   mean_demand    average monthly quantity
//!   volatility     coefficient of variation of monthly quantity
//!   trend          OLS slope relative to the mean (monthly growth rate)
//!
//! Features are z-scored, then clustered with k-means++ seeding and Lloyd
//! iterations. Determinism:
//!   - pairs are sorted before clustering, so input order is irrelevant
//!   - every restart draws from its own seeded stream
//!   - clusters are relabelled by ascending centroid mean demand
//!
//! Degenerate input policy: with fewer distinct profiles than K, K is
//! reduced and the effective K is reported on the result.

use crate::{
    config::SegmentationConfig,
    error::{TradeError, TradeResult},
    rng::{RngBank, StreamSlot},
    types::ProductMarket,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const DIMS: usize = 3;
const MIN_FEATURE_SCALE: f64 = 1e-12;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairFeatures {
    pub pair: ProductMarket,
    pub mean_demand: f64,
    pub volatility: f64,
    pub trend: f64,
}

impl PairFeatures {
    /// Summarise one pair's monthly history.
    pub fn from_series(pair: ProductMarket, series: &[(NaiveDate, f64)]) -> TradeResult<Self> {
        if series.len() < 2 {
            return Err(TradeError::InsufficientHistory {
                available: series.len(),
                required: 2,
            });
        }
        let mut ordered = series.to_vec();
        ordered.sort_by_key(|(m, _)| *m);
        let ys: Vec<f64> = ordered.iter().map(|(_, q)| *q).collect();
        if ys.iter().any(|y| !y.is_finite()) {
            return Err(TradeError::Numerical {
                context: "segment features",
                reason: format!("non-finite demand for {}/{}", pair.0, pair.1),
            });
        }

        let n = ys.len() as f64;
        let mean = ys.iter().sum::<f64>() / n;
        let std = (ys.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n).sqrt();

        let t_mean = (n - 1.0) / 2.0;
        let sxx: f64 = (0..ys.len()).map(|t| (t as f64 - t_mean).powi(2)).sum();
        let sxy: f64 = ys
            .iter()
            .enumerate()
            .map(|(t, y)| (t as f64 - t_mean) * (y - mean))
            .sum();
        let slope = sxy / sxx;

        let (volatility, trend) = if mean > 0.0 {
            (std / mean, slope / mean)
        } else {
            (0.0, slope)
        };

        Ok(Self {
            pair,
            mean_demand: mean,
            volatility,
            trend,
        })
    }

    fn as_array(&self) -> [f64; DIMS] {
        [self.mean_demand, self.volatility, self.trend]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCentroid {
    pub mean_demand: f64,
    pub volatility: f64,
    pub trend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSegment {
    pub id: usize,
    /// Centroid in original feature units.
    pub centroid: SegmentCentroid,
    pub members: Vec<ProductMarket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segmentation {
    pub requested_k: usize,
    pub effective_k: usize,
    pub segments: Vec<MarketSegment>,
    /// Pair → segment id. Members lists carry the same mapping in JSON.
    #[serde(skip)]
    pub assignments: BTreeMap<ProductMarket, usize>,
    /// Within-cluster sum of squares on the standardized scale.
    pub inertia: f64,
}

impl Segmentation {
    pub fn segment_of(&self, pair: ProductMarket) -> Option<&MarketSegment> {
        self.assignments.get(&pair).and_then(|id| self.segments.get(*id))
    }
}

// ── Clustering ───────────────────────────────────────────────────────────────

pub fn segment_pairs(
    features: &[PairFeatures],
    config: &SegmentationConfig,
) -> TradeResult<Segmentation> {
    if config.k == 0 {
        return Err(TradeError::InvalidParameter {
            name: "segmentation.k",
            reason: "must be at least 1".into(),
        });
    }
    if config.restarts == 0 {
        return Err(TradeError::InvalidParameter {
            name: "segmentation.restarts",
            reason: "must be at least 1".into(),
        });
    }
    if features.is_empty() {
        return Err(TradeError::EmptyInput { what: "segmentation pairs" });
    }

    let mut rows: Vec<&PairFeatures> = features.iter().collect();
    rows.sort_by_key(|f| f.pair);
    if let Some(w) = rows.windows(2).find(|w| w[0].pair == w[1].pair) {
        return Err(TradeError::InvalidParameter {
            name: "pairs",
            reason: format!("duplicate pair {}/{}", w[0].pair.0, w[0].pair.1),
        });
    }

    let points = standardize(&rows);
    let distinct: BTreeSet<[u64; DIMS]> = points
        .iter()
        .map(|p| [p[0].to_bits(), p[1].to_bits(), p[2].to_bits()])
        .collect();
    let k = config.k.min(distinct.len());
    if k < config.k {
        log::warn!(
            "segmentation: only {} distinct profiles, reducing k from {} to {k}",
            distinct.len(),
            config.k
        );
    }

    let bank = RngBank::new(config.seed);
    let mut best: Option<(Vec<usize>, f64)> = None;
    for restart in 0..config.restarts {
        let mut rng = bank.for_stream(StreamSlot::SegmentationRestart, restart as u64);
        let mut centers = kmeans_plus_plus(&points, k, || rng.next_f64());
        let (labels, inertia) = lloyd(&points, &mut centers, config.max_iterations);
        // Strict improvement only: ties keep the earlier restart.
        if best.as_ref().map_or(true, |(_, b)| inertia < *b) {
            best = Some((labels, inertia));
        }
    }
    let (labels, inertia) = best.ok_or_else(|| TradeError::Numerical {
        context: "segmentation",
        reason: "no restart produced a clustering".into(),
    })?;

    // Raw-unit centroids for every non-empty cluster
    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        clusters.entry(*label).or_default().push(i);
    }
    let mut built: Vec<(SegmentCentroid, Vec<usize>)> = clusters
        .into_values()
        .map(|members| {
            let m = members.len() as f64;
            let mut sum = [0.0; DIMS];
            for &i in &members {
                for (s, v) in sum.iter_mut().zip(rows[i].as_array()) {
                    *s += v;
                }
            }
            let centroid = SegmentCentroid {
                mean_demand: sum[0] / m,
                volatility: sum[1] / m,
                trend: sum[2] / m,
            };
            (centroid, members)
        })
        .collect();

    // Stable ids: ascending mean demand, then volatility, trend, first member.
    built.sort_by(|a, b| {
        a.0.mean_demand
            .total_cmp(&b.0.mean_demand)
            .then(a.0.volatility.total_cmp(&b.0.volatility))
            .then(a.0.trend.total_cmp(&b.0.trend))
            .then(a.1[0].cmp(&b.1[0]))
    });

    let mut assignments = BTreeMap::new();
    let segments: Vec<MarketSegment> = built
        .into_iter()
        .enumerate()
        .map(|(id, (centroid, members))| {
            let members: Vec<ProductMarket> = members.iter().map(|&i| rows[i].pair).collect();
            for pair in &members {
                assignments.insert(*pair, id);
            }
            MarketSegment { id, centroid, members }
        })
        .collect();

    log::debug!(
        "segmentation: {} pairs into {} segments, inertia={inertia:.4}",
        rows.len(),
        segments.len()
    );

    Ok(Segmentation {
        requested_k: config.k,
        effective_k: segments.len(),
        segments,
        assignments,
        inertia,
    })
}

fn standardize(rows: &[&PairFeatures]) -> Vec<[f64; DIMS]> {
    let n = rows.len() as f64;
    let raw: Vec<[f64; DIMS]> = rows.iter().map(|r| r.as_array()).collect();
    let mut mean = [0.0; DIMS];
    let mut scale = [0.0; DIMS];
    for p in &raw {
        for d in 0..DIMS {
            mean[d] += p[d] / n;
        }
    }
    for p in &raw {
        for d in 0..DIMS {
            scale[d] += (p[d] - mean[d]).powi(2) / n;
        }
    }
    for s in scale.iter_mut() {
        *s = if s.sqrt() < MIN_FEATURE_SCALE { 1.0 } else { s.sqrt() };
    }
    raw.iter()
        .map(|p| {
            let mut z = [0.0; DIMS];
            for d in 0..DIMS {
                z[d] = (p[d] - mean[d]) / scale[d];
            }
            z
        })
        .collect()
}

fn dist2(a: &[f64; DIMS], b: &[f64; DIMS]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the nearest center; ties go to the lower index.
fn nearest(p: &[f64; DIMS], centers: &[[f64; DIMS]]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, center) in centers.iter().enumerate() {
        let d = dist2(p, center);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// k-means++ seeding: first center uniform, then D²-weighted.
/// Requires at least k distinct points.
fn kmeans_plus_plus(
    points: &[[f64; DIMS]],
    k: usize,
    mut uniform: impl FnMut() -> f64,
) -> Vec<[f64; DIMS]> {
    let n = points.len();
    let first = ((uniform() * n as f64) as usize).min(n - 1);
    let mut centers = vec![points[first]];

    while centers.len() < k {
        let d2: Vec<f64> = points.iter().map(|p| nearest(p, &centers).1).collect();
        let total: f64 = d2.iter().sum();
        let threshold = uniform() * total;
        let mut acc = 0.0;
        // Fallback: the farthest point, in case rounding leaves acc < threshold.
        let mut chosen = d2
            .iter()
            .enumerate()
            .fold(0, |best, (i, d)| if *d > d2[best] { i } else { best });
        for (i, d) in d2.iter().enumerate() {
            if *d == 0.0 {
                continue;
            }
            acc += d;
            if acc >= threshold {
                chosen = i;
                break;
            }
        }
        centers.push(points[chosen]);
    }
    centers
}

/// Lloyd iterations until assignments stop changing or the budget runs out.
/// An emptied cluster is re-seeded at the point farthest from its center.
fn lloyd(
    points: &[[f64; DIMS]],
    centers: &mut [[f64; DIMS]],
    max_iterations: usize,
) -> (Vec<usize>, f64) {
    let k = centers.len();
    let mut labels: Vec<usize> = points.iter().map(|p| nearest(p, centers).0).collect();

    for _ in 0..max_iterations {
        let mut sums = vec![[0.0; DIMS]; k];
        let mut counts = vec![0usize; k];
        for (p, &l) in points.iter().zip(&labels) {
            counts[l] += 1;
            for d in 0..DIMS {
                sums[l][d] += p[d];
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                for d in 0..DIMS {
                    centers[c][d] = sums[c][d] / counts[c] as f64;
                }
            } else {
                let far = points
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (i, dist2(p, &centers[labels[i]])))
                    .fold((0, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best })
                    .0;
                centers[c] = points[far];
            }
        }

        let next: Vec<usize> = points.iter().map(|p| nearest(p, centers).0).collect();
        if next == labels {
            break;
        }
        labels = next;
    }

    let inertia = points
        .iter()
        .zip(&labels)
        .map(|(p, &l)| dist2(p, &centers[l]))
        .sum();
    (labels, inertia)
}
