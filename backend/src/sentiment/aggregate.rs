//! Sector aggregation.
//!
//! Simple: arithmetic mean of per-instrument percent changes.
//!
//! Volume-weighted:
//!   1. clamp each change to ±`CHANGE_CLAMP_PCT`
//!   2. weight = dollar volume (price × volume), floored at 0
//!   3. cap weights at the sector's 95th percentile
//!   4. Σ(clamped × capped) / Σ(capped)
//!
//! If the capped weights sum to zero the weighted score is the mean of the raw,
//! unclamped changes. Both scores are rounded to 4 decimals.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SectorReturn;

pub const CHANGE_CLAMP_PCT: f64 = 30.0;
pub const WEIGHT_CAP_PERCENTILE: f64 = 0.95;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Simple score only.
    Simple,
    /// Simple and volume-weighted scores.
    VolumeWeighted,
}

impl FromStr for AggregationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(AggregationMode::Simple),
            "weighted" | "volume_weighted" => Ok(AggregationMode::VolumeWeighted),
            other => Err(format!("unknown aggregation mode {other:?}")),
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMode::Simple => f.write_str("simple"),
            AggregationMode::VolumeWeighted => f.write_str("volume_weighted"),
        }
    }
}

/// Sector-level scores for one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectorScore {
    pub simple_score: f64,
    pub weighted_score: Option<f64>,
    pub sample_size: usize,
}

pub fn aggregate(returns: &[SectorReturn], mode: AggregationMode) -> SectorScore {
    SectorScore {
        simple_score: simple_mean(returns),
        weighted_score: match mode {
            AggregationMode::Simple => None,
            AggregationMode::VolumeWeighted => Some(volume_weighted(returns)),
        },
        sample_size: returns.len(),
    }
}

/// Unweighted mean; `0.0` for an empty sector.
pub fn simple_mean(returns: &[SectorReturn]) -> f64 {
    round4(raw_mean(returns))
}

pub fn volume_weighted(returns: &[SectorReturn]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }

    let weights: Vec<f64> = returns.iter().map(dollar_volume).collect();

    let mut sorted = weights.clone();
    sorted.sort_by(f64::total_cmp);
    let cap = percentile(&sorted, WEIGHT_CAP_PERCENTILE);

    let mut total_weight = 0.0;
    let mut weighted_sum = 0.0;
    for (r, w) in returns.iter().zip(&weights) {
        let capped = w.min(cap);
        let clamped = r.percent_change.clamp(-CHANGE_CLAMP_PCT, CHANGE_CLAMP_PCT);
        total_weight += capped;
        weighted_sum += clamped * capped;
    }

    if total_weight <= 0.0 {
        return round4(raw_mean(returns));
    }

    round4(weighted_sum / total_weight)
}

/// Linear-interpolated percentile of an ascending slice. `q` in `[0, 1]`.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

pub fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn raw_mean(returns: &[SectorReturn]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().map(|r| r.percent_change).sum::<f64>() / returns.len() as f64
}

fn dollar_volume(r: &SectorReturn) -> f64 {
    let w = r.price * r.volume as f64;
    if w.is_finite() { w.max(0.0) } else { 0.0 }
}
