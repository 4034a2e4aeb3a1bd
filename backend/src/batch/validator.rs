//! Batch Validator
//!
//! All-or-nothing gate between a run's per-sector scores and persistence:
//!   1. the sector keys equal the canonical set exactly
//!   2. every simple score is finite and within ±100 %
//!   3. one batch id and one timestamp are minted for all N records

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{SectorBatch, SectorRecord};
use crate::error::ValidationError;
use crate::sector::{Sector, SectorUniverse};
use crate::sentiment::aggregate::SectorScore;
use crate::timeframe::Timeframe;

pub const SCORE_BOUND_PCT: f64 = 100.0;

pub struct BatchValidator {
    universe: SectorUniverse,
}

impl BatchValidator {
    pub fn new(universe: SectorUniverse) -> Self {
        Self { universe }
    }

    pub fn universe(&self) -> &SectorUniverse {
        &self.universe
    }

    pub fn validate(&self, scores: &[(Sector, SectorScore)]) -> Result<(), ValidationError> {
        self.check_completeness(scores)?;

        for (sector, score) in scores {
            check_score(sector, score)?;
        }

        Ok(())
    }

    /// Validates and builds the batch, records in canonical sector order.
    pub fn build_batch(
        &self,
        timeframe: Timeframe,
        scores: &[(Sector, SectorScore)],
        now_ms: u64,
    ) -> Result<SectorBatch, ValidationError> {
        self.validate(scores)?;

        let by_sector: BTreeMap<&Sector, &SectorScore> = scores.iter().map(|(s, v)| (s, v)).collect();
        let records = self
            .universe
            .iter()
            .filter_map(|sector| {
                by_sector.get(sector).map(|score| SectorRecord {
                    sector: sector.clone(),
                    simple_score: score.simple_score,
                    weighted_score: score.weighted_score,
                    sample_size: score.sample_size,
                })
            })
            .collect();

        Ok(SectorBatch {
            batch_id: mint_batch_id(now_ms),
            timeframe,
            timestamp_ms: now_ms,
            records,
        })
    }

    fn check_completeness(&self, scores: &[(Sector, SectorScore)]) -> Result<(), ValidationError> {
        let mut counts: BTreeMap<&Sector, usize> = BTreeMap::new();
        for (sector, _) in scores {
            *counts.entry(sector).or_default() += 1;
        }

        let missing: Vec<String> = self
            .universe
            .iter()
            .filter(|s| !counts.contains_key(s))
            .map(|s| s.to_string())
            .collect();
        let unknown: Vec<String> = counts
            .keys()
            .filter(|s| !self.universe.contains(s))
            .map(|s| s.to_string())
            .collect();
        let duplicated: Vec<String> = counts
            .iter()
            .filter(|(_, n)| **n > 1)
            .map(|(s, _)| s.to_string())
            .collect();

        if missing.is_empty() && unknown.is_empty() && duplicated.is_empty() {
            return Ok(());
        }

        Err(ValidationError::IncompleteBatch {
            expected: self.universe.len(),
            got: scores.len(),
            missing,
            unknown,
            duplicated,
        })
    }
}

fn check_score(sector: &Sector, score: &SectorScore) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidRecord {
        sector: sector.to_string(),
        reason,
    };

    if !score.simple_score.is_finite() {
        return Err(invalid(format!("simple_score is not finite ({})", score.simple_score)));
    }
    if score.simple_score.abs() > SCORE_BOUND_PCT {
        return Err(invalid(format!(
            "simple_score {} outside [-{SCORE_BOUND_PCT}, {SCORE_BOUND_PCT}]",
            score.simple_score
        )));
    }
    if let Some(w) = score.weighted_score {
        if !w.is_finite() {
            return Err(invalid(format!("weighted_score is not finite ({w})")));
        }
    }

    Ok(())
}

/// `<UTC yyyymmddTHHMMSSZ>-<8 hex>`: sortable by time, collision-improbable.
pub fn mint_batch_id(now_ms: u64) -> String {
    let prefix = i64::try_from(now_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y%m%dT%H%M%SZ").to_string())
        .unwrap_or_else(|| now_ms.to_string());

    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &suffix[..8])
}
