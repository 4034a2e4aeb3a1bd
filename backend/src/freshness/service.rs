//! Freshness Service
//!
//! Answers "how current is the latest complete batch" per timeframe:
//!   • Fresh: latest complete batch age ≤ threshold
//!   • Stale: latest complete batch age > threshold
//!   • NoData: no complete batch exists
//!
//! A group that does not hold exactly one record per canonical sector is never
//! returned as the latest batch. Retention deletes whole batch groups.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::logger::warn_if_slow;
use tracing::{debug, info, instrument, warn};

use super::types::{
    AgeStatus, BatchAgeInfo, BatchSummary, FreshnessState, IntegrityIssue, IntegrityReport,
    LatestBatch,
};
use crate::batch::repository::BatchRepository;
use crate::batch::types::{GapperRecord, StoredBatch};
use crate::config::FreshnessConfig;
use crate::sector::{Sector, SectorUniverse};
use crate::time::{MS_PER_MINUTE, minutes_to_ms};
use crate::timeframe::Timeframe;

/// Complete groups fetched by the first latest-batch lookup. Each further page
/// doubles the window until a valid group turns up or history runs out.
const LATEST_SCAN_PAGE: usize = 5;

const MS_PER_DAY: u64 = 24 * 60 * MS_PER_MINUTE;

pub struct FreshnessService {
    repo: Arc<dyn BatchRepository>,
    universe: SectorUniverse,
    cfg: FreshnessConfig,
}

impl FreshnessService {
    pub fn new(repo: Arc<dyn BatchRepository>, universe: SectorUniverse, cfg: FreshnessConfig) -> Self {
        Self {
            repo,
            universe,
            cfg,
        }
    }

    /// Strictly older than the threshold. A batch exactly at the threshold is fresh.
    pub fn is_stale(&self, timestamp_ms: u64, timeframe: Timeframe, now_ms: u64) -> bool {
        now_ms.saturating_sub(timestamp_ms) > self.cfg.threshold_ms(timeframe)
    }

    pub fn get_batch_age_info(&self, timestamp_ms: u64, timeframe: Timeframe, now_ms: u64) -> BatchAgeInfo {
        let age_ms = now_ms.saturating_sub(timestamp_ms);
        let threshold_ms = self.cfg.threshold_ms(timeframe);

        let status = if age_ms > threshold_ms {
            AgeStatus::Stale
        } else if age_ms as f64 > threshold_ms as f64 * self.cfg.approaching_ratio {
            AgeStatus::Approaching
        } else {
            AgeStatus::Fresh
        };

        BatchAgeInfo {
            age_minutes: age_ms as f64 / MS_PER_MINUTE as f64,
            threshold_minutes: self.cfg.threshold_min(timeframe),
            status,
        }
    }

    /// Latest batch with exactly N records that also passes integrity checks.
    ///
    /// Groups failing re-validation (e.g. written under a different sector set)
    /// are skipped; the scan pages back through every stored group.
    #[instrument(skip(self), target = "freshness", fields(timeframe = %timeframe))]
    pub async fn get_latest_complete_batch(
        &self,
        timeframe: Timeframe,
        now_ms: u64,
    ) -> anyhow::Result<Option<LatestBatch>> {
        let mut seen = 0;
        let mut limit = LATEST_SCAN_PAGE;

        loop {
            let candidates = warn_if_slow("db_latest_complete_batch", Duration::from_millis(100), async {
                self.repo
                    .latest_complete_batches(timeframe, self.universe.len(), limit)
                    .await
            })
            .await
            .context("failed to load latest complete batch")?;

            let exhausted = candidates.len() < limit;

            for stored in candidates.into_iter().skip(seen) {
                let report = self.validate_batch_integrity(&stored);
                if !report.is_valid() {
                    warn!(
                        batch_id = %stored.batch_id,
                        issues = ?report.issues,
                        "skipping batch that failed integrity re-validation"
                    );
                    continue;
                }

                let batch = stored.into_sector_batch();
                let age = self.get_batch_age_info(batch.timestamp_ms, timeframe, now_ms);
                let is_stale = self.is_stale(batch.timestamp_ms, timeframe, now_ms);

                debug!(batch_id = %batch.batch_id, age_minutes = age.age_minutes, is_stale, "latest complete batch resolved");
                return Ok(Some(LatestBatch {
                    batch,
                    is_stale,
                    age,
                }));
            }

            if exhausted {
                debug!("no complete batch available");
                return Ok(None);
            }

            seen = limit;
            limit = limit.saturating_mul(2);
        }
    }

    pub async fn freshness(&self, timeframe: Timeframe, now_ms: u64) -> anyhow::Result<FreshnessState> {
        Ok(match self.get_latest_complete_batch(timeframe, now_ms).await? {
            None => FreshnessState::NoData,
            Some(latest) if latest.is_stale => FreshnessState::Stale,
            Some(_) => FreshnessState::Fresh,
        })
    }

    /// Freshness for every timeframe, in `Timeframe::ALL` order.
    pub async fn freshness_report(&self, now_ms: u64) -> anyhow::Result<Vec<(Timeframe, FreshnessState)>> {
        let mut out = Vec::with_capacity(Timeframe::ALL.len());
        for tf in Timeframe::ALL {
            out.push((tf, self.freshness(tf, now_ms).await?));
        }
        Ok(out)
    }

    /// Structural checks on a stored group against the canonical sector set.
    pub fn validate_batch_integrity(&self, batch: &StoredBatch) -> IntegrityReport {
        let mut issues = Vec::new();

        if batch.records.len() != self.universe.len() {
            issues.push(IntegrityIssue::RecordCount {
                expected: self.universe.len(),
                got: batch.records.len(),
            });
        }

        let mut counts: BTreeMap<&Sector, usize> = BTreeMap::new();
        for r in &batch.records {
            *counts.entry(&r.sector).or_default() += 1;
        }
        for (sector, n) in &counts {
            if *n > 1 {
                issues.push(IntegrityIssue::DuplicateSector {
                    sector: sector.to_string(),
                });
            }
            if !self.universe.contains(sector) {
                issues.push(IntegrityIssue::UnknownSector {
                    sector: sector.to_string(),
                });
            }
        }
        for sector in self.universe.iter() {
            if !counts.contains_key(sector) {
                issues.push(IntegrityIssue::MissingSector {
                    sector: sector.to_string(),
                });
            }
        }

        for r in &batch.records {
            if r.batch_id != batch.batch_id {
                issues.push(IntegrityIssue::BatchIdMismatch {
                    expected: batch.batch_id.clone(),
                    found: r.batch_id.clone(),
                });
            }
        }

        if let (Some(newest), Some(oldest)) = (batch.newest_ms(), batch.oldest_ms()) {
            let spread_ms = newest - oldest;
            let tolerance_ms = minutes_to_ms(self.cfg.timestamp_tolerance_min);
            if spread_ms > tolerance_ms {
                issues.push(IntegrityIssue::TimestampSpread {
                    spread_ms,
                    tolerance_ms,
                });
            }
        }

        IntegrityReport {
            batch_id: batch.batch_id.clone(),
            issues,
        }
    }

    /// Newest batch groups for observability, complete or not.
    #[instrument(skip(self), target = "freshness", fields(timeframe = %timeframe))]
    pub async fn get_recent_batch_summaries(
        &self,
        timeframe: Timeframe,
        limit: usize,
        now_ms: u64,
    ) -> anyhow::Result<Vec<BatchSummary>> {
        let batches = self
            .repo
            .recent_batches(timeframe, limit)
            .await
            .context("failed to load recent batches")?;

        Ok(batches
            .iter()
            .map(|b| {
                let timestamp_ms = b.newest_ms().unwrap_or_default();
                let n = b.records.len();
                let mean = if n == 0 {
                    0.0
                } else {
                    b.records.iter().map(|r| r.simple_score).sum::<f64>() / n as f64
                };

                BatchSummary {
                    batch_id: b.batch_id.clone(),
                    timeframe,
                    timestamp_ms,
                    record_count: n,
                    is_complete: self.validate_batch_integrity(b).is_valid(),
                    age_minutes: now_ms.saturating_sub(timestamp_ms) as f64 / MS_PER_MINUTE as f64,
                    total_sample_size: b.records.iter().map(|r| r.sample_size).sum(),
                    mean_simple_score: crate::sentiment::aggregate::round4(mean),
                }
            })
            .collect())
    }

    pub async fn fetch_gappers(&self, batch_id: &str) -> anyhow::Result<Vec<GapperRecord>> {
        self.repo.fetch_gappers(batch_id).await
    }

    /// Deletes batch groups older than the configured retention window.
    #[instrument(skip(self), target = "freshness")]
    pub async fn cleanup_old_batches(&self, now_ms: u64) -> anyhow::Result<u64> {
        let cutoff_ms = now_ms.saturating_sub(self.cfg.retention_days.saturating_mul(MS_PER_DAY));

        let deleted = self
            .repo
            .delete_batches_before(cutoff_ms)
            .await
            .context("retention sweep failed")?;

        info!(deleted, cutoff_ms, "retention sweep complete");
        Ok(deleted)
    }
}
