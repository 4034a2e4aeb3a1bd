//! Snapshot Filter Query
//!
//! Resolves a sector to the latest snapshot (plus a short newest-first history)
//! of each active instrument whose latest observation passes the configured
//! thresholds.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, instrument};

use super::source::{InstrumentDirectory, SnapshotSource};
use super::types::{PriceSnapshot, SnapshotHistory};
use crate::sector::Sector;
use crate::timeframe::SnapshotSeries;

/// Thresholds applied to an instrument's latest snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotFilter {
    /// Minimum absolute move (percent) between the latest and previous
    /// snapshot. `0.0` disables the check.
    pub min_gap_pct: f64,
    pub min_volume: u64,
    pub min_price: f64,
    pub max_price: Option<f64>,
}

impl Default for SnapshotFilter {
    fn default() -> Self {
        Self {
            min_gap_pct: 0.0,
            min_volume: 0,
            min_price: 0.0,
            max_price: None,
        }
    }
}

impl SnapshotFilter {
    pub fn matches(&self, latest: &PriceSnapshot, previous: Option<&PriceSnapshot>) -> bool {
        if latest.volume < self.min_volume || latest.price < self.min_price {
            return false;
        }
        if self.max_price.is_some_and(|max| latest.price > max) {
            return false;
        }
        if self.min_gap_pct > 0.0 {
            return match previous.and_then(|p| gap_pct(latest, p)) {
                Some(gap) => gap.abs() >= self.min_gap_pct,
                None => false,
            };
        }
        true
    }
}

/// Percent move from `previous` to `latest`; `None` when `previous` has no
/// usable price.
pub fn gap_pct(latest: &PriceSnapshot, previous: &PriceSnapshot) -> Option<f64> {
    (previous.price > 0.0).then(|| (latest.price - previous.price) / previous.price * 100.0)
}

/// Result of one filter query over a sector.
#[derive(Clone, Debug, Default)]
pub struct FilteredSector {
    /// Matching instruments, ascending by id.
    pub histories: Vec<SnapshotHistory>,
    /// Active instruments in the sector.
    pub active: usize,
    /// Active instruments without any snapshot in the series.
    pub without_snapshots: usize,
    /// Instruments with snapshots that failed the thresholds.
    pub filtered_out: usize,
}

pub struct SnapshotFilterQuery {
    directory: Arc<dyn InstrumentDirectory>,
    source: Arc<dyn SnapshotSource>,
}

impl SnapshotFilterQuery {
    pub fn new(directory: Arc<dyn InstrumentDirectory>, source: Arc<dyn SnapshotSource>) -> Self {
        Self { directory, source }
    }

    /// `depth` bounds the history returned per instrument (at least 2, so the
    /// gap check always has a previous snapshot to compare with).
    #[instrument(
        skip_all,
        target = "snapshot",
        fields(sector = %sector, series = series.as_str(), depth)
    )]
    pub async fn latest_matching(
        &self,
        sector: &Sector,
        filter: &SnapshotFilter,
        series: SnapshotSeries,
        depth: usize,
    ) -> anyhow::Result<FilteredSector> {
        let ids = self
            .directory
            .active_instruments(sector)
            .await
            .context("instrument directory lookup failed")?;

        if ids.is_empty() {
            debug!("sector has no active instruments");
            return Ok(FilteredSector::default());
        }

        let mut recent = self
            .source
            .recent(series, &ids, depth.max(2))
            .await
            .context("snapshot source lookup failed")?;

        let mut out = FilteredSector {
            active: ids.len(),
            ..FilteredSector::default()
        };

        for id in &ids {
            let Some(history) = recent
                .remove(id)
                .and_then(|snaps| SnapshotHistory::new(id.clone(), snaps))
            else {
                out.without_snapshots += 1;
                continue;
            };

            if filter.matches(history.latest(), history.previous()) {
                out.histories.push(history);
            } else {
                out.filtered_out += 1;
            }
        }

        out.histories
            .sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));

        debug!(
            active = out.active,
            matched = out.histories.len(),
            filtered_out = out.filtered_out,
            without_snapshots = out.without_snapshots,
            "sector filter applied"
        );

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::memory::MemorySnapshotSource;

    fn snap(id: &str, price: f64, volume: u64, ts: u64) -> PriceSnapshot {
        PriceSnapshot::new(id, price, volume, ts)
    }

    #[test]
    fn default_filter_accepts_everything_priced() {
        let f = SnapshotFilter::default();
        assert!(f.matches(&snap("A", 1.0, 0, 1), None));
    }

    #[test]
    fn volume_and_price_bounds() {
        let f = SnapshotFilter {
            min_volume: 1_000,
            min_price: 5.0,
            max_price: Some(100.0),
            ..SnapshotFilter::default()
        };

        assert!(f.matches(&snap("A", 50.0, 1_000, 1), None));
        assert!(!f.matches(&snap("A", 50.0, 999, 1), None));
        assert!(!f.matches(&snap("A", 4.99, 5_000, 1), None));
        assert!(!f.matches(&snap("A", 100.01, 5_000, 1), None));
    }

    #[test]
    fn gap_threshold_uses_absolute_move() {
        let f = SnapshotFilter {
            min_gap_pct: 5.0,
            ..SnapshotFilter::default()
        };
        let prev = snap("A", 100.0, 1, 1);

        assert!(f.matches(&snap("A", 106.0, 1, 2), Some(&prev)));
        assert!(f.matches(&snap("A", 94.0, 1, 2), Some(&prev)));
        assert!(!f.matches(&snap("A", 103.0, 1, 2), Some(&prev)));
        // No previous snapshot -> gap unknown -> rejected
        assert!(!f.matches(&snap("A", 106.0, 1, 2), None));
    }

    #[tokio::test]
    async fn query_returns_matching_latest_per_instrument() {
        let src = Arc::new(MemorySnapshotSource::new());
        let tech = Sector::from("information_technology");
        for id in ["AAPL", "MSFT", "NVDA", "IBM"] {
            src.assign(tech.clone(), id);
        }
        let series = SnapshotSeries::Intraday;
        src.record(series, snap("AAPL", 100.0, 5_000, 1));
        src.record(series, snap("AAPL", 101.0, 5_000, 2));
        src.record(series, snap("MSFT", 300.0, 10, 1)); // thin volume
        src.record(series, snap("NVDA", 50.0, 9_000, 2));
        // IBM has no snapshots

        let query = SnapshotFilterQuery::new(src.clone(), src.clone());
        let filter = SnapshotFilter {
            min_volume: 100,
            ..SnapshotFilter::default()
        };
        let out = query.latest_matching(&tech, &filter, series, 2).await.unwrap();

        let ids: Vec<_> = out.histories.iter().map(|h| h.instrument_id.as_str()).collect();
        assert_eq!(ids, vec!["AAPL", "NVDA"]);
        assert_eq!(out.histories[0].latest().price, 101.0);
        assert_eq!(out.active, 4);
        assert_eq!(out.filtered_out, 1);
        assert_eq!(out.without_snapshots, 1);
    }
}
