//! Anchor Snapshot Selector
//!
//! Picks, per instrument, the historical snapshot a return is measured against.
//!
//! Two modes, never mixed:
//!   • Time-window: anchor is the most recent snapshot at least `min_lookback`
//!     older than *that instrument's own* latest snapshot. Instruments ingested
//!     out of lockstep each get their own reference point.
//!   • Rank: anchor is the snapshot at a fixed 1-based recency rank.
//!
//! Instruments without an anchor, or with a non-positive price on either side,
//! are excluded from the sample. Exclusion is a normal outcome, not an error.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;

use super::SectorReturn;
use crate::snapshot::source::SnapshotSource;
use crate::snapshot::types::{PriceSnapshot, SnapshotHistory};
use crate::timeframe::SnapshotSeries;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnchorMode {
    TimeWindow { min_lookback_ms: u64 },
    Rank { rank: usize },
}

impl AnchorMode {
    /// Newest-first history depth a run should prefetch for this mode.
    pub fn history_depth(&self) -> usize {
        match self {
            AnchorMode::TimeWindow { .. } => 2,
            AnchorMode::Rank { rank } => (*rank).max(2),
        }
    }
}

/// Why an instrument was left out of a timeframe's sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Exclusion {
    MissingAnchor,
    NonPositivePrice,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::MissingAnchor => f.write_str("missing_anchor"),
            Exclusion::NonPositivePrice => f.write_str("non_positive_price"),
        }
    }
}

/// Returns plus exclusions for one sector.
#[derive(Clone, Debug, Default)]
pub struct AnchorOutcome {
    /// Ascending by instrument id.
    pub returns: Vec<SectorReturn>,
    pub excluded: Vec<(String, Exclusion)>,
}

impl AnchorOutcome {
    pub fn excluded_count(&self, reason: Exclusion) -> usize {
        self.excluded.iter().filter(|(_, r)| *r == reason).count()
    }
}

/// `(latest - anchor) / anchor * 100`, only for strictly positive prices.
pub fn percent_return(
    latest: &PriceSnapshot,
    anchor: &PriceSnapshot,
) -> Result<SectorReturn, Exclusion> {
    if !(latest.price > 0.0 && anchor.price > 0.0) {
        return Err(Exclusion::NonPositivePrice);
    }

    Ok(SectorReturn {
        instrument_id: latest.instrument_id.clone(),
        percent_change: (latest.price - anchor.price) / anchor.price * 100.0,
        price: latest.price,
        volume: latest.volume,
    })
}

/// Anchor reference time for the time-window mode. `None` when the lookback
/// reaches before the epoch (no snapshot can qualify).
pub fn window_threshold(latest: &PriceSnapshot, min_lookback_ms: u64) -> Option<u64> {
    latest.recorded_at_ms.checked_sub(min_lookback_ms)
}

/// Anchor from a prefetched history, if the history is deep enough to decide.
///
/// For time-window mode the history is a newest-first prefix of the full
/// series, so the first entry at or before the threshold is the answer. When
/// none qualifies the caller has to consult the source.
pub fn anchor_from_history(history: &SnapshotHistory, mode: AnchorMode) -> Option<&PriceSnapshot> {
    match mode {
        AnchorMode::Rank { rank } => history.nth_most_recent(rank),
        AnchorMode::TimeWindow { min_lookback_ms } => {
            let threshold = window_threshold(history.latest(), min_lookback_ms)?;
            history
                .recent()
                .iter()
                .find(|s| s.recorded_at_ms <= threshold)
        }
    }
}

/// Resolves anchors for a sector's filtered instruments.
pub struct AnchorSelector {
    source: Arc<dyn SnapshotSource>,
}

impl AnchorSelector {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self { source }
    }

    pub async fn select(
        &self,
        series: SnapshotSeries,
        mode: AnchorMode,
        histories: &[SnapshotHistory],
    ) -> anyhow::Result<AnchorOutcome> {
        let mut out = AnchorOutcome::default();

        for history in histories {
            let latest = history.latest();
            let anchor = match anchor_from_history(history, mode) {
                Some(a) => Some(a.clone()),
                None => self.lookup(series, mode, latest).await?,
            };

            let Some(anchor) = anchor else {
                tracing::debug!(
                    instrument_id = %history.instrument_id,
                    reason = %Exclusion::MissingAnchor,
                    "instrument excluded"
                );
                out.excluded
                    .push((history.instrument_id.clone(), Exclusion::MissingAnchor));
                continue;
            };

            match percent_return(latest, &anchor) {
                Ok(r) => out.returns.push(r),
                Err(reason) => {
                    tracing::debug!(
                        instrument_id = %history.instrument_id,
                        reason = %reason,
                        "instrument excluded"
                    );
                    out.excluded.push((history.instrument_id.clone(), reason));
                }
            }
        }

        out.returns
            .sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));
        Ok(out)
    }

    async fn lookup(
        &self,
        series: SnapshotSeries,
        mode: AnchorMode,
        latest: &PriceSnapshot,
    ) -> anyhow::Result<Option<PriceSnapshot>> {
        match mode {
            // The prefetched history already held every snapshot up to `rank`.
            AnchorMode::Rank { .. } => Ok(None),
            AnchorMode::TimeWindow { min_lookback_ms } => {
                let Some(threshold) = window_threshold(latest, min_lookback_ms) else {
                    return Ok(None);
                };
                self.source
                    .at_or_before(series, &latest.instrument_id, threshold)
                    .await
                    .with_context(|| format!("anchor lookup failed for {}", latest.instrument_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::memory::MemorySnapshotSource;
    use tracing_test::traced_test;

    const MIN: u64 = 60_000;
    const NOW: u64 = 1_000 * MIN;
    const LOOKBACK: AnchorMode = AnchorMode::TimeWindow {
        min_lookback_ms: 25 * MIN,
    };

    fn snap(id: &str, price: f64, ts: u64) -> PriceSnapshot {
        PriceSnapshot::new(id, price, 1_000, ts)
    }

    async fn histories(
        src: &MemorySnapshotSource,
        ids: &[&str],
        depth: usize,
    ) -> Vec<SnapshotHistory> {
        let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        let mut map = src
            .recent(SnapshotSeries::Intraday, &ids, depth)
            .await
            .unwrap();
        ids.iter()
            .filter_map(|id| SnapshotHistory::new(id.clone(), map.remove(id)?))
            .collect()
    }

    #[test]
    fn percent_return_requires_positive_prices() {
        let r = percent_return(&snap("A", 11.0, 2), &snap("A", 10.0, 1)).unwrap();
        assert!((r.percent_change - 10.0).abs() < 1e-12);

        assert_eq!(
            percent_return(&snap("A", 11.0, 2), &snap("A", 0.0, 1)),
            Err(Exclusion::NonPositivePrice)
        );
        assert_eq!(
            percent_return(&snap("A", -1.0, 2), &snap("A", 10.0, 1)),
            Err(Exclusion::NonPositivePrice)
        );
    }

    #[tokio::test]
    async fn time_window_excludes_too_recent_prior_snapshot() {
        let src = Arc::new(MemorySnapshotSource::new());
        let s = SnapshotSeries::Intraday;
        // A: prior snapshot only 20 minutes before its own latest
        src.record(s, snap("A", 10.0, NOW - 20 * MIN));
        src.record(s, snap("A", 9.5, NOW));
        // B: prior snapshot 35 minutes before its own latest
        src.record(s, snap("B", 10.0, NOW - 35 * MIN));
        src.record(s, snap("B", 11.0, NOW));

        let hs = histories(&src, &["A", "B"], 2).await;
        let out = AnchorSelector::new(src.clone())
            .select(s, LOOKBACK, &hs)
            .await
            .unwrap();

        assert_eq!(out.returns.len(), 1);
        assert_eq!(out.returns[0].instrument_id, "B");
        assert!((out.returns[0].percent_change - 10.0).abs() < 1e-12);
        assert_eq!(out.excluded, vec![("A".to_string(), Exclusion::MissingAnchor)]);
    }

    #[tokio::test]
    async fn time_window_is_relative_to_each_instruments_latest() {
        let src = Arc::new(MemorySnapshotSource::new());
        let s = SnapshotSeries::Intraday;
        // C lags the rest of the universe by 10 minutes; a shared wall-clock
        // cutoff of NOW - 25m would pick the 40m-old snapshot.
        src.record(s, snap("C", 8.0, NOW - 50 * MIN));
        src.record(s, snap("C", 10.0, NOW - 36 * MIN));
        src.record(s, snap("C", 12.0, NOW - 10 * MIN));

        let hs = histories(&src, &["C"], 2).await;
        let out = AnchorSelector::new(src.clone())
            .select(s, LOOKBACK, &hs)
            .await
            .unwrap();

        // Threshold = (NOW - 10m) - 25m = NOW - 35m -> anchor is the 36m snapshot
        assert!((out.returns[0].percent_change - 20.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn time_window_falls_back_to_source_beyond_prefetch() {
        let src = Arc::new(MemorySnapshotSource::new());
        let s = SnapshotSeries::Intraday;
        src.record(s, snap("D", 10.0, NOW - 60 * MIN));
        src.record(s, snap("D", 10.5, NOW - 10 * MIN));
        src.record(s, snap("D", 11.0, NOW - 5 * MIN));
        src.record(s, snap("D", 12.0, NOW));

        // depth 2 only holds the 5m and 0m snapshots
        let hs = histories(&src, &["D"], 2).await;
        assert!(anchor_from_history(&hs[0], LOOKBACK).is_none());

        let out = AnchorSelector::new(src.clone())
            .select(s, LOOKBACK, &hs)
            .await
            .unwrap();
        assert!((out.returns[0].percent_change - 20.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn rank_mode_uses_fixed_offset() {
        let src = Arc::new(MemorySnapshotSource::new());
        let s = SnapshotSeries::Intraday;
        for (day, price) in [(1, 100.0), (2, 90.0), (3, 95.0), (4, 99.0)] {
            src.record(s, snap("E", price, day * 24 * 60 * MIN));
        }
        src.record(s, snap("F", 50.0, 3 * 24 * 60 * MIN));
        src.record(s, snap("F", 55.0, 4 * 24 * 60 * MIN));

        let mode = AnchorMode::Rank { rank: 3 };
        let hs = histories(&src, &["E", "F"], mode.history_depth()).await;
        let out = AnchorSelector::new(src.clone())
            .select(s, mode, &hs)
            .await
            .unwrap();

        // E: latest 99 vs 3rd most recent 90 -> +10%
        assert_eq!(out.returns.len(), 1);
        assert!((out.returns[0].percent_change - 10.0).abs() < 1e-12);
        // F has only two snapshots
        assert_eq!(out.excluded_count(Exclusion::MissingAnchor), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn non_positive_anchor_is_excluded_and_logged() {
        let src = Arc::new(MemorySnapshotSource::new());
        let s = SnapshotSeries::Intraday;
        src.record(s, snap("G", 0.0, NOW - 40 * MIN));
        src.record(s, snap("G", 5.0, NOW));

        let hs = histories(&src, &["G"], 2).await;
        let out = AnchorSelector::new(src.clone())
            .select(s, LOOKBACK, &hs)
            .await
            .unwrap();

        assert!(out.returns.is_empty());
        assert_eq!(out.excluded_count(Exclusion::NonPositivePrice), 1);
        assert!(logs_contain("non_positive_price"));
    }
}
