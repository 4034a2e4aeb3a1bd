//! Per-instrument snapshot index.
//!
//! Each instrument keeps its snapshots in a vector sorted by `recorded_at_ms`
//! (oldest first). That gives:
//!   • O(log n) "most recent snapshot at or before a threshold"
//!   • O(1) "Nth most recent snapshot"
//!   • O(depth) newest-first history slices

use std::collections::HashMap;

use super::types::PriceSnapshot;

#[derive(Default, Debug, Clone)]
pub struct SnapshotIndex {
    by_instrument: HashMap<String, Vec<PriceSnapshot>>,
}

impl SnapshotIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts keeping time order. A second snapshot with the same timestamp
    /// for the same instrument replaces the first.
    pub fn insert(&mut self, snapshot: PriceSnapshot) {
        let series = self
            .by_instrument
            .entry(snapshot.instrument_id.clone())
            .or_default();

        // Fast path: ingestion is append-mostly.
        match series.last() {
            None => series.push(snapshot),
            Some(last) if last.recorded_at_ms < snapshot.recorded_at_ms => series.push(snapshot),
            _ => {
                let pos = series.partition_point(|s| s.recorded_at_ms < snapshot.recorded_at_ms);
                if series
                    .get(pos)
                    .is_some_and(|s| s.recorded_at_ms == snapshot.recorded_at_ms)
                {
                    series[pos] = snapshot;
                } else {
                    series.insert(pos, snapshot);
                }
            }
        }
    }

    pub fn len(&self, instrument_id: &str) -> usize {
        self.by_instrument.get(instrument_id).map_or(0, Vec::len)
    }

    pub fn latest(&self, instrument_id: &str) -> Option<&PriceSnapshot> {
        self.by_instrument.get(instrument_id)?.last()
    }

    /// Most recent snapshot with `recorded_at_ms <= threshold_ms`.
    pub fn at_or_before(&self, instrument_id: &str, threshold_ms: u64) -> Option<&PriceSnapshot> {
        let series = self.by_instrument.get(instrument_id)?;
        let end = series.partition_point(|s| s.recorded_at_ms <= threshold_ms);
        end.checked_sub(1).map(|i| &series[i])
    }

    /// 1-based recency rank; rank 1 is the latest snapshot.
    pub fn nth_most_recent(&self, instrument_id: &str, rank: usize) -> Option<&PriceSnapshot> {
        let series = self.by_instrument.get(instrument_id)?;
        if rank == 0 || rank > series.len() {
            return None;
        }
        series.get(series.len() - rank)
    }

    /// Up to `depth` snapshots, newest first.
    pub fn recent(&self, instrument_id: &str, depth: usize) -> Vec<PriceSnapshot> {
        self.by_instrument
            .get(instrument_id)
            .map(|series| series.iter().rev().take(depth).cloned().collect())
            .unwrap_or_default()
    }
}
