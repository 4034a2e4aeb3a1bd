use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

use super::index::SnapshotIndex;
use super::source::{InstrumentDirectory, SnapshotSource};
use super::types::PriceSnapshot;
use crate::sector::Sector;
use crate::timeframe::SnapshotSeries;

/// In-process snapshot source and instrument directory.
///
/// Backed by one [`SnapshotIndex`] per series. Used by tooling and tests that
/// do not need a database.
#[derive(Default)]
pub struct MemorySnapshotSource {
    series: RwLock<HashMap<SnapshotSeries, SnapshotIndex>>,
    members: RwLock<BTreeMap<Sector, BTreeSet<String>>>,
}

impl MemorySnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, series: SnapshotSeries, snapshot: PriceSnapshot) {
        self.series.write().entry(series).or_default().insert(snapshot);
    }

    /// Moves `instrument_id` into `sector` (removing any previous membership).
    pub fn assign(&self, sector: Sector, instrument_id: impl Into<String>) {
        let id = instrument_id.into();
        let mut members = self.members.write();
        for ids in members.values_mut() {
            ids.remove(&id);
        }
        members.entry(sector).or_default().insert(id);
    }

    pub fn deactivate(&self, instrument_id: &str) {
        for ids in self.members.write().values_mut() {
            ids.remove(instrument_id);
        }
    }
}

#[async_trait]
impl SnapshotSource for MemorySnapshotSource {
    async fn recent(
        &self,
        series: SnapshotSeries,
        instrument_ids: &[String],
        depth: usize,
    ) -> Result<HashMap<String, Vec<PriceSnapshot>>> {
        let guard = self.series.read();
        let Some(index) = guard.get(&series) else {
            return Ok(HashMap::new());
        };

        Ok(instrument_ids
            .iter()
            .filter_map(|id| {
                let recent = index.recent(id, depth);
                (!recent.is_empty()).then(|| (id.clone(), recent))
            })
            .collect())
    }

    async fn at_or_before(
        &self,
        series: SnapshotSeries,
        instrument_id: &str,
        threshold_ms: u64,
    ) -> Result<Option<PriceSnapshot>> {
        Ok(self
            .series
            .read()
            .get(&series)
            .and_then(|idx| idx.at_or_before(instrument_id, threshold_ms))
            .cloned())
    }
}

#[async_trait]
impl InstrumentDirectory for MemorySnapshotSource {
    async fn active_instruments(&self, sector: &Sector) -> Result<Vec<String>> {
        Ok(self
            .members
            .read()
            .get(sector)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }
}
