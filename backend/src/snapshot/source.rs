use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::sector::Sector;
use crate::snapshot::types::PriceSnapshot;
use crate::timeframe::SnapshotSeries;

/// Read access to recorded price snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Up to `depth` snapshots per instrument, newest first. Instruments without
    /// any snapshot are absent from the map.
    async fn recent(
        &self,
        series: SnapshotSeries,
        instrument_ids: &[String],
        depth: usize,
    ) -> Result<HashMap<String, Vec<PriceSnapshot>>>;

    /// Most recent snapshot of `instrument_id` with `recorded_at_ms <= threshold_ms`.
    async fn at_or_before(
        &self,
        series: SnapshotSeries,
        instrument_id: &str,
        threshold_ms: u64,
    ) -> Result<Option<PriceSnapshot>>;
}

/// Sector membership. Owned outside this crate; may change between runs.
#[async_trait]
pub trait InstrumentDirectory: Send + Sync {
    /// Active instrument ids for `sector`, sorted ascending.
    async fn active_instruments(&self, sector: &Sector) -> Result<Vec<String>>;
}
