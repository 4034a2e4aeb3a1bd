use serde::{Deserialize, Serialize};

use crate::sector::Sector;
use crate::sentiment::gappers::GapperKind;
use crate::timeframe::Timeframe;

/// One sector's scores inside a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectorRecord {
    pub sector: Sector,
    pub simple_score: f64,
    pub weighted_score: Option<f64>,
    pub sample_size: usize,
}

/// A complete, validated set of one record per canonical sector.
///
/// Built only by the validator; never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectorBatch {
    pub batch_id: String,
    pub timeframe: Timeframe,
    pub timestamp_ms: u64,
    pub records: Vec<SectorRecord>,
}

/// A batch row as read back from storage (each row carries its own id and time).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub batch_id: String,
    pub timeframe: Timeframe,
    pub sector: Sector,
    pub simple_score: f64,
    pub weighted_score: Option<f64>,
    pub sample_size: usize,
    pub timestamp_ms: u64,
}

/// All stored rows sharing one `batch_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredBatch {
    pub batch_id: String,
    pub timeframe: Timeframe,
    pub records: Vec<StoredRecord>,
}

impl StoredBatch {
    pub fn newest_ms(&self) -> Option<u64> {
        self.records.iter().map(|r| r.timestamp_ms).max()
    }

    pub fn oldest_ms(&self) -> Option<u64> {
        self.records.iter().map(|r| r.timestamp_ms).min()
    }

    pub fn into_sector_batch(self) -> SectorBatch {
        let timestamp_ms = self.newest_ms().unwrap_or_default();
        SectorBatch {
            batch_id: self.batch_id,
            timeframe: self.timeframe,
            timestamp_ms,
            records: self
                .records
                .into_iter()
                .map(|r| SectorRecord {
                    sector: r.sector,
                    simple_score: r.simple_score,
                    weighted_score: r.weighted_score,
                    sample_size: r.sample_size,
                })
                .collect(),
        }
    }
}

impl SectorBatch {
    /// Row view used by sinks.
    pub fn stored_records(&self) -> Vec<StoredRecord> {
        self.records
            .iter()
            .map(|r| StoredRecord {
                batch_id: self.batch_id.clone(),
                timeframe: self.timeframe,
                sector: r.sector.clone(),
                simple_score: r.simple_score,
                weighted_score: r.weighted_score,
                sample_size: r.sample_size,
                timestamp_ms: self.timestamp_ms,
            })
            .collect()
    }
}

/// Ranked mover persisted alongside the batch that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GapperRecord {
    pub sector: Sector,
    pub batch_id: String,
    pub timeframe: Timeframe,
    pub kind: GapperKind,
    pub rank: u8,
    pub instrument_id: String,
    pub percent_change: f64,
    pub volume: u64,
    pub price: f64,
}
