use serde::{Deserialize, Serialize};

use crate::batch::types::SectorBatch;
use crate::timeframe::Timeframe;

/// Per-timeframe freshness of the latest complete batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessState {
    Fresh,
    Stale,
    NoData,
}

/// Position of a batch's age relative to its timeframe threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeStatus {
    Fresh,
    /// Not stale yet, but past the approaching ratio of the threshold.
    Approaching,
    Stale,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchAgeInfo {
    pub age_minutes: f64,
    pub threshold_minutes: u64,
    pub status: AgeStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatestBatch {
    pub batch: SectorBatch,
    pub is_stale: bool,
    pub age: BatchAgeInfo,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum IntegrityIssue {
    RecordCount { expected: usize, got: usize },
    DuplicateSector { sector: String },
    MissingSector { sector: String },
    UnknownSector { sector: String },
    BatchIdMismatch { expected: String, found: String },
    TimestampSpread { spread_ms: u64, tolerance_ms: u64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub batch_id: String,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Observability view of one stored batch group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub timeframe: Timeframe,
    pub timestamp_ms: u64,
    pub record_count: usize,
    pub is_complete: bool,
    pub age_minutes: f64,
    pub total_sample_size: usize,
    pub mean_simple_score: f64,
}
