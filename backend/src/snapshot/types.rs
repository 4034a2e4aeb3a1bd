use serde::{Deserialize, Serialize};

/// One timestamped price/volume observation. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub instrument_id: String,
    pub price: f64,
    pub volume: u64,
    pub recorded_at_ms: u64,
}

impl PriceSnapshot {
    pub fn new(instrument_id: impl Into<String>, price: f64, volume: u64, recorded_at_ms: u64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            price,
            volume,
            recorded_at_ms,
        }
    }
}

/// The newest snapshots of one instrument, newest first. Never empty.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotHistory {
    pub instrument_id: String,
    recent: Vec<PriceSnapshot>,
}

impl SnapshotHistory {
    /// Returns `None` for an empty list. `recent` must already be newest first.
    pub fn new(instrument_id: impl Into<String>, recent: Vec<PriceSnapshot>) -> Option<Self> {
        if recent.is_empty() {
            return None;
        }
        Some(Self {
            instrument_id: instrument_id.into(),
            recent,
        })
    }

    pub fn latest(&self) -> &PriceSnapshot {
        &self.recent[0]
    }

    pub fn previous(&self) -> Option<&PriceSnapshot> {
        self.recent.get(1)
    }

    /// 1-based recency rank; rank 1 is the latest snapshot.
    pub fn nth_most_recent(&self, rank: usize) -> Option<&PriceSnapshot> {
        rank.checked_sub(1).and_then(|i| self.recent.get(i))
    }

    pub fn recent(&self) -> &[PriceSnapshot] {
        &self.recent
    }
}
