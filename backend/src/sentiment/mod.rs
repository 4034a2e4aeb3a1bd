pub mod aggregate;
pub mod anchor;
pub mod gappers;

use serde::{Deserialize, Serialize};

/// Per-instrument return for one timeframe, derived from a (latest, anchor) pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectorReturn {
    pub instrument_id: String,
    pub percent_change: f64,
    /// Latest price.
    pub price: f64,
    /// Latest volume.
    pub volume: u64,
}
