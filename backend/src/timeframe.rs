use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Sentiment horizons, each with its own orchestrator run and freshness threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "30min", alias = "intraday")]
    Intraday,
    #[serde(rename = "1day", alias = "daily")]
    Daily,
    #[serde(rename = "3day", alias = "multi_day")]
    MultiDay,
    #[serde(rename = "1week", alias = "weekly")]
    Weekly,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::Intraday,
        Timeframe::Daily,
        Timeframe::MultiDay,
        Timeframe::Weekly,
    ];

    /// Storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Intraday => "30min",
            Timeframe::Daily => "1day",
            Timeframe::MultiDay => "3day",
            Timeframe::Weekly => "1week",
        }
    }

    /// Snapshot series the anchor lookup reads from.
    pub fn series(&self) -> SnapshotSeries {
        match self {
            Timeframe::Intraday | Timeframe::Daily => SnapshotSeries::Intraday,
            Timeframe::MultiDay | Timeframe::Weekly => SnapshotSeries::Daily,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "30min" | "intraday" => Ok(Timeframe::Intraday),
            "1day" | "daily" => Ok(Timeframe::Daily),
            "3day" | "multi_day" => Ok(Timeframe::MultiDay),
            "1week" | "weekly" => Ok(Timeframe::Weekly),
            other => Err(AppError::UnknownTimeframe(other.to_string())),
        }
    }
}

/// Ingestion cadence a snapshot belongs to.
///
/// Intraday snapshots arrive every few minutes; daily snapshots once per session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSeries {
    Intraday,
    Daily,
}

impl SnapshotSeries {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSeries::Intraday => "intraday",
            SnapshotSeries::Daily => "daily",
        }
    }
}
