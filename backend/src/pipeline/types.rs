use std::fmt;

use serde::Serialize;

use crate::timeframe::Timeframe;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// No sector had a single included instrument; nothing was written.
    NoSectors,
    /// Validation or the batch write failed; nothing was written.
    PersistFailed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => f.write_str("success"),
            RunStatus::NoSectors => f.write_str("no_sectors"),
            RunStatus::PersistFailed => f.write_str("persist_failed"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub timeframe: Timeframe,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn success(timeframe: Timeframe, batch_id: String, sector_count: usize) -> Self {
        Self {
            status: RunStatus::Success,
            timeframe,
            batch_id: Some(batch_id),
            sector_count: Some(sector_count),
            error: None,
        }
    }

    pub fn no_sectors(timeframe: Timeframe) -> Self {
        Self {
            status: RunStatus::NoSectors,
            timeframe,
            batch_id: None,
            sector_count: None,
            error: None,
        }
    }

    pub fn persist_failed(timeframe: Timeframe, error: impl fmt::Display) -> Self {
        Self {
            status: RunStatus::PersistFailed,
            timeframe,
            batch_id: None,
            sector_count: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_without_empty_fields() {
        let json = serde_json::to_value(RunOutcome::no_sectors(Timeframe::Weekly)).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "no_sectors", "timeframe": "1week" }));

        let ok = serde_json::to_value(RunOutcome::success(Timeframe::Intraday, "b".into(), 11)).unwrap();
        assert_eq!(ok["status"], "success");
        assert_eq!(ok["sector_count"], 11);
        assert!(ok.get("error").is_none());
    }
}
