use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;

use super::types::{GapperRecord, SectorBatch};

/// Persistence capability handed to the orchestrator.
///
/// `write_batch` is all-or-nothing: either every record of the batch becomes
/// visible to readers, or none does.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn write_batch(&self, batch: &SectorBatch) -> Result<()>;

    async fn write_gappers(&self, records: &[GapperRecord]) -> Result<()>;
}

/// Accepts and drops everything. For dry runs and pure-logic tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardSink;

#[async_trait]
impl BatchSink for DiscardSink {
    async fn write_batch(&self, batch: &SectorBatch) -> Result<()> {
        tracing::debug!(batch_id = %batch.batch_id, records = batch.records.len(), "discarding batch");
        Ok(())
    }

    async fn write_gappers(&self, records: &[GapperRecord]) -> Result<()> {
        tracing::debug!(records = records.len(), "discarding gappers");
        Ok(())
    }
}

/// Sink selection, fixed at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkMode {
    Database,
    Discard,
}

impl FromStr for SinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "database" | "db" => Ok(SinkMode::Database),
            "discard" | "noop" => Ok(SinkMode::Discard),
            other => Err(format!("unknown sink mode {other:?}")),
        }
    }
}

impl fmt::Display for SinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkMode::Database => f.write_str("database"),
            SinkMode::Discard => f.write_str("discard"),
        }
    }
}
