use anyhow::Result;
use async_trait::async_trait;

use crate::batch::types::{GapperRecord, StoredBatch};
use crate::timeframe::Timeframe;

/// Read/retention side of batch storage.
#[async_trait]
pub trait BatchRepository: Send + Sync {
    /// Newest batches (by newest record timestamp) having exactly `expected`
    /// rows with distinct sectors. At most `limit` groups, newest first.
    async fn latest_complete_batches(
        &self,
        timeframe: Timeframe,
        expected: usize,
        limit: usize,
    ) -> Result<Vec<StoredBatch>>;

    /// Newest batch groups regardless of completeness.
    async fn recent_batches(&self, timeframe: Timeframe, limit: usize) -> Result<Vec<StoredBatch>>;

    /// Deletes whole batch groups (and their gappers) whose newest record is
    /// older than `cutoff_ms`. Returns the number of groups removed.
    async fn delete_batches_before(&self, cutoff_ms: u64) -> Result<u64>;

    async fn fetch_gappers(&self, batch_id: &str) -> Result<Vec<GapperRecord>>;
}
