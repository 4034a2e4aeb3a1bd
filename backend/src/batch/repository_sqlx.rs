use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use common::logger::warn_if_slow;
use sqlx::{AnyPool, Row};
use tracing::{debug, instrument};

use crate::batch::repository::BatchRepository;
use crate::batch::sink::BatchSink;
use crate::batch::types::{GapperRecord, SectorBatch, StoredBatch, StoredRecord};
use crate::db::convert::{i64_to_u64, i64_to_usize, u64_to_i64, usize_to_i64};
use crate::sector::Sector;
use crate::timeframe::Timeframe;

/// SQLx-backed batch storage: the transactional sink and the freshness
/// repository over the same tables.
#[derive(Clone)]
pub struct SqlxBatchStore {
    pool: AnyPool,
}

impl SqlxBatchStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    async fn fetch_batch(&self, batch_id: &str) -> anyhow::Result<Option<StoredBatch>> {
        let rows = sqlx::query(
            r#"
SELECT batch_id, timeframe, sector, simple_score, weighted_score, sample_size, timestamp_ms
FROM sector_sentiment
WHERE batch_id = ?
ORDER BY sector;
"#,
        )
        .bind(batch_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(row_to_record)
            .collect::<anyhow::Result<Vec<_>>>()
            .with_context(|| format!("malformed sentiment row in batch {batch_id}"))?;

        let Some(first) = records.first() else {
            return Ok(None);
        };

        Ok(Some(StoredBatch {
            batch_id: first.batch_id.clone(),
            timeframe: first.timeframe,
            records,
        }))
    }

    async fn fetch_batches(&self, batch_ids: Vec<String>) -> anyhow::Result<Vec<StoredBatch>> {
        let mut out = Vec::with_capacity(batch_ids.len());
        for id in batch_ids {
            if let Some(b) = self.fetch_batch(&id).await? {
                out.push(b);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl BatchSink for SqlxBatchStore {
    #[instrument(
        skip_all,
        target = "store",
        fields(batch_id = %batch.batch_id, records = batch.records.len())
    )]
    async fn write_batch(&self, batch: &SectorBatch) -> anyhow::Result<()> {
        if batch.records.is_empty() {
            anyhow::bail!("attempted to write empty batch {}", batch.batch_id);
        }

        let ts = u64_to_i64(batch.timestamp_ms)?;

        warn_if_slow("db_write_batch", Duration::from_millis(200), async {
            let mut tx = self.pool.begin().await?;

            for r in &batch.records {
                sqlx::query(
                    r#"
INSERT INTO sector_sentiment
  (batch_id, timeframe, sector, simple_score, weighted_score, sample_size, timestamp_ms)
VALUES (?, ?, ?, ?, ?, ?, ?);
"#,
                )
                .bind(batch.batch_id.clone())
                .bind(batch.timeframe.as_str())
                .bind(r.sector.to_string())
                .bind(r.simple_score)
                .bind(r.weighted_score)
                .bind(usize_to_i64(r.sample_size)?)
                .bind(ts)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("insert failed for sector {}", r.sector))?;
            }

            // Dropping `tx` on any error above rolls the whole batch back.
            tx.commit().await?;
            anyhow::Ok(())
        })
        .await?;

        debug!("batch committed");
        Ok(())
    }

    #[instrument(skip_all, target = "store", fields(records = records.len()))]
    async fn write_gappers(&self, records: &[GapperRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for g in records {
            sqlx::query(
                r#"
INSERT INTO sector_gappers
  (batch_id, timeframe, sector, kind, rank, instrument_id, percent_change, volume, price)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
            )
            .bind(g.batch_id.clone())
            .bind(g.timeframe.as_str())
            .bind(g.sector.to_string())
            .bind(g.kind.as_str())
            .bind(i64::from(g.rank))
            .bind(g.instrument_id.clone())
            .bind(g.percent_change)
            .bind(u64_to_i64(g.volume)?)
            .bind(g.price)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

#[async_trait]
impl BatchRepository for SqlxBatchStore {
    async fn latest_complete_batches(
        &self,
        timeframe: Timeframe,
        expected: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredBatch>> {
        let expected = usize_to_i64(expected)?;

        let rows = sqlx::query(
            r#"
SELECT batch_id, MAX(timestamp_ms) AS newest_ms
FROM sector_sentiment
WHERE timeframe = ?
GROUP BY batch_id
HAVING COUNT(*) = ? AND COUNT(DISTINCT sector) = ?
ORDER BY newest_ms DESC, batch_id DESC
LIMIT ?;
"#,
        )
        .bind(timeframe.as_str())
        .bind(expected)
        .bind(expected)
        .bind(usize_to_i64(limit)?)
        .fetch_all(&self.pool)
        .await?;

        let ids = rows
            .iter()
            .map(|r| r.try_get::<String, _>("batch_id"))
            .collect::<Result<Vec<_>, _>>()?;

        self.fetch_batches(ids).await
    }

    async fn recent_batches(
        &self,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredBatch>> {
        let rows = sqlx::query(
            r#"
SELECT batch_id, MAX(timestamp_ms) AS newest_ms
FROM sector_sentiment
WHERE timeframe = ?
GROUP BY batch_id
ORDER BY newest_ms DESC, batch_id DESC
LIMIT ?;
"#,
        )
        .bind(timeframe.as_str())
        .bind(usize_to_i64(limit)?)
        .fetch_all(&self.pool)
        .await?;

        let ids = rows
            .iter()
            .map(|r| r.try_get::<String, _>("batch_id"))
            .collect::<Result<Vec<_>, _>>()?;

        self.fetch_batches(ids).await
    }

    async fn delete_batches_before(&self, cutoff_ms: u64) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
SELECT batch_id
FROM sector_sentiment
GROUP BY batch_id
HAVING MAX(timestamp_ms) < ?;
"#,
        )
        .bind(u64_to_i64(cutoff_ms)?)
        .fetch_all(&mut *tx)
        .await?;

        let mut deleted = 0_u64;
        for r in &rows {
            let batch_id: String = r.try_get("batch_id")?;

            sqlx::query("DELETE FROM sector_gappers WHERE batch_id = ?;")
                .bind(batch_id.clone())
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM sector_sentiment WHERE batch_id = ?;")
                .bind(batch_id)
                .execute(&mut *tx)
                .await?;

            deleted += 1;
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn fetch_gappers(&self, batch_id: &str) -> anyhow::Result<Vec<GapperRecord>> {
        let rows = sqlx::query(
            r#"
SELECT batch_id, timeframe, sector, kind, rank, instrument_id, percent_change, volume, price
FROM sector_gappers
WHERE batch_id = ?
ORDER BY sector, kind, rank;
"#,
        )
        .bind(batch_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_gapper).collect()
    }
}

/* =========================
Row mapping
========================= */

fn row_to_record(r: &sqlx::any::AnyRow) -> anyhow::Result<StoredRecord> {
    let timeframe: String = r.try_get("timeframe")?;

    Ok(StoredRecord {
        batch_id: r.try_get("batch_id")?,
        timeframe: timeframe.parse()?,
        sector: Sector::new(r.try_get::<String, _>("sector")?),
        simple_score: r.try_get("simple_score")?,
        weighted_score: r.try_get("weighted_score")?,
        sample_size: i64_to_usize(r.try_get("sample_size")?)?,
        timestamp_ms: i64_to_u64(r.try_get("timestamp_ms")?)?,
    })
}

fn row_to_gapper(r: &sqlx::any::AnyRow) -> anyhow::Result<GapperRecord> {
    let timeframe: String = r.try_get("timeframe")?;
    let kind: String = r.try_get("kind")?;
    let rank: i64 = r.try_get("rank")?;

    Ok(GapperRecord {
        sector: Sector::new(r.try_get::<String, _>("sector")?),
        batch_id: r.try_get("batch_id")?,
        timeframe: timeframe.parse()?,
        kind: kind.parse().map_err(|e: String| anyhow!(e))?,
        rank: u8::try_from(rank).map_err(|_| anyhow!("gapper rank out of range: {rank}"))?,
        instrument_id: r.try_get("instrument_id")?,
        percent_change: r.try_get("percent_change")?,
        volume: i64_to_u64(r.try_get("volume")?)?,
        price: r.try_get("price")?,
    })
}
