use std::collections::{HashMap, HashSet};

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{AnyPool, Row};

use super::source::{InstrumentDirectory, SnapshotSource};
use super::types::PriceSnapshot;
use crate::db::convert::{i64_to_u64, u64_to_i64, usize_to_i64};
use crate::sector::Sector;
use crate::timeframe::SnapshotSeries;

/// SQLx-backed snapshot source and instrument directory.
/// Responsible only for queries and row mapping.
#[derive(Clone)]
pub struct SqlxSnapshotSource {
    pool: AnyPool,
}

impl SqlxSnapshotSource {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Appends one snapshot. Snapshots are immutable: a second write for the
    /// same (instrument, series, timestamp) is ignored.
    pub async fn record(&self, series: SnapshotSeries, s: &PriceSnapshot) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO price_snapshots (instrument_id, series, price, volume, recorded_at_ms)
VALUES (?, ?, ?, ?, ?)
ON CONFLICT (instrument_id, series, recorded_at_ms)
DO NOTHING;
"#,
        )
        .bind(s.instrument_id.clone())
        .bind(series.as_str())
        .bind(s.price)
        .bind(u64_to_i64(s.volume)?)
        .bind(u64_to_i64(s.recorded_at_ms)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_instrument(
        &self,
        instrument_id: &str,
        sector: &Sector,
        active: bool,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO instruments (instrument_id, sector, active)
VALUES (?, ?, ?)
ON CONFLICT (instrument_id)
DO UPDATE SET sector = excluded.sector, active = excluded.active;
"#,
        )
        .bind(instrument_id.to_string())
        .bind(sector.as_str())
        .bind(if active { 1_i64 } else { 0_i64 })
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for SqlxSnapshotSource {
    async fn recent(
        &self,
        series: SnapshotSeries,
        instrument_ids: &[String],
        depth: usize,
    ) -> anyhow::Result<HashMap<String, Vec<PriceSnapshot>>> {
        if instrument_ids.is_empty() || depth == 0 {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; instrument_ids.len()].join(", ");
        let sql = format!(
            r#"
SELECT instrument_id, price, volume, recorded_at_ms
FROM (
  SELECT instrument_id, price, volume, recorded_at_ms,
         ROW_NUMBER() OVER (PARTITION BY instrument_id ORDER BY recorded_at_ms DESC) AS rn
  FROM price_snapshots
  WHERE series = ? AND instrument_id IN ({placeholders})
) ranked
WHERE rn <= ?
ORDER BY instrument_id, recorded_at_ms DESC;
"#
        );

        let mut query = sqlx::query(&sql).bind(series.as_str());
        for id in instrument_ids {
            query = query.bind(id.clone());
        }
        let rows = query
            .bind(usize_to_i64(depth)?)
            .fetch_all(&self.pool)
            .await
            .context("recent snapshot query failed")?;

        // A malformed row poisons its instrument's whole history: dropping just
        // that row would shift which snapshot counts as latest.
        let mut out: HashMap<String, Vec<PriceSnapshot>> = HashMap::new();
        let mut poisoned: HashSet<String> = HashSet::new();
        for r in rows {
            let instrument_id: String = r
                .try_get("instrument_id")
                .context("snapshot row without instrument_id")?;
            if poisoned.contains(&instrument_id) {
                continue;
            }

            match row_to_snapshot(&r) {
                Ok(s) => out.entry(instrument_id).or_default().push(s),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        instrument_id = %instrument_id,
                        "malformed snapshot row; dropping instrument history"
                    );
                    out.remove(&instrument_id);
                    poisoned.insert(instrument_id);
                }
            }
        }

        Ok(out)
    }

    async fn at_or_before(
        &self,
        series: SnapshotSeries,
        instrument_id: &str,
        threshold_ms: u64,
    ) -> anyhow::Result<Option<PriceSnapshot>> {
        let row = sqlx::query(
            r#"
SELECT instrument_id, price, volume, recorded_at_ms
FROM price_snapshots
WHERE series = ? AND instrument_id = ? AND recorded_at_ms <= ?
ORDER BY recorded_at_ms DESC
LIMIT 1;
"#,
        )
        .bind(series.as_str())
        .bind(instrument_id.to_string())
        .bind(u64_to_i64(threshold_ms)?)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        match row_to_snapshot(&row) {
            Ok(s) => Ok(Some(s)),
            Err(e) => {
                // Same treatment as in `recent`: no usable anchor.
                tracing::warn!(
                    error = %e,
                    instrument_id = %instrument_id,
                    "malformed snapshot row; treating anchor as missing"
                );
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl InstrumentDirectory for SqlxSnapshotSource {
    async fn active_instruments(&self, sector: &Sector) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
SELECT instrument_id
FROM instruments
WHERE sector = ? AND active = 1
ORDER BY instrument_id;
"#,
        )
        .bind(sector.as_str())
        .fetch_all(&self.pool)
        .await?;

        let ids = rows
            .iter()
            .map(|r| r.try_get::<String, _>("instrument_id"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ids)
    }
}

fn row_to_snapshot(r: &sqlx::any::AnyRow) -> anyhow::Result<PriceSnapshot> {
    Ok(PriceSnapshot {
        instrument_id: r.try_get::<String, _>("instrument_id")?,
        price: r.try_get::<f64, _>("price")?,
        volume: i64_to_u64(r.try_get("volume")?)?,
        recorded_at_ms: i64_to_u64(r.try_get("recorded_at_ms")?)?,
    })
}
