use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Sector membership (written by the instrument-directory collaborator)
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS instruments (
  instrument_id TEXT PRIMARY KEY,
  sector TEXT NOT NULL,
  active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0,1))
);
"#,
    )
    .execute(pool)
    .await?;

    // Append-only snapshots (written by the ingestion collaborator)
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS price_snapshots (
  instrument_id TEXT NOT NULL,
  series TEXT NOT NULL,
  price REAL NOT NULL,
  volume BIGINT NOT NULL,
  recorded_at_ms BIGINT NOT NULL,
  PRIMARY KEY (instrument_id, series, recorded_at_ms)
);
"#,
    )
    .execute(pool)
    .await?;

    // One row per sector per batch
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS sector_sentiment (
  batch_id TEXT NOT NULL,
  timeframe TEXT NOT NULL,
  sector TEXT NOT NULL,
  simple_score REAL NOT NULL,
  weighted_score REAL,
  sample_size BIGINT NOT NULL,
  timestamp_ms BIGINT NOT NULL,
  PRIMARY KEY (batch_id, sector)
);
"#,
    )
    .execute(pool)
    .await?;

    // Top movers per sector, tied to the batch that produced them
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS sector_gappers (
  batch_id TEXT NOT NULL,
  timeframe TEXT NOT NULL,
  sector TEXT NOT NULL,
  kind TEXT NOT NULL,
  rank BIGINT NOT NULL,
  instrument_id TEXT NOT NULL,
  percent_change REAL NOT NULL,
  volume BIGINT NOT NULL,
  price REAL NOT NULL,
  PRIMARY KEY (batch_id, sector, kind, rank)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_instruments_sector ON instruments(sector);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_sentiment_tf_ts ON sector_sentiment(timeframe, timestamp_ms);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_gappers_batch ON sector_gappers(batch_id);"#)
        .execute(pool)
        .await?;

    Ok(())
}
