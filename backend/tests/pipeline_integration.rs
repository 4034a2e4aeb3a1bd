
use std::sync::Arc;

use sqlx::any::AnyPoolOptions;
use uuid::Uuid;

use mock_store::{FailingSink, GapperRejectingSink, MemoryBatchStore};
use sector_sentiment::batch::repository_sqlx::SqlxBatchStore;
use sector_sentiment::batch::sink::BatchSink;
use sector_sentiment::config::{FreshnessConfig, PipelineConfig};
use sector_sentiment::db::schema;
use sector_sentiment::freshness::service::FreshnessService;
use sector_sentiment::freshness::types::FreshnessState;
use sector_sentiment::metrics::PipelineCounters;
use sector_sentiment::pipeline::{RunStatus, SectorPipeline};
use sector_sentiment::sector::{Sector, SectorUniverse};
use sector_sentiment::sentiment::aggregate::AggregationMode;
use sector_sentiment::sentiment::gappers::GapperKind;
use sector_sentiment::snapshot::memory::MemorySnapshotSource;
use sector_sentiment::snapshot::sqlx_source::SqlxSnapshotSource;
use sector_sentiment::snapshot::types::PriceSnapshot;
use sector_sentiment::timeframe::{SnapshotSeries, Timeframe};

const MIN: u64 = 60_000;
const DAY: u64 = 24 * 60 * MIN;
const NOW: u64 = 20_000 * DAY;

fn cfg() -> PipelineConfig {
    PipelineConfig {
        sectors: SectorUniverse::new(["technology", "energy"].map(Sector::from)),
        ..PipelineConfig::default()
    }
}

fn pipeline(src: Arc<MemorySnapshotSource>, sink: Arc<dyn BatchSink>) -> SectorPipeline {
    SectorPipeline::new(src.clone(), src, sink, cfg(), PipelineCounters::default())
}

/// A: only a 20-minute-old comparison point (too recent for the 25-minute
/// lookback). B: a 35-minute-old point at 100.0, now at 110.0.
fn anchor_example() -> Arc<MemorySnapshotSource> {
    let src = Arc::new(MemorySnapshotSource::new());
    let tech = Sector::from("technology");

    src.assign(tech.clone(), "A");
    src.record(SnapshotSeries::Intraday, PriceSnapshot::new("A", 50.0, 1_000, NOW - 20 * MIN));
    src.record(SnapshotSeries::Intraday, PriceSnapshot::new("A", 55.0, 1_000, NOW));

    src.assign(tech, "B");
    src.record(SnapshotSeries::Intraday, PriceSnapshot::new("B", 100.0, 2_000, NOW - 35 * MIN));
    src.record(SnapshotSeries::Intraday, PriceSnapshot::new("B", 110.0, 2_000, NOW));

    src
}

#[tokio::test]
async fn anchor_window_excludes_too_recent_comparison() {
    let store = Arc::new(MemoryBatchStore::new());
    let p = pipeline(anchor_example(), store.clone());

    let out = p.run_pipeline(Timeframe::Intraday, NOW).await.unwrap();
    assert_eq!(out.status, RunStatus::Success);

    let records = store.records.lock();
    let tech = records.iter().find(|r| r.sector.as_str() == "technology").unwrap();
    assert_eq!(tech.simple_score, 10.0);
    assert_eq!(tech.weighted_score, Some(10.0));
    assert_eq!(tech.sample_size, 1);

    let c = p.counters().snapshot();
    assert_eq!(c.excluded_missing_anchor, 1);
    assert_eq!(c.instruments_included, 1);
}

#[tokio::test]
async fn repeated_runs_over_unchanged_data_are_identical() {
    let src = anchor_example();
    src.assign(Sector::from("energy"), "XOM");
    src.record(SnapshotSeries::Intraday, PriceSnapshot::new("XOM", 100.0, 7_777, NOW - 40 * MIN));
    src.record(SnapshotSeries::Intraday, PriceSnapshot::new("XOM", 97.3, 7_777, NOW));

    let store = Arc::new(MemoryBatchStore::new());
    let p = pipeline(src, store.clone());

    let first = p.run_pipeline(Timeframe::Intraday, NOW).await.unwrap();
    let second = p.run_pipeline(Timeframe::Intraday, NOW).await.unwrap();
    assert_ne!(first.batch_id, second.batch_id);

    let records = store.records.lock();
    let of = |id: &Option<String>| {
        records
            .iter()
            .filter(|r| Some(&r.batch_id) == id.as_ref())
            .map(|r| (r.sector.clone(), r.simple_score.to_bits(), r.weighted_score.map(f64::to_bits), r.sample_size))
            .collect::<Vec<_>>()
    };
    assert_eq!(of(&first.batch_id), of(&second.batch_id));
    assert_eq!(of(&first.batch_id).len(), 2);
}

#[tokio::test]
async fn validator_rejection_writes_nothing() {
    let src = anchor_example();
    src.assign(Sector::from("energy"), "MOON");
    src.record(SnapshotSeries::Intraday, PriceSnapshot::new("MOON", 1.0, 10, NOW - 30 * MIN));
    src.record(SnapshotSeries::Intraday, PriceSnapshot::new("MOON", 5.0, 10, NOW));

    let store = Arc::new(MemoryBatchStore::new());
    let p = pipeline(src, store.clone());

    let out = p.run_pipeline(Timeframe::Intraday, NOW).await.unwrap();

    assert_eq!(out.status, RunStatus::PersistFailed);
    assert!(out.error.unwrap().contains("simple_score"));
    assert_eq!(store.record_count(), 0);
    assert!(store.gappers.lock().is_empty());
    assert_eq!(p.counters().snapshot().runs_persist_failed, 1);
}

#[tokio::test]
async fn sink_failure_reports_persist_failed() {
    let p = pipeline(anchor_example(), Arc::new(FailingSink));

    let out = p.run_pipeline(Timeframe::Intraday, NOW).await.unwrap();

    assert_eq!(out.status, RunStatus::PersistFailed);
    assert!(out.batch_id.is_none());
    assert!(out.error.unwrap().contains("disk I/O error"));
}

#[tokio::test]
async fn gapper_write_failure_keeps_the_committed_batch() {
    let sink = Arc::new(GapperRejectingSink::new());
    let p = pipeline(anchor_example(), sink.clone());

    let out = p.run_pipeline(Timeframe::Intraday, NOW).await.unwrap();

    assert_eq!(out.status, RunStatus::Success);
    assert_eq!(out.sector_count, Some(2));
    assert_eq!(sink.inner.record_count(), 2);
    assert!(sink.inner.gappers.lock().is_empty());
    assert!(sink
        .inner
        .records
        .lock()
        .iter()
        .all(|r| Some(&r.batch_id) == out.batch_id.as_ref()));
    assert_eq!(p.counters().snapshot().runs_success, 1);
}

#[tokio::test]
async fn no_included_instrument_reports_no_sectors() {
    let store = Arc::new(MemoryBatchStore::new());
    // Daily series is empty, so the multi-day run has nothing to anchor.
    let p = pipeline(anchor_example(), store.clone());

    let out = p.run_pipeline(Timeframe::MultiDay, NOW).await.unwrap();

    assert_eq!(out.status, RunStatus::NoSectors);
    assert_eq!(store.record_count(), 0);
}

#[tokio::test]
async fn rank_mode_reads_the_daily_series() {
    let src = Arc::new(MemorySnapshotSource::new());
    src.assign(Sector::from("energy"), "XOM");
    for (i, price) in [100.0, 101.0, 102.0, 103.0, 104.0].into_iter().enumerate() {
        src.record(
            SnapshotSeries::Daily,
            PriceSnapshot::new("XOM", price, 1_000, NOW - (4 - i as u64) * DAY),
        );
    }

    let store = Arc::new(MemoryBatchStore::new());
    let p = pipeline(src, store.clone());

    p.run_pipeline(Timeframe::MultiDay, NOW).await.unwrap();
    p.run_pipeline(Timeframe::Weekly, NOW).await.unwrap();

    let records = store.records.lock();
    let energy = |tf: Timeframe| {
        records
            .iter()
            .find(|r| r.timeframe == tf && r.sector.as_str() == "energy")
            .map(|r| r.simple_score)
            .unwrap()
    };
    // 3rd most recent is 102.0, 5th is 100.0
    assert_eq!(energy(Timeframe::MultiDay), 1.9608);
    assert_eq!(energy(Timeframe::Weekly), 4.0);
}

#[tokio::test]
async fn freshness_follows_the_latest_complete_batch() {
    let store = Arc::new(MemoryBatchStore::new());
    let p = pipeline(anchor_example(), store.clone());
    let freshness = FreshnessService::new(store.clone(), cfg().sectors, FreshnessConfig::default());

    assert_eq!(
        freshness.freshness(Timeframe::Intraday, NOW).await.unwrap(),
        FreshnessState::NoData
    );

    let out = p.run_pipeline(Timeframe::Intraday, NOW).await.unwrap();

    let latest = freshness
        .get_latest_complete_batch(Timeframe::Intraday, NOW + 45 * MIN)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Some(latest.batch.batch_id.clone()), out.batch_id);
    assert!(!latest.is_stale);

    assert_eq!(
        freshness.freshness(Timeframe::Intraday, NOW + 46 * MIN).await.unwrap(),
        FreshnessState::Stale
    );

    let gappers = freshness.fetch_gappers(&latest.batch.batch_id).await.unwrap();
    assert_eq!(gappers.len(), 1);
    assert_eq!(gappers[0].instrument_id, "B");
    assert_eq!(gappers[0].kind, GapperKind::Gainer);
}

#[tokio::test]
async fn sqlx_end_to_end() {
    sqlx::any::install_default_drivers();
    let conn_str = format!("sqlite:file:{}?mode=memory&cache=shared", Uuid::new_v4());
    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&conn_str)
        .await
        .unwrap();
    schema::migrate(&pool).await.unwrap();

    let source = Arc::new(SqlxSnapshotSource::new(pool.clone()));
    let store = Arc::new(SqlxBatchStore::new(pool.clone()));

    let tech = Sector::from("technology");
    let energy = Sector::from("energy");
    source.upsert_instrument("AAPL", &tech, true).await.unwrap();
    source.upsert_instrument("XOM", &energy, true).await.unwrap();
    source.upsert_instrument("OLD", &energy, false).await.unwrap();

    for (id, before, after) in [("AAPL", 200.0, 204.0), ("XOM", 100.0, 95.0), ("OLD", 10.0, 20.0)] {
        source
            .record(SnapshotSeries::Intraday, &PriceSnapshot::new(id, before, 1_000, NOW - 30 * MIN))
            .await
            .unwrap();
        source
            .record(SnapshotSeries::Intraday, &PriceSnapshot::new(id, after, 1_000, NOW))
            .await
            .unwrap();
    }

    let cfg = PipelineConfig {
        aggregation: AggregationMode::Simple,
        ..cfg()
    };
    let p = SectorPipeline::new(source.clone(), source, store.clone(), cfg.clone(), PipelineCounters::default());

    let out = p.run_pipeline(Timeframe::Intraday, NOW).await.unwrap();
    assert_eq!(out.status, RunStatus::Success);
    assert_eq!(out.sector_count, Some(2));

    let freshness = FreshnessService::new(store, cfg.sectors, FreshnessConfig::default());
    let latest = freshness
        .get_latest_complete_batch(Timeframe::Intraday, NOW)
        .await
        .unwrap()
        .unwrap();

    let score = |s: &str| {
        latest
            .batch
            .records
            .iter()
            .find(|r| r.sector.as_str() == s)
            .map(|r| (r.simple_score, r.weighted_score, r.sample_size))
            .unwrap()
    };
    assert_eq!(score("technology"), (2.0, None, 1));
    // Inactive instruments are not part of the sector
    assert_eq!(score("energy"), (-5.0, None, 1));

    let summaries = freshness
        .get_recent_batch_summaries(Timeframe::Intraday, 5, NOW)
        .await
        .unwrap();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].is_complete);
    assert_eq!(summaries[0].total_sample_size, 2);

    let gappers = freshness.fetch_gappers(&latest.batch.batch_id).await.unwrap();
    assert_eq!(gappers.len(), 2);
}
