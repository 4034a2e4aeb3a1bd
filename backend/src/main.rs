use std::sync::Arc;

use sector_sentiment::{
    batch::{
        repository_sqlx::SqlxBatchStore,
        sink::{BatchSink, DiscardSink, SinkMode},
    },
    config::AppConfig,
    db::Db,
    freshness::service::FreshnessService,
    metrics::PipelineCounters,
    pipeline::SectorPipeline,
    snapshot::sqlx_source::SqlxSnapshotSource,
    time::now_ms,
    timeframe::Timeframe,
};

/// Starts one fixed-cadence loop for `timeframe`. Each tick runs the pipeline
/// and then reports that timeframe's freshness.
fn start_pipeline_loop(
    pipeline: Arc<SectorPipeline>,
    freshness: Arc<FreshnessService>,
    timeframe: Timeframe,
    cfg: &AppConfig,
) {
    let interval = cfg.cadence.interval_for(timeframe);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            match pipeline.run_pipeline(timeframe, now_ms()).await {
                Ok(outcome) => {
                    let outcome = serde_json::to_string(&outcome).unwrap_or_default();
                    tracing::info!(timeframe = %timeframe, %outcome, "pipeline run finished");
                }
                // Retried on the next tick.
                Err(e) => tracing::error!(error = ?e, timeframe = %timeframe, "pipeline run failed"),
            }

            match freshness.freshness(timeframe, now_ms()).await {
                Ok(state) => tracing::info!(timeframe = %timeframe, state = ?state, "freshness"),
                Err(e) => tracing::warn!(error = ?e, timeframe = %timeframe, "freshness check failed"),
            }
        }
    });
}

fn start_retention_loop(freshness: Arc<FreshnessService>, pipeline: Arc<SectorPipeline>, cfg: &AppConfig) {
    let interval = cfg.cadence.retention_sweep;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            if let Err(e) = freshness.cleanup_old_batches(now_ms()).await {
                tracing::error!(error = ?e, "retention sweep failed");
            }

            let counters = pipeline.counters().snapshot();
            tracing::info!(counters = ?counters, "pipeline counters");
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    common::logger::init_logger("sector-sentiment", cfg.json_logs);

    tracing::info!(sink = %cfg.sink_mode, sectors = cfg.pipeline.sectors.len(), "Starting sector sentiment pipeline...");

    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let snapshots = Arc::new(SqlxSnapshotSource::new(db.pool.clone()));
    let store = Arc::new(SqlxBatchStore::new(db.pool.clone()));

    let sink: Arc<dyn BatchSink> = match cfg.sink_mode {
        SinkMode::Database => store.clone(),
        SinkMode::Discard => Arc::new(DiscardSink),
    };

    let pipeline = Arc::new(SectorPipeline::new(
        snapshots.clone(),
        snapshots,
        sink,
        cfg.pipeline.clone(),
        PipelineCounters::default(),
    ));

    let freshness = Arc::new(FreshnessService::new(
        store,
        cfg.pipeline.sectors.clone(),
        cfg.freshness.clone(),
    ));

    for timeframe in Timeframe::ALL {
        start_pipeline_loop(pipeline.clone(), freshness.clone(), timeframe, &cfg);
    }
    start_retention_loop(freshness, pipeline, &cfg);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    Ok(())
}
