//! Sector Pipeline
//!
//! One run per timeframe:
//!   filter query → anchor selection → aggregation → leader extraction
//!   → batch validation → one atomic batch write → gapper write
//!
//! Per-sector work fans out concurrently on the calling task. A run either
//! writes a complete batch or nothing at all.

use std::sync::Arc;

use common::logger::{TraceId, child_span, root_span};
use futures::future::try_join_all;
use tracing::{Instrument, Span, debug, info, warn};

use super::types::RunOutcome;
use crate::batch::sink::BatchSink;
use crate::batch::types::{GapperRecord, SectorBatch};
use crate::batch::validator::BatchValidator;
use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::metrics::PipelineCounters;
use crate::sector::Sector;
use crate::sentiment::aggregate::{SectorScore, aggregate};
use crate::sentiment::anchor::{AnchorSelector, Exclusion};
use crate::sentiment::gappers::{Leader, extract_leaders};
use crate::snapshot::filter::SnapshotFilterQuery;
use crate::snapshot::source::{InstrumentDirectory, SnapshotSource};
use crate::timeframe::Timeframe;

/// Scores and movers computed for one sector in one run.
#[derive(Clone, Debug)]
struct SectorResult {
    sector: Sector,
    score: SectorScore,
    leaders: Vec<Leader>,
}

pub struct SectorPipeline {
    filter_query: SnapshotFilterQuery,
    anchors: AnchorSelector,
    validator: BatchValidator,
    sink: Arc<dyn BatchSink>,
    cfg: PipelineConfig,
    counters: PipelineCounters,
}

impl SectorPipeline {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        directory: Arc<dyn InstrumentDirectory>,
        sink: Arc<dyn BatchSink>,
        cfg: PipelineConfig,
        counters: PipelineCounters,
    ) -> Self {
        Self {
            filter_query: SnapshotFilterQuery::new(directory, source.clone()),
            anchors: AnchorSelector::new(source),
            validator: BatchValidator::new(cfg.sectors.clone()),
            sink,
            cfg,
            counters,
        }
    }

    pub fn counters(&self) -> &PipelineCounters {
        &self.counters
    }

    /// Runs the full pipeline for `timeframe` as of `now_ms`.
    ///
    /// Validation and write failures come back as `persist_failed` outcomes;
    /// snapshot-source failures are returned as errors.
    pub async fn run_pipeline(&self, timeframe: Timeframe, now_ms: u64) -> anyhow::Result<RunOutcome> {
        let trace_id = TraceId::new();
        let span = root_span("sector_pipeline", &trace_id, timeframe.as_str());

        self.run(timeframe, now_ms).instrument(span).await
    }

    async fn run(&self, timeframe: Timeframe, now_ms: u64) -> anyhow::Result<RunOutcome> {
        let results = try_join_all(
            self.cfg
                .sectors
                .iter()
                .map(|sector| self.run_sector(sector, timeframe).instrument(child_span("sector", sector.as_str()))),
        )
        .await?;

        if results.iter().all(|r| r.score.sample_size == 0) {
            PipelineCounters::add(&self.counters.runs_no_sectors, 1);
            info!(target: "pipeline", "no sector has any included instrument; nothing written");
            return Ok(RunOutcome::no_sectors(timeframe));
        }

        let scores: Vec<(Sector, SectorScore)> = results
            .iter()
            .map(|r| (r.sector.clone(), r.score.clone()))
            .collect();

        let batch = match self.validator.build_batch(timeframe, &scores, now_ms) {
            Ok(batch) => batch,
            Err(e) => {
                PipelineCounters::add(&self.counters.runs_persist_failed, 1);
                warn!(target: "pipeline", error = %e, "batch rejected by validator");
                return Ok(RunOutcome::persist_failed(timeframe, e));
            }
        };

        Span::current().record("batch_id", batch.batch_id.as_str());

        if let Err(e) = self.sink.write_batch(&batch).await {
            let err = AppError::PersistenceFailure(format!("{e:#}"));
            PipelineCounters::add(&self.counters.runs_persist_failed, 1);
            warn!(target: "pipeline", error = %err, "batch write failed");
            return Ok(RunOutcome::persist_failed(timeframe, err));
        }

        let gappers = gapper_records(&batch, &results);
        if !gappers.is_empty() {
            if let Err(e) = self.sink.write_gappers(&gappers).await {
                // The batch itself is already committed and consistent.
                warn!(target: "pipeline", error = %format!("{e:#}"), "gapper write failed");
            }
        }

        PipelineCounters::add(&self.counters.runs_success, 1);
        info!(
            target: "pipeline",
            sectors = batch.records.len(),
            gappers = gappers.len(),
            "batch written"
        );

        Ok(RunOutcome::success(timeframe, batch.batch_id, batch.records.len()))
    }

    async fn run_sector(&self, sector: &Sector, timeframe: Timeframe) -> anyhow::Result<SectorResult> {
        let series = timeframe.series();
        let mode = self.cfg.anchors.mode_for(timeframe);

        let filtered = self
            .filter_query
            .latest_matching(sector, &self.cfg.filter, series, mode.history_depth())
            .await?;

        let outcome = self.anchors.select(series, mode, &filtered.histories).await?;

        PipelineCounters::add(&self.counters.excluded_filtered, filtered.filtered_out);
        PipelineCounters::add(
            self.counters.exclusion(Exclusion::MissingAnchor),
            outcome.excluded_count(Exclusion::MissingAnchor) + filtered.without_snapshots,
        );
        PipelineCounters::add(
            self.counters.exclusion(Exclusion::NonPositivePrice),
            outcome.excluded_count(Exclusion::NonPositivePrice),
        );
        PipelineCounters::add(&self.counters.instruments_included, outcome.returns.len());

        let score = aggregate(&outcome.returns, self.cfg.aggregation);
        let leaders = extract_leaders(&outcome.returns);

        debug!(
            included = score.sample_size,
            excluded = outcome.excluded.len(),
            simple = score.simple_score,
            weighted = ?score.weighted_score,
            "sector aggregated"
        );

        Ok(SectorResult {
            sector: sector.clone(),
            score,
            leaders,
        })
    }
}

fn gapper_records(batch: &SectorBatch, results: &[SectorResult]) -> Vec<GapperRecord> {
    results
        .iter()
        .flat_map(|r| {
            r.leaders.iter().map(move |l| GapperRecord {
                sector: r.sector.clone(),
                batch_id: batch.batch_id.clone(),
                timeframe: batch.timeframe,
                kind: l.kind,
                rank: l.rank,
                instrument_id: l.instrument_id.clone(),
                percent_change: l.percent_change,
                volume: l.volume,
                price: l.price,
            })
        })
        .collect()
}
