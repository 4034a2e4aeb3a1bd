use std::str::FromStr;
use std::time::Duration;

use crate::batch::sink::SinkMode;
use crate::error::AppError;
use crate::sector::{Sector, SectorUniverse};
use crate::sentiment::aggregate::AggregationMode;
use crate::sentiment::anchor::AnchorMode;
use crate::snapshot::filter::SnapshotFilter;
use crate::time::minutes_to_ms;
use crate::timeframe::Timeframe;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    /// JSON log output (set when `APP_ENV=production`).
    pub json_logs: bool,

    /// Where validated batches go: the database, or nowhere (dry run).
    pub sink_mode: SinkMode,

    pub pipeline: PipelineConfig,
    pub freshness: FreshnessConfig,
    pub cadence: CadenceConfig,
}

// =========================
// Pipeline configuration
// =========================
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Canonical sector set; every batch covers exactly these sectors.
    pub sectors: SectorUniverse,

    /// Thresholds applied to each instrument's latest snapshot before anchoring.
    pub filter: SnapshotFilter,

    /// Whether runs also produce the volume-weighted score.
    pub aggregation: AggregationMode,

    pub anchors: AnchorConfig,
}

/// Anchor-selection parameters per timeframe.
#[derive(Clone, Debug)]
pub struct AnchorConfig {
    /// Minimum distance between an instrument's latest snapshot and its anchor
    /// for the 30-minute timeframe.
    ///
    /// Shorter than the nominal horizon: intraday ingestion is irregular, so a
    /// strict 30 minutes would drop most instruments on every run.
    pub intraday_min_lookback_min: u64,

    /// Minimum lookback for the daily timeframe. Must reach back past the
    /// overnight gap to the prior session.
    pub daily_min_lookback_min: u64,

    /// 1-based recency rank of the anchor in the daily series (latest is 1).
    pub multi_day_rank: usize,
    pub weekly_rank: usize,
}

impl AnchorConfig {
    pub fn mode_for(&self, timeframe: Timeframe) -> AnchorMode {
        match timeframe {
            Timeframe::Intraday => AnchorMode::TimeWindow {
                min_lookback_ms: minutes_to_ms(self.intraday_min_lookback_min),
            },
            Timeframe::Daily => AnchorMode::TimeWindow {
                min_lookback_ms: minutes_to_ms(self.daily_min_lookback_min),
            },
            Timeframe::MultiDay => AnchorMode::Rank {
                rank: self.multi_day_rank,
            },
            Timeframe::Weekly => AnchorMode::Rank {
                rank: self.weekly_rank,
            },
        }
    }
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            intraday_min_lookback_min: 25,
            daily_min_lookback_min: 20 * 60,
            multi_day_rank: 3,
            weekly_rank: 5,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sectors: SectorUniverse::default(),
            filter: SnapshotFilter::default(),
            aggregation: AggregationMode::VolumeWeighted,
            anchors: AnchorConfig::default(),
        }
    }
}

// =========================
// Freshness configuration
// =========================
#[derive(Clone, Debug)]
pub struct FreshnessConfig {
    /// Maximum batch age (minutes) before a timeframe is reported stale.
    pub intraday_threshold_min: u64,
    pub daily_threshold_min: u64,
    pub multi_day_threshold_min: u64,
    pub weekly_threshold_min: u64,

    /// Allowed spread between record timestamps inside one batch.
    pub timestamp_tolerance_min: u64,

    /// Fraction of the threshold after which a fresh batch is "approaching".
    pub approaching_ratio: f64,

    /// Batches whose newest record is older than this are deleted by the sweep.
    pub retention_days: u64,
}

impl FreshnessConfig {
    pub fn threshold_min(&self, timeframe: Timeframe) -> u64 {
        match timeframe {
            Timeframe::Intraday => self.intraday_threshold_min,
            Timeframe::Daily => self.daily_threshold_min,
            Timeframe::MultiDay => self.multi_day_threshold_min,
            Timeframe::Weekly => self.weekly_threshold_min,
        }
    }

    pub fn threshold_ms(&self, timeframe: Timeframe) -> u64 {
        minutes_to_ms(self.threshold_min(timeframe))
    }
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            intraday_threshold_min: 45,
            daily_threshold_min: 26 * 60,
            multi_day_threshold_min: 26 * 60,
            weekly_threshold_min: 26 * 60,
            timestamp_tolerance_min: 5,
            approaching_ratio: 0.8,
            retention_days: 7,
        }
    }
}

// =========================
// Scheduling cadence
// =========================
#[derive(Clone, Debug)]
pub struct CadenceConfig {
    pub intraday: Duration,
    pub daily: Duration,
    pub multi_day: Duration,
    pub weekly: Duration,
    pub retention_sweep: Duration,
}

impl CadenceConfig {
    pub fn interval_for(&self, timeframe: Timeframe) -> Duration {
        match timeframe {
            Timeframe::Intraday => self.intraday,
            Timeframe::Daily => self.daily,
            Timeframe::MultiDay => self.multi_day,
            Timeframe::Weekly => self.weekly,
        }
    }
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            intraday: Duration::from_secs(15 * 60),
            daily: Duration::from_secs(60 * 60),
            multi_day: Duration::from_secs(4 * 60 * 60),
            weekly: Duration::from_secs(4 * 60 * 60),
            retention_sweep: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://sector_sentiment_dev.db?mode=rwc".to_string());
        let json_logs = lookup("APP_ENV").as_deref() == Some("production");

        let sink_mode = parse_or(&lookup, "SINK_MODE", SinkMode::Database)?;

        let pipeline_defaults = PipelineConfig::default();
        let sectors = match lookup("SECTORS") {
            Some(raw) => SectorUniverse::new(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Sector::from),
            ),
            None => pipeline_defaults.sectors,
        };
        if sectors.is_empty() {
            return Err(AppError::Config("SECTORS must name at least one sector".into()));
        }

        let filter_defaults = SnapshotFilter::default();
        let filter = SnapshotFilter {
            min_gap_pct: parse_or(&lookup, "FILTER_MIN_GAP_PCT", filter_defaults.min_gap_pct)?,
            min_volume: parse_or(&lookup, "FILTER_MIN_VOLUME", filter_defaults.min_volume)?,
            min_price: parse_or(&lookup, "FILTER_MIN_PRICE", filter_defaults.min_price)?,
            max_price: match lookup("FILTER_MAX_PRICE") {
                Some(raw) => Some(parse_value("FILTER_MAX_PRICE", &raw)?),
                None => filter_defaults.max_price,
            },
        };

        let anchor_defaults = AnchorConfig::default();
        let anchors = AnchorConfig {
            intraday_min_lookback_min: parse_or(
                &lookup,
                "INTRADAY_MIN_LOOKBACK_MIN",
                anchor_defaults.intraday_min_lookback_min,
            )?,
            daily_min_lookback_min: parse_or(
                &lookup,
                "DAILY_MIN_LOOKBACK_MIN",
                anchor_defaults.daily_min_lookback_min,
            )?,
            multi_day_rank: parse_or(&lookup, "MULTI_DAY_RANK", anchor_defaults.multi_day_rank)?,
            weekly_rank: parse_or(&lookup, "WEEKLY_RANK", anchor_defaults.weekly_rank)?,
        };
        if anchors.intraday_min_lookback_min == 0 || anchors.daily_min_lookback_min == 0 {
            return Err(AppError::Config("anchor lookbacks must be positive".into()));
        }
        if anchors.multi_day_rank < 2 || anchors.weekly_rank < 2 {
            return Err(AppError::Config(
                "anchor ranks must be at least 2 (rank 1 is the latest snapshot)".into(),
            ));
        }

        let pipeline = PipelineConfig {
            sectors,
            filter,
            aggregation: parse_or(&lookup, "AGGREGATION_MODE", pipeline_defaults.aggregation)?,
            anchors,
        };

        let fd = FreshnessConfig::default();
        let freshness = FreshnessConfig {
            intraday_threshold_min: parse_or(
                &lookup,
                "FRESHNESS_INTRADAY_MIN",
                fd.intraday_threshold_min,
            )?,
            daily_threshold_min: parse_or(&lookup, "FRESHNESS_DAILY_MIN", fd.daily_threshold_min)?,
            multi_day_threshold_min: parse_or(
                &lookup,
                "FRESHNESS_MULTI_DAY_MIN",
                fd.multi_day_threshold_min,
            )?,
            weekly_threshold_min: parse_or(
                &lookup,
                "FRESHNESS_WEEKLY_MIN",
                fd.weekly_threshold_min,
            )?,
            timestamp_tolerance_min: parse_or(
                &lookup,
                "FRESHNESS_TIMESTAMP_TOLERANCE_MIN",
                fd.timestamp_tolerance_min,
            )?,
            approaching_ratio: parse_or(
                &lookup,
                "FRESHNESS_APPROACHING_RATIO",
                fd.approaching_ratio,
            )?,
            retention_days: parse_or(&lookup, "RETENTION_DAYS", fd.retention_days)?,
        };

        if !(freshness.approaching_ratio > 0.0 && freshness.approaching_ratio <= 1.0) {
            return Err(AppError::Config(
                "FRESHNESS_APPROACHING_RATIO must be in (0, 1]".into(),
            ));
        }

        let cd = CadenceConfig::default();
        let cadence = CadenceConfig {
            intraday: secs_or(&lookup, "CADENCE_INTRADAY_SECS", cd.intraday)?,
            daily: secs_or(&lookup, "CADENCE_DAILY_SECS", cd.daily)?,
            multi_day: secs_or(&lookup, "CADENCE_MULTI_DAY_SECS", cd.multi_day)?,
            weekly: secs_or(&lookup, "CADENCE_WEEKLY_SECS", cd.weekly)?,
            retention_sweep: secs_or(&lookup, "RETENTION_SWEEP_SECS", cd.retention_sweep)?,
        };

        Ok(Self {
            database_url,
            json_logs,
            sink_mode,
            pipeline,
            freshness,
            cadence,
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}")))
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(lookup, key, default.as_secs())?;
    if secs == 0 {
        return Err(AppError::Config(format!("{key} must be positive")));
    }
    Ok(Duration::from_secs(secs))
}
