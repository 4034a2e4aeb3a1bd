pub mod batch;
pub mod config;
pub mod db;
pub mod freshness;
pub mod metrics;
pub mod pipeline;
pub mod sector;
pub mod sentiment;
pub mod snapshot;
pub mod timeframe;

pub mod error;
pub mod time;
