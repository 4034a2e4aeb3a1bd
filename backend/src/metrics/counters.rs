use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::sentiment::anchor::Exclusion;

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct PipelineCounters {
    // runs by outcome
    pub runs_success: Arc<AtomicU64>,
    pub runs_no_sectors: Arc<AtomicU64>,
    pub runs_persist_failed: Arc<AtomicU64>,

    pub instruments_included: Arc<AtomicU64>,

    // exclusion reasons
    pub excluded_filtered: Arc<AtomicU64>,
    pub excluded_missing_anchor: Arc<AtomicU64>,
    pub excluded_non_positive_price: Arc<AtomicU64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub runs_success: u64,
    pub runs_no_sectors: u64,
    pub runs_persist_failed: u64,
    pub instruments_included: u64,
    pub excluded_filtered: u64,
    pub excluded_missing_anchor: u64,
    pub excluded_non_positive_price: u64,
}

impl PipelineCounters {
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn exclusion(&self, reason: Exclusion) -> &AtomicU64 {
        match reason {
            Exclusion::MissingAnchor => &self.excluded_missing_anchor,
            Exclusion::NonPositivePrice => &self.excluded_non_positive_price,
        }
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountersSnapshot {
            runs_success: load(&self.runs_success),
            runs_no_sectors: load(&self.runs_no_sectors),
            runs_persist_failed: load(&self.runs_persist_failed),
            instruments_included: load(&self.instruments_included),
            excluded_filtered: load(&self.excluded_filtered),
            excluded_missing_anchor: load(&self.excluded_missing_anchor),
            excluded_non_positive_price: load(&self.excluded_non_positive_price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_counters() {
        let a = PipelineCounters::default();
        let b = a.clone();

        PipelineCounters::add(&b.runs_success, 1);
        PipelineCounters::add(a.exclusion(Exclusion::MissingAnchor), 3);

        let snap = a.snapshot();
        assert_eq!(snap.runs_success, 1);
        assert_eq!(snap.excluded_missing_anchor, 3);
        assert_eq!(snap.excluded_non_positive_price, 0);
    }
}
