use tracing::{Span, field};

use super::TraceId;

/// Root span for one pipeline run / maintenance job.
///
/// `batch_id` starts empty and is recorded once the validator mints it.
pub fn root_span(name: &'static str, trace_id: &TraceId, timeframe: &str) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id,
        timeframe = %timeframe,
        batch_id = field::Empty
    )
}

/// Child span (inherits trace_id from the enclosing root span).
pub fn child_span(name: &'static str, sector: &str) -> Span {
    tracing::info_span!("child", name = %name, sector = %sector)
}
