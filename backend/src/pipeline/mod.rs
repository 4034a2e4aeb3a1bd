pub mod orchestrator;
pub mod types;

pub use orchestrator::SectorPipeline;
pub use types::{RunOutcome, RunStatus};
