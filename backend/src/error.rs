use thiserror::Error;

/// Run-fatal batch validation failures. Nothing is written when one is raised.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error(
        "incomplete batch: expected {expected} sectors, got {got} (missing: {missing:?}, unknown: {unknown:?}, duplicated: {duplicated:?})"
    )]
    IncompleteBatch {
        expected: usize,
        got: usize,
        missing: Vec<String>,
        unknown: Vec<String>,
        duplicated: Vec<String>,
    },

    #[error("invalid record for sector {sector}: {reason}")]
    InvalidRecord { sector: String, reason: String },
}

impl ValidationError {
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::IncompleteBatch { .. })
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("batch write failed: {0}")]
    PersistenceFailure(String),

    #[error("unknown timeframe: {0}")]
    UnknownTimeframe(String),
}
