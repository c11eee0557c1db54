use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriftcastError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Query dimension mismatch: dataset carries {expected} spatial coordinates but the query rows have {got} columns")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Unknown weighting scheme: {0}")]
    UnknownWeighting(String),
}
