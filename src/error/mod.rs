use thiserror::Error;

/// Errors raised by the dense linear algebra routines (SVD, low-rank
/// reconstruction and matrix division).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Rank {rank} is out of range, expected 1..={max_rank}")]
    InvalidRank { rank: usize, max_rank: usize },
    #[error("Matrix of shape ({rows}, {cols}) is empty")]
    InvalidShape { rows: usize, cols: usize },
    #[error("Matrix has zero total sum of squares, lack of fit is undefined")]
    DegenerateInput,
    #[error("Numerical failure: {0}")]
    NumericalFailure(String),
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("Matrix is singular")]
    SingularMatrix,
    #[error("Invalid tolerance {0}, expected a finite non-negative value")]
    InvalidTolerance(f64),
}

pub type Result<T> = std::result::Result<T, LinalgError>;
