//! Error types for solver construction and solves.

use crate::device::AcceleratorError;
use crate::linalg::backend::FactorizationError;
use crate::linalg::factor::Triangle;
use crate::linalg::sparse::MatrixType;
use thiserror::Error;

/// Malformed sparse input or triangular factor structure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// COO row and column index arrays differ in length
    #[error("Sparse {format} matrix: the two index arrays should have the same size ({rows} vs {cols})")]
    IndexLengthMismatch {
        format: MatrixType,
        rows: usize,
        cols: usize,
    },

    /// Index and value arrays differ in length
    #[error("Sparse {format} matrix: the index and data arrays should have the same size ({indices} vs {values})")]
    DataLengthMismatch {
        format: MatrixType,
        indices: usize,
        values: usize,
    },

    /// Offset array is not of length n + 1
    #[error("Sparse {format} matrix: invalid size for {axis} pointer array (expected {expected}, got {actual})")]
    OffsetLength {
        format: MatrixType,
        axis: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Offset array does not start at zero or decreases
    #[error("Sparse {format} matrix: pointer array must start at 0 and be non-decreasing (violated at position {position})")]
    OffsetNotMonotonic { format: MatrixType, position: usize },

    /// Last offset disagrees with the number of stored entries
    #[error("Sparse {format} matrix: last pointer {last} does not match the number of entries {nnz}")]
    OffsetNnzMismatch {
        format: MatrixType,
        last: i64,
        nnz: usize,
    },

    /// An index lies outside `[0, n)`
    #[error("Sparse {format} matrix: index {index} at position {position} is out of range for dimension {n}")]
    IndexOutOfRange {
        format: MatrixType,
        position: usize,
        index: i64,
        n: usize,
    },

    /// Dimension not representable with 32-bit indices
    #[error("Dimension {n} exceeds the 32-bit index range")]
    DimensionTooLarge { n: usize },

    /// Entry count not representable with 32-bit indices
    #[error("{nnz} stored entries exceed the 32-bit index range")]
    TooManyEntries { nnz: usize },

    /// Triangular factor: column outside the declared triangle
    #[error("Triangular factor row {row}: column {col} lies outside the {triangle} triangle")]
    WrongTriangle {
        triangle: Triangle,
        row: usize,
        col: usize,
    },

    /// Triangular factor: columns of a row not strictly increasing
    #[error("Triangular factor row {row}: column indices are not strictly increasing")]
    UnsortedRow { row: usize },

    /// Triangular factor: row without a diagonal entry
    #[error("Triangular factor row {row} has no diagonal entry")]
    MissingDiagonal { row: usize },

    /// Permutation is not a bijection on `[0, n)`
    #[error("Permutation of length {n} is not a bijection (entry {position} = {value})")]
    InvalidPermutation { n: usize, position: usize, value: i64 },
}

/// Dimension mismatch at solve entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{context}: expected shape [{}, {}], got [{}, {}]", .expected.0, .expected.1, .actual.0, .actual.1)]
pub struct ShapeError {
    pub context: &'static str,
    pub expected: (usize, usize),
    pub actual: (usize, usize),
}

/// Top-level error returned by [`CholeskySolver`](crate::CholeskySolver).
#[derive(Error, Debug)]
pub enum SolverError {
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Reported unmodified by the host factorization
    #[error("Matrix is singular (column {column})")]
    SingularMatrix { column: usize },

    /// Reported unmodified by the host factorization
    #[error("Matrix is not positive definite{}", .column.map(|c| format!(" (column {c})")).unwrap_or_default())]
    NotPositiveDefinite { column: Option<usize> },

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Accelerator(#[from] AcceleratorError),
}

impl From<FactorizationError> for SolverError {
    fn from(e: FactorizationError) -> Self {
        match e {
            FactorizationError::Singular { column } => SolverError::SingularMatrix { column },
            FactorizationError::NotPositiveDefinite { column } => {
                SolverError::NotPositiveDefinite { column }
            }
            FactorizationError::Format(f) => SolverError::Format(f),
        }
    }
}

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;
