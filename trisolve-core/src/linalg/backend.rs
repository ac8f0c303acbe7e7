//! Host factorization interface.
//!
//! The solver consumes a permutation and a lower Cholesky factor through
//! [`HostFactorizer`]; [`CscCholeskyBackend`](super::cholesky::CscCholeskyBackend)
//! is the built-in implementation.

use super::factor::SparseTriangularFactor;
use super::ordering::Permutation;
use super::sparse::SparseCsc;
use crate::error::FormatError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FactorizationError {
    /// A column of the matrix carries no nonzero value
    #[error("matrix is singular (column {column})")]
    Singular { column: usize },

    /// A pivot was not strictly positive
    #[error("matrix is not positive definite")]
    NotPositiveDefinite { column: Option<usize> },

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Output of a host factorization: `P A P^T = L L^T`.
#[derive(Debug, Clone)]
pub struct HostFactorization {
    pub permutation: Permutation,
    pub lower: SparseTriangularFactor<f64>,
}

impl HostFactorization {
    pub fn n(&self) -> usize {
        self.lower.n()
    }
}

/// Sparse direct factorization run once on the host.
///
/// `matrix` is the full symmetric matrix (both triangles stored).
pub trait HostFactorizer {
    fn factorize(&self, matrix: &SparseCsc) -> Result<HostFactorization, FactorizationError>;
}
