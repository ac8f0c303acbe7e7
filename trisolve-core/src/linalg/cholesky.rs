//! Sparse Cholesky factorization on the host.
//!
//! Wraps the left-looking `CscCholesky` of `nalgebra-sparse`. The matrix is
//! reordered first (see [`OrderingMethod`]) since the factorization itself
//! performs no fill reduction.

use super::backend::{FactorizationError, HostFactorization, HostFactorizer};
use super::factor::{SparseTriangularFactor, Triangle};
use super::ordering::{OrderingMethod, Permutation};
use super::sparse::SparseCsc;
use log::debug;
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::CscMatrix;
use std::time::Instant;

/// Default [`HostFactorizer`]: ordering followed by `CscCholesky`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CscCholeskyBackend {
    ordering: OrderingMethod,
}

impl CscCholeskyBackend {
    pub fn new(ordering: OrderingMethod) -> Self {
        Self { ordering }
    }

    pub fn ordering(&self) -> OrderingMethod {
        self.ordering
    }
}

impl HostFactorizer for CscCholeskyBackend {
    fn factorize(&self, matrix: &SparseCsc) -> Result<HostFactorization, FactorizationError> {
        let n = matrix.cols();
        check_columns(matrix)?;
        if n == 0 {
            return Ok(HostFactorization {
                permutation: Permutation::identity(0),
                lower: SparseTriangularFactor::try_new(0, Triangle::Lower, vec![0], vec![], vec![])?,
            });
        }

        let t0 = Instant::now();
        let permutation = Permutation::compute(matrix, self.ordering);
        let permuted = permutation.apply_symmetric(matrix);
        let t_order = t0.elapsed();

        let (indptr, indices, data) = permuted.into_raw_storage();
        let a = CscMatrix::try_from_csc_data(n, n, indptr, indices, data).map_err(|e| {
            debug!("CSC conversion rejected assembled matrix: {}", e);
            FactorizationError::NotPositiveDefinite { column: None }
        })?;

        let t1 = Instant::now();
        let chol = CscCholesky::factor(&a)
            .map_err(|_| FactorizationError::NotPositiveDefinite { column: None })?;
        let l = chol.take_l();
        let t_factor = t1.elapsed();

        debug!(
            "Cholesky: n={}, nnz(A)={}, nnz(L)={}, ordering={:?} ({:.3}ms), factor {:.3}ms",
            n,
            matrix.nnz(),
            l.nnz(),
            self.ordering,
            t_order.as_secs_f64() * 1e3,
            t_factor.as_secs_f64() * 1e3,
        );

        let lower = lower_csr_from_csc(n, l.col_offsets(), l.row_indices(), l.values())?;
        Ok(HostFactorization { permutation, lower })
    }
}

/// Reject columns the factorization cannot pivot on.
///
/// A column with no nonzero value makes the matrix singular. A stored
/// off-diagonal without a stored diagonal can never be positive definite.
fn check_columns(matrix: &SparseCsc) -> Result<(), FactorizationError> {
    for (column, col) in matrix.outer_iterator().enumerate() {
        if col.iter().all(|(_, &v)| v == 0.0) {
            return Err(FactorizationError::Singular { column });
        }
        if col.get(column).is_none() {
            return Err(FactorizationError::NotPositiveDefinite {
                column: Some(column),
            });
        }
    }
    Ok(())
}

/// Convert a CSC lower factor (rows sorted per column) to CSR.
///
/// The CSC arrays of `L` read as CSR are exactly `L^T`, so transposing that
/// gives row storage for `L`.
fn lower_csr_from_csc(
    n: usize,
    col_offsets: &[usize],
    row_indices: &[usize],
    values: &[f64],
) -> Result<SparseTriangularFactor<f64>, FactorizationError> {
    let upper = SparseTriangularFactor::try_new(
        n,
        Triangle::Upper,
        col_offsets.iter().map(|&p| p as i32).collect(),
        row_indices.iter().map(|&i| i as i32).collect(),
        values.to_vec(),
    )?;
    Ok(upper.transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse::from_triplets;

    fn tridiag(n: usize) -> SparseCsc {
        let mut t = vec![];
        for i in 0..n {
            t.push((i, i, 2.0));
            if i + 1 < n {
                t.push((i + 1, i, -1.0));
                t.push((i, i + 1, -1.0));
            }
        }
        from_triplets(n, n, t)
    }

    fn reconstruct(f: &HostFactorization) -> Vec<f64> {
        let n = f.n();
        let l = f.lower.to_dense();
        let mut a = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                a[i * n + j] = (0..n).map(|k| l[i * n + k] * l[j * n + k]).sum();
            }
        }
        a
    }

    #[test]
    fn test_factor_reconstructs_permuted_matrix() {
        let n = 6;
        let a = tridiag(n);
        for ordering in [OrderingMethod::Natural, OrderingMethod::ReverseCuthillMcKee] {
            let f = CscCholeskyBackend::new(ordering).factorize(&a).unwrap();
            assert_eq!(f.lower.triangle(), Triangle::Lower);
            let lt = reconstruct(&f);
            let perm = f.permutation.perm();
            for i in 0..n {
                for j in 0..n {
                    let orig = a
                        .get(perm[i] as usize, perm[j] as usize)
                        .copied()
                        .unwrap_or(0.0);
                    assert!((lt[i * n + j] - orig).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_zero_column_is_singular() {
        let a = from_triplets(3, 3, vec![(0, 0, 1.0), (2, 2, 1.0)]);
        let err = CscCholeskyBackend::default().factorize(&a).unwrap_err();
        assert_eq!(err, FactorizationError::Singular { column: 1 });
    }

    #[test]
    fn test_indefinite_matrix() {
        let a = from_triplets(2, 2, vec![(0, 0, 1.0), (1, 1, 1.0), (0, 1, 2.0), (1, 0, 2.0)]);
        let err = CscCholeskyBackend::new(OrderingMethod::Natural)
            .factorize(&a)
            .unwrap_err();
        assert_eq!(err, FactorizationError::NotPositiveDefinite { column: None });

        let a = from_triplets(2, 2, vec![(0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0)]);
        let err = CscCholeskyBackend::default().factorize(&a).unwrap_err();
        assert_eq!(
            err,
            FactorizationError::NotPositiveDefinite { column: Some(1) }
        );
    }
}
