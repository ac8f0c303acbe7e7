//! Sparse triangular factors in CSR layout.

use crate::error::FormatError;
use crate::linalg::sparse::{check_indices, check_offsets, MatrixType};
use crate::scalar::Scalar;
use std::fmt;

/// Which triangle a factor occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Triangle {
    /// Column indices `<=` row index; solved by forward substitution.
    Lower,
    /// Column indices `>=` row index; solved by backward substitution.
    Upper,
}

impl Triangle {
    /// The other triangle.
    pub fn flipped(self) -> Self {
        match self {
            Triangle::Lower => Triangle::Upper,
            Triangle::Upper => Triangle::Lower,
        }
    }
}

impl fmt::Display for Triangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Triangle::Lower => write!(f, "lower"),
            Triangle::Upper => write!(f, "upper"),
        }
    }
}

/// Immutable triangular factor stored by rows.
///
/// Every row has a diagonal entry and its column indices are strictly
/// increasing and lie within the declared triangle. These are checked once in
/// [`try_new`](Self::try_new); the solve kernels rely on them.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseTriangularFactor<T> {
    n: usize,
    triangle: Triangle,
    row_ptr: Vec<i32>,
    col_idx: Vec<i32>,
    values: Vec<T>,
}

impl<T: Scalar> SparseTriangularFactor<T> {
    /// Build a factor from raw CSR arrays, validating its structure.
    pub fn try_new(
        n: usize,
        triangle: Triangle,
        row_ptr: Vec<i32>,
        col_idx: Vec<i32>,
        values: Vec<T>,
    ) -> Result<Self, FormatError> {
        let nnz = values.len();
        if n >= i32::MAX as usize {
            return Err(FormatError::DimensionTooLarge { n });
        }
        if nnz > i32::MAX as usize {
            return Err(FormatError::TooManyEntries { nnz });
        }
        if col_idx.len() != nnz {
            return Err(FormatError::DataLengthMismatch {
                format: MatrixType::Csr,
                indices: col_idx.len(),
                values: nnz,
            });
        }
        if row_ptr.len() != n + 1 {
            return Err(FormatError::OffsetLength {
                format: MatrixType::Csr,
                axis: "row",
                expected: n + 1,
                actual: row_ptr.len(),
            });
        }
        check_offsets(MatrixType::Csr, &row_ptr, nnz)?;
        check_indices(MatrixType::Csr, &col_idx, n)?;

        for row in 0..n {
            let cols = &col_idx[row_ptr[row] as usize..row_ptr[row + 1] as usize];
            let mut has_diag = false;
            let mut prev: Option<i32> = None;
            for &c in cols {
                let col = c as usize;
                if prev.is_some_and(|p| p >= c) {
                    return Err(FormatError::UnsortedRow { row });
                }
                prev = Some(c);
                let outside = match triangle {
                    Triangle::Lower => col > row,
                    Triangle::Upper => col < row,
                };
                if outside {
                    return Err(FormatError::WrongTriangle { triangle, row, col });
                }
                has_diag |= col == row;
            }
            if !has_diag {
                return Err(FormatError::MissingDiagonal { row });
            }
        }

        Ok(Self {
            n,
            triangle,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// Transpose into the opposite triangle (lower `L` becomes upper `L^T`).
    ///
    /// Columns of the result stay strictly increasing because rows are visited
    /// in ascending order.
    pub fn transpose(&self) -> Self {
        let n = self.n;
        let nnz = self.nnz();

        let mut counts = vec![0i32; n + 1];
        for &c in &self.col_idx {
            counts[c as usize + 1] += 1;
        }
        for i in 0..n {
            counts[i + 1] += counts[i];
        }
        let row_ptr = counts;

        let mut next: Vec<i32> = row_ptr[..n].to_vec();
        let mut col_idx = vec![0i32; nnz];
        let mut values = vec![T::zero(); nnz];
        for row in 0..n {
            let (cols, vals) = self.row(row);
            for (&c, &v) in cols.iter().zip(vals) {
                let dst = next[c as usize] as usize;
                col_idx[dst] = row as i32;
                values[dst] = v;
                next[c as usize] += 1;
            }
        }

        Self {
            n,
            triangle: self.triangle.flipped(),
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Convert values to another precision, keeping the structure.
    pub fn cast<U: Scalar>(&self) -> SparseTriangularFactor<U> {
        SparseTriangularFactor {
            n: self.n,
            triangle: self.triangle,
            row_ptr: self.row_ptr.clone(),
            col_idx: self.col_idx.clone(),
            values: self.values.iter().map(|v| U::narrow(v.widen())).collect(),
        }
    }

    /// Column indices and values of one row.
    #[inline]
    pub fn row(&self, row: usize) -> (&[i32], &[T]) {
        let range = self.row_ptr[row] as usize..self.row_ptr[row + 1] as usize;
        (&self.col_idx[range.clone()], &self.values[range])
    }

    /// Diagonal value of one row.
    pub fn diagonal(&self, row: usize) -> T {
        let (cols, vals) = self.row(row);
        let pos = match self.triangle {
            Triangle::Lower => cols.len() - 1,
            Triangle::Upper => 0,
        };
        vals[pos]
    }

    /// Dense row-major copy, for tests and debugging of small factors.
    pub fn to_dense(&self) -> Vec<T> {
        let mut dense = vec![T::zero(); self.n * self.n];
        for row in 0..self.n {
            let (cols, vals) = self.row(row);
            for (&c, &v) in cols.iter().zip(vals) {
                dense[row * self.n + c as usize] = v;
            }
        }
        dense
    }
}

impl<T> SparseTriangularFactor<T> {
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn triangle(&self) -> Triangle {
        self.triangle
    }

    pub fn row_ptr(&self) -> &[i32] {
        &self.row_ptr
    }

    pub fn col_idx(&self) -> &[i32] {
        &self.col_idx
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}
