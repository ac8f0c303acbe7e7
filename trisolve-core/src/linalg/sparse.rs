//! Sparse input matrices.
//!
//! Callers hand the solver a symmetric matrix in one of three layouts
//! (compressed column, compressed row or coordinate) with 32-bit indices and
//! `f64` values. This module validates the raw arrays and assembles them into
//! a full symmetric CSC matrix (sprs) for the host factorization.

use crate::error::FormatError;
use sprs::{CsMat, TriMat};
use std::fmt;

/// Sparse matrix in CSC format (general, not necessarily symmetric).
pub type SparseCsc = CsMat<f64>;

/// Layout of the raw index arrays passed to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixType {
    /// `ii` = column pointers (n + 1), `jj` = row indices.
    Csc,
    /// `ii` = row pointers (n + 1), `jj` = column indices.
    Csr,
    /// `ii` = row indices, `jj` = column indices.
    Coo,
}

impl fmt::Display for MatrixType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixType::Csc => write!(f, "CSC"),
            MatrixType::Csr => write!(f, "CSR"),
            MatrixType::Coo => write!(f, "COO"),
        }
    }
}

/// Borrowed view of the raw arrays describing an input matrix.
#[derive(Debug, Clone, Copy)]
pub struct SparseInput<'a> {
    pub n: usize,
    pub ii: &'a [i32],
    pub jj: &'a [i32],
    pub x: &'a [f64],
    pub kind: MatrixType,
}

impl<'a> SparseInput<'a> {
    pub fn new(n: usize, ii: &'a [i32], jj: &'a [i32], x: &'a [f64], kind: MatrixType) -> Self {
        Self { n, ii, jj, x, kind }
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.x.len()
    }

    /// Check every shape invariant of the layout.
    ///
    /// After this returns `Ok`, [`entries`](Self::entries) never indexes out
    /// of bounds.
    pub fn validate(&self) -> Result<(), FormatError> {
        let format = self.kind;

        match format {
            MatrixType::Coo => {
                if self.ii.len() != self.jj.len() {
                    return Err(FormatError::IndexLengthMismatch {
                        format,
                        rows: self.ii.len(),
                        cols: self.jj.len(),
                    });
                }
                if self.ii.len() != self.x.len() {
                    return Err(FormatError::DataLengthMismatch {
                        format,
                        indices: self.ii.len(),
                        values: self.x.len(),
                    });
                }
            }
            MatrixType::Csr | MatrixType::Csc => {
                if self.jj.len() != self.x.len() {
                    return Err(FormatError::DataLengthMismatch {
                        format,
                        indices: self.jj.len(),
                        values: self.x.len(),
                    });
                }
                let expected = self
                    .n
                    .checked_add(1)
                    .ok_or(FormatError::DimensionTooLarge { n: self.n })?;
                if self.ii.len() != expected {
                    let axis = if format == MatrixType::Csr { "row" } else { "column" };
                    return Err(FormatError::OffsetLength {
                        format,
                        axis,
                        expected,
                        actual: self.ii.len(),
                    });
                }
            }
        }

        // Offsets hold n + 1 values and the factor stores up to nnz(L) >= n
        // entries, all addressed with i32.
        if self.n >= i32::MAX as usize {
            return Err(FormatError::DimensionTooLarge { n: self.n });
        }
        if self.nnz() > i32::MAX as usize {
            return Err(FormatError::TooManyEntries { nnz: self.nnz() });
        }

        match format {
            MatrixType::Coo => {
                check_indices(format, self.ii, self.n)?;
                check_indices(format, self.jj, self.n)?;
            }
            MatrixType::Csr | MatrixType::Csc => {
                check_offsets(format, self.ii, self.nnz())?;
                check_indices(format, self.jj, self.n)?;
            }
        }

        Ok(())
    }

    /// Iterate over stored entries as `(row, col, value)`.
    ///
    /// Must only be called on validated input.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f64)> + 'a {
        let Self { n, ii, jj, x, kind } = *self;
        let outer = match kind {
            MatrixType::Coo => 0,
            _ => n,
        };
        let compressed = (0..outer).flat_map(move |major| {
            let start = ii[major] as usize;
            let end = ii[major + 1] as usize;
            (start..end).map(move |p| {
                let minor = jj[p] as usize;
                match kind {
                    MatrixType::Csr => (major, minor, x[p]),
                    _ => (minor, major, x[p]),
                }
            })
        });
        let coordinate = (0..if kind == MatrixType::Coo { x.len() } else { 0 })
            .map(move |p| (ii[p] as usize, jj[p] as usize, x[p]));
        compressed.chain(coordinate)
    }

    /// Assemble the full symmetric matrix from the lower triangle.
    ///
    /// Entries with `row >= col` are authoritative and mirrored; strictly upper
    /// entries are ignored. Duplicates are summed.
    pub fn to_symmetric_csc(&self) -> SparseCsc {
        let mut tri = TriMat::with_capacity((self.n, self.n), 2 * self.nnz());
        for (row, col, val) in self.entries() {
            if row < col {
                continue;
            }
            tri.add_triplet(row, col, val);
            if row != col {
                tri.add_triplet(col, row, val);
            }
        }
        tri.to_csc()
    }
}

pub(crate) fn check_offsets(format: MatrixType, offsets: &[i32], nnz: usize) -> Result<(), FormatError> {
    let mut prev = 0i32;
    for (position, &value) in offsets.iter().enumerate() {
        let start_ok = position > 0 || value == 0;
        if !start_ok || value < prev {
            return Err(FormatError::OffsetNotMonotonic { format, position });
        }
        prev = value;
    }
    let last = offsets.last().copied().unwrap_or(0);
    if last as usize != nnz {
        return Err(FormatError::OffsetNnzMismatch {
            format,
            last: last as i64,
            nnz,
        });
    }
    Ok(())
}

pub(crate) fn check_indices(format: MatrixType, indices: &[i32], n: usize) -> Result<(), FormatError> {
    match indices
        .iter()
        .position(|&idx| idx < 0 || idx as usize >= n)
    {
        Some(position) => Err(FormatError::IndexOutOfRange {
            format,
            position,
            index: indices[position] as i64,
            n,
        }),
        None => Ok(()),
    }
}

/// Build a sparse CSC matrix from triplets (row, col, value).
///
/// # Arguments
///
/// * `nrows` - Number of rows
/// * `ncols` - Number of columns
/// * `triplets` - Iterator of (row, col, value) tuples
pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> SparseCsc
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new((nrows, ncols));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csc()
}

/// Sparse matrix times dense multi-column block: `Y = A * X`.
///
/// `x` and `y` are row-major with `ncols` columns.
pub fn spmm(a: &SparseCsc, x: &[f64], y: &mut [f64], ncols: usize) {
    assert_eq!(a.cols() * ncols, x.len());
    assert_eq!(a.rows() * ncols, y.len());

    y.fill(0.0);
    for (val, (row, col)) in a.iter() {
        for k in 0..ncols {
            y[row * ncols + k] += val * x[col * ncols + k];
        }
    }
}
