//! Fill/bandwidth-reducing orderings.

use crate::error::FormatError;
use crate::linalg::sparse::SparseCsc;
use sprs::linalg::reverse_cuthill_mckee;
use std::str::FromStr;

/// Ordering applied to the matrix before factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingMethod {
    /// No reordering (identity permutation).
    Natural,
    /// Reverse Cuthill-McKee (bandwidth reduction, via sprs).
    #[default]
    ReverseCuthillMcKee,
}

impl FromStr for OrderingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "natural" | "none" => Ok(OrderingMethod::Natural),
            "rcm" | "reverse-cuthill-mckee" => Ok(OrderingMethod::ReverseCuthillMcKee),
            other => Err(format!("unknown ordering '{}'", other)),
        }
    }
}

/// Symmetric permutation between original and factorization order.
///
/// `perm[new] = old` and `inv[old] = new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    perm: Vec<i32>,
    inv: Vec<i32>,
}

impl Permutation {
    pub fn identity(n: usize) -> Self {
        let perm: Vec<i32> = (0..n as i32).collect();
        Self {
            inv: perm.clone(),
            perm,
        }
    }

    /// Build from `perm[new] = old`, checking it is a bijection on `[0, n)`.
    pub fn from_vec(perm: Vec<i32>) -> Result<Self, FormatError> {
        let n = perm.len();
        let mut inv = vec![-1i32; n];
        for (new, &old) in perm.iter().enumerate() {
            if old < 0 || old as usize >= n || inv[old as usize] >= 0 {
                return Err(FormatError::InvalidPermutation {
                    n,
                    position: new,
                    value: old as i64,
                });
            }
            inv[old as usize] = new as i32;
        }
        Ok(Self { perm, inv })
    }

    /// Compute an ordering of a structurally symmetric matrix.
    pub fn compute(a: &SparseCsc, method: OrderingMethod) -> Self {
        match method {
            _ if a.rows() == 0 => Self::identity(0),
            OrderingMethod::Natural => Self::identity(a.rows()),
            OrderingMethod::ReverseCuthillMcKee => {
                let ordering = reverse_cuthill_mckee(a.view());
                Self {
                    perm: ordering.perm.vec().into_iter().map(|i| i as i32).collect(),
                    inv: ordering.perm.inv_vec().into_iter().map(|i| i as i32).collect(),
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.perm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perm.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.perm.iter().enumerate().all(|(i, &p)| p as usize == i)
    }

    /// `perm[new] = old`.
    pub fn perm(&self) -> &[i32] {
        &self.perm
    }

    /// `inv[old] = new`.
    pub fn inv(&self) -> &[i32] {
        &self.inv
    }

    /// Symmetric permutation `P A P^T` in the new index space.
    pub fn apply_symmetric(&self, a: &SparseCsc) -> SparseCsc {
        let mut tri = sprs::TriMat::with_capacity(a.shape(), a.nnz());
        for (&val, (row, col)) in a.iter() {
            tri.add_triplet(self.inv[row] as usize, self.inv[col] as usize, val);
        }
        tri.to_csc()
    }
}
