//! Level scheduling for sparse triangular solves.
//!
//! Rows of a triangular factor are grouped into levels such that every row
//! depends only on rows in strictly earlier levels. All rows of one level can
//! then be substituted in parallel, with a barrier between consecutive levels.

use crate::linalg::factor::{SparseTriangularFactor, Triangle};
use log::debug;

/// Partition of the rows of a triangular factor into ordered levels.
///
/// Rows at level `l` are `level_rows[level_ptr[l]..level_ptr[l + 1]]`, in
/// ascending row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSchedule {
    triangle: Triangle,
    level_ptr: Vec<usize>,
    level_rows: Vec<usize>,
    row_level: Vec<usize>,
}

impl LevelSchedule {
    /// Compute the minimal level of every row of `factor`.
    ///
    /// `level(i) = 1 + max(level(j))` over the off-diagonal dependencies `j`
    /// of row `i`, or 0 when there are none. Rows are visited once in
    /// substitution order (ascending for lower, descending for upper), so
    /// every dependency already has its level. O(nnz).
    pub fn analyze<T>(factor: &SparseTriangularFactor<T>) -> Self {
        let n = factor.n();
        let triangle = factor.triangle();
        let row_ptr = factor.row_ptr();
        let col_idx = factor.col_idx();

        let mut row_level = vec![0usize; n];
        let mut visit = |i: usize| {
            let mut level = 0usize;
            for &c in &col_idx[row_ptr[i] as usize..row_ptr[i + 1] as usize] {
                let j = c as usize;
                if j != i {
                    level = level.max(row_level[j] + 1);
                }
            }
            row_level[i] = level;
        };
        match triangle {
            Triangle::Lower => (0..n).for_each(&mut visit),
            Triangle::Upper => (0..n).rev().for_each(&mut visit),
        }

        let num_levels = row_level.iter().max().map_or(0, |&m| m + 1);

        // Counting sort of rows by level; ascending row order within a level.
        let mut level_ptr = vec![0usize; num_levels + 1];
        for &level in &row_level {
            level_ptr[level + 1] += 1;
        }
        for l in 0..num_levels {
            level_ptr[l + 1] += level_ptr[l];
        }

        let mut next = level_ptr.clone();
        let mut level_rows = vec![0usize; n];
        for (row, &level) in row_level.iter().enumerate() {
            level_rows[next[level]] = row;
            next[level] += 1;
        }

        let schedule = Self {
            triangle,
            level_ptr,
            level_rows,
            row_level,
        };
        debug!(
            "{} schedule: n={}, levels={}, max width={}, avg width={:.2}",
            triangle,
            n,
            schedule.num_levels(),
            schedule.max_width(),
            schedule.avg_width()
        );
        schedule
    }

    pub fn triangle(&self) -> Triangle {
        self.triangle
    }

    /// Number of rows scheduled.
    pub fn n(&self) -> usize {
        self.row_level.len()
    }

    pub fn num_levels(&self) -> usize {
        self.level_ptr.len() - 1
    }

    /// Rows of level `l`.
    pub fn level(&self, l: usize) -> &[usize] {
        &self.level_rows[self.level_ptr[l]..self.level_ptr[l + 1]]
    }

    /// Iterate over levels in execution order.
    pub fn levels(&self) -> impl Iterator<Item = &[usize]> + '_ {
        (0..self.num_levels()).map(move |l| self.level(l))
    }

    pub fn level_ptr(&self) -> &[usize] {
        &self.level_ptr
    }

    pub fn level_rows(&self) -> &[usize] {
        &self.level_rows
    }

    /// Level assigned to each row.
    pub fn row_level(&self) -> &[usize] {
        &self.row_level
    }

    /// Size of the widest level.
    pub fn max_width(&self) -> usize {
        self.levels().map(<[usize]>::len).max().unwrap_or(0)
    }

    /// Mean number of rows per level.
    pub fn avg_width(&self) -> f64 {
        if self.num_levels() == 0 {
            0.0
        } else {
            self.n() as f64 / self.num_levels() as f64
        }
    }
}
