//! Model SPD problems for benchmarking.
//!
//! Every generator returns the lower triangle in COO form, which is what
//! `CholeskySolver::new` consumes.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Lower triangle of a symmetric matrix in COO form.
#[derive(Debug, Clone)]
pub struct SpdProblem {
    pub name: String,
    pub n: usize,
    pub rows: Vec<i32>,
    pub cols: Vec<i32>,
    pub vals: Vec<f64>,
}

impl SpdProblem {
    fn new(name: String, n: usize) -> Self {
        Self {
            name,
            n,
            rows: Vec::new(),
            cols: Vec::new(),
            vals: Vec::new(),
        }
    }

    fn push(&mut self, row: usize, col: usize, val: f64) {
        self.rows.push(row as i32);
        self.cols.push(col as i32);
        self.vals.push(val);
    }

    pub fn nnz(&self) -> usize {
        self.vals.len()
    }
}

/// 1D Laplacian `tridiag(-1, 2, -1)`: a single chain of dependencies.
pub fn laplace_1d(n: usize) -> SpdProblem {
    let mut p = SpdProblem::new(format!("laplace1d (n={})", n), n);
    for i in 0..n {
        p.push(i, i, 2.0);
        if i > 0 {
            p.push(i, i - 1, -1.0);
        }
    }
    p
}

/// 5-point Laplacian on a `k x k` grid.
pub fn laplace_2d(k: usize) -> SpdProblem {
    let n = k * k;
    let mut p = SpdProblem::new(format!("laplace2d ({}x{}, n={})", k, k, n), n);
    for row in 0..k {
        for col in 0..k {
            let i = row * k + col;
            p.push(i, i, 4.0);
            if col > 0 {
                p.push(i, i - 1, -1.0);
            }
            if row > 0 {
                p.push(i, i - k, -1.0);
            }
        }
    }
    p
}

/// Random banded matrix made SPD by strict diagonal dominance.
pub fn random_banded(n: usize, bandwidth: usize, density: f64, seed: u64) -> SpdProblem {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut p = SpdProblem::new(
        format!("banded (n={}, bw={}, density={})", n, bandwidth, density),
        n,
    );

    let mut row_abs = vec![0.0f64; n];
    let mut off = Vec::new();
    for i in 0..n {
        for j in i.saturating_sub(bandwidth)..i {
            if rng.gen::<f64>() < density {
                let v: f64 = rng.gen_range(-1.0..1.0);
                row_abs[i] += v.abs();
                row_abs[j] += v.abs();
                off.push((i, j, v));
            }
        }
    }

    for (i, &s) in row_abs.iter().enumerate() {
        p.push(i, i, s + 1.0);
    }
    for (i, j, v) in off {
        p.push(i, j, v);
    }
    p
}
