//! 1D Poisson example demonstrating repeated solves.
//!
//! Solves `-u'' = f` on (0, 1) with zero boundary values, discretized with
//! central differences on `n` interior points:
//!
//!   A = tridiag(-1, 2, -1) / h^2
//!
//! for two right-hand sides at once (`f = 1` and `f = x`), then re-solves
//! with a scaled block to show the factor is reused.

use trisolve_core::{CholeskySolver, DeviceHandle, MatrixType, SolverSettings};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("trisolve - 1D Poisson Example");
    println!("=============================");

    let n = 99;
    let h = 1.0 / (n + 1) as f64;
    let inv_h2 = 1.0 / (h * h);

    // Lower triangle in COO form
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    let mut vals = Vec::new();
    for i in 0..n as i32 {
        rows.push(i);
        cols.push(i);
        vals.push(2.0 * inv_h2);
        if i > 0 {
            rows.push(i);
            cols.push(i - 1);
            vals.push(-inv_h2);
        }
    }

    let device = DeviceHandle::with_defaults()?;
    let mut solver = CholeskySolver::<f64>::new(
        device.clone(),
        n,
        &rows,
        &cols,
        &vals,
        MatrixType::Coo,
        SolverSettings::default(),
    )?;

    println!("n = {}, nnz(L) = {}", solver.n(), solver.nnz_factor());
    println!(
        "levels: lower = {}, upper = {}",
        solver.lower_schedule().num_levels(),
        solver.upper_schedule().num_levels()
    );

    // Columns: f = 1 and f = x, row-major [n, 2]
    let mut f = Vec::with_capacity(2 * n);
    for i in 0..n {
        let x = (i + 1) as f64 * h;
        f.push(1.0);
        f.push(x);
    }
    let b = device.upload_matrix(n, 2, &f)?;
    let u = solver.solve(&b)?.to_host();

    // Exact: u = x(1-x)/2 and u = x(1-x^2)/6
    let mut err = [0.0f64; 2];
    for i in 0..n {
        let x = (i + 1) as f64 * h;
        err[0] = err[0].max((u[2 * i] - x * (1.0 - x) / 2.0).abs());
        err[1] = err[1].max((u[2 * i + 1] - x * (1.0 - x * x) / 6.0).abs());
    }
    println!("max error: f = 1 -> {:.3e}, f = x -> {:.3e}", err[0], err[1]);

    let scaled: Vec<f64> = f.iter().map(|v| 2.0 * v).collect();
    let b2 = device.upload_matrix(n, 2, &scaled)?;
    let mut u2 = device.zeros_matrix::<f64>(n, 2)?;
    solver.solve_into(&b2, &mut u2)?;
    let u2 = u2.to_host();
    let drift = u2
        .iter()
        .zip(&u)
        .map(|(a, b)| (a - 2.0 * b).abs())
        .fold(0.0, f64::max);
    println!("second solve, scaled rhs: max |u2 - 2u| = {:.3e}", drift);

    let stats = solver.stats();
    println!(
        "{} solves, {:.3} ms total, analysis {:.3} ms",
        stats.num_solves,
        stats.time_solve * 1e3,
        stats.time_analysis * 1e3
    );
    Ok(())
}
