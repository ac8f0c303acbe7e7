//! Benchmarking CLI for trisolve.

mod problems;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use problems::SpdProblem;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Instant;
use trisolve_core::linalg::sparse::{spmm, SparseInput};
use trisolve_core::{
    CholeskySolver, DeviceConfig, DeviceHandle, LaunchMode, MatrixType, OrderingMethod, Scalar,
    SolverSettings,
};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ProblemKind {
    Laplace1d,
    Laplace2d,
    Banded,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Precision {
    F32,
    F64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Launch {
    Persistent,
    PerLevel,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Ordering {
    Natural,
    Rcm,
}

#[derive(Parser, Debug)]
#[command(name = "trisolve-bench", about = "Time analysis and repeated solves on model SPD problems")]
struct Args {
    /// Model problem to build
    #[arg(long, value_enum, default_value_t = ProblemKind::Laplace2d)]
    problem: ProblemKind,

    /// Matrix dimension (grid side for laplace2d)
    #[arg(long, default_value_t = 128)]
    size: usize,

    /// Half-bandwidth of the banded problem
    #[arg(long, default_value_t = 8)]
    bandwidth: usize,

    /// Probability of each in-band entry of the banded problem
    #[arg(long, default_value_t = 0.3)]
    density: f64,

    /// Right-hand-side columns per solve
    #[arg(long, default_value_t = 8)]
    nrhs: usize,

    /// Timed solves
    #[arg(long, default_value_t = 20)]
    repeats: usize,

    #[arg(long, value_enum, default_value_t = Precision::F64)]
    precision: Precision,

    #[arg(long, value_enum, default_value_t = Launch::Persistent)]
    launch: Launch,

    #[arg(long, value_enum, default_value_t = Ordering::Rcm)]
    ordering: Ordering,

    /// Device workers (0 = all cores)
    #[arg(long, default_value_t = 0)]
    workers: usize,

    #[arg(long, default_value_t = 12345)]
    seed: u64,

    #[arg(short, long)]
    verbose: bool,
}

fn build_problem(args: &Args) -> SpdProblem {
    match args.problem {
        ProblemKind::Laplace1d => problems::laplace_1d(args.size),
        ProblemKind::Laplace2d => problems::laplace_2d(args.size),
        ProblemKind::Banded => {
            problems::random_banded(args.size, args.bandwidth, args.density, args.seed)
        }
    }
}

fn run<T: Scalar>(args: &Args, problem: &SpdProblem) -> Result<()> {
    let device = DeviceHandle::new(DeviceConfig {
        workers: args.workers,
        launch_mode: match args.launch {
            Launch::Persistent => LaunchMode::Persistent,
            Launch::PerLevel => LaunchMode::PerLevel,
        },
        memory_limit: None,
        verbose: args.verbose,
    })
    .context("creating device")?;

    let settings = SolverSettings {
        ordering: match args.ordering {
            Ordering::Natural => OrderingMethod::Natural,
            Ordering::Rcm => OrderingMethod::ReverseCuthillMcKee,
        },
        verbose: args.verbose,
    };

    let t0 = Instant::now();
    let mut solver = CholeskySolver::<T>::new(
        device.clone(),
        problem.n,
        &problem.rows,
        &problem.cols,
        &problem.vals,
        MatrixType::Coo,
        settings,
    )
    .context("analysis failed")?;
    let t_analysis = t0.elapsed();

    let lower = solver.lower_schedule();
    let upper = solver.upper_schedule();
    println!("Problem:   {}", problem.name);
    println!("           nnz(A lower)={}, nnz(L)={}", problem.nnz(), solver.nnz_factor());
    println!(
        "Device:    {} workers, {:?}, precision {}",
        device.workers(),
        device.launch_mode(),
        T::NAME
    );
    println!(
        "Schedule:  lower {} levels (max {}, avg {:.1}), upper {} levels (max {}, avg {:.1})",
        lower.num_levels(),
        lower.max_width(),
        lower.avg_width(),
        upper.num_levels(),
        upper.max_width(),
        upper.avg_width()
    );
    println!("Analysis:  {:.3} ms", t_analysis.as_secs_f64() * 1e3);

    let n = problem.n;
    let n_rhs = args.nrhs;
    let input = SparseInput::new(n, &problem.rows, &problem.cols, &problem.vals, MatrixType::Coo);
    input.validate()?;
    let a = input.to_symmetric_csc();

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let x_true: Vec<f64> = (0..n * n_rhs).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let mut b_wide = vec![0.0; n * n_rhs];
    spmm(&a, &x_true, &mut b_wide, n_rhs);
    let b_host: Vec<T> = b_wide.iter().copied().map(T::narrow).collect();

    let b = device.upload_matrix(n, n_rhs, &b_host)?;
    let mut x = device.zeros_matrix::<T>(n, n_rhs)?;

    // Warm-up allocates the solve workspace
    solver.solve_into(&b, &mut x)?;

    let t1 = Instant::now();
    for _ in 0..args.repeats {
        solver.solve_into(&b, &mut x)?;
    }
    let t_solve = t1.elapsed().as_secs_f64() / args.repeats.max(1) as f64;

    let x_host: Vec<f64> = x.to_host().into_iter().map(Scalar::widen).collect();
    let mut ax = vec![0.0; n * n_rhs];
    spmm(&a, &x_host, &mut ax, n_rhs);
    let res = ax
        .iter()
        .zip(&b_wide)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    let b_norm = b_wide.iter().map(|v| v.abs()).fold(0.0, f64::max).max(1e-300);
    let err = x_host
        .iter()
        .zip(&x_true)
        .map(|(a, e)| (a - e).abs())
        .fold(0.0, f64::max);

    println!(
        "Solve:     {:.3} ms per call ({} rhs, {:.3} us per column)",
        t_solve * 1e3,
        n_rhs,
        t_solve * 1e6 / n_rhs.max(1) as f64
    );
    println!("Residual:  |Ax-b|/|b| = {:.3e}, |x-x*| = {:.3e}", res / b_norm, err);
    println!("Memory:    {} bytes in use, peak {}", device.bytes_in_use(), device.peak_bytes());

    let stats = solver.stats();
    info!(
        "{} solves, {} columns, {:.3} ms total",
        stats.num_solves,
        stats.num_rhs_solved,
        stats.time_solve * 1e3
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("trisolve benchmark");
    println!("==================\n");

    let problem = build_problem(&args);
    match args.precision {
        Precision::F32 => run::<f32>(&args, &problem),
        Precision::F64 => run::<f64>(&args, &problem),
    }
}
