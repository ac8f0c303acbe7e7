//! Cholesky solver facade.
//!
//! Construction runs once: input validation, host factorization, level
//! scheduling of both factors and upload of everything to the device. Each
//! [`solve`](CholeskySolver::solve) then permutes the right-hand sides,
//! runs the forward pass on `L`, the backward pass on `L^T` and permutes the
//! result back.

use crate::device::permute::{permute_gather, permute_scatter};
use crate::device::sptrsv::solve_pass;
use crate::device::{
    kernels, AcceleratorError, DeviceBuffer, DeviceFactor, DeviceHandle, DeviceMatrix,
    DeviceSchedule, SolveWorkspace,
};
use crate::error::{ShapeError, SolverResult};
use crate::linalg::backend::{HostFactorization, HostFactorizer};
use crate::linalg::cholesky::CscCholeskyBackend;
use crate::linalg::factor::Triangle;
use crate::linalg::levels::LevelSchedule;
use crate::linalg::ordering::Permutation;
use crate::linalg::sparse::{MatrixType, SparseInput};
use crate::scalar::Scalar;
use crate::settings::SolverSettings;
use log::{debug, info, warn};
use std::time::Instant;

/// Solver statistics.
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Matrix dimension.
    pub n: usize,

    /// Stored entries of the lower factor.
    pub nnz_factor: usize,

    /// Levels of the forward (lower) schedule.
    pub lower_levels: usize,

    /// Levels of the backward (upper) schedule.
    pub upper_levels: usize,

    /// Number of analyses performed (construction plus re-analyses).
    pub num_analyses: usize,

    /// Time spent in the latest analysis (seconds).
    pub time_analysis: f64,

    /// Number of solves performed.
    pub num_solves: usize,

    /// Total right-hand-side columns solved.
    pub num_rhs_solved: usize,

    /// Total time in solves (seconds).
    pub time_solve: f64,
}

/// Everything a solver keeps on the device.
struct DeviceState<T> {
    lower: DeviceFactor<T>,
    upper: DeviceFactor<T>,
    lower_schedule: DeviceSchedule,
    upper_schedule: DeviceSchedule,
    perm: DeviceBuffer<i32>,
    inv: DeviceBuffer<i32>,
    workspace: SolveWorkspace<T>,
}

/// Repeated solves of `A X = B` for a fixed SPD matrix `A`.
///
/// `T` is the precision of the device-side factor and of the right-hand
/// sides; the host factorization always runs in `f64`.
pub struct CholeskySolver<T: Scalar> {
    device: DeviceHandle,
    settings: SolverSettings,
    n: usize,
    permutation: Permutation,
    lower_schedule: LevelSchedule,
    upper_schedule: LevelSchedule,
    state: DeviceState<T>,
    stats: SolverStats,
}

impl<T: Scalar> CholeskySolver<T> {
    /// Factor and analyze the symmetric matrix given by `(ii, jj, x)`.
    ///
    /// The lower triangle (`row >= col`) is used and mirrored; strictly upper
    /// entries are ignored and duplicates are summed. See [`MatrixType`] for
    /// the meaning of `ii` and `jj`.
    pub fn new(
        device: DeviceHandle,
        n_rows: usize,
        ii: &[i32],
        jj: &[i32],
        x: &[f64],
        kind: MatrixType,
        settings: SolverSettings,
    ) -> SolverResult<Self> {
        let factorizer = CscCholeskyBackend::new(settings.ordering);
        Self::with_factorizer(device, n_rows, ii, jj, x, kind, settings, &factorizer)
    }

    /// Like [`new`](Self::new) with a custom host factorization.
    #[allow(clippy::too_many_arguments)]
    pub fn with_factorizer(
        device: DeviceHandle,
        n_rows: usize,
        ii: &[i32],
        jj: &[i32],
        x: &[f64],
        kind: MatrixType,
        settings: SolverSettings,
        factorizer: &dyn HostFactorizer,
    ) -> SolverResult<Self> {
        let start = Instant::now();
        let factorization = factorize(n_rows, ii, jj, x, kind, factorizer)?;
        let time_factor = start.elapsed().as_secs_f64();

        let mut solver = Self::from_factorization(device, factorization, settings)?;
        solver.stats.time_analysis += time_factor;
        Ok(solver)
    }

    /// Build from a precomputed permutation and lower factor.
    ///
    /// An upper factor is accepted too and taken as `L^T`.
    pub fn from_factorization(
        device: DeviceHandle,
        factorization: HostFactorization,
        settings: SolverSettings,
    ) -> SolverResult<Self> {
        let start = Instant::now();
        let HostFactorization { permutation, lower } = factorization;

        let n = lower.n();
        if permutation.len() != n {
            return Err(ShapeError {
                context: "permutation",
                expected: (n, 1),
                actual: (permutation.len(), 1),
            }
            .into());
        }

        let (lower, upper) = match lower.triangle() {
            Triangle::Lower => {
                let upper = lower.transpose();
                (lower, upper)
            }
            Triangle::Upper => (lower.transpose(), lower),
        };

        let lower_schedule = LevelSchedule::analyze(&lower);
        let upper_schedule = LevelSchedule::analyze(&upper);
        if n > 1 && lower_schedule.num_levels() == n {
            warn!(
                "Level schedule is fully sequential ({} levels for {} rows)",
                n, n
            );
        }

        let lower_t = lower.cast::<T>();
        let upper_t = upper.cast::<T>();
        let max_levels = lower_schedule.num_levels().max(upper_schedule.num_levels());

        // On error, buffers uploaded so far are dropped before returning.
        let state = DeviceState {
            lower: DeviceFactor::upload(&device, &lower_t)?,
            upper: DeviceFactor::upload(&device, &upper_t)?,
            lower_schedule: DeviceSchedule::upload(&device, &lower_schedule)?,
            upper_schedule: DeviceSchedule::upload(&device, &upper_schedule)?,
            perm: device.upload(permutation.perm())?,
            inv: device.upload(permutation.inv())?,
            workspace: SolveWorkspace::new(&device, n, max_levels)?,
        };

        let stats = SolverStats {
            n,
            nnz_factor: lower.nnz(),
            lower_levels: lower_schedule.num_levels(),
            upper_levels: upper_schedule.num_levels(),
            num_analyses: 1,
            time_analysis: start.elapsed().as_secs_f64(),
            ..SolverStats::default()
        };

        let summary = format!(
            "n={}, nnz(L)={}, precision={}, levels lower={} (max width {}), upper={} (max width {}), device bytes={}",
            n,
            stats.nnz_factor,
            T::NAME,
            stats.lower_levels,
            lower_schedule.max_width(),
            stats.upper_levels,
            upper_schedule.max_width(),
            device.bytes_in_use(),
        );
        if settings.verbose {
            info!("Analysis: {}", summary);
        } else {
            debug!("Analysis: {}", summary);
        }

        Ok(Self {
            device,
            settings,
            n,
            permutation,
            lower_schedule,
            upper_schedule,
            state,
            stats,
        })
    }

    /// Replace the matrix, keeping the device and settings.
    ///
    /// The previous device state is released once the new one is in place.
    /// On error the solver keeps its previous matrix.
    pub fn reanalyze(
        &mut self,
        n_rows: usize,
        ii: &[i32],
        jj: &[i32],
        x: &[f64],
        kind: MatrixType,
    ) -> SolverResult<()> {
        let next = Self::new(
            self.device.clone(),
            n_rows,
            ii,
            jj,
            x,
            kind,
            self.settings.clone(),
        )?;
        let num_analyses = self.stats.num_analyses + 1;
        *self = next;
        self.stats.num_analyses = num_analyses;
        Ok(())
    }

    /// Solve `A X = B` into a new device matrix.
    pub fn solve(&mut self, b: &DeviceMatrix<T>) -> SolverResult<DeviceMatrix<T>> {
        self.check_device(b)?;
        self.check_rhs(b)?;
        let mut x = self.device.zeros_matrix(b.rows(), b.cols())?;
        self.solve_into(b, &mut x)?;
        Ok(x)
    }

    /// Solve `A X = B`, writing `X` into `x`.
    ///
    /// `b` and `x` must have shape `[n, n_rhs]` and live on the solver's
    /// device. `n_rhs = 0` is a no-op.
    pub fn solve_into(&mut self, b: &DeviceMatrix<T>, x: &mut DeviceMatrix<T>) -> SolverResult<()> {
        self.check_device(b)?;
        self.check_device(x)?;
        self.check_rhs(b)?;
        if x.shape() != b.shape() {
            return Err(ShapeError {
                context: "solution",
                expected: b.shape(),
                actual: x.shape(),
            }
            .into());
        }

        let n_rhs = b.cols();
        if n_rhs == 0 {
            return Ok(());
        }

        let start = Instant::now();
        let device = &self.device;
        let state = &mut self.state;
        state.workspace.ensure_rhs(device, n_rhs)?;

        permute_gather(device, &state.perm, b.as_slice(), state.workspace.block_mut(), n_rhs);
        solve_pass(device, &state.lower, &state.lower_schedule, &mut state.workspace)?;
        solve_pass(device, &state.upper, &state.upper_schedule, &mut state.workspace)?;
        permute_scatter(device, &state.inv, state.workspace.block(), x.as_mut_slice(), n_rhs);

        let elapsed = start.elapsed().as_secs_f64();
        self.stats.num_solves += 1;
        self.stats.num_rhs_solved += n_rhs;
        self.stats.time_solve += elapsed;
        debug!(
            "Solve: n={}, n_rhs={}, {} -> {} -> {} -> {} in {:.3}ms",
            self.n,
            n_rhs,
            kernels::PERMUTE_GATHER,
            kernels::SPTRSV_LOWER,
            kernels::SPTRSV_UPPER,
            kernels::PERMUTE_SCATTER,
            elapsed * 1e3
        );
        Ok(())
    }

    fn check_device(&self, m: &DeviceMatrix<T>) -> SolverResult<()> {
        if !m.device().same_device(&self.device) {
            return Err(AcceleratorError::DeviceMismatch.into());
        }
        Ok(())
    }

    fn check_rhs(&self, b: &DeviceMatrix<T>) -> SolverResult<()> {
        if b.rows() != self.n {
            return Err(ShapeError {
                context: "right-hand side",
                expected: (self.n, b.cols()),
                actual: b.shape(),
            }
            .into());
        }
        Ok(())
    }

    /// Matrix dimension.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Stored entries of the lower factor (the upper factor has as many).
    pub fn nnz_factor(&self) -> usize {
        self.state.lower.nnz()
    }

    pub fn lower_schedule(&self) -> &LevelSchedule {
        &self.lower_schedule
    }

    pub fn upper_schedule(&self) -> &LevelSchedule {
        &self.upper_schedule
    }

    pub fn permutation(&self) -> &Permutation {
        &self.permutation
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }
}

fn factorize(
    n_rows: usize,
    ii: &[i32],
    jj: &[i32],
    x: &[f64],
    kind: MatrixType,
    factorizer: &dyn HostFactorizer,
) -> SolverResult<HostFactorization> {
    let input = SparseInput::new(n_rows, ii, jj, x, kind);
    input.validate()?;
    let matrix = input.to_symmetric_csc();
    Ok(factorizer.factorize(&matrix)?)
}
