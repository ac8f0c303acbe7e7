//! Level-scheduled sparse triangular solve kernels.
//!
//! A pass substitutes one triangular factor against the `[n, n_rhs]` block
//! held in a [`SolveWorkspace`], level by level. Inside a level, workers claim
//! rows dynamically from the level's cursor; a claimed row is owned by one
//! worker for every right-hand-side column. Levels are separated by a device
//! wide barrier (persistent launch) or by the join of a per-level launch.

use super::error::AcceleratorResult;
use super::handle::{DeviceBuffer, DeviceHandle, LaunchMode};
use crate::linalg::factor::{SparseTriangularFactor, Triangle};
use crate::linalg::levels::LevelSchedule;
use crate::scalar::Scalar;
use log::debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Barrier;

/// Triangular factor resident on a device (CSR, `i32` indices).
#[derive(Debug)]
pub struct DeviceFactor<T> {
    n: usize,
    triangle: Triangle,
    row_ptr: DeviceBuffer<i32>,
    col_idx: DeviceBuffer<i32>,
    values: DeviceBuffer<T>,
}

impl<T: Scalar> DeviceFactor<T> {
    pub fn upload(
        device: &DeviceHandle,
        factor: &SparseTriangularFactor<T>,
    ) -> AcceleratorResult<Self> {
        Ok(Self {
            n: factor.n(),
            triangle: factor.triangle(),
            row_ptr: device.upload(factor.row_ptr())?,
            col_idx: device.upload(factor.col_idx())?,
            values: device.upload(factor.values())?,
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn triangle(&self) -> Triangle {
        self.triangle
    }
}

/// Level schedule resident on a device.
#[derive(Debug)]
pub struct DeviceSchedule {
    level_ptr: DeviceBuffer<i32>,
    level_rows: DeviceBuffer<i32>,
}

impl DeviceSchedule {
    pub fn upload(device: &DeviceHandle, schedule: &LevelSchedule) -> AcceleratorResult<Self> {
        let level_ptr: Vec<i32> = schedule.level_ptr().iter().map(|&p| p as i32).collect();
        let level_rows: Vec<i32> = schedule.level_rows().iter().map(|&r| r as i32).collect();
        Ok(Self {
            level_ptr: device.upload(&level_ptr)?,
            level_rows: device.upload(&level_rows)?,
        })
    }

    pub fn num_levels(&self) -> usize {
        self.level_ptr.len().saturating_sub(1)
    }

    fn level_range(&self, level: usize) -> (usize, usize) {
        (
            self.level_ptr[level] as usize,
            self.level_ptr[level + 1] as usize,
        )
    }
}

/// Per-solver scratch state for substitution passes.
///
/// Holds the `[n, n_rhs]` block being solved, one completion marker per row
/// and one claim cursor per level. Markers and cursors are zeroed at the
/// start of every pass. The block is reallocated only when `n_rhs` changes.
#[derive(Debug)]
pub struct SolveWorkspace<T> {
    n: usize,
    n_rhs: usize,
    x: DeviceBuffer<T>,
    done: DeviceBuffer<AtomicU32>,
    cursors: DeviceBuffer<AtomicUsize>,
}

impl<T: Scalar> SolveWorkspace<T> {
    /// Allocate a workspace for `n` rows and up to `max_levels` levels.
    pub fn new(device: &DeviceHandle, n: usize, max_levels: usize) -> AcceleratorResult<Self> {
        Ok(Self {
            n,
            n_rhs: 0,
            x: device.alloc_with(0, T::zero)?,
            done: device.alloc_default(n)?,
            cursors: device.alloc_default(max_levels)?,
        })
    }

    pub fn n_rhs(&self) -> usize {
        self.n_rhs
    }

    /// Make room for `n_rhs` columns, reallocating only on a change.
    pub fn ensure_rhs(&mut self, device: &DeviceHandle, n_rhs: usize) -> AcceleratorResult<()> {
        if n_rhs == self.n_rhs {
            return Ok(());
        }
        // Drop the old block before allocating so both never count together.
        self.x = device.alloc_with(0, T::zero)?;
        self.n_rhs = 0;
        self.x = device.alloc_with(self.n * n_rhs, T::zero)?;
        self.n_rhs = n_rhs;
        debug!("[sptrsv] workspace resized to [{}, {}]", self.n, n_rhs);
        Ok(())
    }

    /// The `[n, n_rhs]` block, row-major.
    pub fn block(&self) -> &[T] {
        &self.x
    }

    pub fn block_mut(&mut self) -> &mut [T] {
        self.x.as_mut_slice()
    }

    fn reset(&mut self, num_levels: usize) {
        for marker in self.done.as_mut_slice() {
            *marker.get_mut() = 0;
        }
        for cursor in &mut self.cursors.as_mut_slice()[..num_levels] {
            *cursor.get_mut() = 0;
        }
    }
}

/// Shared view of a mutable slice written by several workers.
///
/// Callers guarantee that no element is written while another worker reads
/// or writes it.
struct SharedMut<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

unsafe impl<T: Send + Sync> Send for SharedMut<'_, T> {}
unsafe impl<T: Send + Sync> Sync for SharedMut<'_, T> {}

impl<'a, T: Copy> SharedMut<'a, T> {
    fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    #[inline]
    unsafe fn read(&self, idx: usize) -> T {
        debug_assert!(idx < self.len);
        *self.ptr.add(idx)
    }

    #[inline]
    unsafe fn write(&self, idx: usize, value: T) {
        debug_assert!(idx < self.len);
        *self.ptr.add(idx) = value;
    }
}

/// Everything one pass reads, borrowed for the duration of the launch.
struct Pass<'a, T> {
    triangle: Triangle,
    row_ptr: &'a [i32],
    col_idx: &'a [i32],
    values: &'a [T],
    schedule: &'a DeviceSchedule,
    n_rhs: usize,
    x: SharedMut<'a, T>,
    done: &'a [AtomicU32],
    cursors: &'a [AtomicUsize],
}

impl<T: Scalar> Pass<'_, T> {
    /// Claim and solve rows of `level` until its cursor runs past the end.
    fn drain_level(&self, level: usize) {
        let (start, end) = self.schedule.level_range(level);
        let width = end - start;
        loop {
            let k = self.cursors[level].fetch_add(1, Ordering::Relaxed);
            if k >= width {
                break;
            }
            let row = self.schedule.level_rows[start + k] as usize;
            // SAFETY: the cursor hands `row` to exactly one worker, and every
            // row read by it belongs to an earlier, completed level.
            unsafe { self.solve_row(row) };
        }
    }

    unsafe fn solve_row(&self, i: usize) {
        let start = self.row_ptr[i] as usize;
        let end = self.row_ptr[i + 1] as usize;
        let (diag_pos, off) = match self.triangle {
            Triangle::Lower => (end - 1, start..end - 1),
            Triangle::Upper => (start, start + 1..end),
        };
        let diag = self.values[diag_pos];

        if cfg!(debug_assertions) {
            for &j in &self.col_idx[off.clone()] {
                debug_assert_eq!(
                    self.done[j as usize].load(Ordering::Acquire),
                    1,
                    "row {} scheduled before its dependency {}",
                    i,
                    j
                );
            }
        }

        let n_rhs = self.n_rhs;
        for k in 0..n_rhs {
            let mut acc = self.x.read(i * n_rhs + k);
            for p in off.clone() {
                let j = self.col_idx[p] as usize;
                acc = acc - self.values[p] * self.x.read(j * n_rhs + k);
            }
            self.x.write(i * n_rhs + k, acc / diag);
        }

        self.done[i].store(1, Ordering::Release);
    }
}

/// Substitute `factor` against the workspace block in place.
pub fn solve_pass<T: Scalar>(
    device: &DeviceHandle,
    factor: &DeviceFactor<T>,
    schedule: &DeviceSchedule,
    ws: &mut SolveWorkspace<T>,
) -> AcceleratorResult<()> {
    let num_levels = schedule.num_levels();
    if ws.n_rhs == 0 || num_levels == 0 {
        return Ok(());
    }
    ws.reset(num_levels);

    let n_rhs = ws.n_rhs;
    let pass = Pass {
        triangle: factor.triangle,
        row_ptr: &factor.row_ptr,
        col_idx: &factor.col_idx,
        values: &factor.values,
        schedule,
        n_rhs,
        x: SharedMut::new(ws.x.as_mut_slice()),
        done: &ws.done,
        cursors: &ws.cursors,
    };

    match device.launch_mode() {
        LaunchMode::Persistent => launch_persistent(&pass, device, num_levels),
        LaunchMode::PerLevel => launch_per_level(&pass, device, num_levels),
    }
    Ok(())
}

fn launch_persistent<T: Scalar>(pass: &Pass<'_, T>, device: &DeviceHandle, num_levels: usize) {
    // Every pool worker runs the whole pass, so the barrier counts all of them.
    let barrier = Barrier::new(device.workers());
    device.launch_on_all_workers(|| {
        for level in 0..num_levels {
            pass.drain_level(level);
            barrier.wait();
        }
    });
}

fn launch_per_level<T: Scalar>(pass: &Pass<'_, T>, device: &DeviceHandle, num_levels: usize) {
    let workers = device.workers();
    for level in 0..num_levels {
        let (start, end) = pass.schedule.level_range(level);
        let jobs = workers.min(end - start);
        if jobs <= 1 {
            pass.drain_level(level);
            continue;
        }
        device.pool().scope(|s| {
            for _ in 0..jobs {
                s.spawn(move |_| pass.drain_level(level));
            }
        });
    }
}
