//! Device handle, configuration and owned device memory.
//!
//! - `DeviceHandle`: worker pool, configuration and memory accounting.
//!   Cheap to clone; clones refer to the same device.
//! - `DeviceBuffer` / `DeviceMatrix`: RAII device allocations that return
//!   their bytes to the device when dropped.

use super::error::{AcceleratorError, AcceleratorResult};
use super::kernels;
use crate::scalar::Scalar;
use log::{debug, info};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::mem;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Upper bound on the worker count accepted by [`DeviceHandle::new`].
pub const MAX_WORKERS: usize = 1024;

/// How a substitution pass is launched on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    /// One launch per pass; every pool worker iterates all levels and meets
    /// the others at a barrier.
    #[default]
    Persistent,
    /// One launch per level on the worker pool.
    PerLevel,
}

impl FromStr for LaunchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "persistent" => Ok(LaunchMode::Persistent),
            "per-level" | "per_level" | "perlevel" => Ok(LaunchMode::PerLevel),
            other => Err(format!("unknown launch mode '{}'", other)),
        }
    }
}

/// Configuration for a device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Number of workers. 0 picks the available hardware parallelism.
    pub workers: usize,

    /// Launch strategy for substitution passes.
    pub launch_mode: LaunchMode,

    /// Maximum bytes allocated at once. `None` means unlimited.
    pub memory_limit: Option<usize>,

    /// Log device events at info level.
    pub verbose: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let workers = std::env::var("TRISOLVE_WORKERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        let launch_mode = std::env::var("TRISOLVE_LAUNCH")
            .ok()
            .and_then(|s| s.parse::<LaunchMode>().ok())
            .unwrap_or_default();
        let memory_limit = std::env::var("TRISOLVE_MEMORY_LIMIT")
            .ok()
            .and_then(|s| s.parse::<usize>().ok());

        Self {
            workers,
            launch_mode,
            memory_limit,
            verbose: false,
        }
    }
}

struct DeviceInner {
    config: DeviceConfig,
    workers: usize,
    pool: ThreadPool,
    bytes_in_use: AtomicUsize,
    peak_bytes: AtomicUsize,
}

/// Handle to a compute device.
///
/// Create once and share between solvers; every buffer keeps its device
/// alive.
#[derive(Clone)]
pub struct DeviceHandle {
    inner: Arc<DeviceInner>,
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("workers", &self.inner.workers)
            .field("launch_mode", &self.inner.config.launch_mode)
            .field("bytes_in_use", &self.bytes_in_use())
            .finish()
    }
}

impl DeviceHandle {
    /// Create a device with the given configuration.
    pub fn new(config: DeviceConfig) -> AcceleratorResult<Self> {
        let workers = match config.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            w if w > MAX_WORKERS => {
                return Err(AcceleratorError::InvalidConfig(format!(
                    "{} workers requested, at most {} supported",
                    w, MAX_WORKERS
                )));
            }
            w => w,
        };

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("trisolve-worker-{}", i))
            .build()
            .map_err(|e| AcceleratorError::LaunchFailed {
                kernel: kernels::WORKER_POOL,
                reason: e.to_string(),
            })?;

        if config.verbose {
            info!(
                "[device] {} workers, {:?} launch, memory limit {:?}",
                workers, config.launch_mode, config.memory_limit
            );
        }

        Ok(Self {
            inner: Arc::new(DeviceInner {
                config,
                workers,
                pool,
                bytes_in_use: AtomicUsize::new(0),
                peak_bytes: AtomicUsize::new(0),
            }),
        })
    }

    /// Create a device with [`DeviceConfig::default`].
    pub fn with_defaults() -> AcceleratorResult<Self> {
        Self::new(DeviceConfig::default())
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Resolved worker count.
    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    pub fn launch_mode(&self) -> LaunchMode {
        self.inner.config.launch_mode
    }

    pub(crate) fn pool(&self) -> &ThreadPool {
        &self.inner.pool
    }

    /// Run `op` once on every pool worker and wait for all of them.
    ///
    /// Broadcasts reach every worker in the same order, so concurrent
    /// launches on one device run one after another.
    pub(crate) fn launch_on_all_workers<F>(&self, op: F)
    where
        F: Fn() + Sync,
    {
        self.inner.pool.broadcast(|_| op());
    }

    /// Bytes currently held by live buffers.
    pub fn bytes_in_use(&self) -> usize {
        self.inner.bytes_in_use.load(Ordering::Acquire)
    }

    /// Highest value [`bytes_in_use`](Self::bytes_in_use) has reached.
    pub fn peak_bytes(&self) -> usize {
        self.inner.peak_bytes.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same device.
    pub fn same_device(&self, other: &DeviceHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn reserve(&self, bytes: usize) -> AcceleratorResult<()> {
        let limit = self.inner.config.memory_limit.unwrap_or(usize::MAX);
        let mut current = self.inner.bytes_in_use.load(Ordering::Relaxed);
        loop {
            let next = match current.checked_add(bytes) {
                Some(next) if next <= limit => next,
                _ => {
                    return Err(AcceleratorError::AllocationFailed {
                        size: bytes,
                        reason: format!(
                            "device memory limit of {} bytes exceeded ({} in use)",
                            limit, current
                        ),
                    });
                }
            };
            match self.inner.bytes_in_use.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.inner.peak_bytes.fetch_max(next, Ordering::AcqRel);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.inner.bytes_in_use.fetch_sub(bytes, Ordering::AcqRel);
    }

    fn allocate<T>(&self, len: usize) -> AcceleratorResult<(Vec<T>, usize)> {
        let bytes = len
            .checked_mul(mem::size_of::<T>())
            .ok_or_else(|| AcceleratorError::AllocationFailed {
                size: usize::MAX,
                reason: format!("{} elements overflow the address space", len),
            })?;
        self.reserve(bytes)?;

        let mut data = Vec::new();
        if let Err(e) = data.try_reserve_exact(len) {
            self.release(bytes);
            return Err(AcceleratorError::AllocationFailed {
                size: bytes,
                reason: e.to_string(),
            });
        }
        Ok((data, bytes))
    }

    /// Allocate `len` elements initialised with `init`.
    pub fn alloc_with<T>(
        &self,
        len: usize,
        init: impl FnMut() -> T,
    ) -> AcceleratorResult<DeviceBuffer<T>> {
        let (mut data, bytes) = self.allocate(len)?;
        data.resize_with(len, init);
        Ok(DeviceBuffer {
            data,
            bytes,
            device: self.clone(),
        })
    }

    /// Allocate `len` default-initialised elements.
    pub fn alloc_default<T: Default>(&self, len: usize) -> AcceleratorResult<DeviceBuffer<T>> {
        self.alloc_with(len, T::default)
    }

    /// Copy a host slice into a new device buffer.
    pub fn upload<T: Copy>(&self, host: &[T]) -> AcceleratorResult<DeviceBuffer<T>> {
        let (mut data, bytes) = self.allocate(host.len())?;
        data.extend_from_slice(host);
        Ok(DeviceBuffer {
            data,
            bytes,
            device: self.clone(),
        })
    }

    /// Upload a dense row-major `rows x cols` matrix.
    pub fn upload_matrix<T: Scalar>(
        &self,
        rows: usize,
        cols: usize,
        host: &[T],
    ) -> AcceleratorResult<DeviceMatrix<T>> {
        let len = rows.saturating_mul(cols);
        if host.len() != len {
            return Err(AcceleratorError::TransferSizeMismatch {
                expected: len,
                actual: host.len(),
            });
        }
        Ok(DeviceMatrix {
            buf: self.upload(host)?,
            rows,
            cols,
        })
    }

    /// Allocate a zero-filled `rows x cols` matrix.
    pub fn zeros_matrix<T: Scalar>(&self, rows: usize, cols: usize) -> AcceleratorResult<DeviceMatrix<T>> {
        let len = rows
            .checked_mul(cols)
            .ok_or_else(|| AcceleratorError::AllocationFailed {
                size: usize::MAX,
                reason: format!("{}x{} matrix overflows the address space", rows, cols),
            })?;
        Ok(DeviceMatrix {
            buf: self.alloc_with(len, T::zero)?,
            rows,
            cols,
        })
    }
}

/// Owned device allocation.
pub struct DeviceBuffer<T> {
    data: Vec<T>,
    bytes: usize,
    device: DeviceHandle,
}

impl<T> DeviceBuffer<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes charged to the device for this buffer.
    pub fn size_bytes(&self) -> usize {
        self.bytes
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Copy> DeviceBuffer<T> {
    /// Copy the buffer back to the host.
    pub fn to_host(&self) -> Vec<T> {
        self.data.clone()
    }

    /// Overwrite the buffer from a host slice of the same length.
    pub fn copy_from_host(&mut self, host: &[T]) -> AcceleratorResult<()> {
        if host.len() != self.data.len() {
            return Err(AcceleratorError::TransferSizeMismatch {
                expected: self.data.len(),
                actual: host.len(),
            });
        }
        self.data.copy_from_slice(host);
        Ok(())
    }
}

impl<T> Deref for DeviceBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        self.device.release(self.bytes);
        debug!("[device] released {} bytes", self.bytes);
    }
}

impl<T> std::fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("len", &self.data.len())
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// Dense row-major matrix resident on a device.
#[derive(Debug)]
pub struct DeviceMatrix<T> {
    buf: DeviceBuffer<T>,
    rows: usize,
    cols: usize,
}

impl<T: Scalar> DeviceMatrix<T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn device(&self) -> &DeviceHandle {
        self.buf.device()
    }

    /// Row-major copy of the matrix on the host.
    pub fn to_host(&self) -> Vec<T> {
        self.buf.to_host()
    }

    /// Overwrite the matrix from a row-major host slice.
    pub fn copy_from_host(&mut self, host: &[T]) -> AcceleratorResult<()> {
        self.buf.copy_from_host(host)
    }

    pub(crate) fn as_slice(&self) -> &[T] {
        &self.buf
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        self.buf.as_mut_slice()
    }
}
