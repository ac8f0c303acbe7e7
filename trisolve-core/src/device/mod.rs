//! Parallel compute device for repeated triangular solves.
//!
//! The device owns a pool of workers and accounts for every byte of memory it
//! hands out. Factors, schedules and right-hand sides live in device buffers
//! for the lifetime of a solver; kernels run on the device's workers.
//!
//! # Launch modes
//!
//! A substitution pass walks the levels of a [`LevelSchedule`] in order:
//!
//! - [`LaunchMode::Persistent`]: one launch per pass, broadcast to every
//!   worker of the pool. Workers iterate all levels and synchronise at a
//!   barrier after each one.
//! - [`LaunchMode::PerLevel`]: one launch per level on the worker pool; the
//!   join of each launch separates levels.
//!
//! In both modes rows of a level are claimed dynamically through an atomic
//! cursor.
//!
//! [`LevelSchedule`]: crate::linalg::levels::LevelSchedule

mod error;
mod handle;
pub mod permute;
pub mod sptrsv;

pub use error::{AcceleratorError, AcceleratorResult};
pub use handle::{DeviceBuffer, DeviceConfig, DeviceHandle, DeviceMatrix, LaunchMode, MAX_WORKERS};
pub use sptrsv::{DeviceFactor, DeviceSchedule, SolveWorkspace};

/// Kernel names reported in launch errors and logs.
pub mod kernels {
    pub const WORKER_POOL: &str = "worker_pool";

    // Triangular solves
    pub const SPTRSV_LOWER: &str = "sptrsv_lower";
    pub const SPTRSV_UPPER: &str = "sptrsv_upper";

    // Permutations
    pub const PERMUTE_GATHER: &str = "permute_gather";
    pub const PERMUTE_SCATTER: &str = "permute_scatter";
}
