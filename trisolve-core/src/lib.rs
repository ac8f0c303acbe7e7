//! trisolve: level-scheduled sparse Cholesky solves on a parallel device
//!
//! This library accelerates repeated solves of symmetric positive-definite
//! sparse systems `A X = B`. The factorization `P A P^T = L L^T` is computed
//! once on the host; every later solve runs two level-scheduled triangular
//! substitutions on a compute device, over many right-hand-side columns at
//! once.
//!
//! # Pipeline
//!
//! - **Analysis** (once per matrix): input validation, fill-reducing
//!   ordering, host Cholesky, level schedules for `L` and `L^T`, upload of
//!   factors, schedules and permutation to the device.
//! - **Solve** (per right-hand-side block): gather-permute, forward pass on
//!   `L`, backward pass on `L^T`, scatter back to the original order.
//!
//! Rows within a level are independent and solved in parallel; levels are
//! separated by a device-wide barrier.
//!
//! # Example
//!
//! ```ignore
//! use trisolve_core::{CholeskySolver, DeviceHandle, MatrixType, SolverSettings};
//!
//! // Lower triangle of [[4, 1], [1, 3]] in COO form
//! let device = DeviceHandle::with_defaults()?;
//! let mut solver = CholeskySolver::<f64>::new(
//!     device.clone(),
//!     2,
//!     &[0, 1, 1],
//!     &[0, 0, 1],
//!     &[4.0, 1.0, 3.0],
//!     MatrixType::Coo,
//!     SolverSettings::default(),
//! )?;
//!
//! let b = device.upload_matrix(2, 1, &[5.0, 4.0])?;
//! let x = solver.solve(&b)?;
//! println!("x = {:?}", x.to_host());
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod linalg;
pub mod scalar;
pub mod settings;
pub mod solver;

// Re-export main types
pub use device::{AcceleratorError, DeviceConfig, DeviceHandle, DeviceMatrix, LaunchMode};
pub use error::{FormatError, ShapeError, SolverError, SolverResult};
pub use linalg::backend::{FactorizationError, HostFactorization, HostFactorizer};
pub use linalg::factor::{SparseTriangularFactor, Triangle};
pub use linalg::levels::LevelSchedule;
pub use linalg::ordering::{OrderingMethod, Permutation};
pub use linalg::sparse::MatrixType;
pub use scalar::Scalar;
pub use settings::SolverSettings;
pub use solver::{CholeskySolver, SolverStats};
