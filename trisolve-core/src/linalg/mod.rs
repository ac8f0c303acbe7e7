//! Linear algebra layer.
//!
//! Sparse input assembly, orderings, host factorization and the triangular
//! factor / level schedule types consumed by the device solver.

pub mod sparse;
pub mod factor;
pub mod levels;
pub mod ordering;
pub mod backend;
pub mod cholesky;
