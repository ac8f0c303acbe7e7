//! Floating-point precision of the solve path.

use num_traits::Float;
use std::fmt::{Debug, Display};

/// Element type of factors, right-hand sides and solutions.
///
/// The host factorization always runs in `f64`; the factor is narrowed to
/// `Self` once, at upload time. Everything that runs on the device afterwards
/// stays in `Self`.
pub trait Scalar: Float + Debug + Display + Default + Send + Sync + 'static {
    /// Short name used in logs ("f32" / "f64").
    const NAME: &'static str;

    /// Convert a host `f64` value into this precision.
    fn narrow(value: f64) -> Self;

    /// Widen to `f64` (used for residual checks and statistics).
    fn widen(self) -> f64;
}

impl Scalar for f32 {
    const NAME: &'static str = "f32";

    #[inline]
    fn narrow(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn widen(self) -> f64 {
        self as f64
    }
}

impl Scalar for f64 {
    const NAME: &'static str = "f64";

    #[inline]
    fn narrow(value: f64) -> Self {
        value
    }

    #[inline]
    fn widen(self) -> f64 {
        self
    }
}
