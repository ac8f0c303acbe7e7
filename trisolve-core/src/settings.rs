//! Solver settings.

use crate::linalg::ordering::OrderingMethod;

/// Settings for [`CholeskySolver`](crate::CholeskySolver) construction.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Ordering applied before factorization.
    pub ordering: OrderingMethod,

    /// Log analysis summaries at info level.
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        // TRISOLVE_ORDERING=natural disables reordering
        let ordering = std::env::var("TRISOLVE_ORDERING")
            .ok()
            .and_then(|s| s.parse::<OrderingMethod>().ok())
            .unwrap_or_default();

        Self {
            ordering,
            verbose: false,
        }
    }
}
