//! Error types for the device runtime.

use std::fmt;

/// Result type for device operations.
pub type AcceleratorResult<T> = Result<T, AcceleratorError>;

/// Errors raised by the device runtime. All of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceleratorError {
    /// Device configuration rejected at creation.
    InvalidConfig(String),

    /// Allocation beyond the memory limit, or host allocation failure.
    AllocationFailed {
        size: usize,
        reason: String,
    },

    /// Workers for a kernel could not be started.
    LaunchFailed {
        kernel: &'static str,
        reason: String,
    },

    /// Host slice length differs from the device buffer length.
    TransferSizeMismatch {
        expected: usize,
        actual: usize,
    },

    /// Buffer belongs to a different device than the solver.
    DeviceMismatch,
}

impl fmt::Display for AcceleratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceleratorError::InvalidConfig(msg) => {
                write!(f, "Invalid device configuration: {}", msg)
            }
            AcceleratorError::AllocationFailed { size, reason } => {
                write!(f, "Failed to allocate device buffer of {} bytes: {}", size, reason)
            }
            AcceleratorError::LaunchFailed { kernel, reason } => {
                write!(f, "Failed to launch kernel '{}': {}", kernel, reason)
            }
            AcceleratorError::TransferSizeMismatch { expected, actual } => {
                write!(
                    f,
                    "Transfer size mismatch: device buffer holds {} elements, host slice has {}",
                    expected, actual
                )
            }
            AcceleratorError::DeviceMismatch => {
                write!(f, "Buffer belongs to a different device")
            }
        }
    }
}

impl std::error::Error for AcceleratorError {}
