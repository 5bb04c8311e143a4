// ============================================================================
// ERRORS - structural misuse surfaced to the caller
// ============================================================================
//
// Numeric degeneracies (flat histograms, empty threshold partitions, log of
// zero) never appear here: the component that detects them degrades to an
// identity result instead.

use thiserror::Error;

/// Error type for every image operation in the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    /// Buffer is empty, ragged, or has an unsupported channel count.
    #[error("invalid image shape: {0}")]
    InvalidShape(String),

    /// A buffer promoted to a binary mask holds a sample other than 0 or 255.
    #[error("binary image required: sample ({x}, {y}) has value {value}")]
    NotBinary { x: u32, y: u32, value: u8 },

    /// Threshold, kernel size, angle or shear factor is not acceptable.
    #[error("parameter out of range: {0}")]
    ParameterOutOfRange(String),

    /// The caller raised the cancellation flag while the operation ran.
    #[error("operation cancelled")]
    Cancelled,
}

pub type OpResult<T> = Result<T, OpError>;
