//! Demosaicing error codes.

use thiserror::Error;

/// Result type of the demosaicing operations.
pub type DebayerResult<T> = Result<T, DebayerError>;

/// Error codes for the demosaicing engines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebayerError {
    /// The CFA pattern could not be parsed or is not a legal pattern.
    #[error("Invalid CFA pattern: {0}")]
    InvalidPattern(String),

    /// The mosaic is smaller than the method requires.
    #[error("Invalid image dimensions: {width}x{height}, at least {min_width}x{min_height} required")]
    Dimension {
        /// Width of the mosaic.
        width: usize,
        /// Height of the mosaic.
        height: usize,
        /// Minimum width for the method.
        min_width: usize,
        /// Minimum height for the method.
        min_height: usize,
    },

    /// The demosaicing method is not known, or not available for the pattern.
    #[error("Unsupported demosaicing method: {0}")]
    UnsupportedMethod(String),

    /// The X-Trans pattern does not admit the neighbour tables of the algorithm.
    #[error("CFA validation failed: {0}")]
    CfaValidation(&'static str),

    /// The operation was cancelled through its [`StatusMonitor`](crate::StatusMonitor).
    #[error("Demosaicing cancelled")]
    Cancelled,

    /// An image container could not be created.
    #[error("Invalid image: {0}")]
    InvalidImage(&'static str),

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl From<&'static str> for DebayerError {
    fn from(value: &'static str) -> Self {
        DebayerError::InvalidImage(value)
    }
}
