//! Error types for the cropping and batching pipeline.

use thiserror::Error;

/// Errors raised while windowing trials or assembling batches.
#[derive(Debug, Error)]
pub enum CropError {
    /// Window larger than the trial, or a zero window/stride.
    #[error("invalid crop geometry: {0}")]
    InvalidGeometry(String),

    /// Parallel arrays disagree in length or shape.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Train/valid and test index windows overlap.
    #[error("invalid split: {0}")]
    InvalidSplit(String),

    /// `make_crops` called on an already cropped dataset.
    #[error("dataset has already been cropped")]
    AlreadyCropped,

    /// Queue still underfull after every trial of the epoch was cropped.
    #[error("trials exhausted: queue holds {queued} crops, batch needs {batch_size}")]
    ExhaustedTrials {
        /// Crops left in the queue.
        queued: usize,
        /// Requested batch size.
        batch_size: usize,
    },

    /// Label does not fit the one-hot width.
    #[error("label {label} out of range for {n_classes} classes")]
    LabelOutOfRange {
        /// Offending label.
        label: usize,
        /// One-hot width.
        n_classes: usize,
    },

    /// Configuration rejected at load time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Array reshape failure.
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CropError {
    /// Creates an invalid geometry error.
    #[must_use]
    pub fn invalid_geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry(reason.into())
    }

    /// Creates a dimension mismatch error.
    #[must_use]
    pub fn dimension_mismatch(reason: impl Into<String>) -> Self {
        Self::DimensionMismatch(reason.into())
    }

    /// Creates an invalid split error.
    #[must_use]
    pub fn invalid_split(reason: impl Into<String>) -> Self {
        Self::InvalidSplit(reason.into())
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

impl From<std::io::Error> for CropError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CropError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for cropping and batching operations.
pub type Result<T> = std::result::Result<T, CropError>;
