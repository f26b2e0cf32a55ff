//! Error types for chronoseg

use thiserror::Error;

/// Main error type for chronoseg operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Cluster {cluster} has no assigned pixels after round {round}")]
    DegenerateCluster { cluster: usize, round: usize },

    #[error("Distance computation failed for cluster {cluster} at ({row}, {col}): {reason}")]
    DistanceComputation {
        cluster: usize,
        row: usize,
        col: usize,
        reason: String,
    },

    #[error("Segmentation incomplete: {completed} of {requested} rounds finished")]
    Incomplete { completed: usize, requested: usize },

    #[error("Vector write error: {0}")]
    VectorWrite(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidParameter`]
    pub fn invalid_parameter(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for chronoseg operations
pub type Result<T> = std::result::Result<T, Error>;
