//! Error types shared by the analysis passes.

use std::io;
use thiserror::Error;

pub type GeoDeltaResult<T> = Result<T, GeoDeltaError>;

#[derive(Error, Debug)]
pub enum GeoDeltaError {
    /// Centroid requested over an empty point set
    #[error("no valid points to calculate weighted center")]
    NoValidPoints,

    /// A point whose accuracy radius cannot be used as a weight
    #[error("degenerate accuracy {accuracy} at point {index}")]
    DegenerateAccuracy { index: usize, accuracy: f64 },

    /// A point with a non-finite coordinate
    #[error("invalid coordinate at point {index}: lat={lat}, lng={lng}")]
    InvalidCoordinate { index: usize, lat: f64, lng: f64 },

    /// Selection too large for a single centroid or inspection pass
    #[error("selection of {len} items exceeds the limit of {limit}")]
    SelectionTooLarge { len: usize, limit: usize },

    /// Point set too large for the pairwise uncertainty pass
    #[error("selection holds {len} points, over the limit of {limit}")]
    TooManyPoints { len: usize, limit: usize },

    #[error("bin width must be a positive number of km, got {0}")]
    InvalidBinWidth(f64),

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("malformed record {id}: {reason}")]
    MalformedRecord { id: u64, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
