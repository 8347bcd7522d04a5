//! Error types shared by the clustering stages.

use thiserror::Error;

use crate::schema::Category;

/// Why a coordinate pair was refused at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateIssue {
    #[error("longitude is missing")]
    MissingLongitude,
    #[error("latitude is missing")]
    MissingLatitude,
    #[error("longitude {0} is outside of +/-360 degrees")]
    LongitudeOutOfRange(f64),
    #[error("coordinate is not a finite number")]
    NonFinite,
}

#[derive(Debug, Error)]
pub enum ClusteringError {
    /// Point dropped before clustering. Recovered locally by the ingest stage.
    #[error("label {label_id} has an invalid coordinate: {issue}")]
    InvalidCoordinate {
        label_id: i64,
        #[source]
        issue: CoordinateIssue,
    },
    /// Dendrogram construction was attempted below two points.
    #[error("hierarchical clustering needs at least two points, got {points}")]
    InsufficientData { points: usize },
    #[error("threshold for {category} must be finite and non-negative, got {value}")]
    InvalidThreshold { category: Category, value: f64 },
    #[error("failed to build clustering worker pool: {0}")]
    WorkerPool(String),
}
