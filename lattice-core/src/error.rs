use arrow_schema::ArrowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LatticeCoreError {
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Dimension error: {0}")]
    DimensionError(String),

    #[error("Mismatching bin indices: {0}")]
    BinIndexMismatch(String),

    #[error("Not found: `{0}`")]
    NotFound(String),

    #[error("Unsupported dtype: {0}")]
    DTypeError(String),

    #[error("Unit error: {0}")]
    UnitError(String),

    #[error("Invalid bins: {0}")]
    InvalidBins(String),

    #[error("Arrow error: `{0}`")]
    ArrowError(#[from] ArrowError),
}

impl LatticeCoreError {
    pub fn dims(msg: impl Into<String>) -> Self {
        Self::DimensionError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}
