use lattice_core::LatticeCoreError;

#[derive(Debug, thiserror::Error)]
pub enum LatticeBinsError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Core(#[from] LatticeCoreError),
}
