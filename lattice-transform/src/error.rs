use lattice_core::LatticeCoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LatticeTransformError {
    #[error("Duplicate output name defined in graph: `{0}`")]
    DuplicateOutput(String),

    #[error("Function with variable arguments not allowed in graph: `{0}`")]
    VariadicFunction(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Coordinate `{0}` does not exist in the input data and no rule has been provided to compute it")]
    CoordinateNotFound(String),

    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    #[error("Function `{func}` returned a single output but {expected} were expected")]
    UnexpectedSingleOutput { func: String, expected: usize },

    #[error("Function `{func}` did not return output `{name}`")]
    MissingOutput { func: String, name: String },

    #[error("Dense and event evaluation of `{0}` disagree")]
    InconsistentOutputs(String),

    #[error(transparent)]
    Core(#[from] LatticeCoreError),
}
