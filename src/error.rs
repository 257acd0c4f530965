use thiserror::Error;

/// Input table is missing required columns. Carries every missing name so
/// the caller sees the full gap in one failure, not one column per run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required columns: {}", missing.join(", "))]
pub struct SchemaError {
    pub missing: Vec<String>,
}

/// Regression fitting failure. Propagated to the caller without retry;
/// a deterministic batch fit has nothing to gain from retrying.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("shape mismatch: {message}")]
    ShapeMismatch { message: String },
    #[error("singular design matrix, least squares has no unique solution")]
    SingularMatrix,
}
