//! Pipeline error type.

use faceforge_core::CoreError;
use faceforge_store::StoreError;

/// Errors surfaced to the immediate caller of an orchestration operation.
///
/// Engine failures never appear here: where a state machine exists
/// (template preprocessing, task execution) collaborator errors become
/// `Failed` states with an `error_detail`, and sweeps fold per-item
/// failures into their reports.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<faceforge_core::mapping::MappingError> for PipelineError {
    fn from(err: faceforge_core::mapping::MappingError) -> Self {
        Self::Core(err.into())
    }
}
