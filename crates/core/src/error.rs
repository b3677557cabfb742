//! Domain error taxonomy shared across the workspace.

use crate::types::DbId;

/// Errors that propagate to the immediate caller of an orchestration
/// operation. Collaborator failures (engine, storage) never surface here;
/// they become `Failed` state transitions on the owning entity.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Entities not found: {entity} with ids {ids:?}")]
    NotFoundMany { entity: &'static str, ids: Vec<DbId> },

    #[error("Entity not found: {entity} with uid {uid}")]
    NotFoundUid { entity: &'static str, uid: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for the single-id not-found case.
    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        Self::NotFound { entity, id }
    }
}
