//! Swap task records.

use faceforge_core::mapping::ResolvedMapping;
use faceforge_core::task::TaskState;
use faceforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{StatusId, TaskStatus};

/// A row from the `tasks` table: one source pair + one template + one
/// resolved mapping, producing one result image.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    /// Externally stable opaque identifier (`task_<hex>`).
    pub uid: String,
    /// Null for standalone tasks created outside a batch.
    pub batch_id: Option<DbId>,
    pub first_photo_id: DbId,
    pub second_photo_id: DbId,
    pub template_id: DbId,
    /// The resolved mapping, validated once at creation.
    pub mapping: serde_json::Value,
    pub status_id: StatusId,
    pub progress_percent: i16,
    /// Cooperative cancellation flag, observed at executor checkpoints.
    pub cancel_requested: bool,
    pub result_resource_id: Option<DbId>,
    pub error_detail: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Task {
    /// Domain state; unknown status ids surface as `Failed` so a corrupt
    /// row can never look active.
    pub fn state(&self) -> TaskState {
        TaskStatus::try_from_id(self.status_id)
            .map(TaskStatus::as_state)
            .unwrap_or(TaskState::Failed)
    }

    /// Deserialize the stored mapping.
    pub fn resolved_mapping(&self) -> Result<ResolvedMapping, serde_json::Error> {
        serde_json::from_value(self.mapping.clone())
    }
}

/// Insert payload for a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub uid: String,
    pub batch_id: Option<DbId>,
    pub first_photo_id: DbId,
    pub second_photo_id: DbId,
    pub template_id: DbId,
    pub mapping: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn unknown_status_id_reads_as_failed() {
        let task = Task {
            id: 1,
            uid: "task_abc".into(),
            batch_id: None,
            first_photo_id: 1,
            second_photo_id: 2,
            template_id: 3,
            mapping: serde_json::json!([]),
            status_id: 77,
            progress_percent: 0,
            cancel_requested: false,
            result_resource_id: None,
            error_detail: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        assert_eq!(task.state(), TaskState::Failed);
        assert!(task.resolved_mapping().unwrap().is_empty());
    }
}
