//! Batch records.
//!
//! The row stores only identity and composition. State and progress
//! counters are recomputed from the child tasks on every read; nothing
//! here can drift.

use faceforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `batches` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Batch {
    pub id: DbId,
    /// Externally stable opaque identifier (`batch_<hex>`).
    pub uid: String,
    pub first_photo_id: DbId,
    pub second_photo_id: DbId,
    /// Unique template ids in first-occurrence order.
    pub template_ids: serde_json::Value,
    pub total_tasks: i32,
    pub created_at: Timestamp,
    /// Stamped the first time a status read observes all children terminal.
    pub completed_at: Option<Timestamp>,
}

impl Batch {
    pub fn template_id_list(&self) -> Result<Vec<DbId>, serde_json::Error> {
        serde_json::from_value(self.template_ids.clone())
    }
}

/// Insert payload for a new batch.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub uid: String,
    pub first_photo_id: DbId,
    pub second_photo_id: DbId,
    pub template_ids: Vec<DbId>,
    pub total_tasks: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn template_ids_round_trip_through_jsonb() {
        let batch = Batch {
            id: 1,
            uid: "batch_abc".into(),
            first_photo_id: 1,
            second_photo_id: 2,
            template_ids: serde_json::json!([5, 7]),
            total_tasks: 2,
            created_at: Utc::now(),
            completed_at: None,
        };
        assert_eq!(batch.template_id_list().unwrap(), vec![5, 7]);
    }
}
