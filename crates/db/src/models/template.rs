//! Template records: an image with maskable face slots.

use faceforge_core::face::FaceObservation;
use faceforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{PreprocessingStatus, StatusId};

/// A row from the `templates` table.
///
/// `faces` is the ordered `FaceObservation` array discovered during
/// preprocessing; it stays empty until the status reaches `Completed` and
/// is cleared again by an administrative re-preprocess.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Template {
    pub id: DbId,
    pub name: String,
    pub original_resource_id: DbId,
    pub preprocessing_status_id: StatusId,
    pub faces: serde_json::Value,
    pub masked_resource_id: Option<DbId>,
    pub error_detail: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Template {
    pub fn preprocessing_status(&self) -> Option<PreprocessingStatus> {
        PreprocessingStatus::try_from_id(self.preprocessing_status_id)
    }

    pub fn is_preprocessed(&self) -> bool {
        self.preprocessing_status_id == PreprocessingStatus::Completed.id()
    }

    /// Deserialize the stored face observations.
    pub fn face_observations(&self) -> Result<Vec<FaceObservation>, serde_json::Error> {
        serde_json::from_value(self.faces.clone())
    }
}

/// Insert payload for a new template.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub original_resource_id: DbId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn template(faces: serde_json::Value, status: PreprocessingStatus) -> Template {
        Template {
            id: 1,
            name: "t".into(),
            original_resource_id: 2,
            preprocessing_status_id: status.id(),
            faces,
            masked_resource_id: None,
            error_detail: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn face_observations_deserialize_from_jsonb() {
        let faces = serde_json::json!([
            {"index": 0, "bbox": {"x1": 1, "y1": 2, "x2": 3, "y2": 4}, "gender": "male", "confidence": 0.8}
        ]);
        let t = template(faces, PreprocessingStatus::Completed);
        let parsed = t.face_observations().unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].index, 0);
    }

    #[test]
    fn empty_faces_array_parses() {
        let t = template(serde_json::json!([]), PreprocessingStatus::NotStarted);
        assert!(t.face_observations().unwrap().is_empty());
        assert!(!t.is_preprocessed());
    }
}
