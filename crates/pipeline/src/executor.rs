//! Task execution.
//!
//! One task = one source pair + one masked template + one resolved
//! mapping. The executor chains one engine swap per mapping rule through
//! a working image, persists a single result resource, and transitions
//! the task. Cancellation is cooperative: the flag is read before every
//! swap call; a task past its last checkpoint runs to completion.

use std::collections::HashMap;
use std::sync::Arc;

use faceforge_core::face::FaceObservation;
use faceforge_core::mapping::SourceRole;
use faceforge_core::masking::crop_face;
use faceforge_core::task::{rule_progress, PROGRESS_PERSISTING, PROGRESS_STARTED};
use faceforge_core::types::DbId;
use faceforge_db::models::status::ResourceRole;
use faceforge_db::models::Task;
use faceforge_db::repositories::{ResourceRepo, TaskRepo, TemplateRepo};
use faceforge_engine::{FaceAnalysis, FaceSwap};
use image::RgbImage;
use sqlx::PgPool;

use crate::registry::{RegisterLifetime, ResourceRegistry};

/// A decoded source photo with its detected faces.
struct SourceFaces {
    image: RgbImage,
    faces: Vec<FaceObservation>,
}

/// Why execution stopped short of completion.
enum ExecError {
    /// A checkpoint observed the cancellation flag.
    Canceled,
    /// Collaborator or data failure; becomes the task's `error_detail`.
    Failed(String),
    /// Infrastructure failure talking to the database.
    Db(sqlx::Error),
}

impl From<sqlx::Error> for ExecError {
    fn from(e: sqlx::Error) -> Self {
        Self::Db(e)
    }
}

/// Executes claimed tasks against the engine collaborators.
pub struct TaskExecutor {
    pool: PgPool,
    registry: Arc<ResourceRegistry>,
    analysis: Arc<dyn FaceAnalysis>,
    swap: Arc<dyn FaceSwap>,
}

impl TaskExecutor {
    pub fn new(
        pool: PgPool,
        registry: Arc<ResourceRegistry>,
        analysis: Arc<dyn FaceAnalysis>,
        swap: Arc<dyn FaceSwap>,
    ) -> Self {
        Self {
            pool,
            registry,
            analysis,
            swap,
        }
    }

    /// Drive one already-claimed (`Running`) task to a terminal state.
    ///
    /// Never returns an error to the dispatcher: every outcome is a state
    /// transition, and one task's failure must not disturb its siblings.
    pub async fn execute(&self, task: &Task) {
        match self.run(task).await {
            Ok(result_id) => {
                if let Err(e) = TaskRepo::complete(&self.pool, task.id, result_id).await {
                    tracing::error!(task_uid = %task.uid, error = %e, "Failed to record completion");
                } else {
                    tracing::info!(task_uid = %task.uid, result_id, "Task completed");
                }
            }
            Err(ExecError::Canceled) => {
                if let Err(e) = TaskRepo::mark_canceled(&self.pool, task.id).await {
                    tracing::error!(task_uid = %task.uid, error = %e, "Failed to record cancellation");
                } else {
                    tracing::info!(task_uid = %task.uid, "Task canceled at checkpoint");
                }
            }
            Err(ExecError::Failed(reason)) => {
                if let Err(e) = TaskRepo::fail(&self.pool, task.id, &reason).await {
                    tracing::error!(task_uid = %task.uid, error = %e, "Failed to record failure");
                } else {
                    tracing::warn!(task_uid = %task.uid, reason = %reason, "Task failed");
                }
            }
            Err(ExecError::Db(e)) => {
                tracing::error!(task_uid = %task.uid, error = %e, "Task aborted on database error");
                if let Err(e2) = TaskRepo::fail(&self.pool, task.id, "internal database error").await
                {
                    tracing::error!(task_uid = %task.uid, error = %e2, "Failed to record failure");
                }
            }
        }
    }

    async fn run(&self, task: &Task) -> Result<DbId, ExecError> {
        let mapping = task
            .resolved_mapping()
            .map_err(|e| ExecError::Failed(format!("stored mapping is unreadable: {e}")))?;

        TaskRepo::update_progress(&self.pool, task.id, PROGRESS_STARTED).await?;

        // Masked template image is the canvas every swap composes onto.
        let template = TemplateRepo::find_by_id(&self.pool, task.template_id)
            .await?
            .ok_or_else(|| ExecError::Failed(format!("template {} is missing", task.template_id)))?;
        let masked_id = template.masked_resource_id.ok_or_else(|| {
            ExecError::Failed(format!("template {} has no masked variant", template.id))
        })?;
        let mut current = self.load_blob(masked_id).await?;

        let sources = self.load_sources(task, &mapping.rules).await?;

        let total = mapping.len();
        for (i, rule) in mapping.rules.iter().enumerate() {
            // Cancellation checkpoint, once per rule.
            if TaskRepo::is_cancel_requested(&self.pool, task.id).await? {
                return Err(ExecError::Canceled);
            }

            current = apply_rule(self.swap.as_ref(), &sources, rule, current)
                .await
                .map_err(ExecError::Failed)?;

            TaskRepo::update_progress(&self.pool, task.id, rule_progress(i + 1, total)).await?;
        }

        TaskRepo::update_progress(&self.pool, task.id, PROGRESS_PERSISTING).await?;

        let result = self
            .registry
            .register(&current, ResourceRole::Result, RegisterLifetime::Permanent, None)
            .await
            .map_err(|e| ExecError::Failed(format!("failed to store result: {e}")))?;

        Ok(result.id)
    }

    /// Load and decode each source photo the mapping actually uses, and
    /// detect its faces once.
    async fn load_sources(
        &self,
        task: &Task,
        rules: &[faceforge_core::mapping::MappingRule],
    ) -> Result<HashMap<SourceRole, SourceFaces>, ExecError> {
        let mut sources = HashMap::new();
        for role in [SourceRole::First, SourceRole::Second] {
            if !rules.iter().any(|r| r.source_role == role) {
                continue;
            }
            let resource_id = match role {
                SourceRole::First => task.first_photo_id,
                SourceRole::Second => task.second_photo_id,
            };
            let bytes = self.load_blob(resource_id).await?;
            let image = image::load_from_memory(&bytes)
                .map_err(|e| {
                    ExecError::Failed(format!("{} source photo is unreadable: {e}", role.label()))
                })?
                .to_rgb8();
            let faces = self
                .analysis
                .detect_and_classify(&bytes)
                .await
                .map_err(|e| ExecError::Failed(e.to_string()))?;
            if faces.is_empty() {
                return Err(ExecError::Failed(format!(
                    "no face detected in {} source photo",
                    role.label()
                )));
            }
            sources.insert(role, SourceFaces { image, faces });
        }
        Ok(sources)
    }

    async fn load_blob(&self, resource_id: DbId) -> Result<Vec<u8>, ExecError> {
        let resource = ResourceRepo::find_by_id(&self.pool, resource_id)
            .await?
            .ok_or_else(|| ExecError::Failed(format!("resource {resource_id} is missing")))?;
        self.registry
            .fetch_bytes(&resource)
            .await
            .map_err(|e| ExecError::Failed(format!("failed to read resource {resource_id}: {e}")))
    }
}

/// Apply one mapping rule: crop the requested source face and ask the
/// engine to swap it onto the canvas's target slot. Returns the new
/// canvas, or a human-readable failure reason.
async fn apply_rule(
    swap: &dyn FaceSwap,
    sources: &HashMap<SourceRole, SourceFaces>,
    rule: &faceforge_core::mapping::MappingRule,
    canvas: Vec<u8>,
) -> Result<Vec<u8>, String> {
    let source = sources.get(&rule.source_role).ok_or_else(|| {
        format!(
            "{} source photo was not loaded for this mapping",
            rule.source_role.label()
        )
    })?;
    let face = source
        .faces
        .get(rule.source_face_index as usize)
        .ok_or_else(|| {
            format!(
                "{} source photo has {} face(s), rule wants index {}",
                rule.source_role.label(),
                source.faces.len(),
                rule.source_face_index,
            )
        })?;

    let crop = crop_face(&source.image, &face.bbox).map_err(|e| e.to_string())?;
    let crop_bytes = encode_png(&crop)?;

    swap.swap(&crop_bytes, &canvas, rule.target_face_index)
        .await
        .map_err(|e| e.to_string())
}

fn encode_png(img: &RgbImage) -> Result<Vec<u8>, String> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| format!("failed to encode face crop: {e}"))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use faceforge_core::face::{BoundingBox, FaceObservation, Gender};
    use faceforge_core::mapping::MappingRule;
    use faceforge_engine::EngineError;
    use std::sync::Mutex;

    /// Swap double that records its calls and returns a canvas tagged
    /// with the swapped target index.
    #[derive(Default)]
    struct RecordingSwap {
        calls: Mutex<Vec<u32>>,
        fail_on: Option<u32>,
    }

    #[async_trait]
    impl FaceSwap for RecordingSwap {
        async fn swap(
            &self,
            source_face: &[u8],
            target_image: &[u8],
            target_face_index: u32,
        ) -> Result<Vec<u8>, EngineError> {
            if self.fail_on == Some(target_face_index) {
                return Err(EngineError::Swap("gpu exploded".into()));
            }
            // The crop must itself be a decodable image.
            assert!(image::load_from_memory(source_face).is_ok());
            self.calls.lock().unwrap().push(target_face_index);
            let mut out = target_image.to_vec();
            out.push(target_face_index as u8);
            Ok(out)
        }
    }

    fn source(face_count: u32) -> SourceFaces {
        let image = RgbImage::from_pixel(32, 32, image::Rgb([128, 128, 128]));
        let faces = (0..face_count)
            .map(|i| FaceObservation {
                index: i,
                bbox: BoundingBox::new(i as i32 * 8, 0, i as i32 * 8 + 8, 8),
                gender: Gender::Unknown,
                confidence: 0.9,
            })
            .collect();
        SourceFaces { image, faces }
    }

    fn rule(role: SourceRole, source_idx: u32, target_idx: u32) -> MappingRule {
        MappingRule {
            source_role: role,
            source_face_index: source_idx,
            target_face_index: target_idx,
        }
    }

    fn sources_with(first: u32, second: u32) -> HashMap<SourceRole, SourceFaces> {
        let mut map = HashMap::new();
        map.insert(SourceRole::First, source(first));
        map.insert(SourceRole::Second, source(second));
        map
    }

    #[tokio::test]
    async fn rule_swaps_onto_canvas_and_returns_engine_output() {
        let swap = RecordingSwap::default();
        let sources = sources_with(1, 1);
        let canvas = vec![1, 2, 3];

        let out = apply_rule(&swap, &sources, &rule(SourceRole::First, 0, 2), canvas)
            .await
            .unwrap();

        assert_eq!(out, vec![1, 2, 3, 2]);
        assert_eq!(*swap.calls.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn rules_compose_sequentially_through_the_canvas() {
        let swap = RecordingSwap::default();
        let sources = sources_with(1, 1);
        let mut canvas = vec![9];

        for r in [rule(SourceRole::First, 0, 0), rule(SourceRole::Second, 0, 1)] {
            canvas = apply_rule(&swap, &sources, &r, canvas).await.unwrap();
        }

        // Each swap's output became the next swap's target.
        assert_eq!(canvas, vec![9, 0, 1]);
        assert_eq!(*swap.calls.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn missing_source_face_index_fails_with_detail() {
        let swap = RecordingSwap::default();
        let sources = sources_with(1, 1);

        let err = apply_rule(&swap, &sources, &rule(SourceRole::Second, 3, 0), vec![])
            .await
            .unwrap_err();

        assert!(err.contains("second source photo has 1 face(s)"));
        assert!(err.contains("index 3"));
        assert!(swap.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn engine_failure_surfaces_as_reason_string() {
        let swap = RecordingSwap {
            fail_on: Some(1),
            ..Default::default()
        };
        let sources = sources_with(1, 1);

        let err = apply_rule(&swap, &sources, &rule(SourceRole::First, 0, 1), vec![])
            .await
            .unwrap_err();

        assert!(err.contains("face swap failed"));
    }

    #[tokio::test]
    async fn missing_role_fails_without_calling_engine() {
        let swap = RecordingSwap::default();
        let mut sources = HashMap::new();
        sources.insert(SourceRole::First, source(1));

        let err = apply_rule(&swap, &sources, &rule(SourceRole::Second, 0, 0), vec![])
            .await
            .unwrap_err();

        assert!(err.contains("second source photo was not loaded"));
        assert!(swap.calls.lock().unwrap().is_empty());
    }
}
