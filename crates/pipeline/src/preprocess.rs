//! Template preprocessing pipeline.
//!
//! Runs face detection and classification against newly registered
//! templates, persists the discovered faces and a masked variant, and
//! exposes the per-template status. Submission is an idempotent
//! compare-and-swap; pickup is a second CAS, so two runners can never
//! process the same template. Failures land in the template's
//! `error_detail` and are never retried automatically — a caller must
//! re-submit.

use std::sync::Arc;
use std::time::Duration;

use faceforge_core::error::CoreError;
use faceforge_core::face::FaceObservation;
use faceforge_core::masking::mask_faces;
use faceforge_core::types::DbId;
use faceforge_db::models::status::{PreprocessingStatus, ResourceLifetime, ResourceRole};
use faceforge_db::models::Template;
use faceforge_db::repositories::{ResourceRepo, TemplateRepo};
use faceforge_engine::FaceAnalysis;
use serde::Serialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::registry::{RegisterLifetime, ResourceRegistry};

/// Default polling interval for the preprocessing loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Read-only preprocessing status of a template.
#[derive(Debug, Serialize)]
pub struct TemplateStatusView {
    pub template_id: DbId,
    pub status: String,
    pub faces: Vec<FaceObservation>,
    pub masked_resource_id: Option<DbId>,
    pub error_detail: Option<String>,
}

/// Preprocessing pipeline over the template table.
pub struct Preprocessor {
    pool: PgPool,
    registry: Arc<ResourceRegistry>,
    analysis: Arc<dyn FaceAnalysis>,
    poll_interval: Duration,
}

impl Preprocessor {
    pub fn new(
        pool: PgPool,
        registry: Arc<ResourceRegistry>,
        analysis: Arc<dyn FaceAnalysis>,
    ) -> Self {
        Self {
            pool,
            registry,
            analysis,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Queue a template for preprocessing.
    ///
    /// `NotStarted`/`Failed` move to `Pending`; a template already
    /// `Pending` or `Processing` is left untouched and its current status
    /// is returned — calling submit twice enqueues one run, not two.
    pub async fn submit(&self, template_id: DbId) -> Result<PreprocessingStatus, PipelineError> {
        if TemplateRepo::find_by_id(&self.pool, template_id).await?.is_none() {
            return Err(CoreError::not_found("template", template_id).into());
        }

        if TemplateRepo::submit_preprocessing(&self.pool, template_id).await? {
            tracing::info!(template_id, "Template queued for preprocessing");
            return Ok(PreprocessingStatus::Pending);
        }

        // No transition: already pending, processing, or completed. Read
        // back whatever state won the race.
        let template = TemplateRepo::find_by_id(&self.pool, template_id)
            .await?
            .ok_or_else(|| CoreError::not_found("template", template_id))?;
        Ok(template
            .preprocessing_status()
            .unwrap_or(PreprocessingStatus::Failed))
    }

    /// Pure status read, available in every state.
    pub async fn status(&self, template_id: DbId) -> Result<TemplateStatusView, PipelineError> {
        let template = TemplateRepo::find_by_id(&self.pool, template_id)
            .await?
            .ok_or_else(|| CoreError::not_found("template", template_id))?;

        let status = template
            .preprocessing_status()
            .map(status_label)
            .unwrap_or("unknown");

        Ok(TemplateStatusView {
            template_id: template.id,
            status: status.to_string(),
            faces: template.face_observations().unwrap_or_default(),
            masked_resource_id: template.masked_resource_id,
            error_detail: template.error_detail,
        })
    }

    /// Administrative re-preprocess: reset to `Pending`, clearing faces,
    /// masked variant, and error atomically. The superseded masked
    /// resource is retired best-effort.
    pub async fn resubmit(&self, template_id: DbId) -> Result<PreprocessingStatus, PipelineError> {
        let previous_masked = TemplateRepo::reset_preprocessing(&self.pool, template_id)
            .await?
            .ok_or_else(|| CoreError::not_found("template", template_id))?;

        if let Some(masked_id) = previous_masked {
            // In-use or already-gone variants are left to the sweeps.
            if let Err(e) = self.registry.delete(masked_id).await {
                tracing::debug!(
                    template_id,
                    masked_id,
                    error = %e,
                    "Superseded masked variant not deleted",
                );
            }
        }

        tracing::info!(template_id, "Template reset for re-preprocessing");
        Ok(PreprocessingStatus::Pending)
    }

    /// Claim and process one pending template. Returns `false` when the
    /// queue is empty.
    pub async fn process_next(&self) -> Result<bool, PipelineError> {
        let Some(template) = TemplateRepo::claim_next_pending(&self.pool).await? else {
            return Ok(false);
        };
        self.process(template).await?;
        Ok(true)
    }

    /// Run the preprocessing loop until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Preprocessor started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Preprocessor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    loop {
                        match self.process_next().await {
                            Ok(true) => continue,
                            Ok(false) => break,
                            Err(e) => {
                                tracing::error!(error = %e, "Preprocessing cycle failed");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Process one claimed template: detect, mask, persist.
    ///
    /// Collaborator and storage errors become a `Failed` status with
    /// `error_detail`; only database errors propagate.
    async fn process(&self, template: Template) -> Result<(), PipelineError> {
        let template_id = template.id;
        tracing::info!(template_id, "Preprocessing template");

        match self.detect_and_mask(&template).await {
            Ok((faces, masked_id)) => {
                let faces_json = serde_json::to_value(&faces)
                    .unwrap_or_else(|_| serde_json::Value::Array(vec![]));
                TemplateRepo::complete_preprocessing(
                    &self.pool,
                    template_id,
                    &faces_json,
                    masked_id,
                )
                .await?;
                tracing::info!(template_id, faces = faces.len(), "Preprocessing completed");
            }
            Err(reason) => {
                TemplateRepo::fail_preprocessing(&self.pool, template_id, &reason).await?;
                tracing::warn!(template_id, reason = %reason, "Preprocessing failed");
            }
        }
        Ok(())
    }

    /// The fallible middle of preprocessing. Returns the detected faces
    /// and the masked variant's resource id, or a human-readable reason.
    async fn detect_and_mask(
        &self,
        template: &Template,
    ) -> Result<(Vec<FaceObservation>, DbId), String> {
        let original = ResourceRepo::find_by_id(&self.pool, template.original_resource_id)
            .await
            .map_err(|e| format!("failed to load original resource record: {e}"))?
            .ok_or_else(|| {
                format!(
                    "original resource {} is missing",
                    template.original_resource_id
                )
            })?;

        let bytes = self
            .registry
            .fetch_bytes(&original)
            .await
            .map_err(|e| format!("failed to read original image: {e}"))?;

        let mut faces = self
            .analysis
            .detect_and_classify(&bytes)
            .await
            .map_err(|e| e.to_string())?;

        // The detection-order position is the addressing key; enforce it
        // regardless of what the engine reported.
        for (i, face) in faces.iter_mut().enumerate() {
            face.index = i as u32;
        }

        let mut decoded = image::load_from_memory(&bytes)
            .map_err(|e| format!("failed to decode original image: {e}"))?
            .to_rgb8();

        let boxes: Vec<_> = faces.iter().map(|f| f.bbox).collect();
        mask_faces(&mut decoded, &boxes);

        let mut encoded = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(decoded)
            .write_to(&mut encoded, image::ImageFormat::Png)
            .map_err(|e| format!("failed to encode masked image: {e}"))?;

        // The masked variant inherits the original's lifetime.
        let lifetime = match original.expires_at {
            Some(at) if original.lifetime_id == ResourceLifetime::Temporary.id() => {
                RegisterLifetime::TemporaryUntil(at)
            }
            _ => RegisterLifetime::Permanent,
        };

        let masked = self
            .registry
            .register(
                &encoded.into_inner(),
                ResourceRole::TemplateMasked,
                lifetime,
                original.group_tag.clone(),
            )
            .await
            .map_err(|e| format!("failed to store masked image: {e}"))?;

        Ok((faces, masked.id))
    }
}

fn status_label(status: PreprocessingStatus) -> &'static str {
    match status {
        PreprocessingStatus::NotStarted => "not_started",
        PreprocessingStatus::Pending => "pending",
        PreprocessingStatus::Processing => "processing",
        PreprocessingStatus::Completed => "completed",
        PreprocessingStatus::Failed => "failed",
    }
}
