//! External face-analysis and face-swap collaborators.
//!
//! The orchestrator never runs inference in-process. Detection,
//! classification, and swapping are delegated to an engine sidecar behind
//! the [`FaceAnalysis`] and [`FaceSwap`] traits; the HTTP implementation
//! lives in [`http`]. Engine failures never cross the pipeline boundary —
//! they become `Failed` states on the owning template or task.

pub mod http;

use async_trait::async_trait;
use faceforge_core::face::FaceObservation;

/// Errors from an engine collaborator.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Face detection/classification failed on the engine side.
    #[error("face analysis failed: {0}")]
    Analysis(String),

    /// A swap operation failed on the engine side.
    #[error("face swap failed: {0}")]
    Swap(String),

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("engine request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("engine error ({status}): {body}")]
    Protocol { status: u16, body: String },
}

/// Face detection and gender classification.
#[async_trait]
pub trait FaceAnalysis: Send + Sync {
    /// Detect every face in an encoded image, in stable detection order.
    async fn detect_and_classify(
        &self,
        image: &[u8],
    ) -> Result<Vec<FaceObservation>, EngineError>;
}

/// Single-face swap against a target image.
#[async_trait]
pub trait FaceSwap: Send + Sync {
    /// Swap `source_face` (an encoded face crop) onto face slot
    /// `target_face_index` of the encoded `target_image`, returning the
    /// encoded result image.
    async fn swap(
        &self,
        source_face: &[u8],
        target_image: &[u8],
        target_face_index: u32,
    ) -> Result<Vec<u8>, EngineError>;
}
