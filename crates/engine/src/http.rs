//! HTTP client for the inference sidecar.
//!
//! Wraps the sidecar's two endpoints (`POST /detect`, `POST /swap`) using
//! [`reqwest`] multipart uploads. The sidecar owns the models and the GPU;
//! this client only moves encoded images.

use async_trait::async_trait;
use faceforge_core::face::FaceObservation;
use serde::Deserialize;

use crate::{EngineError, FaceAnalysis, FaceSwap};

/// HTTP client for a single engine sidecar instance.
pub struct RemoteEngine {
    client: reqwest::Client,
    base_url: String,
}

/// Response returned by the sidecar `/detect` endpoint.
#[derive(Debug, Deserialize)]
struct DetectResponse {
    faces: Vec<FaceObservation>,
}

impl RemoteEngine {
    /// Create a new client.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `http://host:8500`.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`]
    /// (connection pooling across workers).
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::Protocol {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl FaceAnalysis for RemoteEngine {
    async fn detect_and_classify(
        &self,
        image: &[u8],
    ) -> Result<Vec<FaceObservation>, EngineError> {
        let form = reqwest::multipart::Form::new().part(
            "image",
            reqwest::multipart::Part::bytes(image.to_vec()).file_name("image"),
        );

        let response = self
            .client
            .post(format!("{}/detect", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Analysis(format!("malformed detect response: {e}")))?;

        tracing::debug!(faces = parsed.faces.len(), "Engine detection finished");
        Ok(parsed.faces)
    }
}

#[async_trait]
impl FaceSwap for RemoteEngine {
    async fn swap(
        &self,
        source_face: &[u8],
        target_image: &[u8],
        target_face_index: u32,
    ) -> Result<Vec<u8>, EngineError> {
        let form = reqwest::multipart::Form::new()
            .part(
                "source_face",
                reqwest::multipart::Part::bytes(source_face.to_vec()).file_name("source_face"),
            )
            .part(
                "target",
                reqwest::multipart::Part::bytes(target_image.to_vec()).file_name("target"),
            )
            .text("target_face_index", target_face_index.to_string());

        let response = self
            .client
            .post(format!("{}/swap", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(EngineError::Swap("engine returned an empty image".into()));
        }

        tracing::debug!(
            target_face_index,
            bytes = bytes.len(),
            "Engine swap finished",
        );
        Ok(bytes.to_vec())
    }
}
