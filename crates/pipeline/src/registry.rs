//! Resource registry: the write path for stored images.
//!
//! Pairs every blob with a `resources` row. Registration decodes the
//! image once for dimensions, content-hashes the bytes into a storage
//! key, and writes blob-then-record; deletion is record-then-blob behind
//! the active-use check, so a crash between the two steps can only leave
//! an orphaned blob for the orphan sweep, never a dangling record.

use std::sync::Arc;

use faceforge_core::error::CoreError;
use faceforge_core::types::{DbId, Timestamp};
use faceforge_db::models::status::{ResourceLifetime, ResourceRole};
use faceforge_db::models::{NewResource, Resource};
use faceforge_db::repositories::{DeleteOutcome, ResourceRepo};
use faceforge_store::{keys, BlobStore, StoreError};
use sqlx::PgPool;

use crate::error::PipelineError;

/// Lifetime requested at registration.
#[derive(Debug, Clone, Copy)]
pub enum RegisterLifetime {
    Permanent,
    TemporaryUntil(Timestamp),
}

/// Registry over the resource table and the blob store.
pub struct ResourceRegistry {
    pool: PgPool,
    store: Arc<dyn BlobStore>,
}

impl ResourceRegistry {
    pub fn new(pool: PgPool, store: Arc<dyn BlobStore>) -> Self {
        Self { pool, store }
    }

    /// Store an uploaded image and create its record.
    ///
    /// Rejects bytes that do not decode as a supported image format.
    pub async fn register(
        &self,
        bytes: &[u8],
        role: ResourceRole,
        lifetime: RegisterLifetime,
        group_tag: Option<String>,
    ) -> Result<Resource, PipelineError> {
        let format = image::guess_format(bytes)
            .map_err(|_| CoreError::Validation("unrecognized image format".into()))?;
        let ext = extension_for(format)?;
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| CoreError::Validation(format!("corrupt image: {e}")))?;
        let (width, height) = (decoded.width() as i32, decoded.height() as i32);

        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let key = keys::storage_key(role_prefix(role), bytes, &nonce[..8], ext);

        self.store.put(&key, bytes).await?;

        let (lifetime_id, expires_at) = match lifetime {
            RegisterLifetime::Permanent => (ResourceLifetime::Permanent.id(), None),
            RegisterLifetime::TemporaryUntil(at) => (ResourceLifetime::Temporary.id(), Some(at)),
        };

        let resource = ResourceRepo::insert(
            &self.pool,
            &NewResource {
                storage_key: key.clone(),
                width,
                height,
                byte_size: bytes.len() as i64,
                lifetime_id,
                expires_at,
                group_tag,
                role_id: role.id(),
            },
        )
        .await;

        match resource {
            Ok(resource) => {
                tracing::info!(
                    resource_id = resource.id,
                    key = %key,
                    width,
                    height,
                    "Resource registered",
                );
                Ok(resource)
            }
            Err(e) => {
                // The record is authoritative; without it the blob is an
                // orphan. Best effort removal, orphan sweep as backstop.
                if let Err(del) = self.store.delete(&key).await {
                    tracing::warn!(key = %key, error = %del, "Failed to roll back blob after insert error");
                }
                Err(e.into())
            }
        }
    }

    /// Fetch a resource record, or `NotFound`.
    pub async fn get(&self, id: DbId) -> Result<Resource, PipelineError> {
        ResourceRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| CoreError::not_found("resource", id).into())
    }

    /// Fetch a resource's bytes from the blob store.
    pub async fn fetch_bytes(&self, resource: &Resource) -> Result<Vec<u8>, StoreError> {
        self.store.get(&resource.storage_key).await
    }

    /// Promote a temporary resource to permanent.
    pub async fn mark_permanent(&self, id: DbId) -> Result<(), PipelineError> {
        if !ResourceRepo::mark_permanent(&self.pool, id).await? {
            return Err(CoreError::not_found("resource", id).into());
        }
        Ok(())
    }

    /// Delete a resource unless a pending/running task still references
    /// it, in which case the caller gets a `Conflict` and may retry later.
    pub async fn delete(&self, id: DbId) -> Result<Resource, PipelineError> {
        match ResourceRepo::delete_if_unreferenced(&self.pool, id).await? {
            DeleteOutcome::Deleted(resource) => {
                match self.store.delete(&resource.storage_key).await {
                    Ok(()) | Err(StoreError::NotFound(_)) => {}
                    Err(e) => {
                        tracing::warn!(
                            resource_id = resource.id,
                            key = %resource.storage_key,
                            error = %e,
                            "Record removed but blob delete failed; orphan sweep will retry",
                        );
                    }
                }
                Ok(resource)
            }
            DeleteOutcome::InUse { active_tasks } => Err(CoreError::Conflict(format!(
                "resource {id} is referenced by {active_tasks} active task(s)"
            ))
            .into()),
            DeleteOutcome::NotFound => Err(CoreError::not_found("resource", id).into()),
        }
    }
}

/// Storage prefix per resource role.
fn role_prefix(role: ResourceRole) -> &'static str {
    match role {
        ResourceRole::SourcePhoto => "photos",
        ResourceRole::TemplateOriginal => "templates",
        ResourceRole::TemplateMasked => "preprocessed",
        ResourceRole::Result => "results",
    }
}

fn extension_for(format: image::ImageFormat) -> Result<&'static str, CoreError> {
    match format {
        image::ImageFormat::Png => Ok("png"),
        image::ImageFormat::Jpeg => Ok("jpg"),
        image::ImageFormat::WebP => Ok("webp"),
        other => Err(CoreError::Validation(format!(
            "unsupported image format: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_prefixes_are_distinct() {
        let prefixes = [
            role_prefix(ResourceRole::SourcePhoto),
            role_prefix(ResourceRole::TemplateOriginal),
            role_prefix(ResourceRole::TemplateMasked),
            role_prefix(ResourceRole::Result),
        ];
        let mut unique = prefixes.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), prefixes.len());
    }

    #[test]
    fn only_decodable_formats_have_extensions() {
        assert_eq!(extension_for(image::ImageFormat::Png).unwrap(), "png");
        assert_eq!(extension_for(image::ImageFormat::Jpeg).unwrap(), "jpg");
        assert_eq!(extension_for(image::ImageFormat::WebP).unwrap(), "webp");
        assert!(extension_for(image::ImageFormat::Gif).is_err());
    }
}
