//! Stored image records.

use faceforge_core::retention::Lifetime;
use faceforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{ResourceLifetime, StatusId};

/// A row from the `resources` table. One row per stored image, regardless
/// of the role it plays.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Resource {
    pub id: DbId,
    pub storage_key: String,
    pub width: i32,
    pub height: i32,
    pub byte_size: i64,
    pub lifetime_id: StatusId,
    /// Set iff the lifetime is temporary.
    pub expires_at: Option<Timestamp>,
    /// Opaque grouping key, e.g. an upload session.
    pub group_tag: Option<String>,
    pub role_id: StatusId,
    pub created_at: Timestamp,
}

impl Resource {
    /// Domain lifetime; unknown ids are treated as permanent (never swept).
    pub fn lifetime(&self) -> Lifetime {
        ResourceLifetime::try_from_id(self.lifetime_id)
            .map(ResourceLifetime::as_domain)
            .unwrap_or(Lifetime::Permanent)
    }
}

/// Insert payload for a new resource record.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub storage_key: String,
    pub width: i32,
    pub height: i32,
    pub byte_size: i64,
    pub lifetime_id: StatusId,
    pub expires_at: Option<Timestamp>,
    pub group_tag: Option<String>,
    pub role_id: StatusId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn unknown_lifetime_id_defaults_to_permanent() {
        let resource = Resource {
            id: 1,
            storage_key: "k".into(),
            width: 1,
            height: 1,
            byte_size: 1,
            lifetime_id: 42,
            expires_at: None,
            group_tag: None,
            role_id: 1,
            created_at: Utc::now(),
        };
        assert_eq!(resource.lifetime(), Lifetime::Permanent);
    }
}
