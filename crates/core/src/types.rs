//! Shared identifier and timestamp types.

use uuid::Uuid;

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Length of the hex portion of an externally visible uid.
const UID_HEX_LEN: usize = 16;

/// Generate an externally stable task uid, e.g. `task_9f8b2c1d4e5a6071`.
pub fn new_task_uid() -> String {
    format!("task_{}", short_hex())
}

/// Generate an externally stable batch uid, e.g. `batch_9f8b2c1d4e5a6071`.
pub fn new_batch_uid() -> String {
    format!("batch_{}", short_hex())
}

fn short_hex() -> String {
    let mut buf = Uuid::encode_buffer();
    let simple = Uuid::new_v4().simple().encode_lower(&mut buf);
    simple[..UID_HEX_LEN].to_string()
}
