//! Retention decisions and sweep reporting.
//!
//! Pure eligibility logic for the cleanup sweeper. Whether a candidate is
//! actually protected by an active task is a database question answered by
//! the repository layer; this module only decides ages and shapes reports.

use serde::Serialize;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Lifetime
// ---------------------------------------------------------------------------

/// Ownership lifetime of a stored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Permanent,
    Temporary,
}

/// Whether a resource is an expiry candidate at `now`.
///
/// Permanent resources never expire. A temporary resource without an
/// `expires_at` is treated as not yet expired.
pub fn is_expired(lifetime: Lifetime, expires_at: Option<Timestamp>, now: Timestamp) -> bool {
    match (lifetime, expires_at) {
        (Lifetime::Temporary, Some(at)) => at < now,
        _ => false,
    }
}

/// Whether a terminal task's result is stale relative to `cutoff`.
pub fn is_stale(completed_at: Option<Timestamp>, cutoff: Timestamp) -> bool {
    matches!(completed_at, Some(at) if at < cutoff)
}

// ---------------------------------------------------------------------------
// Sweep reports
// ---------------------------------------------------------------------------

/// A single item the sweep could not process. The sweep continues past it.
/// `subject` is the resource id for record-backed items, or the storage
/// key for orphaned blobs.
#[derive(Debug, Clone, Serialize)]
pub struct SweepItemError {
    pub subject: String,
    pub reason: String,
}

/// Outcome of one sweep operation. In dry-run mode the counts describe
/// what *would* have been deleted.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub deleted_count: u32,
    pub reclaimed_bytes: i64,
    pub errors: Vec<SweepItemError>,
    pub dry_run: bool,
}

impl SweepReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            deleted_count: 0,
            reclaimed_bytes: 0,
            errors: Vec::new(),
            dry_run,
        }
    }

    /// Record one deleted (or would-be-deleted) item of `bytes` size.
    pub fn record_deleted(&mut self, bytes: i64) {
        self.deleted_count += 1;
        self.reclaimed_bytes += bytes.max(0);
    }

    /// Record a per-item failure without aborting the sweep.
    pub fn record_error(&mut self, subject: impl ToString, reason: impl Into<String>) {
        self.errors.push(SweepItemError {
            subject: subject.to_string(),
            reason: reason.into(),
        });
    }
}

/// Human-readable byte formatting for sweep logs.
pub fn format_bytes(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.2} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
