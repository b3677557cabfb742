//! Pure domain logic for the faceforge orchestration backend.
//!
//! This crate carries no I/O and no internal dependencies: identifiers,
//! the face/mapping model, the task and batch state machines, the masking
//! policy, and retention decisions. All data access lives in
//! `faceforge-db`; all blob and engine traffic lives in `faceforge-store`
//! and `faceforge-engine`.

pub mod batch;
pub mod clock;
pub mod error;
pub mod face;
pub mod mapping;
pub mod masking;
pub mod retention;
pub mod task;
pub mod types;

pub use error::CoreError;
