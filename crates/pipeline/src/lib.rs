//! Orchestration layer: preprocessing, task execution, batch fan-out, and
//! retention sweeps.
//!
//! Everything here composes the leaf crates: domain rules from
//! `faceforge-core`, persistence from `faceforge-db`, blobs from
//! `faceforge-store`, and the inference sidecar from `faceforge-engine`.

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod preprocess;
pub mod registry;
pub mod sweeper;

pub use error::PipelineError;
