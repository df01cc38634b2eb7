//! Capture-classify-persist pipeline for waste tracking.
//!
//! The crate owns the sequence from "user requests a capture" through
//! classification to a durably stored history entry, plus the read-only
//! aggregation over that history. The presentation layer is an external
//! collaborator: it drives the [`Coordinator`] API and consumes its
//! broadcast [`PipelineEvent`]s.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::PipelineConfig;
pub use error::{AppError, Result};
pub use models::category::{Category, CategoryInfo};
pub use models::entry::{ArtifactRef, ClassificationResult, Entry};
pub use models::stats_types::{CategoryCount, DayBucket, Stats};
pub use services::artifact_store::ArtifactStore;
pub use services::capture::{CaptureDevice, CaptureSession, DirectoryCaptureDevice, SessionState};
pub use services::classifier::Classifier;
pub use services::coordinator::{Coordinator, PipelineEvent, PipelineState};
pub use services::db::EntryStore;
pub use services::stats;
