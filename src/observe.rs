//! Observer trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as
//! the pipeline advances through its stages.
//!
//! The trait is `Send + Sync` because stage work may execute on a
//! blocking-pool thread. All methods have default no-op implementations so
//! callers only override what they care about.

use crate::error::RowDefect;
use crate::run::Stage;
use std::sync::Arc;

/// Called by the pipeline as it advances through stages.
pub trait PipelineObserver: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage completes, with a short human-readable detail
    /// (discovered URL, bytes downloaded, row count, output path).
    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        let _ = (stage, detail);
    }

    /// Called once per dropped or rejected row during normalization.
    fn on_row_defect(&self, defect: &RowDefect) {
        let _ = defect;
    }

    /// Called when a stage fails; the pipeline terminates after this.
    fn on_failure(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type Observer = Arc<dyn PipelineObserver>;
