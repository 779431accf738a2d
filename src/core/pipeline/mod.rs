//! Build pipeline orchestration and reporting

pub mod runner;
pub mod summary;

pub use runner::{BuildPipeline, PipelineOptions};
pub use summary::{BuildOutcome, BuildSummary};
