//! Engine orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{load_blueprint, Pipeline, PipelineConfig};
pub use stats::PipelineStats;
