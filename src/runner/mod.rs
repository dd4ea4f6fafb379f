//! Episode runs on disk: single runs, experiment batches, and summaries.

pub mod experiment;
pub mod report;
pub mod trace;

pub use experiment::{
    new_run_id, run_agent, run_experiments, run_single, sanitize_model_name, ExperimentFile,
    ExperimentSpec, RunSummaryRow,
};
pub use report::{aggregate_summaries, summarize_by_model, ExperimentReport, ModelStats};
pub use trace::{JsonlTraceWriter, TraceMeta};

use crate::sim::decider::AgentError;
use crate::sim::error::{ConfigError, SimError};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error("invalid experiment: {0}")]
    Experiment(String),
}

pub(crate) fn io_at(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> RunError + '_ {
    move |source| RunError::Io {
        path: path.display().to_string(),
        source,
    }
}
