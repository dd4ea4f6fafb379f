use std::path::{Path, PathBuf};

use chrono::Local;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::agent::AgentSpec;
use crate::runner::report::{write_report, ExperimentReport, RunMetadata};
use crate::runner::trace::{JsonlTraceWriter, TraceMeta};
use crate::runner::{io_at, RunError};
use crate::sim::config::Config;
use crate::sim::decider::Decider;
use crate::sim::engine::{DiscardTrace, EpisodeResult, Simulator};

// ---------------------------------------------------------------------------
// Experiment files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentFile {
    pub experiments: Vec<ExperimentSpec>,
}

/// One grid of runs: every model against every seed, `replicas` times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSpec {
    /// Scenario file. The built-in stall when absent.
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    #[serde(default = "default_seeds")]
    pub seeds: Vec<u64>,
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    #[serde(default = "default_models")]
    pub models: Vec<AgentSpec>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_seeds() -> Vec<u64> {
    vec![42]
}

fn default_replicas() -> usize {
    1
}

fn default_models() -> Vec<AgentSpec> {
    vec![AgentSpec::Heuristic]
}

fn default_max_concurrency() -> usize {
    4
}

impl ExperimentSpec {
    pub fn load_config(&self) -> Result<Config, RunError> {
        match &self.config_path {
            Some(path) => Ok(Config::load(path)?),
            None => Ok(Config::builtin()?),
        }
    }

    pub fn total_runs(&self) -> usize {
        self.models.len() * self.seeds.len() * self.replicas
    }
}

impl ExperimentFile {
    pub fn load(path: &Path) -> Result<Self, RunError> {
        let raw = std::fs::read_to_string(path).map_err(io_at(path))?;
        let file: ExperimentFile = serde_json::from_str(&raw)?;
        for (i, exp) in file.experiments.iter().enumerate() {
            if exp.seeds.is_empty() || exp.models.is_empty() || exp.replicas == 0 {
                return Err(RunError::Experiment(format!(
                    "experiment {i} needs at least one seed, one model and one replica"
                )));
            }
        }
        Ok(file)
    }
}

// ---------------------------------------------------------------------------
// Single runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummaryRow {
    pub run_id: String,
    /// `provider/model`, or `heuristic`.
    pub model: String,
    pub reasoning_effort: Option<String>,
    pub seed: u64,
    pub replica: usize,
    pub cash_final: Option<f64>,
    pub tool_calls: Option<u64>,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub cost_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummaryRow {
    fn failed(spec: &AgentSpec, seed: u64, replica: usize, error: String) -> Self {
        Self {
            run_id: "error".to_string(),
            model: model_key(spec),
            reasoning_effort: spec.reasoning_effort().map(str::to_string),
            seed,
            replica,
            cash_final: None,
            tool_calls: None,
            tokens_in: None,
            tokens_out: None,
            cost_total: None,
            trace_file: None,
            error: Some(error),
        }
    }
}

fn model_key(spec: &AgentSpec) -> String {
    match spec.provider() {
        Some(provider) => format!("{provider}/{}", spec.label()),
        None => spec.label(),
    }
}

/// `YYYYmmdd-HHMMSS-xxxxxx`, unique across concurrent runs.
pub fn new_run_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Local::now().format("%Y%m%d-%H%M%S"), &suffix[..6])
}

/// Keeps alphanumerics, `-`, `_` and `.`; everything else becomes `_`.
pub fn sanitize_model_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RunError> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).map_err(io_at(path))
}

/// Plays one episode with an already-built agent.
///
/// With an output directory it writes `<run_id>_config.json`,
/// `<model>_<run_id>.jsonl` and `<run_id>_metrics.json`; without one the
/// trace is discarded.
pub async fn run_agent<D: Decider>(
    config: &Config,
    spec: &AgentSpec,
    agent: &mut D,
    seed: u64,
    out_dir: Option<&Path>,
) -> Result<RunSummaryRow, RunError> {
    let mut config = config.clone();
    config.seed = seed;
    let run_id = new_run_id();
    let mut sim = Simulator::new(config);

    let (result, trace_file): (EpisodeResult, Option<PathBuf>) = match out_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(io_at(dir))?;
            write_json(&dir.join(format!("{run_id}_config.json")), sim.config())?;

            let model = spec.label();
            let trace_path = dir.join(format!("{}_{run_id}.jsonl", sanitize_model_name(&model)));
            let provider = spec.provider().map_or_else(|| model.clone(), str::to_string);
            let meta = TraceMeta::new(
                model,
                provider,
                spec.reasoning_effort().map(str::to_string),
                run_id.clone(),
                seed,
            );
            let mut writer = JsonlTraceWriter::create(&trace_path, &meta)?;
            let result = sim.run_episode(agent, &mut writer).await?;
            write_json(&dir.join(format!("{run_id}_metrics.json")), &result)?;
            (result, Some(trace_path))
        }
        None => (sim.run_episode(agent, &mut DiscardTrace).await?, None),
    };

    Ok(RunSummaryRow {
        run_id: format!("{run_id}-{seed}"),
        model: model_key(spec),
        reasoning_effort: spec.reasoning_effort().map(str::to_string),
        seed,
        replica: 0,
        cash_final: Some(result.cash_final),
        tool_calls: Some(result.tool_calls_total),
        tokens_in: Some(result.tokens_in_total),
        tokens_out: Some(result.tokens_out_total),
        cost_total: Some(result.cost_total),
        trace_file: trace_file.map(|p| p.display().to_string()),
        error: None,
    })
}

/// Builds the agent described by `spec` and plays one recorded episode.
pub async fn run_single(
    config: &Config,
    spec: &AgentSpec,
    seed: u64,
    out_dir: &Path,
) -> Result<RunSummaryRow, RunError> {
    let mut agent = spec.build()?;
    run_agent(config, spec, &mut agent, seed, Some(out_dir)).await
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

struct PlannedRun {
    config: Config,
    spec: AgentSpec,
    seed: u64,
    replica: usize,
}

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message("episodes");
    pb
}

async fn execute_planned(run: PlannedRun, out_dir: &Path) -> RunSummaryRow {
    if run.spec == AgentSpec::Human {
        return RunSummaryRow::failed(
            &run.spec,
            run.seed,
            run.replica,
            "human agents cannot run in a batch".to_string(),
        );
    }
    match run_single(&run.config, &run.spec, run.seed, out_dir).await {
        Ok(row) => RunSummaryRow {
            replica: run.replica,
            ..row
        },
        Err(error) => {
            tracing::warn!(model = %model_key(&run.spec), seed = run.seed, %error, "run failed");
            RunSummaryRow::failed(&run.spec, run.seed, run.replica, error.to_string())
        }
    }
}

/// Runs every experiment in `spec_path` under `out_root/<timestamp>/` and
/// writes `summary.json` there. Failed runs become error rows.
pub async fn run_experiments(
    spec_path: &Path,
    out_root: &Path,
) -> Result<(PathBuf, ExperimentReport), RunError> {
    let file = ExperimentFile::load(spec_path)?;
    let out_dir = out_root.join(Local::now().format("%Y%m%d-%H%M%S").to_string());
    std::fs::create_dir_all(&out_dir).map_err(io_at(&out_dir))?;
    let spec_copy = out_dir.join("experiments.json");
    std::fs::copy(spec_path, &spec_copy).map_err(io_at(&spec_copy))?;

    let total: usize = file.experiments.iter().map(ExperimentSpec::total_runs).sum();
    let pb = progress_bar(total);
    tracing::info!(total, out_dir = %out_dir.display(), "starting experiments");

    let mut rows = Vec::with_capacity(total);
    for exp in &file.experiments {
        let config = exp.load_config()?;
        let mut planned = Vec::with_capacity(exp.total_runs());
        for spec in &exp.models {
            for &seed in &exp.seeds {
                for replica in 0..exp.replicas {
                    planned.push(PlannedRun {
                        config: config.clone(),
                        spec: spec.clone(),
                        seed,
                        replica,
                    });
                }
            }
        }

        let limit = exp.max_concurrency.max(1);
        let out_dir = out_dir.as_path();
        let pb = &pb;
        tracing::debug!(runs = planned.len(), limit, "experiment grid expanded");
        let finished: Vec<RunSummaryRow> = stream::iter(planned)
            .map(|run| async move {
                let row = execute_planned(run, out_dir).await;
                pb.inc(1);
                row
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        rows.extend(finished);
    }
    pb.finish_with_message("complete");

    rows.sort_by(|a, b| {
        (a.model.as_str(), a.seed, a.replica).cmp(&(b.model.as_str(), b.seed, b.replica))
    });
    let report = ExperimentReport {
        metadata: RunMetadata::new(spec_path, &rows),
        rows,
    };
    write_report(&out_dir.join("summary.json"), &report)?;
    Ok((out_dir, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_are_safe_for_file_names() {
        assert_eq!(sanitize_model_name("gpt-5.1-mini"), "gpt-5.1-mini");
        assert_eq!(sanitize_model_name("models/gemini 2.5:pro"), "models_gemini_2.5_pro");
    }

    #[test]
    fn run_ids_have_timestamp_and_suffix() {
        let id = new_run_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 6);
        assert_ne!(new_run_id(), id);
    }

    #[test]
    fn experiment_defaults_fill_missing_fields() {
        let file: ExperimentFile =
            serde_json::from_str(r#"{"experiments": [{}]}"#).expect("valid file");
        let exp = &file.experiments[0];
        assert_eq!(exp.seeds, vec![42]);
        assert_eq!(exp.replicas, 1);
        assert_eq!(exp.models, vec![AgentSpec::Heuristic]);
        assert_eq!(exp.total_runs(), 1);
    }

    #[tokio::test]
    async fn run_single_writes_config_trace_and_metrics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::builtin().expect("builtin");
        config.num_turns = 3;
        let row = run_single(&config, &AgentSpec::Heuristic, 7, dir.path())
            .await
            .expect("run succeeds");
        assert!(row.run_id.ends_with("-7"));
        assert_eq!(row.model, "heuristic");

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 3);
        assert!(names.iter().any(|n| n.ends_with("_config.json")));
        assert!(names.iter().any(|n| n.ends_with("_metrics.json")));
        let trace = names
            .iter()
            .find(|n| n.starts_with("heuristic_") && n.ends_with(".jsonl"))
            .expect("trace file");
        let text = std::fs::read_to_string(dir.path().join(trace)).expect("trace");
        assert_eq!(text.lines().count(), 4);
    }
}
