use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::runner::experiment::RunSummaryRow;
use crate::runner::{io_at, RunError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub schema_version: u32,
    pub generated_at: String,
    pub experiments_file: String,
    pub total_runs: usize,
    pub failed_runs: usize,
}

impl RunMetadata {
    pub fn new(experiments_file: &Path, rows: &[RunSummaryRow]) -> Self {
        Self {
            schema_version: 1,
            generated_at: Utc::now().to_rfc3339(),
            experiments_file: experiments_file.display().to_string(),
            total_runs: rows.len(),
            failed_runs: rows.iter().filter(|r| r.error.is_some()).count(),
        }
    }
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub metadata: RunMetadata,
    pub rows: Vec<RunSummaryRow>,
}

pub fn write_report(path: &Path, report: &ExperimentReport) -> Result<(), RunError> {
    let body = serde_json::to_string_pretty(report)?;
    std::fs::write(path, body).map_err(io_at(path))
}

/// Collects the rows of every `<root>/*/summary.json`, oldest batch first.
pub fn aggregate_summaries(root: &Path) -> Result<Vec<RunSummaryRow>, RunError> {
    let mut batches: Vec<_> = std::fs::read_dir(root)
        .map_err(io_at(root))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.join("summary.json").is_file())
        .collect();
    batches.sort();

    let mut rows = Vec::new();
    for dir in batches {
        let path = dir.join("summary.json");
        let raw = std::fs::read_to_string(&path).map_err(io_at(&path))?;
        let report: ExperimentReport = serde_json::from_str(&raw)?;
        rows.extend(report.rows);
    }
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub model: String,
    pub runs: usize,
    pub failed: usize,
    pub mean_cash: f64,
    pub min_cash: f64,
    pub max_cash: f64,
    pub mean_cost: f64,
}

/// Per-model cash and cost over the successful runs.
pub fn summarize_by_model(rows: &[RunSummaryRow]) -> Vec<ModelStats> {
    let mut grouped: BTreeMap<&str, Vec<&RunSummaryRow>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.model.as_str()).or_default().push(row);
    }

    grouped
        .into_iter()
        .map(|(model, rows)| {
            let cash: Vec<f64> = rows.iter().filter_map(|r| r.cash_final).collect();
            let costs: Vec<f64> = rows.iter().filter_map(|r| r.cost_total).collect();
            let mean = |values: &[f64]| {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            };
            ModelStats {
                model: model.to_string(),
                runs: rows.len(),
                failed: rows.iter().filter(|r| r.error.is_some()).count(),
                mean_cash: mean(&cash),
                min_cash: cash.iter().copied().reduce(f64::min).unwrap_or(0.0),
                max_cash: cash.iter().copied().reduce(f64::max).unwrap_or(0.0),
                mean_cost: mean(&costs),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(model: &str, cash: Option<f64>) -> RunSummaryRow {
        RunSummaryRow {
            run_id: "r".into(),
            model: model.into(),
            reasoning_effort: None,
            seed: 42,
            replica: 0,
            cash_final: cash,
            tool_calls: cash.map(|_| 10),
            tokens_in: Some(0),
            tokens_out: Some(0),
            cost_total: cash.map(|_| 0.5),
            trace_file: None,
            error: cash.is_none().then(|| "boom".to_string()),
        }
    }

    #[test]
    fn stats_skip_failed_runs() {
        let rows = vec![
            row("heuristic", Some(100.0)),
            row("heuristic", Some(300.0)),
            row("heuristic", None),
            row("openai/gpt-5", Some(50.0)),
        ];
        let stats = summarize_by_model(&rows);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].model, "heuristic");
        assert_eq!(stats[0].runs, 3);
        assert_eq!(stats[0].failed, 1);
        assert_eq!(stats[0].mean_cash, 200.0);
        assert_eq!(stats[0].min_cash, 100.0);
        assert_eq!(stats[0].max_cash, 300.0);
        assert_eq!(stats[1].mean_cost, 0.5);
    }

    #[test]
    fn aggregates_every_batch_under_root() {
        let root = tempfile::tempdir().expect("tempdir");
        for (batch, model) in [("20250101-100000", "a"), ("20250102-100000", "b")] {
            let dir = root.path().join(batch);
            std::fs::create_dir_all(&dir).expect("mkdir");
            let rows = vec![row(model, Some(1.0))];
            let report = ExperimentReport {
                metadata: RunMetadata::new(Path::new("experiments.json"), &rows),
                rows,
            };
            write_report(&dir.join("summary.json"), &report).expect("write");
        }
        std::fs::create_dir_all(root.path().join("empty")).expect("mkdir");

        let rows = aggregate_summaries(root.path()).expect("aggregate");
        let models: Vec<&str> = rows.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(models, vec!["a", "b"]);
    }
}
