use std::path::PathBuf;

use stall_sim_lib::agent::AgentSpec;
use stall_sim_lib::runner::{
    aggregate_summaries, run_agent, run_experiments, summarize_by_model, ModelStats,
    RunSummaryRow,
};
use stall_sim_lib::sim::Config;
use stall_sim_lib::{init_tracing, DEFAULT_LOG_FILTER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    RunExperiments,
    Aggregate,
    ShowConfig,
}

impl Command {
    fn from_arg(value: &str) -> Result<Self, String> {
        match value {
            "play" => Ok(Self::Play),
            "run-experiments" => Ok(Self::RunExperiments),
            "aggregate" => Ok(Self::Aggregate),
            "show-config" => Ok(Self::ShowConfig),
            _ => Err(format!(
                "unknown command '{value}'. Use play, run-experiments, aggregate, or show-config"
            )),
        }
    }
}

#[derive(Debug)]
struct Options {
    command: Command,
    config_path: Option<PathBuf>,
    seed: Option<u64>,
    agent: AgentSpec,
    reasoning_effort: Option<String>,
    write_trace: bool,
    runs_dir: PathBuf,
    experiments_path: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            command: Command::Play,
            config_path: None,
            seed: None,
            agent: AgentSpec::Heuristic,
            reasoning_effort: None,
            write_trace: true,
            runs_dir: PathBuf::from("runs"),
            experiments_path: PathBuf::from("experiments.json"),
        }
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    if let Err(error) = run().await {
        eprintln!("stall-sim failed: {error}");
        std::process::exit(1);
    }
}

/// Reads `--flag value` or `--flag=value`. Returns `None` when `arg` is a
/// different flag.
fn flag_value(
    arg: &str,
    flag: &str,
    args: &mut impl Iterator<Item = String>,
) -> Option<Result<String, String>> {
    if let Some(value) = arg.strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
        return Some(Ok(value.to_string()));
    }
    if arg == flag {
        return Some(args.next().ok_or_else(|| format!("{flag} requires a value")));
    }
    None
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut args = raw.into_iter();
    let mut command_seen = false;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Ok(None);
        }
        if arg == "--no-trace" {
            options.write_trace = false;
            continue;
        }
        if let Some(value) = flag_value(&arg, "--config", &mut args) {
            options.config_path = Some(PathBuf::from(value?));
            continue;
        }
        if let Some(value) = flag_value(&arg, "--seed", &mut args) {
            let value = value?;
            options.seed = Some(
                value
                    .parse()
                    .map_err(|_| format!("invalid --seed value '{value}'"))?,
            );
            continue;
        }
        if let Some(value) = flag_value(&arg, "--agent", &mut args) {
            options.agent = value?.parse()?;
            continue;
        }
        if let Some(value) = flag_value(&arg, "--reasoning-effort", &mut args) {
            options.reasoning_effort = Some(value?);
            continue;
        }
        if let Some(value) = flag_value(&arg, "--runs-dir", &mut args) {
            options.runs_dir = PathBuf::from(value?);
            continue;
        }
        if let Some(value) = flag_value(&arg, "--out", &mut args) {
            options.runs_dir = PathBuf::from(value?);
            continue;
        }
        if let Some(value) = flag_value(&arg, "--experiments", &mut args) {
            options.experiments_path = PathBuf::from(value?);
            continue;
        }
        if !arg.starts_with('-') && !command_seen {
            options.command = Command::from_arg(&arg)?;
            command_seen = true;
            continue;
        }
        return Err(format!("unknown argument '{arg}'. Use --help for usage"));
    }

    if options.reasoning_effort.is_some() {
        options.agent = options.agent.with_reasoning_effort(options.reasoning_effort.clone());
    }
    Ok(Some(options))
}

fn load_config(options: &Options) -> Result<Config, String> {
    let config = match &options.config_path {
        Some(path) => Config::load(path),
        None => Config::builtin(),
    };
    config.map_err(|error| format!("failed to load config: {error}"))
}

async fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1))? else {
        print_help();
        return Ok(());
    };

    // Keep the terminal readable for a human player.
    if options.command == Command::Play && options.agent == AgentSpec::Human {
        init_tracing("warn");
    } else {
        init_tracing(DEFAULT_LOG_FILTER);
    }

    match options.command {
        Command::ShowConfig => {
            let config = load_config(&options)?;
            let body = serde_json::to_string_pretty(&config)
                .map_err(|error| format!("failed to serialize config: {error}"))?;
            println!("{body}");
        }
        Command::Play => {
            let config = load_config(&options)?;
            let seed = options.seed.unwrap_or(config.seed);
            let mut agent = options
                .agent
                .build()
                .map_err(|error| format!("failed to build agent: {error}"))?;
            let out_dir = options.write_trace.then_some(options.runs_dir.as_path());
            let row = run_agent(&config, &options.agent, &mut agent, seed, out_dir)
                .await
                .map_err(|error| error.to_string())?;
            print_run(&row);
        }
        Command::RunExperiments => {
            let (out_dir, report) =
                run_experiments(&options.experiments_path, &options.runs_dir)
                    .await
                    .map_err(|error| error.to_string())?;
            print_stats(&summarize_by_model(&report.rows));
            println!("\nSaved experiment output to {}", out_dir.display());
        }
        Command::Aggregate => {
            let rows = aggregate_summaries(&options.runs_dir).map_err(|error| error.to_string())?;
            println!("{} runs under {}", rows.len(), options.runs_dir.display());
            print_stats(&summarize_by_model(&rows));
        }
    }
    Ok(())
}

fn print_run(row: &RunSummaryRow) {
    println!("\nRun {} ({}, seed {})", row.run_id, row.model, row.seed);
    println!("  final cash:  {:.2} EUR", row.cash_final.unwrap_or_default());
    println!("  tool calls:  {}", row.tool_calls.unwrap_or_default());
    println!(
        "  tokens:      {} in / {} out",
        row.tokens_in.unwrap_or_default(),
        row.tokens_out.unwrap_or_default()
    );
    println!("  model cost:  {:.4} EUR", row.cost_total.unwrap_or_default());
    if let Some(trace) = &row.trace_file {
        println!("  trace:       {trace}");
    }
}

fn print_stats(stats: &[ModelStats]) {
    println!(
        "\n{:<40} {:>5} {:>7} {:>12} {:>12} {:>12} {:>10}",
        "model", "runs", "failed", "mean cash", "min cash", "max cash", "mean cost"
    );
    for s in stats {
        println!(
            "{:<40} {:>5} {:>7} {:>12.2} {:>12.2} {:>12.2} {:>10.4}",
            s.model, s.runs, s.failed, s.mean_cash, s.min_cash, s.max_cash, s.mean_cost
        );
    }
}

fn print_help() {
    println!(
        "stall-sim\n\n\
Usage:\n  stall-sim <command> [options]\n\n\
Commands:\n\
  play              Play one episode (default)\n\
  run-experiments   Run every experiment in an experiments file\n\
  aggregate         Summarize every batch under the runs directory\n\
  show-config       Print the effective scenario configuration\n\n\
Options:\n\
  --config <path>               Scenario JSON (default: built-in stall)\n\
  --seed <n>                    Override the scenario seed\n\
  --agent <spec>                heuristic | human | <provider>/<model> (default: heuristic)\n\
  --reasoning-effort <value>    Passed to reasoning models\n\
  --no-trace                    Do not write run files\n\
  --runs-dir <dir>              Output root (default: runs)\n\
  --experiments <path>          Experiments JSON (default: experiments.json)\n\
  --out <dir>                   Alias for --runs-dir\n\
  -h, --help                    Show this help\n\n\
Providers: openai, anthropic, gemini, xai. API keys are read from\n\
OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY and XAI_API_KEY (a .env file is loaded)."
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn play_flags_parse() {
        let options = parse_args(args(&[
            "play",
            "--seed=7",
            "--agent",
            "openai/gpt-5-mini",
            "--reasoning-effort",
            "low",
            "--no-trace",
        ]))
        .expect("valid")
        .expect("not help");
        assert_eq!(options.command, Command::Play);
        assert_eq!(options.seed, Some(7));
        assert!(!options.write_trace);
        assert_eq!(options.agent.reasoning_effort(), Some("low"));
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(parse_args(args(&["fly"])).is_err());
        assert!(parse_args(args(&["play", "--seed"])).is_err());
        assert!(parse_args(args(&["play", "--seed", "x"])).is_err());
        assert!(parse_args(args(&["play", "extra"])).is_err());
        assert!(parse_args(args(&["--help"])).expect("help").is_none());
    }
}
