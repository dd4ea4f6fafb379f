//! Market stall simulation library.
//!
//! A single food-and-drink stall is played for a fixed number of 15-minute
//! turns. Each turn a decision-maker adjusts prices, staffing and
//! purchasing through a small tool surface; then customers arrive and are
//! served within the stall's stock and worker capacity.
//!
//! # Architecture
//!
//! - `sim`: world state, demand sampling, fulfillment, tool executor, and
//!   the turn engine
//! - `agent`: decision-makers (heuristic baseline, scripted replay,
//!   terminal player, language-model player) and their providers
//! - `runner`: single runs and experiment batches on disk
//! - `core`: shared tool declarations

pub mod agent;
pub mod core;
pub mod runner;
pub mod sim;

/// Default `tracing` filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "stall_sim_lib=debug,stall_sim=debug,info";

/// Installs the global subscriber, logging to stderr. Safe to call twice.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
