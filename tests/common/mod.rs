//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;

use serde_json::json;
use stall_sim_lib::sim::engine::{Simulator, TraceRecord};
use stall_sim_lib::sim::{Action, Config};

/// One product (`bread`, one `pan` each), no station load, no demand.
pub fn bread_stall(turns: usize) -> Config {
    let curve = vec![0.0; turns];
    let raw = json!({
        "num_turns": turns,
        "lead_time": 2,
        "seed": 7,
        "initial": {
            "cash": 50.0,
            "stock": { "pan": 0.0 },
            "prices": { "bread": 2.0 }
        },
        "costs": { "pan": 0.5, "txistorra": 1.0, "sidra": 1.0 },
        "ingredient_weights": { "pan": 0.25, "txistorra": 0.1, "sidra": 1.0 },
        "worker_max_carry_weight": 25.0,
        "recipes": { "bread": { "pan": 1.0 } },
        "demand": {
            "price_ref": { "bread": 2.0 },
            "noise_std": 0.0,
            "customers_curve": curve,
            "elasticity_customers": 1.0,
            "order_profiles": { "single": { "bread": 1 } },
            "order_mix_segments": [
                { "from_turn": 0, "to_turn": turns, "profile_probs": { "single": 1.0 } }
            ]
        }
    });
    Config::from_json(&raw.to_string()).expect("fixture config is valid")
}

pub fn builtin(turns: usize, seed: u64) -> Config {
    let mut config = Config::builtin().expect("builtin scenario");
    config.num_turns = turns;
    config.seed = seed;
    config
}

pub fn quantities(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Same script every turn.
pub fn every_turn(turns: usize, actions: Vec<Action>) -> BTreeMap<usize, Vec<Action>> {
    (0..turns).map(|t| (t, actions.clone())).collect()
}

pub fn trace_json(trace: &[TraceRecord]) -> String {
    trace
        .iter()
        .map(|r| serde_json::to_string(r).expect("record serializes"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn run_traced<D: stall_sim_lib::sim::Decider>(
    config: Config,
    agent: &mut D,
) -> (Simulator, Vec<TraceRecord>) {
    let mut sim = Simulator::new(config);
    let mut trace = Vec::new();
    sim.run_episode(agent, &mut trace)
        .await
        .expect("episode runs");
    (sim, trace)
}
