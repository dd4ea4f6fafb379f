//! Run configuration: JSON schema, loading, and consistency checks.
//!
//! A configuration is immutable for the duration of an episode. The engine
//! clones what it needs into the world state at reset time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::sim::error::ConfigError;
use crate::sim::workers::{count_tasks, EmployeeAssignment, Task, MAX_WORKERS_PER_TASK};

// ---------------------------------------------------------------------------
// Built-in scenario (inline JSON)
// ---------------------------------------------------------------------------

pub const TXISTORRA_STALL_SCENARIO: &str = include_str!("scenarios/txistorra_stall.json");

/// Ingredient quantity per unit of product.
pub type Recipe = BTreeMap<String, f64>;
pub type RecipeBook = BTreeMap<String, Recipe>;
/// Fixed product bundle a customer orders (product -> units).
pub type OrderProfile = BTreeMap<String, u32>;

// ---------------------------------------------------------------------------
// Configuration data structures -- deserialize from JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub num_turns: usize,
    pub lead_time: usize,
    pub seed: u64,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    pub initial: InitialState,
    pub costs: BTreeMap<String, f64>,
    pub ingredient_weights: BTreeMap<String, f64>,
    pub worker_max_carry_weight: f64,
    pub recipes: RecipeBook,
    #[serde(default)]
    pub stations: Stations,
    pub demand: DemandParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    pub cash: f64,
    pub stock: BTreeMap<String, f64>,
    pub prices: BTreeMap<String, f64>,
    #[serde(default)]
    pub worker_assignments: Vec<EmployeeAssignment>,
}

/// Which ingredients are throttled by the grill and the drinks counter.
/// An order's grill load is the amount of `grill_ingredient` its recipes
/// consume; likewise for drinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stations {
    pub grill_ingredient: String,
    pub drink_ingredient: String,
}

impl Default for Stations {
    fn default() -> Self {
        Self {
            grill_ingredient: "txistorra".to_string(),
            drink_ingredient: "sidra".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandParams {
    /// Prices charged by the reference competitor.
    pub price_ref: BTreeMap<String, f64>,
    /// Own-price elasticity per product. Carried for agents and reports; the
    /// customer-count model only uses `elasticity_customers`.
    #[serde(default)]
    pub elasticity: BTreeMap<String, f64>,
    pub noise_std: f64,
    /// Expected market customers (all four stalls) per turn.
    pub customers_curve: Vec<f64>,
    pub elasticity_customers: f64,
    pub order_profiles: BTreeMap<String, OrderProfile>,
    pub order_mix_segments: Vec<OrderMixSegment>,
}

/// Profile mix for an inclusive range of turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderMixSegment {
    pub from_turn: usize,
    pub to_turn: usize,
    pub profile_probs: BTreeMap<String, f64>,
}

fn default_num_workers() -> usize {
    8
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// The scenario shipped with the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json(TXISTORRA_STALL_SCENARIO)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&raw)?;
        tracing::debug!(path = %path.display(), turns = config.num_turns, "loaded config");
        Ok(config)
    }

    /// Products are whatever the recipe book defines.
    pub fn products(&self) -> impl Iterator<Item = &String> {
        self.recipes.keys()
    }

    /// Ingredients are whatever has a purchase cost.
    pub fn ingredients(&self) -> impl Iterator<Item = &String> {
        self.costs.keys()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.num_workers == 0 {
            return invalid("num_workers must be at least 1".into());
        }
        if self.lead_time == 0 {
            return invalid("lead_time must be at least 1 turn".into());
        }
        if !self.worker_max_carry_weight.is_finite() || self.worker_max_carry_weight < 0.0 {
            return invalid("worker_max_carry_weight must be a non-negative number".into());
        }
        if !self.initial.cash.is_finite() || self.initial.cash < 0.0 {
            return invalid("initial cash must be a non-negative number".into());
        }

        for (label, map) in [
            ("costs", &self.costs),
            ("ingredient_weights", &self.ingredient_weights),
            ("initial stock", &self.initial.stock),
            ("initial prices", &self.initial.prices),
            ("price_ref", &self.demand.price_ref),
        ] {
            if let Some((key, value)) = map.iter().find(|(_, v)| !v.is_finite() || **v < 0.0) {
                return invalid(format!("{label}: {key} has invalid value {value}"));
            }
        }

        let ingredients: BTreeSet<&String> = self.costs.keys().collect();
        for ingredient in self
            .ingredient_weights
            .keys()
            .chain(self.initial.stock.keys())
        {
            if !ingredients.contains(ingredient) {
                return invalid(format!("ingredient '{ingredient}' has no cost"));
            }
        }
        for (product, recipe) in &self.recipes {
            for (ingredient, per_unit) in recipe {
                if !ingredients.contains(ingredient) {
                    return invalid(format!(
                        "recipe '{product}' uses unknown ingredient '{ingredient}'"
                    ));
                }
                if !per_unit.is_finite() || *per_unit < 0.0 {
                    return invalid(format!(
                        "recipe '{product}' has invalid quantity for '{ingredient}'"
                    ));
                }
            }
            if !self.initial.prices.contains_key(product) {
                return invalid(format!("product '{product}' has no initial price"));
            }
        }
        for station in [&self.stations.grill_ingredient, &self.stations.drink_ingredient] {
            if !ingredients.contains(station) {
                return invalid(format!("station ingredient '{station}' has no cost"));
            }
        }

        for (name, profile) in &self.demand.order_profiles {
            if let Some(product) = profile.keys().find(|p| !self.recipes.contains_key(*p)) {
                return invalid(format!("order profile '{name}' uses unknown product '{product}'"));
            }
        }
        for (idx, segment) in self.demand.order_mix_segments.iter().enumerate() {
            if segment.from_turn > segment.to_turn {
                return invalid(format!("order mix segment {idx} has from_turn > to_turn"));
            }
            for (profile, prob) in &segment.profile_probs {
                if !self.demand.order_profiles.contains_key(profile) {
                    return invalid(format!(
                        "order mix segment {idx} references unknown profile '{profile}'"
                    ));
                }
                if !prob.is_finite() || *prob < 0.0 {
                    return invalid(format!(
                        "order mix segment {idx} has invalid probability for '{profile}'"
                    ));
                }
            }
        }
        if self.demand.customers_curve.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return invalid("customers_curve entries must be non-negative".into());
        }
        if !self.demand.noise_std.is_finite() || !self.demand.elasticity_customers.is_finite() {
            return invalid("demand noise_std and elasticity_customers must be finite".into());
        }

        self.validate_initial_assignments()
    }

    fn validate_initial_assignments(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for assignment in &self.initial.worker_assignments {
            let id = assignment.employee_id;
            if id < 1 || id > self.num_workers as i64 {
                return Err(ConfigError::Invalid(format!(
                    "initial assignment has out-of-range employee_id {id}"
                )));
            }
            if !seen.insert(id) {
                return Err(ConfigError::Invalid(format!(
                    "initial assignment repeats employee_id {id}"
                )));
            }
        }
        let counts = count_tasks(&self.initial.worker_assignments);
        for task in Task::CAPPED {
            if counts.get(&task).copied().unwrap_or(0) > MAX_WORKERS_PER_TASK {
                return Err(ConfigError::Invalid(format!(
                    "initial assignments exceed {MAX_WORKERS_PER_TASK} workers on {}",
                    task.as_str()
                )));
            }
        }
        Ok(())
    }
}
