//! World state and the values exchanged with decision-makers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sim::config::{Config, RecipeBook};
use crate::sim::workers::{
    compute_capacities, normalize_assignments, EmployeeAssignment, WorkerCapacities, WorkerId,
    TURN_MINUTES,
};

/// Ingredient -> quantity.
pub type StockMap = BTreeMap<String, f64>;
/// Product -> unit price.
pub type PriceMap = BTreeMap<String, f64>;
/// Product -> units.
pub type ProductCounts = BTreeMap<String, u32>;

const DAY_START_MINUTES: u32 = 10 * 60;

/// Renders a turn index as the time of day it starts, e.g. `"10:15"`.
pub fn format_time(turn: usize) -> String {
    let minutes = DAY_START_MINUTES as usize + TURN_MINUTES as usize * turn;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

// ---------------------------------------------------------------------------
// Orders and deliveries
// ---------------------------------------------------------------------------

/// A customer order waiting at the counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub items: ProductCounts,
    pub arrival_turn: usize,
}

/// Item view of an order as reported back to agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTicket {
    pub items: ProductCounts,
}

impl From<&Order> for OrderTicket {
    fn from(order: &Order) -> Self {
        Self {
            items: order.items.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub arrival_turn: usize,
    pub quantities: StockMap,
}

/// Pending delivery with a clock time instead of a turn index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundDeliveryView {
    pub arrival_time: String,
    pub quantities: StockMap,
}

impl From<&Delivery> for InboundDeliveryView {
    fn from(delivery: &Delivery) -> Self {
        Self {
            arrival_time: format_time(delivery.arrival_turn),
            quantities: delivery.quantities.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Turn summary
// ---------------------------------------------------------------------------

/// Queue and service outcome of one turn, shown to the agent on the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub queue_start: usize,
    pub new_customers: usize,
    pub served_customers: usize,
    pub queue_end: usize,
    pub dropped_from_queue: usize,
    pub orders_served: Vec<OrderTicket>,
    pub unserved_orders: Vec<OrderTicket>,
    pub blocked_by_customers_capacity: bool,
    pub blocked_by_grill_capacity: bool,
    pub blocked_by_drinks_capacity: bool,
    pub blocked_by_stock: bool,
    pub messages: Vec<String>,
    pub worker_assignments: Vec<EmployeeAssignment>,
    pub worker_capacities: WorkerCapacities,
}

// ---------------------------------------------------------------------------
// World state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub turn: usize,
    pub cash: f64,
    pub stock_on_hand: StockMap,
    pub inbound_deliveries: Vec<Delivery>,
    pub prices: PriceMap,
    pub order_queue: Vec<Order>,
    pub worker_assignments: Vec<EmployeeAssignment>,
    pub worker_capacities: WorkerCapacities,
    /// Worker id -> turns until the worker is back from shopping.
    pub workers_on_trip: BTreeMap<WorkerId, usize>,
    pub last_turn: Option<TurnSummary>,
}

impl State {
    pub fn initial(config: &Config) -> Self {
        let assignments = normalize_assignments(config.initial.worker_assignments.clone());
        Self {
            turn: 0,
            cash: config.initial.cash,
            stock_on_hand: config.initial.stock.clone(),
            inbound_deliveries: Vec::new(),
            prices: config.initial.prices.clone(),
            order_queue: Vec::new(),
            worker_capacities: compute_capacities(&assignments),
            worker_assignments: assignments,
            workers_on_trip: BTreeMap::new(),
            last_turn: None,
        }
    }

    /// Replaces the full assignment set and recomputes capacities.
    pub fn set_worker_assignments(&mut self, assignments: Vec<EmployeeAssignment>) {
        self.worker_assignments = normalize_assignments(assignments);
        self.worker_capacities = compute_capacities(&self.worker_assignments);
    }

    pub fn is_on_trip(&self, worker: WorkerId) -> bool {
        self.workers_on_trip.contains_key(&worker)
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Read-only view handed to the decision-maker at the start of its phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub turn: usize,
    pub time: String,
    pub last_turn_summary: Option<TurnSummary>,
    pub costs: StockMap,
    pub recipes: RecipeBook,
    pub lead_time: usize,
    pub num_workers: usize,
    pub capacity_customers_per_turn: f64,
    pub capacity_grill_per_turn: f64,
    pub capacity_drinks_per_turn: f64,
    pub worker_assignments: Vec<EmployeeAssignment>,
    pub workers_on_trip: BTreeMap<WorkerId, usize>,
}

impl Observation {
    pub fn build(state: &State, config: &Config) -> Self {
        Self {
            turn: state.turn,
            time: format_time(state.turn),
            last_turn_summary: state.last_turn.clone(),
            costs: config.costs.clone(),
            recipes: config.recipes.clone(),
            lead_time: config.lead_time,
            num_workers: config.num_workers,
            capacity_customers_per_turn: state.worker_capacities.customers_per_turn,
            capacity_grill_per_turn: state.worker_capacities.grill_per_turn,
            capacity_drinks_per_turn: state.worker_capacities.drinks_per_turn,
            worker_assignments: state.worker_assignments.clone(),
            workers_on_trip: state.workers_on_trip.clone(),
        }
    }
}
