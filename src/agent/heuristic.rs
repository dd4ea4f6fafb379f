//! Rule-based baseline.
//!
//! Each turn it reads status and prices, tops up ingredients that fell
//! below their target level (one shopper per order, halving the quantity
//! until the order fits), restaffs whoever is free, and ends the turn.
//! Prices are never changed.

use std::collections::BTreeSet;

use crate::sim::decider::{AgentError, Decider};
use crate::sim::tools::{Action, AssignmentRequest, ToolExecutor};
use crate::sim::types::{Observation, StockMap};
use crate::sim::workers::{EmployeeAssignment, Task, WorkerId};

/// Restock targets, most important first.
pub const DEFAULT_TARGETS: &[(&str, f64)] = &[("txistorra", 150.0), ("pan", 80.0), ("sidra", 40.0)];

/// Staffing plan filled in order with the workers not out shopping.
pub const DEFAULT_STAFFING: &[(Task, usize)] = &[
    (Task::ServeCustomers, 3),
    (Task::Grill, 3),
    (Task::PourDrinks, 1),
    (Task::Prep, 1),
];

#[derive(Debug, Clone)]
pub struct HeuristicAgent {
    targets: Vec<(String, f64)>,
    staffing: Vec<(Task, usize)>,
}

impl Default for HeuristicAgent {
    fn default() -> Self {
        Self {
            targets: DEFAULT_TARGETS
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            staffing: DEFAULT_STAFFING.to_vec(),
        }
    }
}

impl HeuristicAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(mut self, targets: Vec<(String, f64)>) -> Self {
        self.targets = targets;
        self
    }

    fn restock(
        &self,
        tools: &mut ToolExecutor<'_>,
        stock: &StockMap,
        available: &mut Vec<WorkerId>,
        actions: &mut Vec<Action>,
    ) {
        for (ingredient, target) in &self.targets {
            let current = stock.get(ingredient).copied().unwrap_or(0.0);
            if current >= *target {
                continue;
            }
            let mut qty = (target - current).ceil() as u64;
            while qty > 0 {
                let Some(&worker) = available.first() else {
                    return;
                };
                let mut quantities = StockMap::new();
                quantities.insert(ingredient.clone(), qty as f64);
                let result = tools.place_order(quantities.clone(), vec![worker]);
                actions.push(Action::PlaceOrder {
                    quantities,
                    workers: vec![worker],
                });
                if result.is_accepted() {
                    available.remove(0);
                    break;
                }
                qty /= 2;
            }
        }
    }

    /// Fills the staffing plan with `available`, lowest id first.
    fn staffing_for(&self, available: &[WorkerId]) -> Vec<EmployeeAssignment> {
        let mut free = available.iter().copied();
        let mut plan = Vec::new();
        for (task, count) in &self.staffing {
            for employee_id in free.by_ref().take(*count) {
                plan.push(EmployeeAssignment {
                    employee_id,
                    task: *task,
                });
            }
        }
        plan
    }
}

impl Decider for HeuristicAgent {
    fn name(&self) -> String {
        "heuristic".to_string()
    }

    async fn decide(
        &mut self,
        obs: &Observation,
        tools: &mut ToolExecutor<'_>,
    ) -> Result<Vec<Action>, AgentError> {
        let mut actions = vec![Action::GetStatus, Action::GetPrices];
        let status = tools.get_status();
        tools.get_prices();

        // Goods already paid for count towards the target.
        let mut effective = status.stock_on_hand.unwrap_or_default();
        for delivery in status.inbound_deliveries.unwrap_or_default() {
            for (ingredient, qty) in delivery.quantities {
                *effective.entry(ingredient).or_insert(0.0) += qty;
            }
        }

        let on_trip: BTreeSet<WorkerId> = status
            .workers_on_trip
            .unwrap_or_default()
            .into_keys()
            .collect();
        let mut available: Vec<WorkerId> = (1..=obs.num_workers as WorkerId)
            .filter(|id| !on_trip.contains(id))
            .collect();

        self.restock(tools, &effective, &mut available, &mut actions);

        // Shoppers drop out of their task when they leave.
        let current: Vec<EmployeeAssignment> = status
            .worker_assignments
            .unwrap_or_default()
            .into_iter()
            .filter(|a| available.contains(&a.employee_id))
            .collect();
        let plan = self.staffing_for(&available);
        if plan != current {
            let requests: Vec<AssignmentRequest> = plan
                .iter()
                .map(|a| AssignmentRequest::new(a.employee_id, a.task))
                .collect();
            let result = tools.assign_workers(requests.clone());
            actions.push(Action::AssignWorkers {
                assignments: requests,
            });
            if !result.ok {
                tracing::warn!(turn = obs.turn, reason = ?result.reason, "heuristic staffing rejected");
            }
        }

        tools.end_turn();
        actions.push(Action::EndTurn);
        Ok(actions)
    }
}
