//! Staff tasks and the capacity model derived from them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Minutes of in-world time per turn.
pub const TURN_MINUTES: u32 = 15;
/// Cap on workers per capacity-bearing task. Shopping is uncapped.
pub const MAX_WORKERS_PER_TASK: usize = 3;

const CUSTOMERS_PER_WORKER_MINUTE: f64 = 1.0;
const GRILL_STRIPS_PER_WORKER_MINUTE: f64 = 4.0 / 60.0;
const DRINKS_PER_WORKER_MINUTE: f64 = 2.0;

/// Worker ids run from 1 to `num_workers`. Signed so that out-of-range
/// requests (0, negatives) can be represented and rejected.
pub type WorkerId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    ServeCustomers,
    Grill,
    Prep,
    PourDrinks,
    GoShopping,
}

impl Task {
    pub const ALL: [Task; 5] = [
        Task::ServeCustomers,
        Task::Grill,
        Task::Prep,
        Task::PourDrinks,
        Task::GoShopping,
    ];

    /// Tasks limited to `MAX_WORKERS_PER_TASK` workers.
    pub const CAPPED: [Task; 4] = [Task::ServeCustomers, Task::Grill, Task::Prep, Task::PourDrinks];

    pub fn as_str(self) -> &'static str {
        match self {
            Task::ServeCustomers => "serve_customers",
            Task::Grill => "grill",
            Task::Prep => "prep",
            Task::PourDrinks => "pour_drinks",
            Task::GoShopping => "go_shopping",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::ALL
            .into_iter()
            .find(|task| task.as_str() == s.trim())
            .ok_or_else(|| format!("unknown task: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeAssignment {
    pub employee_id: WorkerId,
    pub task: Task,
}

/// Per-turn throughput derived from the current assignments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerCapacities {
    pub customers_per_turn: f64,
    pub grill_per_turn: f64,
    pub drinks_per_turn: f64,
}

pub fn count_tasks(assignments: &[EmployeeAssignment]) -> BTreeMap<Task, usize> {
    let mut counts: BTreeMap<Task, usize> = Task::ALL.into_iter().map(|t| (t, 0)).collect();
    for assignment in assignments {
        *counts.entry(assignment.task).or_insert(0) += 1;
    }
    counts
}

pub fn compute_capacities(assignments: &[EmployeeAssignment]) -> WorkerCapacities {
    let counts = count_tasks(assignments);
    let on = |task: Task| counts.get(&task).copied().unwrap_or(0) as f64;
    let minutes = f64::from(TURN_MINUTES);

    WorkerCapacities {
        customers_per_turn: CUSTOMERS_PER_WORKER_MINUTE * on(Task::ServeCustomers) * minutes,
        grill_per_turn: GRILL_STRIPS_PER_WORKER_MINUTE * minutes * on(Task::Grill),
        drinks_per_turn: DRINKS_PER_WORKER_MINUTE * on(Task::PourDrinks) * minutes,
    }
}

/// Sort by worker id so snapshots are stable regardless of request order.
pub fn normalize_assignments(mut assignments: Vec<EmployeeAssignment>) -> Vec<EmployeeAssignment> {
    assignments.sort_by_key(|a| a.employee_id);
    assignments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assign(pairs: &[(WorkerId, Task)]) -> Vec<EmployeeAssignment> {
        pairs
            .iter()
            .map(|&(employee_id, task)| EmployeeAssignment { employee_id, task })
            .collect()
    }

    #[test]
    fn capacities_scale_with_worker_counts() {
        let caps = compute_capacities(&assign(&[
            (1, Task::ServeCustomers),
            (2, Task::ServeCustomers),
            (3, Task::ServeCustomers),
            (4, Task::Grill),
            (5, Task::Grill),
            (6, Task::PourDrinks),
            (7, Task::Prep),
        ]));
        assert!((caps.customers_per_turn - 45.0).abs() < 1e-9);
        assert!((caps.grill_per_turn - 2.0).abs() < 1e-9);
        assert!((caps.drinks_per_turn - 30.0).abs() < 1e-9);
    }

    #[test]
    fn no_assignments_means_no_capacity() {
        assert_eq!(compute_capacities(&[]), WorkerCapacities::default());
    }

    #[test]
    fn task_names_round_trip_through_strings() {
        for task in Task::ALL {
            assert_eq!(task.as_str().parse::<Task>(), Ok(task));
        }
        assert!("freir".parse::<Task>().is_err());
        assert_eq!(
            serde_json::to_value(Task::PourDrinks).expect("serialize"),
            serde_json::json!("pour_drinks")
        );
    }

    #[test]
    fn normalize_sorts_by_id() {
        let sorted = normalize_assignments(assign(&[(5, Task::Grill), (2, Task::Prep)]));
        assert_eq!(sorted[0].employee_id, 2);
        assert_eq!(sorted[1].employee_id, 5);
    }
}
