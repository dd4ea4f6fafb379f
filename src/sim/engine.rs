//! Turn engine.
//!
//! Each turn runs the same fixed sequence:
//!
//! 1. workers on a shopping trip count down and come back unassigned
//! 2. deliveries due this turn land in stock
//! 3. the decision-maker acts through the tool executor until `end_turn`
//! 4. demand is sampled and orders are fulfilled; revenue goes to cash
//! 5. the turn summary is stored for the next observation and a trace
//!    record is emitted
//!
//! The simulator owns the world state, the episode RNG, and the episode
//! metrics. Nothing in it is shared, so parallel episodes need one
//! simulator each.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::sim::config::Config;
use crate::sim::decider::Decider;
use crate::sim::demand::sample_orders;
use crate::sim::error::SimError;
use crate::sim::fulfillment::{fulfill_orders, FulfillmentOutcome, MAX_QUEUE_WAIT_TURNS};
use crate::sim::tools::{Action, AgentTraceEntry, ToolExecutor};
use crate::sim::types::{
    format_time, Delivery, Observation, OrderTicket, PriceMap, State, StockMap, TurnSummary,
};
use crate::sim::workers::{EmployeeAssignment, WorkerCapacities, WorkerId, TURN_MINUTES};

// ---------------------------------------------------------------------------
// Episode bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingDecision,
    AwaitingSettlement,
    Closed,
}

/// Counters owned by the episode; reset with the simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetrics {
    pub tool_calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub cash_final: f64,
    pub tool_calls_total: u64,
    pub tokens_in_total: u64,
    pub tokens_out_total: u64,
    pub cost_total: f64,
}

// ---------------------------------------------------------------------------
// Trace records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub cash: f64,
    pub stock: StockMap,
    pub inbound: Vec<Delivery>,
    pub prices: PriceMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_end: Option<usize>,
    pub worker_assignments: Vec<EmployeeAssignment>,
    pub worker_capacities: WorkerCapacities,
    pub workers_on_trip: BTreeMap<WorkerId, usize>,
}

impl StateSnapshot {
    fn of(state: &State) -> Self {
        Self {
            cash: state.cash,
            stock: state.stock_on_hand.clone(),
            inbound: state.inbound_deliveries.clone(),
            prices: state.prices.clone(),
            queue_start: None,
            queue_end: None,
            worker_assignments: state.worker_assignments.clone(),
            worker_capacities: state.worker_capacities,
            workers_on_trip: state.workers_on_trip.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesBreakdown {
    pub revenue: f64,
    pub by_product: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmTurnMetrics {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
}

/// One line of the episode trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub turn: usize,
    pub time: String,
    pub state_before: StateSnapshot,
    pub agent_actions: Vec<AgentTraceEntry>,
    pub tool_calls_count: u64,
    pub orders_served: Vec<OrderTicket>,
    pub sales: SalesBreakdown,
    pub state_after: StateSnapshot,
    pub llm_metrics: LlmTurnMetrics,
}

/// Append-only destination for trace records.
pub trait TraceSink {
    fn append(&mut self, record: &TraceRecord) -> Result<(), SimError>;
}

impl TraceSink for Vec<TraceRecord> {
    fn append(&mut self, record: &TraceRecord) -> Result<(), SimError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Sink that drops every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardTrace;

impl TraceSink for DiscardTrace {
    fn append(&mut self, _record: &TraceRecord) -> Result<(), SimError> {
        Ok(())
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct Simulator {
    config: Config,
    state: State,
    rng: ChaCha8Rng,
    phase: TurnPhase,
    action_trace: Vec<AgentTraceEntry>,
    metrics: EpisodeMetrics,
    end_turn_requested: bool,
}

impl Simulator {
    pub fn new(config: Config) -> Self {
        let state = State::initial(&config);
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            state,
            rng,
            phase: TurnPhase::AwaitingDecision,
            action_trace: Vec::new(),
            metrics: EpisodeMetrics::default(),
            end_turn_requested: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn metrics(&self) -> &EpisodeMetrics {
        &self.metrics
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Tool calls and messages recorded in the current turn.
    pub fn action_trace(&self) -> &[AgentTraceEntry] {
        &self.action_trace
    }

    /// Back to the configured initial state, metrics, and RNG seed.
    pub fn reset(&mut self) {
        self.state = State::initial(&self.config);
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.phase = TurnPhase::AwaitingDecision;
        self.action_trace.clear();
        self.metrics = EpisodeMetrics::default();
        self.end_turn_requested = false;
    }

    /// Executor over the live state for the current decision phase.
    pub fn tools(&mut self) -> ToolExecutor<'_> {
        ToolExecutor::new(
            &self.config,
            &mut self.state,
            &mut self.action_trace,
            &mut self.metrics,
            &mut self.end_turn_requested,
        )
    }

    pub fn observation(&self) -> Observation {
        Observation::build(&self.state, &self.config)
    }

    fn update_worker_trips(&mut self) {
        let trips = std::mem::take(&mut self.state.workers_on_trip);
        self.state.workers_on_trip = trips
            .into_iter()
            .filter_map(|(worker, left)| {
                let remaining = left.saturating_sub(1);
                (remaining > 0).then_some((worker, remaining))
            })
            .collect();
    }

    fn receive_deliveries(&mut self) {
        let turn = self.state.turn;
        let (arrived, pending): (Vec<Delivery>, Vec<Delivery>) =
            std::mem::take(&mut self.state.inbound_deliveries)
                .into_iter()
                .partition(|d| d.arrival_turn == turn);
        for delivery in arrived {
            for (ingredient, qty) in delivery.quantities {
                *self.state.stock_on_hand.entry(ingredient).or_insert(0.0) += qty;
            }
        }
        self.state.inbound_deliveries = pending;
    }

    /// Opens turn `turn`: trips count down, deliveries land, and the
    /// decision phase starts. Returns the pre-decision snapshot.
    pub fn begin_turn(&mut self, turn: usize) -> StateSnapshot {
        self.state.turn = turn;
        self.end_turn_requested = false;
        self.action_trace.clear();
        self.update_worker_trips();
        self.receive_deliveries();
        self.phase = TurnPhase::AwaitingDecision;
        StateSnapshot::of(&self.state)
    }

    fn decision_closed(&self, actions: &[Action]) -> bool {
        let returned_end = matches!(actions.last(), Some(Action::EndTurn));
        let recorded_end = self
            .action_trace
            .iter()
            .rev()
            .find_map(|entry| match entry {
                AgentTraceEntry::ToolCall { name, .. } => Some(name == "end_turn"),
                AgentTraceEntry::Message { .. } => None,
            })
            .unwrap_or(false);
        returned_end && recorded_end && self.end_turn_requested
    }

    /// Demand, fulfillment, and revenue for the current turn.
    pub fn settle(&mut self) -> (FulfillmentOutcome, f64) {
        self.phase = TurnPhase::AwaitingSettlement;
        let turn = self.state.turn;
        let batch = sample_orders(&self.state.prices, &self.config.demand, turn, &mut self.rng);
        let queue = std::mem::take(&mut self.state.order_queue);
        let mut outcome = fulfill_orders(
            queue,
            batch.orders,
            turn,
            &self.state.worker_capacities,
            &mut self.state.stock_on_hand,
            &self.config.recipes,
            &self.config.stations,
        );
        self.state.order_queue = std::mem::take(&mut outcome.next_queue);

        let revenue: f64 = outcome
            .sold
            .iter()
            .map(|(product, units)| {
                self.state.prices.get(product).copied().unwrap_or(0.0) * f64::from(*units)
            })
            .sum();
        self.state.cash += revenue;

        let stats = &outcome.stats;
        let mut messages = Vec::new();
        if stats.dropped_from_queue > 0 {
            messages.push(format!(
                "{} left the queue after waiting {} minutes or more.",
                plural(stats.dropped_from_queue, "customer", "customers"),
                MAX_QUEUE_WAIT_TURNS as u32 * TURN_MINUTES
            ));
        }
        self.state.last_turn = Some(TurnSummary {
            queue_start: stats.queue_start,
            new_customers: stats.new_customers,
            served_customers: stats.served_customers,
            queue_end: stats.queue_end,
            dropped_from_queue: stats.dropped_from_queue,
            orders_served: outcome.orders_served.clone(),
            unserved_orders: outcome.unserved_orders.clone(),
            blocked_by_customers_capacity: stats.blocked_by_customers_capacity > 0,
            blocked_by_grill_capacity: stats.blocked_by_grill_capacity > 0,
            blocked_by_drinks_capacity: stats.blocked_by_drinks_capacity > 0,
            blocked_by_stock: stats.blocked_by_stock,
            messages,
            worker_assignments: self.state.worker_assignments.clone(),
            worker_capacities: self.state.worker_capacities,
        });
        self.phase = TurnPhase::Closed;
        (outcome, revenue)
    }

    /// Runs one full turn with `agent` as the decision-maker.
    pub async fn run_turn<D: Decider>(
        &mut self,
        turn: usize,
        agent: &mut D,
    ) -> Result<TraceRecord, SimError> {
        let mut state_before = self.begin_turn(turn);
        let metrics_before = self.metrics;

        let obs = self.observation();
        let actions = {
            let mut tools = self.tools();
            agent.decide(&obs, &mut tools).await?
        };
        if !self.decision_closed(&actions) {
            tracing::warn!(turn, agent = %agent.name(), "decision phase ended without end_turn");
            return Err(SimError::MissingEndTurn { turn });
        }

        let (outcome, revenue) = self.settle();
        state_before.queue_start = Some(outcome.stats.queue_start);

        let by_product = outcome
            .sold
            .iter()
            .map(|(product, units)| {
                let price = self.state.prices.get(product).copied().unwrap_or(0.0);
                (product.clone(), price * f64::from(*units))
            })
            .collect();
        let mut state_after = StateSnapshot::of(&self.state);
        state_after.queue_end = Some(outcome.stats.queue_end);

        tracing::debug!(
            turn,
            revenue,
            cash = self.state.cash,
            served = outcome.stats.served_customers,
            "turn settled"
        );

        Ok(TraceRecord {
            turn,
            time: format_time(turn),
            state_before,
            agent_actions: self.action_trace.clone(),
            tool_calls_count: self.metrics.tool_calls - metrics_before.tool_calls,
            orders_served: outcome.orders_served,
            sales: SalesBreakdown {
                revenue,
                by_product,
            },
            state_after,
            llm_metrics: LlmTurnMetrics {
                tokens_in: self.metrics.tokens_in - metrics_before.tokens_in,
                tokens_out: self.metrics.tokens_out - metrics_before.tokens_out,
                cost: round6(self.metrics.cost - metrics_before.cost),
            },
        })
    }

    /// Resets, then plays every configured turn, appending one record per
    /// turn to `sink`.
    pub async fn run_episode<D: Decider, S: TraceSink + ?Sized>(
        &mut self,
        agent: &mut D,
        sink: &mut S,
    ) -> Result<EpisodeResult, SimError> {
        self.reset();
        tracing::info!(
            agent = %agent.name(),
            turns = self.config.num_turns,
            seed = self.config.seed,
            "episode started"
        );

        for turn in 0..self.config.num_turns {
            let record = self.run_turn(turn, agent).await?;
            sink.append(&record)?;
        }

        let result = EpisodeResult {
            cash_final: self.state.cash,
            tool_calls_total: self.metrics.tool_calls,
            tokens_in_total: self.metrics.tokens_in,
            tokens_out_total: self.metrics.tokens_out,
            cost_total: round6(self.metrics.cost),
        };
        tracing::info!(
            agent = %agent.name(),
            cash_final = result.cash_final,
            tool_calls = result.tool_calls_total,
            "episode finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::decider::AgentError;
    use crate::sim::workers::Task;
    use crate::sim::tools::AssignmentRequest;

    /// Replays a fixed closure each turn.
    struct FnAgent<F>(F);

    impl<F> Decider for FnAgent<F>
    where
        F: FnMut(&Observation, &mut ToolExecutor<'_>) -> Vec<Action>,
    {
        fn name(&self) -> String {
            "fn".to_string()
        }

        async fn decide(
            &mut self,
            obs: &Observation,
            tools: &mut ToolExecutor<'_>,
        ) -> Result<Vec<Action>, AgentError> {
            Ok((self.0)(obs, tools))
        }
    }

    fn closure_agent<F>(f: F) -> FnAgent<F>
    where
        F: FnMut(&Observation, &mut ToolExecutor<'_>) -> Vec<Action>,
    {
        FnAgent(f)
    }

    fn idle_config(turns: usize) -> Config {
        let mut config = Config::builtin().expect("builtin");
        config.num_turns = turns;
        config.lead_time = 2;
        config.initial.worker_assignments.clear();
        config
    }

    fn end_only(_: &Observation, tools: &mut ToolExecutor<'_>) -> Vec<Action> {
        tools.end_turn();
        vec![Action::EndTurn]
    }

    #[tokio::test]
    async fn missing_end_turn_is_fatal() {
        let mut sim = Simulator::new(idle_config(3));
        let mut agent = closure_agent(|_: &Observation, tools: &mut ToolExecutor<'_>| {
            tools.get_status();
            vec![Action::GetStatus]
        });
        let err = sim
            .run_episode(&mut agent, &mut DiscardTrace)
            .await
            .expect_err("episode must fail");
        assert!(matches!(err, SimError::MissingEndTurn { turn: 0 }));
    }

    #[tokio::test]
    async fn claiming_end_turn_without_calling_it_is_fatal() {
        let mut sim = Simulator::new(idle_config(1));
        let mut agent = closure_agent(|_: &Observation, _: &mut ToolExecutor<'_>| vec![Action::EndTurn]);
        let err = sim.run_episode(&mut agent, &mut DiscardTrace).await;
        assert!(matches!(err, Err(SimError::MissingEndTurn { .. })));
    }

    #[tokio::test]
    async fn delivery_and_workers_return_after_lead_time() {
        let mut sim = Simulator::new(idle_config(4));
        let mut agent = closure_agent(|obs: &Observation, tools: &mut ToolExecutor<'_>| {
            let mut actions = Vec::new();
            if obs.turn == 0 {
                let mut quantities = StockMap::new();
                quantities.insert("pan".into(), 4.0);
                tools.place_order(quantities.clone(), vec![1]);
                actions.push(Action::PlaceOrder {
                    quantities,
                    workers: vec![1],
                });
            }
            tools.end_turn();
            actions.push(Action::EndTurn);
            actions
        });
        let mut trace: Vec<TraceRecord> = Vec::new();
        sim.run_episode(&mut agent, &mut trace).await.expect("episode runs");

        let pan_before = |t: usize| trace[t].state_before.stock.get("pan").copied().unwrap_or(0.0);
        let initial_pan = sim.config().initial.stock.get("pan").copied().unwrap_or(0.0);
        assert_eq!(trace[1].state_before.workers_on_trip.get(&1), Some(&1));
        assert!(trace[2].state_before.workers_on_trip.is_empty());
        assert!(pan_before(1) <= initial_pan);
        assert!(pan_before(2) >= 4.0);
        assert!(trace[2].state_before.inbound.is_empty());
    }

    #[tokio::test]
    async fn trips_release_workers_unassigned() {
        let mut sim = Simulator::new(idle_config(3));
        let mut agent = closure_agent(|obs: &Observation, tools: &mut ToolExecutor<'_>| {
            if obs.turn == 0 {
                tools.assign_workers(vec![AssignmentRequest::new(1, Task::Grill)]);
                tools.place_order(StockMap::new(), vec![1]);
            }
            tools.end_turn();
            vec![Action::EndTurn]
        });
        sim.run_episode(&mut agent, &mut DiscardTrace).await.expect("episode runs");
        assert!(sim.state().workers_on_trip.is_empty());
        assert!(sim.state().worker_assignments.is_empty());
    }

    #[tokio::test]
    async fn per_turn_tool_calls_are_counted() {
        let mut sim = Simulator::new(idle_config(2));
        let mut trace: Vec<TraceRecord> = Vec::new();
        let result = sim
            .run_episode(&mut FnAgent(end_only), &mut trace)
            .await
            .expect("episode runs");
        assert_eq!(result.tool_calls_total, 2);
        assert!(trace.iter().all(|r| r.tool_calls_count == 1));
        assert_eq!(trace[1].time, "10:15");
        assert_eq!(sim.phase(), TurnPhase::Closed);
    }

    #[tokio::test]
    async fn dropped_customers_produce_a_message() {
        let mut config = idle_config(3);
        config.demand.noise_std = 0.0;
        config.demand.customers_curve = vec![40.0, 0.0, 0.0];
        let mut sim = Simulator::new(config);
        let mut trace: Vec<TraceRecord> = Vec::new();
        sim.run_episode(&mut FnAgent(end_only), &mut trace)
            .await
            .expect("episode runs");
        // Nobody serves, so turn-0 customers wait and leave at turn 2.
        let summary = sim.state().last_turn.clone().expect("summary");
        assert!(summary.dropped_from_queue > 0);
        assert!(summary.messages[0].contains("left the queue"));
        assert_eq!(summary.queue_end, 0);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut sim = Simulator::new(idle_config(1));
        sim.tools().place_order(StockMap::new(), vec![2]);
        assert!(!sim.state().workers_on_trip.is_empty());
        sim.reset();
        assert_eq!(sim.state(), &State::initial(sim.config()));
        assert_eq!(sim.metrics(), &EpisodeMetrics::default());
    }
}
