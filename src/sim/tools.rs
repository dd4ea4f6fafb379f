//! Tool surface exposed to decision-makers.
//!
//! Every operation validates first and mutates only when all checks pass.
//! Rejections are ordinary `ToolResult`s with `ok == false` and a reason;
//! the agent may retry within the same decision phase. Every call, accepted
//! or not, bumps the episode's tool-call counter and lands in the turn's
//! action trace.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::tool::ToolDescriptor;
use crate::sim::config::Config;
use crate::sim::engine::EpisodeMetrics;
use crate::sim::types::{Delivery, InboundDeliveryView, PriceMap, State, StockMap};
use crate::sim::workers::{
    count_tasks, EmployeeAssignment, Task, WorkerCapacities, WorkerId, MAX_WORKERS_PER_TASK,
};

const WEIGHT_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Actions and results
// ---------------------------------------------------------------------------

/// One tool invocation in typed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    GetStatus,
    GetPrices,
    SetPrices {
        prices: PriceMap,
    },
    PlaceOrder {
        quantities: StockMap,
        workers: Vec<WorkerId>,
    },
    AssignWorkers {
        assignments: Vec<AssignmentRequest>,
    },
    EndTurn,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::GetStatus => "get_status",
            Action::GetPrices => "get_prices",
            Action::SetPrices { .. } => "set_prices",
            Action::PlaceOrder { .. } => "place_order",
            Action::AssignWorkers { .. } => "assign_workers",
            Action::EndTurn => "end_turn",
        }
    }

    /// Arguments as a JSON object, without the `type` tag.
    pub fn arguments(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.remove("type");
                Value::Object(map)
            }
            _ => Value::Object(Default::default()),
        }
    }
}

/// Requested assignment. The task stays a string until validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub employee_id: WorkerId,
    pub task: String,
}

impl AssignmentRequest {
    pub fn new(employee_id: WorkerId, task: Task) -> Self {
        Self {
            employee_id,
            task: task.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_on_hand: Option<StockMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound_deliveries: Option<Vec<InboundDeliveryView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_prices: Option<PriceMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_assignments: Option<Vec<EmployeeAssignment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_capacities: Option<WorkerCapacities>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "trip_map")]
    pub workers_on_trip: Option<BTreeMap<WorkerId, usize>>,
}

/// Worker ids as string keys. Tagged trace entries are buffered before
/// decoding, and buffered maps do not turn `"1"` back into an integer key.
mod trip_map {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::sim::workers::WorkerId;

    pub fn serialize<S: Serializer>(
        map: &Option<BTreeMap<WorkerId, usize>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match map {
            Some(map) => {
                serializer.collect_map(map.iter().map(|(id, left)| (id.to_string(), left)))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<BTreeMap<WorkerId, usize>>, D::Error> {
        let raw: Option<BTreeMap<String, usize>> = Option::deserialize(deserializer)?;
        raw.map(|map| {
            map.into_iter()
                .map(|(id, left)| {
                    id.parse::<WorkerId>()
                        .map(|id| (id, left))
                        .map_err(|e| D::Error::custom(format!("worker id '{id}': {e}")))
                })
                .collect()
        })
        .transpose()
    }
}

impl ToolResult {
    pub fn success() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    fn not_accepted(reason: impl Into<String>) -> Self {
        Self {
            accepted: Some(false),
            ..Self::rejected(reason)
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.ok && self.accepted.unwrap_or(true)
    }
}

/// Entry in the per-turn action trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentTraceEntry {
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
        result: ToolResult,
    },
    /// Free text the agent produced alongside its tool calls.
    Message { content: String },
}

// ---------------------------------------------------------------------------
// Wire arguments (language-model tool calls)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PriceEntry {
    product: String,
    price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PricesArg {
    List(Vec<PriceEntry>),
    Map(PriceMap),
}

#[derive(Debug, Deserialize)]
struct SetPricesArgs {
    prices: PricesArg,
}

#[derive(Debug, Deserialize)]
struct OrderItem {
    ingredient: String,
    quantity: f64,
}

#[derive(Debug, Deserialize)]
struct PlaceOrderArgs {
    #[serde(default)]
    items: Vec<OrderItem>,
    #[serde(default)]
    quantities: StockMap,
    #[serde(default)]
    workers: Vec<WorkerId>,
}

#[derive(Debug, Deserialize)]
struct AssignWorkersArgs {
    #[serde(default)]
    assignments: Vec<AssignmentRequest>,
}

fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, String> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args.clone()
    };
    serde_json::from_value(args).map_err(|e| format!("invalid arguments: {e}"))
}

/// Converts a named call with JSON arguments into a typed action.
pub fn parse_tool_call(name: &str, args: &Value) -> Result<Action, String> {
    match name {
        "get_status" => Ok(Action::GetStatus),
        "get_prices" => Ok(Action::GetPrices),
        "end_turn" => Ok(Action::EndTurn),
        "set_prices" => {
            let parsed: SetPricesArgs = parse_args(args)?;
            let prices = match parsed.prices {
                PricesArg::List(entries) => {
                    entries.into_iter().map(|e| (e.product, e.price)).collect()
                }
                PricesArg::Map(map) => map,
            };
            Ok(Action::SetPrices { prices })
        }
        "place_order" => {
            let parsed: PlaceOrderArgs = parse_args(args)?;
            let mut quantities = parsed.quantities;
            for item in parsed.items {
                *quantities.entry(item.ingredient).or_insert(0.0) += item.quantity;
            }
            Ok(Action::PlaceOrder {
                quantities,
                workers: parsed.workers,
            })
        }
        "assign_workers" => {
            let parsed: AssignWorkersArgs = parse_args(args)?;
            Ok(Action::AssignWorkers {
                assignments: parsed.assignments,
            })
        }
        other => Err(format!("unknown tool: {other}")),
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Mutable handle on the world for one decision phase.
pub struct ToolExecutor<'a> {
    config: &'a Config,
    state: &'a mut State,
    trace: &'a mut Vec<AgentTraceEntry>,
    metrics: &'a mut EpisodeMetrics,
    end_turn_requested: &'a mut bool,
}

impl<'a> ToolExecutor<'a> {
    pub(crate) fn new(
        config: &'a Config,
        state: &'a mut State,
        trace: &'a mut Vec<AgentTraceEntry>,
        metrics: &'a mut EpisodeMetrics,
        end_turn_requested: &'a mut bool,
    ) -> Self {
        Self {
            config,
            state,
            trace,
            metrics,
            end_turn_requested,
        }
    }

    pub fn get_status(&mut self) -> ToolResult {
        self.execute(&Action::GetStatus)
    }

    pub fn get_prices(&mut self) -> ToolResult {
        self.execute(&Action::GetPrices)
    }

    pub fn set_prices(&mut self, prices: PriceMap) -> ToolResult {
        self.execute(&Action::SetPrices { prices })
    }

    pub fn place_order(&mut self, quantities: StockMap, workers: Vec<WorkerId>) -> ToolResult {
        self.execute(&Action::PlaceOrder {
            quantities,
            workers,
        })
    }

    pub fn assign_workers(&mut self, assignments: Vec<AssignmentRequest>) -> ToolResult {
        self.execute(&Action::AssignWorkers { assignments })
    }

    pub fn end_turn(&mut self) -> ToolResult {
        self.execute(&Action::EndTurn)
    }

    pub fn execute(&mut self, action: &Action) -> ToolResult {
        self.execute_call("", action, action.arguments())
    }

    /// Runs a call received as JSON. Returns the typed action when the
    /// arguments parsed, so callers can keep their own action log.
    pub fn dispatch(&mut self, call_id: &str, name: &str, args: &Value) -> (Option<Action>, ToolResult) {
        match parse_tool_call(name, args) {
            Ok(action) => {
                let result = self.execute_call(call_id, &action, args.clone());
                (Some(action), result)
            }
            Err(reason) => {
                self.metrics.tool_calls += 1;
                tracing::warn!(tool = name, %reason, "rejected tool call");
                let result = ToolResult::rejected(reason);
                self.record(call_id, name, args.clone(), result.clone());
                (None, result)
            }
        }
    }

    /// Attributes model usage to the current turn.
    pub fn record_usage(&mut self, tokens_in: u64, tokens_out: u64, cost: f64) {
        self.metrics.tokens_in += tokens_in;
        self.metrics.tokens_out += tokens_out;
        self.metrics.cost += cost;
    }

    pub fn record_message(&mut self, content: impl Into<String>) {
        self.trace.push(AgentTraceEntry::Message {
            content: content.into(),
        });
    }

    pub fn end_turn_requested(&self) -> bool {
        *self.end_turn_requested
    }

    fn execute_call(&mut self, call_id: &str, action: &Action, arguments: Value) -> ToolResult {
        self.metrics.tool_calls += 1;
        let result = match action {
            Action::GetStatus => self.status(),
            Action::GetPrices => ToolResult {
                current_prices: Some(self.state.prices.clone()),
                ..ToolResult::success()
            },
            Action::SetPrices { prices } => self.apply_prices(prices),
            Action::PlaceOrder {
                quantities,
                workers,
            } => self.apply_order(quantities, workers),
            Action::AssignWorkers { assignments } => self.apply_assignments(assignments),
            Action::EndTurn => {
                *self.end_turn_requested = true;
                ToolResult::success()
            }
        };
        if let Some(reason) = &result.reason {
            tracing::warn!(tool = action.name(), turn = self.state.turn, %reason, "rejected tool call");
        }
        self.record(call_id, action.name(), arguments, result.clone());
        result
    }

    fn record(&mut self, call_id: &str, name: &str, arguments: Value, result: ToolResult) {
        self.trace.push(AgentTraceEntry::ToolCall {
            id: call_id.to_string(),
            name: name.to_string(),
            arguments,
            result,
        });
    }

    fn status(&self) -> ToolResult {
        ToolResult {
            cash: Some(self.state.cash),
            stock_on_hand: Some(self.state.stock_on_hand.clone()),
            inbound_deliveries: Some(
                self.state
                    .inbound_deliveries
                    .iter()
                    .map(InboundDeliveryView::from)
                    .collect(),
            ),
            worker_assignments: Some(self.state.worker_assignments.clone()),
            workers_on_trip: Some(self.state.workers_on_trip.clone()),
            ..ToolResult::success()
        }
    }

    fn apply_prices(&mut self, prices: &PriceMap) -> ToolResult {
        for (product, price) in prices {
            if !self.config.recipes.contains_key(product) {
                return ToolResult::rejected(format!("unknown product: {product}"));
            }
            if !price.is_finite() {
                return ToolResult::rejected(format!("price for {product} is not a finite number"));
            }
            if *price < 0.0 {
                return ToolResult::rejected(format!("negative price for {product}"));
            }
        }
        self.state
            .prices
            .extend(prices.iter().map(|(k, v)| (k.clone(), *v)));
        ToolResult::success()
    }

    fn valid_worker(&self, id: WorkerId) -> bool {
        id >= 1 && id <= self.config.num_workers as i64
    }

    fn apply_order(&mut self, quantities: &StockMap, workers: &[WorkerId]) -> ToolResult {
        let mut cost = 0.0;
        for (ingredient, qty) in quantities {
            if !qty.is_finite() || *qty < 0.0 {
                return ToolResult::rejected(format!("negative quantity for {ingredient}"));
            }
            let Some(unit_cost) = self.config.costs.get(ingredient) else {
                return ToolResult::rejected(format!("unknown ingredient: {ingredient}"));
            };
            cost += unit_cost * qty;
        }

        if workers.is_empty() {
            return ToolResult::rejected("at least one worker must be sent shopping");
        }
        let mut sent = BTreeSet::new();
        for &worker in workers {
            if !self.valid_worker(worker) {
                return ToolResult::rejected(format!("invalid worker id: {worker}"));
            }
            if !sent.insert(worker) {
                return ToolResult::rejected(format!("duplicate worker id: {worker}"));
            }
            if self.state.is_on_trip(worker) {
                return ToolResult::rejected(format!("worker {worker} is already on a trip"));
            }
        }

        let total_weight: f64 = quantities
            .iter()
            .map(|(ingredient, qty)| {
                self.config
                    .ingredient_weights
                    .get(ingredient)
                    .copied()
                    .unwrap_or(0.0)
                    * qty
            })
            .sum();
        let max_weight = workers.len() as f64 * self.config.worker_max_carry_weight;
        if total_weight > max_weight + WEIGHT_EPSILON {
            return ToolResult::not_accepted(
                "order exceeds the carrying capacity of the selected workers",
            );
        }
        if cost > self.state.cash {
            return ToolResult::not_accepted("order rejected: cost exceeds cash");
        }

        self.state.cash -= cost;
        self.state.inbound_deliveries.push(Delivery {
            arrival_turn: self.state.turn + self.config.lead_time,
            quantities: quantities.clone(),
        });
        let remaining: Vec<EmployeeAssignment> = self
            .state
            .worker_assignments
            .iter()
            .filter(|a| !sent.contains(&a.employee_id))
            .cloned()
            .collect();
        self.state.set_worker_assignments(remaining);
        for worker in sent {
            self.state
                .workers_on_trip
                .insert(worker, self.config.lead_time);
        }
        tracing::debug!(turn = self.state.turn, cost, total_weight, "order placed");

        ToolResult {
            accepted: Some(true),
            worker_assignments: Some(self.state.worker_assignments.clone()),
            workers_on_trip: Some(self.state.workers_on_trip.clone()),
            ..ToolResult::success()
        }
    }

    fn apply_assignments(&mut self, requests: &[AssignmentRequest]) -> ToolResult {
        let mut seen = BTreeSet::new();
        let mut assignments = Vec::with_capacity(requests.len());
        for request in requests {
            let id = request.employee_id;
            if !self.valid_worker(id) {
                return ToolResult::rejected(format!("invalid employee_id: {id}"));
            }
            if self.state.is_on_trip(id) {
                return ToolResult::rejected(format!(
                    "worker {id} is on a trip and cannot be assigned"
                ));
            }
            if !seen.insert(id) {
                return ToolResult::rejected(format!("duplicate employee_id: {id}"));
            }
            let Ok(task) = request.task.parse::<Task>() else {
                return ToolResult::rejected(format!("invalid task: {}", request.task));
            };
            assignments.push(EmployeeAssignment {
                employee_id: id,
                task,
            });
        }

        let counts = count_tasks(&assignments);
        for task in Task::CAPPED {
            if counts.get(&task).copied().unwrap_or(0) > MAX_WORKERS_PER_TASK {
                return ToolResult::rejected(format!(
                    "at most {MAX_WORKERS_PER_TASK} workers on {task}"
                ));
            }
        }

        self.state.set_worker_assignments(assignments);
        ToolResult {
            worker_assignments: Some(self.state.worker_assignments.clone()),
            worker_capacities: Some(self.state.worker_capacities),
            ..ToolResult::success()
        }
    }
}

// ---------------------------------------------------------------------------
// Tool definitions (native tool calling)
// ---------------------------------------------------------------------------

pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    let tasks: Vec<&str> = Task::ALL.iter().map(|t| t.as_str()).collect();
    vec![
        ToolDescriptor {
            name: "get_status".to_string(),
            description: "Get cash, stock on hand, incoming deliveries, worker assignments and \
                          workers away shopping."
                .to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
            output_schema: None,
        },
        ToolDescriptor {
            name: "get_prices".to_string(),
            description: "Get the current selling price of every product.".to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
            output_schema: None,
        },
        ToolDescriptor {
            name: "set_prices".to_string(),
            description: "Change selling prices. Products not listed keep their price."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "prices": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "product": { "type": "string" },
                                "price": { "type": "number", "minimum": 0 }
                            },
                            "required": ["product", "price"]
                        }
                    }
                },
                "required": ["prices"]
            }),
            output_schema: None,
        },
        ToolDescriptor {
            name: "place_order".to_string(),
            description: "Buy ingredients. Cash is paid now; the selected workers leave their \
                          task and return with the goods after the lead time. Each worker \
                          carries a limited weight."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "items": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "ingredient": { "type": "string" },
                                "quantity": { "type": "number", "minimum": 0 }
                            },
                            "required": ["ingredient", "quantity"]
                        }
                    },
                    "workers": {
                        "type": "array",
                        "items": { "type": "integer", "minimum": 1 },
                        "description": "Ids of the workers sent to buy"
                    }
                },
                "required": ["items", "workers"]
            }),
            output_schema: None,
        },
        ToolDescriptor {
            name: "assign_workers".to_string(),
            description: format!(
                "Replace all worker assignments. Workers left out become idle. At most \
                 {MAX_WORKERS_PER_TASK} workers per task except go_shopping."
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "assignments": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "employee_id": { "type": "integer", "minimum": 1 },
                                "task": { "type": "string", "enum": tasks }
                            },
                            "required": ["employee_id", "task"]
                        }
                    }
                },
                "required": ["assignments"]
            }),
            output_schema: None,
        },
        ToolDescriptor {
            name: "end_turn".to_string(),
            description: "Finish your decisions for this 15-minute turn.".to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
            output_schema: None,
        },
    ]
}
