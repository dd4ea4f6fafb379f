//! Language-model player using native function calling.
//!
//! The conversation lives for the whole episode: one system message, then
//! one user message per turn followed by the model's tool calls and their
//! results. Within a turn the agent keeps answering tool calls until the
//! model calls `end_turn`, stops calling tools, or runs out of rounds; in
//! the last two cases `end_turn` is issued on its behalf.

use serde_json::Value;

use crate::agent::costs::estimate_cost;
use crate::agent::message::format_observation_message;
use crate::agent::providers::{ChatMessage, OpenAiCompatClient, ProviderId};
use crate::core::tool::ToolDescriptor;
use crate::sim::decider::{AgentError, Decider};
use crate::sim::tools::{tool_descriptors, Action, ToolExecutor};
use crate::sim::types::Observation;

pub const DEFAULT_MAX_ROUNDS: usize = 12;

pub const SYSTEM_PROMPT: &str = "\
You run a street-food stall at a town festival from 10:00 to 20:00. The day \
is split into 15-minute turns. You sell pintxos and bocadillos of txistorra \
(a thin sausage grilled to order) and glasses of sidra.

Each turn you receive what happened in the previous 15 minutes: how many \
people are queuing, which orders were served, and which could not be served \
because the stall lacked capacity.

Use the tools to run the stall:
- get_status: cash, stock, deliveries on the way, who is doing what, and who \
is away shopping.
- get_prices / set_prices: read or change selling prices. Higher prices bring \
more money per sale but fewer customers.
- assign_workers: give every available worker a task. Serving customers, \
grilling and pouring drinks each limit how many orders the stall can handle \
per turn. At most 3 workers can share a task.
- place_order: buy ingredients. You pay immediately, the workers you send \
leave their task, and they come back with the goods after the lead time. \
Each worker can carry only a limited weight.
- end_turn: finish your decisions for this turn. You must call it every turn.

Customers who wait 30 minutes or more leave the queue. Orders that cannot be \
completed because an ingredient ran out are lost. Your goal is to finish the \
day with as much cash as possible.";

pub struct LlmAgent {
    provider: ProviderId,
    client: OpenAiCompatClient,
    tools: Vec<ToolDescriptor>,
    history: Vec<ChatMessage>,
    max_rounds: usize,
}

impl LlmAgent {
    pub fn new(provider: ProviderId, client: OpenAiCompatClient) -> Self {
        Self {
            provider,
            client,
            tools: tool_descriptors(),
            history: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.client.model
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Drops the conversation; the next turn starts with the system prompt.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "tool arguments are not valid JSON");
        Value::Object(Default::default())
    })
}

impl Decider for LlmAgent {
    fn name(&self) -> String {
        format!("{}/{}", self.provider, self.client.model)
    }

    async fn decide(
        &mut self,
        obs: &Observation,
        tools: &mut ToolExecutor<'_>,
    ) -> Result<Vec<Action>, AgentError> {
        if self.history.is_empty() {
            self.history.push(ChatMessage::system(SYSTEM_PROMPT));
        }
        self.history
            .push(ChatMessage::user(format_observation_message(obs)));

        let mut actions = Vec::new();
        for round in 0..self.max_rounds {
            let completion = self.client.chat(&self.history, &self.tools).await?;
            let usage = completion.usage;
            let cost = estimate_cost(
                self.provider.as_str(),
                &self.client.model,
                usage.prompt_tokens,
                usage.completion_tokens,
            );
            tools.record_usage(usage.prompt_tokens, usage.completion_tokens, cost);

            let mut message = completion.message;
            message.role = "assistant".to_string();
            if let Some(content) = message.content.as_deref().filter(|c| !c.trim().is_empty()) {
                tools.record_message(content);
            }
            let calls = message.tool_calls.clone().unwrap_or_default();
            self.history.push(message);

            tracing::debug!(turn = obs.turn, round, calls = calls.len(), "model replied");
            if calls.is_empty() {
                break;
            }

            for call in calls {
                let args = parse_arguments(&call.function.arguments);
                let (action, result) = tools.dispatch(&call.id, &call.function.name, &args);
                actions.extend(action);
                let payload = serde_json::to_string(&result)
                    .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;
                self.history.push(ChatMessage::tool(call.id, payload));
            }

            if tools.end_turn_requested() {
                break;
            }
        }

        if !tools.end_turn_requested() || actions.last() != Some(&Action::EndTurn) {
            tracing::warn!(turn = obs.turn, model = %self.client.model, "forcing end_turn");
            tools.end_turn();
            actions.push(Action::EndTurn);
        }
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::config::Config;
    use crate::sim::engine::{Simulator, TraceRecord};
    use crate::sim::tools::AgentTraceEntry;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    fn agent_for(server: &MockServer, model: &str) -> LlmAgent {
        let client = OpenAiCompatClient::new(
            "key".into(),
            model.to_string(),
            server.base_url(),
            "openai",
        );
        LlmAgent::new(ProviderId::OpenAi, client)
    }

    fn sim(turns: usize) -> Simulator {
        let mut config = Config::builtin().expect("builtin");
        config.num_turns = turns;
        Simulator::new(config)
    }

    #[tokio::test]
    async fn executes_tool_calls_and_tracks_usage() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": "Raising cider a little.",
                        "tool_calls": [
                            {
                                "id": "c1",
                                "type": "function",
                                "function": {
                                    "name": "set_prices",
                                    "arguments": "{\"prices\":[{\"product\":\"sidra\",\"price\":2.75}]}"
                                }
                            },
                            {
                                "id": "c2",
                                "type": "function",
                                "function": { "name": "end_turn", "arguments": "" }
                            }
                        ]
                    }
                }],
                "usage": { "prompt_tokens": 1000, "completion_tokens": 100 }
            }));
        });

        let mut sim = sim(2);
        let mut agent = agent_for(&server, "gpt-5-mini");
        let mut trace: Vec<TraceRecord> = Vec::new();
        let result = sim
            .run_episode(&mut agent, &mut trace)
            .await
            .expect("episode runs");

        mock.assert_hits(2);
        assert_eq!(sim.state().prices["sidra"], 2.75);
        assert_eq!(result.tokens_in_total, 2000);
        assert_eq!(result.tool_calls_total, 4);
        assert!((result.cost_total - 0.0009).abs() < 1e-9);
        assert!(matches!(
            trace[0].agent_actions[0],
            AgentTraceEntry::Message { .. }
        ));
        // system, then per turn: user, assistant, two tool results
        assert_eq!(agent.history().len(), 1 + 2 * 4);
    }

    #[tokio::test]
    async fn forces_end_turn_when_model_stops_calling_tools() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Waiting." } }]
            }));
        });

        let mut sim = sim(1);
        let mut agent = agent_for(&server, "unpriced-model");
        let mut trace: Vec<TraceRecord> = Vec::new();
        let result = sim
            .run_episode(&mut agent, &mut trace)
            .await
            .expect("forced end_turn keeps the episode going");
        assert_eq!(result.tool_calls_total, 1);
        assert_eq!(result.cost_total, 0.0);
    }

    #[tokio::test]
    async fn provider_errors_abort_the_episode() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("boom");
        });
        let mut sim = sim(1);
        let mut agent = agent_for(&server, "gpt-5");
        let mut trace: Vec<TraceRecord> = Vec::new();
        assert!(sim.run_episode(&mut agent, &mut trace).await.is_err());
        assert!(trace.is_empty());
    }

    #[test]
    fn empty_arguments_become_an_object() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("{not json"), json!({}));
        assert_eq!(parse_arguments("{\"a\":1}"), json!({"a": 1}));
    }
}
