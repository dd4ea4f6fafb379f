//! Token prices for the models the benchmark knows about.

/// EUR per million tokens, input and output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelCost {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

const MODEL_COSTS: &[(&str, ModelCost)] = &[
    ("openai:gpt-5.1", ModelCost::new(1.25, 10.0)),
    ("openai:gpt-5.1-mini", ModelCost::new(0.25, 2.0)),
    ("openai:gpt-5.2", ModelCost::new(1.75, 14.0)),
    ("openai:gpt-5-mini", ModelCost::new(0.25, 2.0)),
    ("openai:gpt-5-nano", ModelCost::new(0.05, 0.40)),
    ("openai:gpt-5", ModelCost::new(1.25, 10.0)),
    ("anthropic:claude-sonnet-4-5-20250929", ModelCost::new(3.0, 15.0)),
    ("anthropic:claude-opus-4-5-20251101", ModelCost::new(5.0, 25.0)),
    ("anthropic:claude-haiku-4-5-20251001", ModelCost::new(1.0, 5.0)),
    ("gemini:gemini-3-pro-preview", ModelCost::new(2.0, 12.0)),
    ("gemini:gemini-2.5-flash", ModelCost::new(0.30, 2.50)),
    ("gemini:gemini-2.5-pro", ModelCost::new(1.25, 10.0)),
    ("xai:grok-4-1-fast-reasoning", ModelCost::new(0.20, 0.50)),
    ("xai:grok-4-0709", ModelCost::new(3.0, 15.0)),
];

impl ModelCost {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }
}

/// Looks up `provider:model`.
pub fn model_cost(provider: &str, model: &str) -> Option<ModelCost> {
    let key = format!("{}:{}", provider.to_ascii_lowercase(), model);
    MODEL_COSTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, cost)| *cost)
}

/// Estimated spend for one request. Unknown models cost nothing.
pub fn estimate_cost(provider: &str, model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
    let Some(cost) = model_cost(provider, model) else {
        return 0.0;
    };
    (tokens_in as f64 * cost.input_per_million + tokens_out as f64 * cost.output_per_million)
        / 1_000_000.0
}
