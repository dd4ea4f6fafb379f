//! Decision-maker contract.

use crate::sim::tools::{Action, ToolExecutor};
use crate::sim::types::Observation;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("input error: {0}")]
    Input(String),
}

/// Anything that can run a decision phase.
///
/// `decide` may call the executor any number of times and must finish with
/// `end_turn`; the returned list mirrors the calls it made, in order.
#[allow(async_fn_in_trait)]
pub trait Decider {
    fn name(&self) -> String;
    async fn decide(
        &mut self,
        obs: &Observation,
        tools: &mut ToolExecutor<'_>,
    ) -> Result<Vec<Action>, AgentError>;
}
