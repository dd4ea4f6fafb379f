use std::collections::BTreeMap;

use crate::sim::decider::{AgentError, Decider};
use crate::sim::tools::{Action, ToolExecutor};
use crate::sim::types::Observation;

/// Replays a fixed list of actions per turn.
///
/// Turns without an entry just end. Unless built with
/// [`ScriptedAgent::without_auto_end`], an `end_turn` is appended to any
/// script that does not already finish with one.
#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    script: BTreeMap<usize, Vec<Action>>,
    auto_end: bool,
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl ScriptedAgent {
    pub fn new(script: BTreeMap<usize, Vec<Action>>) -> Self {
        Self {
            script,
            auto_end: true,
        }
    }

    /// Plays the script verbatim, so a turn may finish without `end_turn`.
    pub fn without_auto_end(mut self) -> Self {
        self.auto_end = false;
        self
    }

    pub fn from_json(raw: &str) -> Result<Self, AgentError> {
        let script: BTreeMap<usize, Vec<Action>> = serde_json::from_str(raw)
            .map_err(|e| AgentError::Input(format!("invalid script: {e}")))?;
        Ok(Self::new(script))
    }
}

impl Decider for ScriptedAgent {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn decide(
        &mut self,
        obs: &Observation,
        tools: &mut ToolExecutor<'_>,
    ) -> Result<Vec<Action>, AgentError> {
        let mut actions = match self.script.get(&obs.turn) {
            Some(actions) => actions.clone(),
            None if self.auto_end => Vec::new(),
            None => return Ok(Vec::new()),
        };
        if self.auto_end && actions.last() != Some(&Action::EndTurn) {
            actions.push(Action::EndTurn);
        }
        for action in &actions {
            let result = tools.execute(action);
            if !result.ok {
                tracing::debug!(turn = obs.turn, tool = action.name(), reason = ?result.reason, "scripted call rejected");
            }
        }
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::config::Config;
    use crate::sim::engine::{DiscardTrace, Simulator};
    use crate::sim::error::SimError;

    #[tokio::test]
    async fn missing_turns_default_to_end_turn() {
        let mut config = Config::builtin().expect("builtin");
        config.num_turns = 3;
        let mut sim = Simulator::new(config);
        let mut agent = ScriptedAgent::new(BTreeMap::new());
        let result = sim
            .run_episode(&mut agent, &mut DiscardTrace)
            .await
            .expect("episode runs");
        assert_eq!(result.tool_calls_total, 3);
    }

    #[tokio::test]
    async fn verbatim_script_without_end_turn_fails() {
        let mut config = Config::builtin().expect("builtin");
        config.num_turns = 2;
        let mut sim = Simulator::new(config);
        let mut script = BTreeMap::new();
        script.insert(0, vec![Action::GetStatus, Action::EndTurn]);
        script.insert(1, vec![Action::GetPrices]);
        let mut agent = ScriptedAgent::new(script).without_auto_end();
        let err = sim
            .run_episode(&mut agent, &mut DiscardTrace)
            .await
            .expect_err("turn 1 never ends");
        assert!(matches!(err, SimError::MissingEndTurn { turn: 1 }));
    }

    #[test]
    fn scripts_parse_from_tagged_json() {
        let agent = ScriptedAgent::from_json(
            r#"{"0": [{"type": "set_prices", "prices": {"sidra": 3.0}}, {"type": "end_turn"}]}"#,
        )
        .expect("valid script");
        assert_eq!(agent.script[&0].len(), 2);
        assert!(ScriptedAgent::from_json("[1, 2]").is_err());
    }
}
