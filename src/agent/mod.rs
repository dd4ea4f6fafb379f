//! Decision-makers that can play the stall.

pub mod costs;
pub mod heuristic;
pub mod human;
pub mod llm;
pub mod message;
pub mod providers;
pub mod scripted;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use heuristic::HeuristicAgent;
pub use human::HumanAgent;
pub use llm::LlmAgent;
pub use message::format_observation_message;
pub use providers::ProviderId;
pub use scripted::ScriptedAgent;

use crate::sim::decider::{AgentError, Decider};
use crate::sim::tools::{Action, ToolExecutor};
use crate::sim::types::Observation;

/// Which agent to build. Parsed from the CLI (`heuristic`, `human`,
/// `provider/model`) or read from an experiments file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentSpec {
    Heuristic,
    Human,
    Llm {
        provider: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning_effort: Option<String>,
    },
}

impl AgentSpec {
    /// Label used in file names and summaries.
    pub fn label(&self) -> String {
        match self {
            AgentSpec::Heuristic => "heuristic".to_string(),
            AgentSpec::Human => "human".to_string(),
            AgentSpec::Llm { model, .. } => model.clone(),
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            AgentSpec::Llm { provider, .. } => Some(provider),
            _ => None,
        }
    }

    pub fn reasoning_effort(&self) -> Option<&str> {
        match self {
            AgentSpec::Llm {
                reasoning_effort, ..
            } => reasoning_effort.as_deref(),
            _ => None,
        }
    }

    pub fn with_reasoning_effort(self, effort: Option<String>) -> Self {
        match self {
            AgentSpec::Llm {
                provider, model, ..
            } => AgentSpec::Llm {
                provider,
                model,
                reasoning_effort: effort,
            },
            other => other,
        }
    }

    pub fn build(&self) -> Result<Agent, AgentError> {
        match self {
            AgentSpec::Heuristic => Ok(Agent::Heuristic(HeuristicAgent::new())),
            AgentSpec::Human => Ok(Agent::Human(HumanAgent::stdio())),
            AgentSpec::Llm {
                provider,
                model,
                reasoning_effort,
            } => {
                let provider = provider.parse::<ProviderId>().map_err(AgentError::Input)?;
                let client =
                    providers::client_from_env(provider, model, reasoning_effort.clone())?;
                Ok(Agent::Llm(LlmAgent::new(provider, client)))
            }
        }
    }
}

impl FromStr for AgentSpec {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "heuristic" => Ok(AgentSpec::Heuristic),
            "human" => Ok(AgentSpec::Human),
            other => {
                let (provider, model) = other.split_once('/').ok_or_else(|| {
                    format!("unknown agent '{other}', expected heuristic, human or provider/model")
                })?;
                let provider = provider.parse::<ProviderId>()?;
                if model.trim().is_empty() {
                    return Err(format!("missing model name in '{other}'"));
                }
                Ok(AgentSpec::Llm {
                    provider: provider.as_str().to_string(),
                    model: model.trim().to_string(),
                    reasoning_effort: None,
                })
            }
        }
    }
}

pub enum Agent {
    Heuristic(HeuristicAgent),
    Scripted(ScriptedAgent),
    Human(HumanAgent<std::io::StdinLock<'static>, std::io::Stdout>),
    Llm(LlmAgent),
}

impl Decider for Agent {
    fn name(&self) -> String {
        match self {
            Agent::Heuristic(agent) => agent.name(),
            Agent::Scripted(agent) => agent.name(),
            Agent::Human(agent) => agent.name(),
            Agent::Llm(agent) => agent.name(),
        }
    }

    async fn decide(
        &mut self,
        obs: &Observation,
        tools: &mut ToolExecutor<'_>,
    ) -> Result<Vec<Action>, AgentError> {
        match self {
            Agent::Heuristic(agent) => agent.decide(obs, tools).await,
            Agent::Scripted(agent) => agent.decide(obs, tools).await,
            Agent::Human(agent) => agent.decide(obs, tools).await,
            Agent::Llm(agent) => agent.decide(obs, tools).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specs_parse_from_cli_strings() {
        assert_eq!("heuristic".parse::<AgentSpec>(), Ok(AgentSpec::Heuristic));
        assert_eq!(
            "openai/gpt-5-mini".parse::<AgentSpec>(),
            Ok(AgentSpec::Llm {
                provider: "openai".into(),
                model: "gpt-5-mini".into(),
                reasoning_effort: None,
            })
        );
        assert!("openai/".parse::<AgentSpec>().is_err());
        assert!("mistral/large".parse::<AgentSpec>().is_err());
        assert!("random".parse::<AgentSpec>().is_err());
    }

    #[test]
    fn specs_deserialize_from_tagged_json() {
        let spec: AgentSpec = serde_json::from_str(
            r#"{"type": "llm", "provider": "xai", "model": "grok-4-0709", "reasoning_effort": "low"}"#,
        )
        .expect("valid spec");
        assert_eq!(spec.label(), "grok-4-0709");
        assert_eq!(spec.reasoning_effort(), Some("low"));
    }
}
