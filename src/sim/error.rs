use crate::sim::decider::AgentError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors that abort an episode. Rejected tool calls are not errors; they
/// come back to the agent as a `ToolResult` with `ok == false`.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("turn {turn}: decision phase ended without end_turn as the last action")]
    MissingEndTurn { turn: usize },
    #[error("agent failed: {0}")]
    Agent(#[from] AgentError),
    #[error("trace sink failed: {0}")]
    Trace(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        SimError::Trace(err.to_string())
    }
}
