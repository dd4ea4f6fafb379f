//! Language-model providers reachable through an OpenAI-compatible
//! chat-completions endpoint.

pub mod openai_compat;

use std::str::FromStr;

pub use openai_compat::{ChatCompletion, ChatMessage, OpenAiCompatClient, OpenAiToolCall, Usage};

use crate::sim::decider::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Gemini,
    Xai,
}

impl ProviderId {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Xai => "xai",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OpenAi,
            ProviderId::Anthropic,
            ProviderId::Gemini,
            ProviderId::Xai,
        ]
    }

    pub const fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Xai => "https://api.x.ai/v1",
        }
    }

    pub const fn api_key_env_keys(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::Xai => &["XAI_API_KEY"],
        }
    }

    pub const fn base_url_env_keys(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["OPENAI_BASE_URL"],
            Self::Anthropic => &["ANTHROPIC_BASE_URL"],
            Self::Gemini => &["GEMINI_BASE_URL"],
            Self::Xai => &["XAI_BASE_URL"],
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "xai" | "grok" => Ok(Self::Xai),
            _ => Err(format!("unsupported llm provider: {value}")),
        }
    }
}

pub(crate) fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        std::env::var(key)
            .ok()
            .and_then(|value| normalize_optional_string(Some(value)))
    })
}

pub(crate) fn normalize_optional_string(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Builds a client for `provider` from environment variables.
pub fn client_from_env(
    provider: ProviderId,
    model: &str,
    reasoning_effort: Option<String>,
) -> Result<OpenAiCompatClient, AgentError> {
    let api_key = first_non_empty_env(provider.api_key_env_keys()).ok_or_else(|| {
        AgentError::Auth(format!(
            "missing API key for {provider}; set one of {}",
            provider.api_key_env_keys().join(", ")
        ))
    })?;
    let base_url = first_non_empty_env(provider.base_url_env_keys())
        .unwrap_or_else(|| provider.default_base_url().to_string());
    Ok(OpenAiCompatClient::new(
        api_key,
        model.to_string(),
        base_url,
        provider.as_str(),
    )
    .with_reasoning_effort(normalize_optional_string(reasoning_effort)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_ids_parse_aliases() {
        assert_eq!("OpenAI".parse::<ProviderId>(), Ok(ProviderId::OpenAi));
        assert_eq!("grok".parse::<ProviderId>(), Ok(ProviderId::Xai));
        assert!("mistral".parse::<ProviderId>().is_err());
        for id in ProviderId::all() {
            assert_eq!(id.as_str().parse::<ProviderId>().as_ref(), Ok(id));
        }
    }

    #[test]
    fn blank_strings_normalize_to_none() {
        assert_eq!(normalize_optional_string(Some("  ".into())), None);
        assert_eq!(normalize_optional_string(Some(" high ".into())), Some("high".into()));
    }
}
