use serde::{Deserialize, Serialize};

use crate::core::tool::ToolDescriptor;
use crate::sim::decider::AgentError;

/// Chat-completions client with native tool calling.
pub struct OpenAiCompatClient {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    reasoning_effort: Option<String>,
    client: reqwest::Client,
    provider_name: &'static str,
}

impl OpenAiCompatClient {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        provider_name: &'static str,
    ) -> Self {
        Self {
            api_key,
            model,
            base_url,
            reasoning_effort: None,
            client: reqwest::Client::new(),
            provider_name,
        }
    }

    pub fn with_reasoning_effort(mut self, effort: Option<String>) -> Self {
        self.reasoning_effort = effort;
        self
    }

    pub fn model_id(&self) -> String {
        self.model.clone()
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider_name
    }

    /// One round trip. `messages` is the full conversation so far.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ChatCompletion, AgentError> {
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let openai_tools: Option<Vec<serde_json::Value>> = if tools.is_empty() {
            None
        } else {
            Some(tools.iter().map(ToolDescriptor::to_function_tool).collect())
        };
        let has_tools = openai_tools.is_some();
        let body = OpenAiChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            tools: openai_tools,
            tool_choice: has_tools.then(|| "auto".to_string()),
            reasoning_effort: self.reasoning_effort.clone(),
        };

        let response = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;

        tracing::debug!("{} API response: status={}", self.provider_name, status);

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AgentError::Auth(format!(
                "{} auth failed ({status}). Check API key and account access.",
                self.provider_name
            )));
        }
        if !status.is_success() {
            return Err(AgentError::Request(format!(
                "{} error {status}: {text}",
                self.provider_name
            )));
        }

        let parsed: OpenAiChatResponse = serde_json::from_str(&text).map_err(|e| {
            AgentError::InvalidResponse(format!("{} parse failed: {e}", self.provider_name))
        })?;

        let usage = parsed.usage.unwrap_or_default();
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| {
                AgentError::InvalidResponse(format!(
                    "missing choices[0].message from {} response",
                    self.provider_name
                ))
            })?;
        Ok(ChatCompletion { message, usage })
    }
}

/// Assistant reply plus the tokens it cost.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub message: ChatMessage,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text("user", content)
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::text("tool", content)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    pub function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn parses_tool_calls_and_usage() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key")
                .body_contains("\"tool_choice\":\"auto\"")
                .body_contains("\"name\":\"end_turn\"");
            then.status(200).json_body(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": { "name": "end_turn", "arguments": "{}" }
                        }]
                    }
                }],
                "usage": { "prompt_tokens": 120, "completion_tokens": 8 }
            }));
        });

        let client = OpenAiCompatClient::new(
            "test-key".into(),
            "gpt-5-mini".into(),
            format!("{}/v1", server.base_url()),
            "openai",
        );
        let completion = client
            .chat(
                &[ChatMessage::user("hello")],
                &crate::sim::tools::tool_descriptors(),
            )
            .await
            .expect("chat should succeed");

        mock.assert();
        assert_eq!(completion.usage.prompt_tokens, 120);
        let calls = completion.message.tool_calls.expect("tool calls");
        assert_eq!(calls[0].function.name, "end_turn");
        assert_eq!(calls[0].id, "call_1");
    }

    #[tokio::test]
    async fn maps_unauthorized_to_auth_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401).body("nope");
        });
        let client =
            OpenAiCompatClient::new("bad".into(), "m".into(), server.base_url(), "openai");
        let err = client.chat(&[], &[]).await.expect_err("401 must fail");
        assert!(matches!(err, AgentError::Auth(_)));
    }

    #[test]
    fn tool_messages_carry_call_id() {
        let msg = ChatMessage::tool("call_9", "{\"ok\":true}");
        let value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_9");
        assert!(value.get("tool_calls").is_none());
    }
}
