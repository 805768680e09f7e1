//! Generic HTTP-backed `ModelClient` (reference wiring, not core contract).
//!
//! One implementation parameterized by base URL, model id, and API key
//! instead of a one-file-per-provider split — since every participant
//! speaks a similar chat-completions-shaped wire protocol, a single
//! generic client configured per participant covers them without
//! several near-duplicate files.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use super::{
    FinishReason, GenerateRequest, ModelClient, ModelResponse, ModelUsage, StreamChunk,
};
use crate::model::ToolInvocation;

/// Configuration for one HTTP-backed participant.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

pub struct HttpModelClient {
    http: reqwest::Client,
    config: HttpClientConfig,
}

impl HttpModelClient {
    pub fn new(config: HttpClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn body(&self, request: &GenerateRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect();
        let tools: Vec<_> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        json!({
            "model": self.config.model,
            "messages": messages,
            "tools": tools,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": stream,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallBody>,
}

#[derive(Debug, Deserialize)]
struct ToolCallBody {
    id: String,
    function: ToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct ToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn generate(&self, request: GenerateRequest) -> anyhow::Result<ModelResponse> {
        let body = self.body(&request, false);
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<CompletionResponse>()
            .await?;

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("model returned no choices"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolInvocation {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect::<Vec<_>>();

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => FinishReason::ToolUse,
            Some("length") => FinishReason::Length,
            _ if !tool_calls.is_empty() => FinishReason::ToolUse,
            _ => FinishReason::Stop,
        };

        Ok(ModelResponse {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: resp
                .usage
                .map(|u| ModelUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                })
                .unwrap_or_default(),
            finish_reason,
        })
    }

    async fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamChunk>> {
        // Streaming transport is a collaborator concern; this reference
        // wiring falls back to a single non-streamed call and replays it
        // as one chunk, a degraded-but-correct behavior also useful for
        // mock clients in tests.
        let (tx, rx) = mpsc::channel(8);
        let response = self.generate(request).await;
        tokio::spawn(async move {
            match response {
                Ok(resp) => {
                    if !resp.text.is_empty() {
                        let _ = tx.send(StreamChunk::TextDelta(resp.text.clone())).await;
                    }
                    let _ = tx.send(StreamChunk::Done(resp)).await;
                }
                Err(e) => {
                    let _ = tx.send(StreamChunk::Error(e.to_string())).await;
                }
            }
        });
        Ok(rx)
    }

    fn count_tokens(&self, text: &str) -> u32 {
        // Rough estimate (~4 chars/token); a real client would call the
        // provider's tokenizer endpoint or a local tokenizer library.
        (text.len() as u32 / 4).max(1)
    }

    fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_tokens_is_monotonic_and_nonzero() {
        let client = HttpModelClient::new(HttpClientConfig {
            base_url: "http://localhost".into(),
            model: "test".into(),
            api_key: "key".into(),
        });
        assert!(client.count_tokens("") >= 1);
        assert!(client.count_tokens("a longer string of text") > client.count_tokens("short"));
    }

    #[test]
    fn unavailable_without_api_key() {
        let client = HttpModelClient::new(HttpClientConfig {
            base_url: "http://localhost".into(),
            model: "test".into(),
            api_key: "".into(),
        });
        assert!(!client.is_available());
    }
}
