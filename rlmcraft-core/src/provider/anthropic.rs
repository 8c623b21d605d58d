//! Anthropic Claude provider implementation

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(ANTHROPIC_BASE_URL)
    }

    fn build_request(&self, request: CompletionRequest) -> std::result::Result<AnthropicRequest, ProviderError> {
        let model = request
            .model
            .or_else(|| self.config.default_model.clone())
            .ok_or_else(|| ProviderError::InvalidRequest("model name is required".into()))?;

        // System messages travel outside the message list
        let mut system: Vec<String> = Vec::new();
        let mut messages = Vec::new();
        for msg in request.messages {
            if msg.role == Role::System {
                system.push(msg.content);
            } else {
                messages.push(AnthropicMessage::from(msg));
            }
        }

        Ok(AnthropicRequest {
            model,
            messages,
            system: if system.is_empty() { None } else { Some(system.join("\n\n")) },
            max_tokens: request.max_tokens.unwrap_or(4096),
            temperature: request.temperature,
            stream: Some(false),
            stop_sequences: request.stop,
        })
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> Option<&str> {
        self.config.default_model.as_deref()
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let api_request = self.build_request(request)?;

        let api_key = self.config.api_key.as_ref()
            .ok_or(ProviderError::AuthenticationFailed)?;

        let mut req = self.client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", api_key)
            .header("content-type", "application/json")
            .json(&api_request);

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req.send().await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();

            if status == 429 {
                return Err(ProviderError::RateLimited { retry_after: None });
            } else if status == 401 {
                return Err(ProviderError::AuthenticationFailed);
            }

            return Err(ProviderError::Api { status, message: text });
        }

        let api_response: AnthropicResponse = response.json().await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(api_response.into_completion())
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

impl From<ChatMessage> for AnthropicMessage {
    fn from(msg: ChatMessage) -> Self {
        let role = match msg.role {
            Role::Assistant => "assistant",
            Role::User | Role::System => "user",
        };

        Self {
            role: role.into(),
            content: msg.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

impl AnthropicResponse {
    fn into_completion(self) -> CompletionResponse {
        let content: String = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect();

        let finish_reason = match self.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Unknown,
        };

        let usage = self.usage.map(|u| Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });

        CompletionResponse {
            id: self.id,
            model: self.model,
            content: if content.is_empty() { None } else { Some(content) },
            finish_reason,
            usage,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_messages_lifted() {
        let provider = AnthropicProvider::new(ProviderConfig::anthropic("sk-ant")).unwrap();
        let request = CompletionRequest::new(vec![
            ChatMessage::system("a"),
            ChatMessage::user("question"),
            ChatMessage::system("b"),
        ]);
        let body = serde_json::to_value(provider.build_request(request).unwrap()).unwrap();

        assert_eq!(body["system"], "a\n\nb");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn test_response_mapping() {
        let raw = json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "FINAL("},
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "4)"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 7, "output_tokens": 2}
        });
        let response: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let completion = response.into_completion();

        assert_eq!(completion.content.as_deref(), Some("FINAL(4)"));
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert_eq!(
            completion.usage,
            Some(Usage { prompt_tokens: 7, completion_tokens: 2, total_tokens: 9 })
        );
    }

    #[test]
    fn test_missing_usage_is_reported() {
        let raw = json!({"content": [], "stop_reason": "max_tokens"});
        let response: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let completion = response.into_completion();

        assert!(completion.usage.is_none());
        assert!(completion.content.is_none());
        assert_eq!(completion.finish_reason, FinishReason::Length);
    }
}
