//! # LLM Provider Interface
//!
//! A trait-based abstraction for communicating with LLM backends.
//!
//! ## Design
//! - `LlmProvider` trait defines the core interface
//! - Implementations for OpenAI-compatible APIs and Anthropic
//! - `Backend` joins them into one closed enum, chosen once from a `ProviderConfig`
//! - Usage is reported per response and never defaulted

pub mod openai;
pub mod anthropic;

pub use openai::OpenAIProvider;
pub use anthropic::AnthropicProvider;

use crate::error::{self, Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;

// ============================================================================
// Core Types
// ============================================================================

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub stop: Option<Vec<String>>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: Option<String>,
    pub finish_reason: FinishReason,
    /// `None` when the provider omitted usage; callers must not default it
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Error type for provider operations
#[derive(Debug)]
pub enum ProviderError {
    /// Network/connection error
    Network(String),
    /// API returned an error
    Api { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    /// Rate limited
    RateLimited { retry_after: Option<u64> },
    /// Invalid request
    InvalidRequest(String),
    /// Model not found
    ModelNotFound(String),
    /// Authentication failed
    AuthenticationFailed,
    /// Other error
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Self::Parse(e) => write!(f, "Parse error: {}", e),
            Self::RateLimited { retry_after } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after {
                    write!(f, " (retry after {}s)", secs)?;
                }
                Ok(())
            }
            Self::InvalidRequest(e) => write!(f, "Invalid request: {}", e),
            Self::ModelNotFound(m) => write!(f, "Model not found: {}", m),
            Self::AuthenticationFailed => write!(f, "Authentication failed"),
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Map into the unified error, keeping the provider error as source
    pub fn into_error(self) -> Error {
        let kind = match &self {
            Self::Network(_) => ErrorKind::NetworkFailed,
            Self::Api { status, .. } if *status >= 500 => ErrorKind::ProviderUnavailable,
            Self::Api { .. } => ErrorKind::InferenceFailed,
            Self::Parse(_) => ErrorKind::ParseFailed,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::InvalidRequest(_) => ErrorKind::InvalidArgument,
            Self::ModelNotFound(_) => ErrorKind::ConfigInvalid,
            Self::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            Self::Other(_) => ErrorKind::InferenceFailed,
        };
        let mut err = Error::new(kind, self.to_string());
        if let Self::Api { status, .. } = &self {
            err = err.with_context("status", status.to_string());
        }
        err.set_source(self)
    }
}

/// The main LLM provider trait
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "anthropic")
    fn name(&self) -> &str;

    /// Model used when a call names none
    fn default_model(&self) -> Option<&str>;

    /// Send a completion request and get a full response
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = std::result::Result<CompletionResponse, ProviderError>> + Send;
}

// ============================================================================
// Provider Configuration
// ============================================================================

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const VERCEL_BASE_URL: &str = "https://ai-gateway.vercel.sh/v1";
/// OpenAI-compatible; only reports usage when the request asks for it
pub const PRIME_INTELLECT_BASE_URL: &str = "https://api.pinference.ai/api/v1";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    OpenRouter,
    Vercel,
    Vllm,
    Anthropic,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::OpenRouter => "openrouter",
            ProviderType::Vercel => "vercel",
            ProviderType::Vllm => "vllm",
            ProviderType::Anthropic => "anthropic",
        }
    }

    /// Environment variable holding the provider's API key
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some("OPENAI_API_KEY"),
            ProviderType::OpenRouter => Some("OPENROUTER_API_KEY"),
            ProviderType::Vercel => Some("AI_GATEWAY_API_KEY"),
            ProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderType::Vllm => None,
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(ProviderType::OpenAI),
            "openrouter" => Ok(ProviderType::OpenRouter),
            "vercel" => Ok(ProviderType::Vercel),
            "vllm" => Ok(ProviderType::Vllm),
            "anthropic" => Ok(ProviderType::Anthropic),
            other => Err(error::config_invalid(format!(
                "unknown backend: {}. Supported backends: openai, openrouter, vercel, vllm, anthropic",
                other
            ))),
        }
    }
}

impl ProviderConfig {
    fn base(provider_type: ProviderType, base_url: &str) -> Self {
        Self {
            provider_type,
            api_key: None,
            base_url: Some(base_url.into()),
            default_model: None,
            headers: HashMap::new(),
            timeout_secs: Some(120),
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            default_model: Some("gpt-4o".into()),
            ..Self::base(ProviderType::OpenAI, OPENAI_BASE_URL)
        }
    }

    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::base(ProviderType::OpenRouter, OPENROUTER_BASE_URL)
        }
    }

    pub fn vercel(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::base(ProviderType::Vercel, VERCEL_BASE_URL)
        }
    }

    /// The Prime Intellect inference gateway
    pub fn prime_intellect(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::base(ProviderType::OpenAI, PRIME_INTELLECT_BASE_URL)
        }
    }

    /// A local vLLM server; the model must be named
    pub fn vllm(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            timeout_secs: Some(300),
            ..Self::base(ProviderType::Vllm, "")
        }
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("anthropic-version".into(), "2023-06-01".into());

        Self {
            api_key: Some(api_key.into()),
            default_model: Some("claude-sonnet-4-20250514".into()),
            headers,
            ..Self::base(ProviderType::Anthropic, ANTHROPIC_BASE_URL)
        }
    }

    /// Build a config for a hosted provider, reading its API key from the
    /// environment once. vLLM has no hosted endpoint and is rejected here.
    pub fn from_env(provider_type: ProviderType) -> Result<Self> {
        let key = provider_type
            .api_key_var()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default();
        let mut config = match provider_type {
            ProviderType::OpenAI => Self::openai(key),
            ProviderType::OpenRouter => Self::openrouter(key),
            ProviderType::Vercel => Self::vercel(key),
            ProviderType::Anthropic => Self::anthropic(key),
            ProviderType::Vllm => {
                return Err(error::config_invalid(
                    "base_url is required to be set to local vLLM server address for vLLM",
                )
                .with_operation("provider::from_env"))
            }
        };
        if config.api_key.as_deref() == Some("") {
            config.api_key = None;
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Check the config can produce a working client
    pub fn validate(&self) -> Result<()> {
        let has_base_url = self.base_url.as_deref().map(|u| !u.is_empty()).unwrap_or(false);
        if !has_base_url {
            return Err(error::config_invalid(format!(
                "{} backend requires a base_url",
                self.provider_type.as_str()
            ))
            .with_operation("provider::validate"));
        }
        Ok(())
    }
}

// ============================================================================
// Backend selection
// ============================================================================

/// One variant per provider implementation, selected once from config
pub enum Backend {
    OpenAI(OpenAIProvider),
    Anthropic(AnthropicProvider),
}

impl Backend {
    pub fn from_config(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        match config.provider_type {
            ProviderType::OpenAI
            | ProviderType::OpenRouter
            | ProviderType::Vercel
            | ProviderType::Vllm => Ok(Backend::OpenAI(OpenAIProvider::new(config)?)),
            ProviderType::Anthropic => Ok(Backend::Anthropic(AnthropicProvider::new(config)?)),
        }
    }
}

impl LlmProvider for Backend {
    fn name(&self) -> &str {
        match self {
            Backend::OpenAI(p) => p.name(),
            Backend::Anthropic(p) => p.name(),
        }
    }

    fn default_model(&self) -> Option<&str> {
        match self {
            Backend::OpenAI(p) => p.default_model(),
            Backend::Anthropic(p) => p.default_model(),
        }
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        match self {
            Backend::OpenAI(p) => p.complete(request).await,
            Backend::Anthropic(p) => p.complete(request).await,
        }
    }
}

/// Shared HTTP client construction for the adapters
pub(crate) fn http_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(120)))
        .build()
        .map_err(|e| {
            error::config_invalid("failed to create HTTP client")
                .with_operation("provider::http_client")
                .set_source(e)
        })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are helpful");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.content, "You are helpful");

        let user = ChatMessage::user("Hello");
        assert_eq!(user.role, Role::User);

        let asst = ChatMessage::assistant("Hi there!");
        assert_eq!(asst.role, Role::Assistant);
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_value(ChatMessage::assistant("x")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "x"}));
        assert!(serde_json::from_value::<ChatMessage>(serde_json::json!({"role": "robot"})).is_err());
        assert!(serde_json::from_value::<ChatMessage>(serde_json::json!({"role": "tool"})).is_err());
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("Hello")])
            .with_model("gpt-4o")
            .with_temperature(0.7)
            .with_max_tokens(1000);

        assert_eq!(request.model, Some("gpt-4o".into()));
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(1000));
    }

    #[test]
    fn test_provider_config() {
        let config = ProviderConfig::openai("sk-test");
        assert_eq!(config.provider_type, ProviderType::OpenAI);
        assert_eq!(config.default_model, Some("gpt-4o".into()));

        let config = ProviderConfig::anthropic("sk-ant-test");
        assert_eq!(config.provider_type, ProviderType::Anthropic);
        assert!(config.headers.contains_key("anthropic-version"));

        let config = ProviderConfig::openrouter("or-key");
        assert_eq!(config.base_url.as_deref(), Some(OPENROUTER_BASE_URL));
        assert_eq!(config.default_model, None);
    }

    #[test]
    fn test_vllm_requires_base_url() {
        assert!(ProviderConfig::vllm("http://localhost:8000/v1", "qwen").validate().is_ok());

        let err = ProviderConfig::vllm("", "qwen").validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let err = ProviderConfig::from_env(ProviderType::Vllm).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_provider_type_parse() {
        assert_eq!("openrouter".parse::<ProviderType>().unwrap(), ProviderType::OpenRouter);
        let err = "portkey".parse::<ProviderType>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert!(err.message().contains("portkey"));
    }

    #[test]
    fn test_backend_selection() {
        let backend = Backend::from_config(ProviderConfig::vercel("key")).unwrap();
        assert_eq!(backend.name(), "openai");
        assert!(matches!(backend, Backend::OpenAI(_)));

        let backend = Backend::from_config(ProviderConfig::anthropic("key")).unwrap();
        assert_eq!(backend.name(), "anthropic");
        assert_eq!(backend.default_model(), Some("claude-sonnet-4-20250514"));
    }

    #[test]
    fn test_provider_error_mapping() {
        let err = ProviderError::RateLimited { retry_after: Some(3) }.into_error();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.is_retryable());

        let err = ProviderError::Api { status: 503, message: "down".into() }.into_error();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert_eq!(err.context()[0], ("status", "503".to_string()));

        let err = ProviderError::AuthenticationFailed.into_error();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert!(!err.is_retryable());
    }
}
