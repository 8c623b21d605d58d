//! # Model Client
//!
//! The contract the orchestrator calls models through, and `LmClient`, which
//! puts a provider and a usage ledger behind it.

use crate::error::{self, Error, Result};
use crate::prompt::Prompt;
use crate::provider::{CompletionRequest, LlmProvider};
use crate::types::{ModelUsageSummary, UsageSummary};
use crate::usage::UsageLedger;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

/// Anything that can answer a prompt and account for it
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Complete `prompt` with `model`, or the client default when `None`
    async fn acompletion(&self, prompt: &Prompt, model: Option<&str>) -> Result<String>;

    /// Blocking counterpart of `acompletion`.
    ///
    /// Outside a runtime this drives its own single-threaded one. On a
    /// multi-threaded runtime the worker is handed off with `block_in_place`.
    /// A current-thread runtime cannot block, so that case is `Unsupported`.
    fn completion(&self, prompt: &Prompt, model: Option<&str>) -> Result<String> {
        if let Ok(handle) = Handle::try_current() {
            return match handle.runtime_flavor() {
                RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| {
                    handle.block_on(self.acompletion(prompt, model))
                }),
                _ => Err(Error::unsupported(
                    "blocking completion inside a current-thread runtime, use acompletion",
                )
                .with_operation("client::completion")),
            };
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::unexpected("failed to start runtime for blocking completion")
                    .with_operation("client::completion")
                    .set_source(e)
            })?;
        runtime.block_on(self.acompletion(prompt, model))
    }

    /// Cumulative usage of every call made so far
    fn get_usage_summary(&self) -> UsageSummary;

    /// Usage of the most recent call
    fn get_last_usage(&self) -> Option<ModelUsageSummary>;

    /// Model used when a call names none
    fn model_name(&self) -> Option<&str>;

    /// Backend label recorded in run metadata
    fn backend(&self) -> &str;
}

#[async_trait]
impl<C: ModelClient + ?Sized> ModelClient for Arc<C> {
    async fn acompletion(&self, prompt: &Prompt, model: Option<&str>) -> Result<String> {
        (**self).acompletion(prompt, model).await
    }

    fn get_usage_summary(&self) -> UsageSummary {
        (**self).get_usage_summary()
    }

    fn get_last_usage(&self) -> Option<ModelUsageSummary> {
        (**self).get_last_usage()
    }

    fn model_name(&self) -> Option<&str> {
        (**self).model_name()
    }

    fn backend(&self) -> &str {
        (**self).backend()
    }
}

/// A provider with usage accounting and a default model
pub struct LmClient<P> {
    provider: P,
    model_name: Option<String>,
    ledger: UsageLedger,
}

impl<P: LlmProvider> LmClient<P> {
    /// The default model falls back to the provider's own default
    pub fn new(provider: P) -> Self {
        let model_name = provider.default_model().map(str::to_string);
        Self {
            provider,
            model_name,
            ledger: UsageLedger::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn resolve_model(&self, model: Option<&str>) -> Result<String> {
        model
            .or(self.model_name.as_deref())
            .map(str::to_string)
            .ok_or_else(|| {
                error::model_missing(self.provider.name()).with_operation("client::acompletion")
            })
    }
}

#[async_trait]
impl<P: LlmProvider> ModelClient for LmClient<P> {
    async fn acompletion(&self, prompt: &Prompt, model: Option<&str>) -> Result<String> {
        let messages = prompt
            .to_messages()
            .map_err(|e| e.with_operation("client::acompletion"))?;
        let model = self.resolve_model(model)?;

        let request = CompletionRequest::new(messages).with_model(model.clone());
        let response = self.provider.complete(request).await.map_err(|e| {
            e.into_error()
                .with_operation("client::acompletion")
                .with_context("model", model.clone())
        })?;

        self.ledger
            .track(&model, response.usage.as_ref())
            .map_err(|e| e.with_operation("client::acompletion"))?;

        if let Some(usage) = &response.usage {
            debug!(
                model = %model,
                input_tokens = usage.prompt_tokens,
                output_tokens = usage.completion_tokens,
                "completion finished"
            );
        }

        Ok(response.content.unwrap_or_default())
    }

    fn get_usage_summary(&self) -> UsageSummary {
        self.ledger.get_usage_summary()
    }

    fn get_last_usage(&self) -> Option<ModelUsageSummary> {
        self.ledger.get_last_usage()
    }

    fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    fn backend(&self) -> &str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::provider::{ChatMessage, Role};
    use crate::testing::{ScriptedProvider, ScriptedReply};
    use serde_json::json;

    #[tokio::test]
    async fn test_acompletion_tracks_usage() {
        let provider = ScriptedProvider::new(vec![
            ScriptedReply::text("first").with_usage(10, 2),
            ScriptedReply::text("second").with_usage(20, 4),
        ]);
        let client = LmClient::new(provider).with_model("gpt-4o");

        let prompt = Prompt::from("hello");
        assert_eq!(client.acompletion(&prompt, None).await.unwrap(), "first");
        assert_eq!(client.acompletion(&prompt, Some("gpt-4o-mini")).await.unwrap(), "second");

        let summary = client.get_usage_summary();
        assert_eq!(summary.get("gpt-4o"), Some(&ModelUsageSummary::new(1, 10, 2)));
        assert_eq!(summary.get("gpt-4o-mini"), Some(&ModelUsageSummary::new(1, 20, 4)));
        assert_eq!(client.get_last_usage(), Some(ModelUsageSummary::new(1, 20, 4)));

        let requests = client.provider().requests();
        assert_eq!(requests[0].model.as_deref(), Some("gpt-4o"));
        assert_eq!(requests[0].messages, vec![ChatMessage::user("hello")]);
        assert_eq!(requests[1].model.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_missing_model() {
        let client = LmClient::new(ScriptedProvider::new(vec![ScriptedReply::text("x")]));
        assert_eq!(client.model_name(), None);

        let err = client.acompletion(&Prompt::from("hi"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelMissing);
        // Nothing reached the provider
        assert!(client.provider().requests().is_empty());
    }

    #[tokio::test]
    async fn test_provider_default_model() {
        let provider = ScriptedProvider::new(vec![ScriptedReply::text("x")]).with_default_model("local");
        let client = LmClient::new(provider);
        assert_eq!(client.model_name(), Some("local"));
        client.acompletion(&Prompt::from("hi"), None).await.unwrap();
        assert_eq!(client.get_usage_summary().total_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_usage() {
        let provider = ScriptedProvider::new(vec![ScriptedReply::text("no usage").without_usage()]);
        let client = LmClient::new(provider).with_model("gpt-4o");

        let err = client.acompletion(&Prompt::from("hi"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageMissing);
        assert!(client.get_usage_summary().is_empty());
        assert!(client.get_last_usage().is_none());
    }

    #[tokio::test]
    async fn test_invalid_prompt() {
        let client = LmClient::new(ScriptedProvider::new(vec![])).with_model("m");
        let prompt = Prompt::from_value(json!({"doc": "x"})).unwrap();

        let err = client.acompletion(&prompt, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPrompt);
    }

    #[tokio::test]
    async fn test_message_prompt() {
        let provider = ScriptedProvider::new(vec![ScriptedReply::text("ok")]);
        let client = LmClient::new(provider).with_model("m");
        let prompt = Prompt::from_messages(&[ChatMessage::system("s"), ChatMessage::user("u")]);

        client.acompletion(&prompt, None).await.unwrap();
        let sent = &client.provider().requests()[0].messages;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_provider_failure() {
        let client = LmClient::new(ScriptedProvider::new(vec![])).with_model("m");
        let err = client.acompletion(&Prompt::from("hi"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert_eq!(err.operation(), "client::acompletion");
    }

    #[test]
    fn test_blocking_completion() {
        let provider = ScriptedProvider::new(vec![ScriptedReply::text("sync").with_usage(1, 1)]);
        let client = LmClient::new(provider).with_model("m");

        assert_eq!(client.completion(&Prompt::from("hi"), None).unwrap(), "sync");
        assert_eq!(client.get_usage_summary().total_calls(), 1);
    }

    #[tokio::test]
    async fn test_blocking_completion_on_current_thread_runtime() {
        let client = LmClient::new(ScriptedProvider::from_texts(["unused"])).with_model("m");

        let err = client.completion(&Prompt::from("hi"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_eq!(err.operation(), "client::completion");
        assert!(client.provider().requests().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_completion_on_multi_thread_runtime() {
        let provider = ScriptedProvider::new(vec![ScriptedReply::text("from a worker").with_usage(3, 1)]);
        let client = Arc::new(LmClient::new(provider).with_model("m"));

        let worker = Arc::clone(&client);
        let text = tokio::spawn(async move { worker.completion(&Prompt::from("hi"), None) })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(text, "from a worker");
        assert_eq!(client.get_usage_summary().get("m"), Some(&ModelUsageSummary::new(1, 3, 1)));
    }

    #[tokio::test]
    async fn test_shared_client() {
        let provider = ScriptedProvider::new(vec![
            ScriptedReply::text("a").with_usage(1, 1),
            ScriptedReply::text("b").with_usage(1, 1),
        ]);
        let client = Arc::new(LmClient::new(provider).with_model("m"));
        let other = Arc::clone(&client);

        client.acompletion(&Prompt::from("1"), None).await.unwrap();
        other.acompletion(&Prompt::from("2"), None).await.unwrap();
        assert_eq!(client.get_usage_summary().get("m"), Some(&ModelUsageSummary::new(2, 2, 2)));
    }
}
