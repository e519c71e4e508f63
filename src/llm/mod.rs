pub mod hedge;
pub mod openai;

pub use hedge::HedgedProvider;
pub use openai::{ChatCompletionsClient, LlmConfig};

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing api key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("no providers configured")]
    NoProviders,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Provider-agnostic request; each provider fills in its own model id and
/// sampling parameters.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

/// A language-model backend. Returns the raw reply text.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// Builds the configured provider, or `None` when no API key is set so every
/// region goes straight to templates.
pub fn build_provider(config: LlmConfig) -> Option<Arc<dyn ModelProvider>> {
    config.api_key.as_ref()?;
    if config.hedge_endpoints.is_empty() {
        info!(target = "adcopy.llm", endpoint = %config.endpoint, model = %config.model, "model provider configured");
        return Some(Arc::new(ChatCompletionsClient::new(config)));
    }

    let http = crate::http::build_client();
    let mut endpoints = vec![config.endpoint.clone()];
    endpoints.extend(config.hedge_endpoints.iter().cloned());
    info!(target = "adcopy.llm", endpoints = endpoints.len(), model = %config.model, "hedged model providers configured");
    let providers = endpoints
        .into_iter()
        .map(|endpoint| {
            let provider: Arc<dyn ModelProvider> = Arc::new(ChatCompletionsClient::with_client(
                http.clone(),
                LlmConfig {
                    endpoint,
                    hedge_endpoints: Vec::new(),
                    ..config.clone()
                },
            ));
            provider
        })
        .collect();
    Some(Arc::new(HedgedProvider::new(providers)))
}
