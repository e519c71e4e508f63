use super::{ChatMessage, ChatRequest, LlmError, ModelProvider};
use crate::config::{env_parse, env_string};
use crate::http::build_client;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// Extra OpenAI-compatible endpoints raced against `endpoint`.
    pub hedge_endpoints: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            api_key: None,
            model: DEFAULT_MODEL.into(),
            max_tokens: 1200,
            temperature: 0.9,
            top_p: 0.95,
            presence_penalty: 0.6,
            frequency_penalty: 0.4,
            hedge_endpoints: Vec::new(),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: env_string("LLM_API_URL").unwrap_or(defaults.endpoint),
            api_key: env_string("LLM_API_KEY").or_else(|| env_string("OPENAI_API_KEY")),
            model: env_string("LLM_MODEL").unwrap_or(defaults.model),
            max_tokens: env_parse("LLM_MAX_TOKENS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_tokens),
            temperature: env_parse("LLM_TEMPERATURE")
                .filter(|v: &f32| (0.0..=2.0).contains(v))
                .unwrap_or(defaults.temperature),
            top_p: env_parse("LLM_TOP_P")
                .filter(|v: &f32| *v > 0.0 && *v <= 1.0)
                .unwrap_or(defaults.top_p),
            presence_penalty: env_penalty("LLM_PRESENCE_PENALTY")
                .unwrap_or(defaults.presence_penalty),
            frequency_penalty: env_penalty("LLM_FREQUENCY_PENALTY")
                .unwrap_or(defaults.frequency_penalty),
            hedge_endpoints: env_string("LLM_HEDGE_URLS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|url| !url.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            ..defaults
        }
    }
}

fn env_penalty(key: &str) -> Option<f32> {
    env_parse(key).filter(|v: &f32| (-2.0..=2.0).contains(v))
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsClient {
    http: Client,
    config: LlmConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    pub fn with_client(http: Client, config: LlmConfig) -> Self {
        Self { http, config }
    }

    fn body<'a>(&'a self, messages: &'a [ChatMessage]) -> CompletionBody<'a> {
        CompletionBody {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            presence_penalty: self.config.presence_penalty,
            frequency_penalty: self.config.frequency_penalty,
        }
    }
}

#[async_trait]
impl ModelProvider for ChatCompletionsClient {
    fn name(&self) -> &str {
        &self.config.endpoint
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(key)
            .json(&self.body(&request.messages))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Http(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(LlmError::Status(response.status().as_u16()));
        }

        let payload: CompletionResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".into()))
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    /// Local stand-in for the completions endpoint.
    async fn spawn_stub(status: StatusCode, reply: Value) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let recorded = recorded.clone();
                let reply = reply.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    recorded.lock().unwrap().push((auth, body));
                    (status, Json(reply))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}/v1/chat/completions"), seen)
    }

    fn config(endpoint: String, key: Option<&str>) -> LlmConfig {
        LlmConfig {
            endpoint,
            api_key: key.map(str::to_string),
            ..LlmConfig::default()
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
        }
    }

    #[tokio::test]
    async fn posts_fixed_request_shape_with_bearer_auth() {
        let (url, seen) = spawn_stub(
            StatusCode::OK,
            json!({"choices": [{"message": {"role": "assistant", "content": "Copy 1: hello"}}]}),
        )
        .await;
        let client = ChatCompletionsClient::new(config(url, Some("sk-test")));
        let text = client.generate(&request()).await.expect("reply");
        assert_eq!(text, "Copy 1: hello");

        let seen = seen.lock().unwrap();
        let (auth, body) = &seen[0];
        assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 1200);
        for key in ["temperature", "top_p", "presence_penalty", "frequency_penalty"] {
            assert!(body[key].is_number(), "{key}");
        }
    }

    #[test]
    fn sampling_parameters_come_from_env() {
        // Only this test touches these variables.
        unsafe {
            std::env::set_var("LLM_TOP_P", "0.5");
            std::env::set_var("LLM_PRESENCE_PENALTY", "-1.5");
            std::env::set_var("LLM_FREQUENCY_PENALTY", "9");
        }
        let cfg = LlmConfig::from_env();
        assert_eq!(cfg.top_p, 0.5);
        assert_eq!(cfg.presence_penalty, -1.5);
        assert_eq!(cfg.frequency_penalty, LlmConfig::default().frequency_penalty);
    }

    #[tokio::test]
    async fn non_success_status_is_typed() {
        let (url, _) = spawn_stub(StatusCode::TOO_MANY_REQUESTS, json!({"error": "slow down"})).await;
        let client = ChatCompletionsClient::new(config(url, Some("sk-test")));
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Status(429)));
    }

    #[tokio::test]
    async fn missing_content_is_invalid_response() {
        let (url, _) = spawn_stub(StatusCode::OK, json!({"choices": []})).await;
        let client = ChatCompletionsClient::new(config(url, Some("sk-test")));
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let (url, seen) = spawn_stub(StatusCode::OK, json!({})).await;
        let client = ChatCompletionsClient::new(config(url, Some("  ")));
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let client =
            ChatCompletionsClient::new(config("http://127.0.0.1:9/v1/chat/completions".into(), Some("k")));
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Http(_) | LlmError::Timeout));
    }
}
