use crate::config::{COPIES_PER_REGION, GeneratorConfig};
use crate::llm::{ChatRequest, LlmError, ModelProvider};
use crate::models::FallbackReason;
use crate::prompt::PromptSpec;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

static COPY_DELIMITER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)copy\s*\d+\s*[:：]").expect("valid copy delimiter regex"));

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Provider(#[from] LlmError),
    #[error("model call exceeded {0:?}")]
    Timeout(Duration),
}

impl GenerationError {
    pub fn fallback_reason(&self) -> FallbackReason {
        match self {
            GenerationError::Provider(LlmError::MissingApiKey | LlmError::NoProviders) => {
                FallbackReason::NotConfigured
            }
            GenerationError::Provider(LlmError::Timeout) | GenerationError::Timeout(_) => {
                FallbackReason::Timeout
            }
            GenerationError::Provider(LlmError::InvalidResponse(detail)) => FallbackReason::Parse {
                detail: detail.clone(),
            },
            GenerationError::Provider(err) => FallbackReason::Transport {
                detail: err.to_string(),
            },
        }
    }
}

/// Accepted candidate length, in characters.
#[derive(Debug, Clone, Copy)]
pub struct CopyLimits {
    pub min_chars: usize,
    pub max_chars: usize,
    pub max_count: usize,
}

impl From<&GeneratorConfig> for CopyLimits {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            min_chars: config.min_copy_chars,
            max_chars: config.max_copy_chars,
            max_count: COPIES_PER_REGION,
        }
    }
}

/// One attempt, no retry: returns up to `max_count` raw candidates.
pub async fn call_model(
    provider: &dyn ModelProvider,
    prompt: &PromptSpec<'_>,
    limits: CopyLimits,
    timeout: Duration,
) -> Result<Vec<String>, GenerationError> {
    let request = ChatRequest {
        messages: prompt.messages(),
    };
    let reply = tokio::time::timeout(timeout, provider.generate(&request))
        .await
        .map_err(|_| GenerationError::Timeout(timeout))??;
    Ok(parse_reply(&reply, limits))
}

/// Segments following each `Copy n:` label, trimmed of whitespace and `|`
/// separators. Text before the first label is dropped.
pub fn split_reply(reply: &str) -> Vec<String> {
    COPY_DELIMITER
        .split(reply)
        .skip(1)
        .map(|segment| {
            segment
                .trim_matches(|c: char| c.is_whitespace() || c == '|')
                .to_string()
        })
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// `split_reply` restricted to segments within the length bounds, capped.
pub fn parse_reply(reply: &str, limits: CopyLimits) -> Vec<String> {
    split_reply(reply)
        .into_iter()
        .filter(|segment| {
            let len = segment.chars().count();
            len >= limits.min_chars && len <= limits.max_chars
        })
        .take(limits.max_count)
        .collect()
}
