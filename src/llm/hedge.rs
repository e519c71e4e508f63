use super::{ChatRequest, LlmError, ModelProvider};
use async_trait::async_trait;
use futures::future::{BoxFuture, select_ok};
use std::sync::Arc;
use tracing::{debug, warn};

/// Races a fixed list of providers: the first successful reply wins and the
/// remaining in-flight requests are dropped. Fails only when every provider
/// fails, with the last error.
pub struct HedgedProvider {
    providers: Vec<Arc<dyn ModelProvider>>,
}

impl HedgedProvider {
    pub fn new(providers: Vec<Arc<dyn ModelProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl ModelProvider for HedgedProvider {
    fn name(&self) -> &str {
        "hedged"
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError> {
        if self.providers.is_empty() {
            return Err(LlmError::NoProviders);
        }

        let attempts = self.providers.iter().map(|provider| {
            let attempt: BoxFuture<'_, Result<(String, String), LlmError>> = Box::pin(async move {
                match provider.generate(request).await {
                    Ok(text) => Ok((provider.name().to_string(), text)),
                    Err(err) => {
                        warn!(target = "adcopy.llm", provider = provider.name(), error = %err, "hedged_attempt_failed");
                        Err(err)
                    }
                }
            });
            attempt
        });

        let ((winner, text), losers) = select_ok(attempts).await?;
        debug!(
            target = "adcopy.llm",
            provider = %winner,
            cancelled = losers.len(),
            "hedged_request_won"
        );
        Ok(text)
    }
}
