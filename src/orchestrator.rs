use crate::catalog::Catalog;
use crate::config::{COPIES_PER_REGION, GeneratorConfig};
use crate::emoji::EmojiEnhancer;
use crate::generation::{CopyLimits, call_model};
use crate::llm::ModelProvider;
use crate::locale::ResolvedRegion;
use crate::models::{CopySource, DiversitySeed, FallbackReason, GeneratedCopy, ProductInfo, RegionBatch};
use crate::postprocess::clean_copy;
use crate::prompt::{PromptSpec, emoji_rules};
use crate::validator::LanguageValidator;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Receives each region's copies as soon as they are final.
#[async_trait]
pub trait CopySink: Send + Sync {
    async fn emit(&self, batch: RegionBatch);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub regions: usize,
    pub copies: usize,
    pub fallbacks: usize,
    pub elapsed_ms: u128,
}

/// Fans a product out over its regions with a bounded worker pool. Every
/// region yields exactly three copies, from the model or from templates.
#[derive(Clone)]
pub struct Orchestrator {
    catalog: Arc<Catalog>,
    provider: Option<Arc<dyn ModelProvider>>,
    config: Arc<GeneratorConfig>,
    validator: LanguageValidator,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<Catalog>,
        provider: Option<Arc<dyn ModelProvider>>,
        config: GeneratorConfig,
    ) -> Self {
        let validator = LanguageValidator::new(config.min_coverage);
        Self {
            catalog,
            provider,
            config: Arc::new(config),
            validator,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn model_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn run(
        &self,
        product: ProductInfo,
        seed: &DiversitySeed,
        sink: &dyn CopySink,
    ) -> Result<RunSummary, PipelineError> {
        let product = product.validate()?;
        let started = Instant::now();
        let total = product.regions.len();
        let workers = self.config.concurrency.max(1).min(total);
        let cursor = AtomicUsize::new(0);
        let fallbacks = AtomicUsize::new(0);

        info!(
            target = "adcopy.orchestrator",
            regions = total,
            workers,
            model = self.provider.is_some(),
            "run_started"
        );

        let pool = (0..workers).map(|worker| {
            let (product, cursor, fallbacks) = (&product, &cursor, &fallbacks);
            async move {
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(code) = product.regions.get(index) else {
                        break;
                    };
                    debug!(target = "adcopy.orchestrator", worker, region = %code, "region_claimed");
                    let batch = self.process_region(product, code, seed).await;
                    if batch.fallback_reason.is_some() {
                        fallbacks.fetch_add(1, Ordering::SeqCst);
                    }
                    sink.emit(batch).await;
                }
            }
        });
        join_all(pool).await;

        let summary = RunSummary {
            regions: total,
            copies: total * COPIES_PER_REGION,
            fallbacks: fallbacks.load(Ordering::SeqCst),
            elapsed_ms: started.elapsed().as_millis(),
        };
        crate::metrics::run_finished(summary.regions, summary.fallbacks, summary.elapsed_ms);
        info!(
            target = "adcopy.orchestrator",
            regions = summary.regions,
            copies = summary.copies,
            fallbacks = summary.fallbacks,
            elapsed_ms = summary.elapsed_ms as u64,
            "run_finished"
        );
        Ok(summary)
    }

    async fn process_region(
        &self,
        product: &ProductInfo,
        code: &str,
        seed: &DiversitySeed,
    ) -> RegionBatch {
        let started = Instant::now();
        let region = self.catalog.regions.resolve(code);
        if !region.known {
            debug!(target = "adcopy.orchestrator", region = %region.code, "unknown_region_defaults_to_english");
        }

        let (source, fallback_reason, texts) = match self.generate(product, &region, seed).await {
            Ok(texts) => (CopySource::Model, None, texts),
            Err(reason) => {
                warn!(
                    target = "adcopy.orchestrator",
                    region = %region.code,
                    language = %region.language,
                    reason = reason.label(),
                    "region_fallback"
                );
                crate::metrics::region_fallback(&region.code, reason.label());
                let texts = self
                    .catalog
                    .templates
                    .fallback(&self.catalog.regions, product, &region.language)
                    .to_vec();
                (CopySource::Fallback, Some(reason), texts)
            }
        };

        let mut enhancer = EmojiEnhancer::new(
            self.catalog.palettes.palette_for(&region.code),
            self.config.emoji_density,
            self.config.emoji_max_density,
            seed,
            &region.code,
        );
        let copies = texts
            .iter()
            .enumerate()
            .map(|(slot, text)| GeneratedCopy {
                text: enhancer.enhance(&clean_copy(text), slot),
                region: region.code.clone(),
                region_name: region.name.clone(),
                language: region.language.clone(),
                slot,
                source,
            })
            .collect();

        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::region_elapsed(&region.code, source.as_str(), elapsed_ms);
        info!(
            target = "adcopy.orchestrator",
            region = %region.code,
            source = source.as_str(),
            elapsed_ms = elapsed_ms as u64,
            "region_completed"
        );

        RegionBatch {
            region: region.code,
            region_name: region.name,
            language: region.language,
            source,
            fallback_reason,
            copies,
        }
    }

    /// Model path for one region: three parsed candidates that all pass the
    /// language gate, or the reason to fall back.
    async fn generate(
        &self,
        product: &ProductInfo,
        region: &ResolvedRegion,
        seed: &DiversitySeed,
    ) -> Result<Vec<String>, FallbackReason> {
        let provider = self
            .provider
            .as_deref()
            .ok_or(FallbackReason::NotConfigured)?;

        let palette = self.catalog.palettes.palette_for(&region.code);
        let prompt = PromptSpec {
            product,
            region,
            emoji_rules: emoji_rules(
                &palette,
                self.config.emoji_density,
                self.config.emoji_max_density,
            ),
            seed,
        };
        let candidates = call_model(
            provider,
            &prompt,
            CopyLimits::from(self.config.as_ref()),
            self.config.request_timeout,
        )
        .await
        .map_err(|err| err.fallback_reason())?;

        if candidates.len() < COPIES_PER_REGION {
            return Err(FallbackReason::Parse {
                detail: format!(
                    "expected {COPIES_PER_REGION} copies, parsed {}",
                    candidates.len()
                ),
            });
        }

        let accepted: Vec<String> = candidates
            .iter()
            .map(|candidate| clean_copy(candidate))
            .filter(|candidate| {
                let ok = self.validator.is_in_target_language(candidate, &region.language);
                if !ok {
                    debug!(target = "adcopy.orchestrator", region = %region.code, "candidate_language_rejected");
                }
                ok
            })
            .collect();
        if accepted.len() < COPIES_PER_REGION {
            return Err(FallbackReason::LanguageRejected {
                accepted: accepted.len(),
            });
        }
        Ok(accepted)
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}
