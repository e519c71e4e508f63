use std::{env, str::FromStr, time::Duration};

/// Copies produced per region, model or fallback.
pub const COPIES_PER_REGION: usize = 3;

pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

pub fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Tunables for a generation run.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Regions in flight at once.
    pub concurrency: usize,
    /// Upper bound on one model call, on top of the HTTP client timeout.
    pub request_timeout: Duration,
    /// Share of letter-like characters that must belong to the target script.
    pub min_coverage: f32,
    pub emoji_density: usize,
    pub emoji_max_density: usize,
    pub min_copy_chars: usize,
    pub max_copy_chars: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            request_timeout: Duration::from_secs(crate::http::DEFAULT_TIMEOUT_SECS),
            min_coverage: 0.8,
            emoji_density: 4,
            emoji_max_density: 6,
            min_copy_chars: 20,
            max_copy_chars: 500,
        }
    }
}

impl GeneratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let emoji_density = env_parse::<usize>("EMOJI_DENSITY").unwrap_or(defaults.emoji_density);
        let emoji_max_density = env_parse::<usize>("EMOJI_MAX_DENSITY")
            .unwrap_or(defaults.emoji_max_density)
            .max(emoji_density);
        Self {
            concurrency: env_parse::<usize>("GENERATOR_CONCURRENCY")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.concurrency),
            request_timeout: env_parse::<u64>("LLM_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            min_coverage: env_parse::<f32>("LANGUAGE_MIN_COVERAGE")
                .filter(|v| *v > 0.0 && *v <= 1.0)
                .unwrap_or(defaults.min_coverage),
            emoji_density,
            emoji_max_density,
            ..defaults
        }
    }
}
