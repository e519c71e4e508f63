use crate::config::env_parse;
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Shared outbound client. Every model call is bounded by `HTTP_TIMEOUT_SECS`;
/// expiry surfaces as a timeout error and the region falls back.
pub fn build_client() -> Client {
    let timeout = env_parse::<u64>("HTTP_TIMEOUT_SECS")
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let connect = env_parse::<u64>("HTTP_CONNECT_TIMEOUT_SECS")
        .filter(|v| *v > 0)
        .unwrap_or(5);
    Client::builder()
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}
