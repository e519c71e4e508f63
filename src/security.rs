use crate::config::{env_parse, env_string};
use crate::models::ApiError;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode, header::HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, convert::Infallible, sync::Arc, time::Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const API_KEY_HEADER: &str = "X-Adcopy-Key";

const DEFAULT_KEYS: &str = "demo-client:demo-key";

/// API keys and per-client rate limits shared by the protected routes.
#[derive(Clone)]
pub struct AuthState {
    records: Arc<HashMap<String, ClientRecord>>,
    limiter: Arc<TokenBuckets>,
}

/// The authenticated caller; each client gets its own result board.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub client_id: String,
    pub api_key_id: String,
}

#[derive(Clone)]
struct ClientRecord {
    client_id: String,
    api_key_id: String,
}

impl AuthState {
    pub fn from_env() -> Self {
        let raw = env_string("ADCOPY_API_KEYS").unwrap_or_else(|| DEFAULT_KEYS.to_string());
        Self::new(&raw, TokenBuckets::from_env())
    }

    fn new(raw_keys: &str, limiter: TokenBuckets) -> Self {
        Self {
            records: Arc::new(parse_keys(raw_keys)),
            limiter: Arc::new(limiter),
        }
    }

    fn authenticate(&self, presented: &str) -> Option<AuthContext> {
        self.records.get(presented).map(|record| AuthContext {
            client_id: record.client_id.clone(),
            api_key_id: record.api_key_id.clone(),
        })
    }
}

pub async fn require_api_auth(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(presented) = extract_api_key(request.headers()) else {
        let response =
            unauthorized_response("missing_api_key", "Provide X-Adcopy-Key or Bearer token");
        return Ok(response);
    };

    let Some(context) = state.authenticate(&presented) else {
        let response = unauthorized_response("invalid_api_key", "Key not recognized");
        return Ok(response);
    };

    match state.limiter.admit(&context.client_id).await {
        Admission::Allowed { remaining } => {
            request.extensions_mut().insert(context);
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
            Ok(response)
        }
        Admission::Limited { retry_after_secs } => {
            warn!(
                target = "adcopy.api",
                client_id = %context.client_id,
                retry_after_secs,
                "rate_limited"
            );
            let mut response = too_many_requests("rate_limited", "Too many requests");
            response
                .headers_mut()
                .insert(http::header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            Ok(response)
        }
    }
}

fn extract_api_key(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw[..6].eq_ignore_ascii_case("bearer")
    {
        return Some(raw[6..].trim().to_string());
    }
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn unauthorized_response(code: &str, message: &str) -> Response {
    let payload = ApiError {
        error: code.to_string(),
        detail: Some(message.to_string()),
    };
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

fn too_many_requests(code: &str, message: &str) -> Response {
    let payload = ApiError {
        error: code.to_string(),
        detail: Some(message.to_string()),
    };
    (StatusCode::TOO_MANY_REQUESTS, Json(payload)).into_response()
}

/// `client:key` pairs separated by commas; malformed entries are skipped and
/// an empty result falls back to the demo key.
fn parse_keys(raw: &str) -> HashMap<String, ClientRecord> {
    let mut entries = HashMap::new();
    for (idx, token) in raw.split(',').enumerate() {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.splitn(2, ':');
        let client_id = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let key = parts.next().map(str::trim).filter(|s| !s.is_empty());
        match (client_id, key) {
            (Some(client), Some(secret)) => {
                let record = ClientRecord {
                    client_id: client.to_string(),
                    api_key_id: format!("key-{:02}", idx + 1),
                };
                entries.insert(secret.to_string(), record);
            }
            _ => warn!(
                target = "adcopy.api",
                "ignored malformed ADCOPY_API_KEYS entry at position {}",
                idx + 1
            ),
        }
    }

    if entries.is_empty() {
        warn!(
            target = "adcopy.api",
            "ADCOPY_API_KEYS produced no keys; falling back to demo credentials"
        );
        entries.insert(
            "demo-key".to_string(),
            ClientRecord {
                client_id: "demo-client".to_string(),
                api_key_id: "key-01".to_string(),
            },
        );
    } else {
        info!(
            target = "adcopy.api",
            key_count = entries.len(),
            "loaded API keys"
        );
    }

    entries
}

#[derive(Clone)]
struct TokenBuckets {
    rate_per_sec: f64,
    capacity: f64,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl TokenBuckets {
    fn from_env() -> Self {
        let rate_per_sec = env_parse::<f64>("RATE_LIMIT_PER_SEC")
            .filter(|value| *value > 0.0)
            .unwrap_or(5.0);
        let capacity = env_parse::<f64>("RATE_LIMIT_CAPACITY")
            .filter(|value| *value >= 1.0)
            .unwrap_or(10.0);
        Self::new(rate_per_sec, capacity)
    }

    fn new(rate_per_sec: f64, capacity: f64) -> Self {
        Self {
            rate_per_sec,
            capacity,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Takes one token from the client's bucket, refilling it first.
    async fn admit(&self, client_id: &str) -> Admission {
        let mut guard = self.buckets.lock().await;
        let now = Instant::now();
        let bucket = guard.entry(client_id.to_string()).or_insert_with(|| BucketState {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Admission::Allowed {
                remaining: bucket.tokens.floor() as u64,
            }
        } else {
            let wait = (1.0 - bucket.tokens) / self.rate_per_sec;
            Admission::Limited {
                retry_after_secs: wait.ceil().max(1.0) as u64,
            }
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Allowed { remaining: u64 },
    Limited { retry_after_secs: u64 },
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{Extension, Router, middleware, routing::get};
    use tower::ServiceExt;

    pub(crate) fn test_auth(keys: &str, capacity: f64) -> AuthState {
        AuthState::new(keys, TokenBuckets::new(0.001, capacity))
    }

    async fn whoami(Extension(context): Extension<AuthContext>) -> String {
        context.client_id
    }

    fn app(auth: AuthState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route_layer(middleware::from_fn_with_state(auth, require_api_auth))
    }

    fn request(header: Option<(&str, &str)>) -> Request<Body> {
        let mut builder = Request::builder().uri("/whoami");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn parses_client_key_pairs() {
        let keys = parse_keys("acme:k1, broken, globex:k2,:k3");
        assert_eq!(keys.len(), 2);
        assert_eq!(keys["k1"].client_id, "acme");
        assert_eq!(keys["k2"].api_key_id, "key-03");
        assert_eq!(parse_keys(" , ")["demo-key"].client_id, "demo-client");
    }

    #[tokio::test]
    async fn buckets_drain_and_report_the_wait() {
        let buckets = TokenBuckets::new(0.5, 2.0);
        assert_eq!(buckets.admit("acme").await, Admission::Allowed { remaining: 1 });
        assert_eq!(buckets.admit("acme").await, Admission::Allowed { remaining: 0 });
        assert_eq!(
            buckets.admit("acme").await,
            Admission::Limited { retry_after_secs: 2 }
        );
        assert_eq!(buckets.admit("globex").await, Admission::Allowed { remaining: 1 });
    }

    #[tokio::test]
    async fn accepts_bearer_and_header_keys() {
        let auth = test_auth("acme:secret", 10.0);
        let bearer = app(auth.clone())
            .oneshot(request(Some(("Authorization", "Bearer secret"))))
            .await
            .unwrap();
        assert_eq!(bearer.status(), StatusCode::OK);
        assert_eq!(bearer.headers()["X-RateLimit-Remaining"], "9");

        let header = app(auth)
            .oneshot(request(Some((API_KEY_HEADER, "secret"))))
            .await
            .unwrap();
        assert_eq!(header.status(), StatusCode::OK);
        let body = axum::body::to_bytes(header.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"acme");
    }

    #[tokio::test]
    async fn rejects_missing_and_unknown_keys() {
        let auth = test_auth("acme:secret", 10.0);
        let missing = app(auth.clone()).oneshot(request(None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        let unknown = app(auth)
            .oneshot(request(Some((API_KEY_HEADER, "nope"))))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rate_limit_is_per_client() {
        let auth = test_auth("acme:a,globex:g", 1.0);
        let first = app(auth.clone())
            .oneshot(request(Some((API_KEY_HEADER, "a"))))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app(auth.clone())
            .oneshot(request(Some((API_KEY_HEADER, "a"))))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry: u64 = second.headers()[http::header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry >= 999, "{retry}");
        let other = app(auth)
            .oneshot(request(Some((API_KEY_HEADER, "g"))))
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }
}
