mod catalog;
mod config;
mod emoji;
mod fallback;
mod generation;
mod http;
mod llm;
mod locale;
mod metrics;
mod models;
mod orchestrator;
mod policy;
mod postprocess;
mod prompt;
mod security;
mod session;
mod validator;

use axum::{
    Json, Router,
    extract::{Extension, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use catalog::Catalog;
use config::{GeneratorConfig, env_parse, env_string};
use eyre::WrapErr;
use locale::RegionInfo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, ProductInfo, RunSnapshot, StartRunResponse};
use orchestrator::{Orchestrator, PipelineError, PipelineErrorKind};
use policy::PolicyReport;
use security::{AuthContext, AuthState, require_api_auth};
use serde::{Deserialize, Serialize};
use serde_json::json;
use session::Sessions;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if let Err(err) = run().await {
        error!(target = "adcopy.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    init_tracing();

    let catalog = Arc::new(Catalog::embedded().wrap_err("loading embedded catalog")?);
    info!(
        target = "adcopy.api",
        regions = catalog.regions.regions().len(),
        lexicon_entries = catalog.lexicon.entry_count(),
        "catalog loaded"
    );
    let provider = llm::build_provider(llm::LlmConfig::from_env());
    if provider.is_none() {
        info!(target = "adcopy.api", "no model API key configured; every region uses templates");
    }
    let orchestrator = Orchestrator::new(catalog, provider, GeneratorConfig::from_env());
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("installing prometheus recorder")?;

    let state = AppState {
        sessions: Sessions::new(orchestrator),
        prometheus_handle,
        metrics_key: env_string("METRICS_KEY"),
    };
    let app = build_router(state, AuthState::from_env());

    let port: u16 = env_parse("PORT").unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "adcopy.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    sessions: Sessions,
    prometheus_handle: PrometheusHandle,
    metrics_key: Option<String>,
}

fn build_router(state: AppState, auth: AuthState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/regions", get(list_regions))
        .route("/runs", post(start_run))
        .route("/runs/current", get(current_run))
        .route("/policy/check", post(check_policy))
        .route_layer(middleware::from_fn_with_state(auth, require_api_auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()))
}

/// Liveness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "adcopy-api-rs",
    }))
}

fn body_limit_from_env() -> usize {
    env_parse::<usize>("REQUEST_MAX_BYTES")
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = &state.metrics_key {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [("Content-Type", "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct RegionsResponse {
    regions: Vec<RegionInfo>,
    model_configured: bool,
}

/// Supported regions with their display names and languages.
///
/// - Method: `GET`
/// - Path: `/regions`
/// - Auth: `Authorization: Bearer <key>` or `X-Adcopy-Key: <key>`
async fn list_regions(State(state): State<AppState>) -> Json<RegionsResponse> {
    crate::metrics::inc_requests("/regions");
    let orchestrator = state.sessions.orchestrator();
    Json(RegionsResponse {
        regions: orchestrator.catalog().regions.regions().to_vec(),
        model_configured: orchestrator.model_configured(),
    })
}

/// Start a generation run for the calling client, replacing any run still
/// in flight. Copies show up on `/runs/current` as each region finishes.
///
/// - Method: `POST`
/// - Path: `/runs`
/// - Body: `ProductInfo`
/// - Response: `202` with `StartRunResponse`
async fn start_run(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(product): Json<ProductInfo>,
) -> Result<(StatusCode, Json<StartRunResponse>), AppError> {
    crate::metrics::inc_requests("/runs");
    info!(
        target = "adcopy.api",
        client_id = %context.client_id,
        api_key = %context.api_key_id,
        "run requested",
    );
    let started = state.sessions.start_run(&context, product).await?;
    Ok((StatusCode::ACCEPTED, Json(started)))
}

#[derive(Debug, Deserialize)]
struct SnapshotQuery {
    #[serde(default)]
    since: usize,
}

/// Current run state; `since` skips copies the caller already has.
async fn current_run(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Query(query): Query<SnapshotQuery>,
) -> Json<RunSnapshot> {
    crate::metrics::inc_requests("/runs/current");
    let board = state.sessions.board(&context.client_id).await;
    Json(board.snapshot(query.since).await)
}

#[derive(Debug, Deserialize)]
struct PolicyCheckRequest {
    text: String,
}

async fn check_policy(
    State(state): State<AppState>,
    Json(req): Json<PolicyCheckRequest>,
) -> Result<Json<PolicyReport>, AppError> {
    crate::metrics::inc_requests("/policy/check");
    let text = req.text.trim();
    if text.is_empty() {
        return Err(PipelineError::invalid_input("policy_check", "missing_text").into());
    }
    Ok(Json(state.sessions.orchestrator().catalog().lexicon.review(text)))
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
