//! HTTP gateway for Preflight.
//!
//! Exposes the guarded operational endpoints (`/healthz`, `/metrics`,
//! `/metrics/json`) and the chat pipeline (`POST /v1/chat`,
//! `POST /v1/chat/stream`). Built on Axum.
//!
//! All endpoints sit behind the same bearer-token gate when a shared
//! secret is configured; with no secret they are open for development and
//! probing. Token comparison goes through SHA-256 digests of both sides,
//! so the equality check is length-independent with no partial-match
//! leakage.

pub mod chat;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use preflight_chain::ReflectChainController;
use preflight_config::AppConfig;
use preflight_context::{ContextTrimmer, RetentionScorer};
use preflight_persona::{PersonaCompiler, PrethoughtDecomposer};
use preflight_providers::{ModelCapabilityRegistry, ProviderDispatcher};
use preflight_telemetry::MetricsRegistry;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub compiler: PersonaCompiler,
    pub decomposer: PrethoughtDecomposer,
    pub trimmer: ContextTrimmer,
    pub dispatcher: Arc<ProviderDispatcher>,
    pub chain: ReflectChainController,
    pub metrics: Arc<MetricsRegistry>,
    bearer_digest: Option<[u8; 32]>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    /// Assemble the state from pre-built parts. The pipeline components
    /// (compiler, decomposer, trimmer, chain) are derived here so every
    /// construction path wires them identically.
    pub fn from_parts(
        config: AppConfig,
        dispatcher: Arc<ProviderDispatcher>,
        scorer: Option<Arc<RetentionScorer>>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let compiler = PersonaCompiler::new(&config.persona.forbidden_patterns);
        let mut trimmer = ContextTrimmer::new().with_metrics(metrics.clone());
        if let Some(scorer) = scorer {
            trimmer = trimmer.with_scorer(scorer);
        }
        let bearer_digest = config
            .gateway
            .bearer_secret
            .as_deref()
            .map(|secret| Sha256::digest(secret.as_bytes()).into());

        Self {
            chain: ReflectChainController::new(dispatcher.clone()),
            compiler,
            decomposer: PrethoughtDecomposer::new(),
            trimmer,
            dispatcher,
            metrics,
            bearer_digest,
            config,
        }
    }
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/json", get(metrics_json_handler))
        .route("/v1/chat", post(chat::chat_handler))
        .route("/v1/chat/stream", post(chat::chat_stream_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let addr = format!("{host}:{port}");

    let router = preflight_providers::router::build_from_config(&config);
    let registry = Arc::new(ModelCapabilityRegistry::load(
        &config.models,
        &config.default_effort,
        &config.default_provider,
    ));

    // The retention scorer reuses the same provider clients the dispatcher
    // calls through; "none" disables scoring entirely.
    let scorer = match config.retention.provider.as_str() {
        "" | "none" | "off" => None,
        name => router
            .get(name)
            .map(|provider| Arc::new(RetentionScorer::new(provider, &config.retention.model))),
    };

    let dispatcher = Arc::new(
        ProviderDispatcher::new(router, registry)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens),
    );

    let metrics = Arc::new(MetricsRegistry::new());
    let state = Arc::new(GatewayState::from_parts(config, dispatcher, scorer, metrics));

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Auth ---

/// Bearer-token gate for every route.
///
/// With no configured secret the gateway is open. Otherwise the
/// `Authorization: Bearer` value must hash to the same SHA-256 digest as
/// the configured secret; missing or mismatched headers get 401.
async fn auth_middleware(
    State(state): State<SharedState>,
    req: axum::extract::Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.bearer_digest else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) => {
            let digest: [u8; 32] = Sha256::digest(token.as_bytes()).into();
            if digest == expected {
                Ok(next.run(req).await)
            } else {
                warn!("Rejected request with invalid bearer token");
                Err(StatusCode::UNAUTHORIZED)
            }
        }
        None => {
            warn!("Rejected request without bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

// --- Ops handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Liveness probe — fixed body, independent of chain state and provider
/// reachability.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Prometheus text exposition. Missing retention renders as `NaN`.
async fn metrics_handler(State(state): State<SharedState>) -> Response {
    let payload = state.metrics.export_prometheus();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        payload,
    )
        .into_response()
}

/// JSON exposition of the same snapshot. Missing retention is `null`.
async fn metrics_json_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let snapshot = state.metrics.snapshot();
    Json(serde_json::json!({
        "compress_ratio": snapshot.compress_ratio,
        "semantic_retention": snapshot.semantic_retention,
    }))
}
