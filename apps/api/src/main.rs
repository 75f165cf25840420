mod auth;
mod chat;
mod config;
mod errors;
mod metrics;
mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use orchestrator::prompt::system_instruction;
use orchestrator::{
    ConversationLoop, FunctionDispatcher, FunctionRegistry, LoopConfig, OpenAiChatModel,
    OpenAiConfig, Sha256UrlSigner,
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{dispatcher, error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::auth::SessionVerifier;
use crate::config::{load_app_structure, AppConfig};
use crate::metrics::AppMetrics;
use crate::store::{PgRecordStore, PgUserDirectory, UserDirectory};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) verifier: SessionVerifier,
    pub(crate) users: Arc<dyn UserDirectory>,
    pub(crate) conversation: Arc<ConversationLoop>,
    pub(crate) instruction: Arc<String>,
    pub(crate) metrics: AppMetrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let config = AppConfig::from_env()?;
    let pool = build_pool(&config).await?;
    let app_structure = load_app_structure(config.app_structure_path.as_ref()).await?;

    let registry = Arc::new(FunctionRegistry::new());
    let instruction = system_instruction(&registry, app_structure.as_deref());
    let dispatcher = FunctionDispatcher::new(
        registry,
        Arc::new(PgRecordStore::new(pool.clone())),
        Arc::new(Sha256UrlSigner::new(
            config.attachment_base_url.clone(),
            config.attachment_secret.clone(),
            config.attachment_ttl,
        )),
    );
    let model = OpenAiChatModel::new(
        OpenAiConfig::new(config.llm_base_url.clone(), config.llm_model.clone())
            .with_api_key(config.llm_api_key.clone())
            .with_timeout(config.llm_timeout),
    )?;
    let loop_config = LoopConfig::default()
        .with_max_followup_rounds(config.max_followup_rounds)
        .with_fallback_answer(config.fallback_answer.clone());
    let conversation = ConversationLoop::new(Arc::new(model), Arc::new(dispatcher), loop_config);

    let state = AppState {
        verifier: SessionVerifier::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            config.session_cookie.clone(),
        ),
        users: Arc::new(PgUserDirectory::new(pool)),
        conversation: Arc::new(conversation),
        instruction: Arc::new(instruction),
        metrics: AppMetrics::new()?,
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(bind_addr = %config.bind_addr, model = %config.llm_model, "server starting");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/chat", post(chat::chat))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

fn init_tracing() -> anyhow::Result<()> {
    if dispatcher::has_been_set() {
        return Ok(());
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

async fn build_pool(config: &AppConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
