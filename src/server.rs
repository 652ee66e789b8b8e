//! HTTP front end for the question pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::diesel_runtime::Database;
use crate::query::{QueryPipeline, ScalarExecutor, SqlTranslator};

pub const USAGE: &str = "🤖 Бот аналитики видео готов!\n\
Задавайте вопросы на русском языке, например:\n\
• Сколько всего видео?\n\
• Сколько видео у креатора aca1061a?\n\
• На сколько выросли просмотры 28 ноября?\n\
\n\
Отправьте вопрос текстом: POST /ask\n";

pub struct AppState<T, E> {
    pub pipeline: Arc<QueryPipeline<T, E>>,
    pub db: Database,
}

impl<T, E> Clone for AppState<T, E> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            db: self.db.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskResponse {
    pub reply: String,
}

pub fn router<T, E>(state: AppState<T, E>) -> Router
where
    T: SqlTranslator + 'static,
    E: ScalarExecutor + 'static,
{
    Router::new()
        .route("/", get(usage))
        .route("/ask", post(ask::<T, E>))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check::<T, E>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve<T, E>(state: AppState<T, E>, port: u16) -> std::io::Result<()>
where
    T: SqlTranslator + 'static,
    E: ScalarExecutor + 'static,
{
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Question API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await
        }
    }
}

async fn usage() -> &'static str {
    USAGE
}

/// Answer one question; the body is the question text.
async fn ask<T, E>(
    State(state): State<AppState<T, E>>,
    body: String,
) -> Result<Json<AskResponse>, AppError>
where
    T: SqlTranslator,
    E: ScalarExecutor,
{
    let question = body.trim();
    if question.is_empty() {
        return Err(AppError::ValidationError("Question is empty".to_string()));
    }

    let reply = state.pipeline.handle(question).await;
    Ok(Json(AskResponse { reply }))
}

/// Health check endpoint (liveness)
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "vidstat",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint - verifies the database answers
async fn readiness_check<T, E>(
    State(state): State<AppState<T, E>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let db = state.db.clone();
    match tokio::task::spawn_blocking(move || db.test_connection()).await {
        Ok(Ok(())) => Ok(Json(serde_json::json!({
            "status": "ready",
            "service": "vidstat",
            "database": "connected"
        }))),
        Ok(Err(e)) => {
            tracing::warn!("Readiness check failed: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
        Err(e) => {
            tracing::warn!("Readiness check task failed: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

#[derive(Debug)]
enum AppError {
    ValidationError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        (status, Json(serde_json::json!({
            "error": message
        })))
            .into_response()
    }
}
