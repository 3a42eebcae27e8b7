//! Health endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::context::AppContext;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// GET /health - verifies database connectivity off the async runtime.
pub async fn health(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<HealthStatus>, StatusCode> {
    let db = Arc::clone(&ctx.db);
    let check = tokio::task::spawn_blocking(move || db.health_check()).await;

    match check {
        Ok(Ok(())) => Ok(Json(HealthStatus { status: "ok" })),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "database health check failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
        Err(err) => {
            tracing::error!(error = %err, "database health check task panicked");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
