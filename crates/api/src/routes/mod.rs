//! Route table and the rollover middleware.

pub mod health;
pub mod tasks;
pub mod timeclock;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use chrono::Local;

use crate::context::AppContext;
use crate::error::{ApiError, ApiResult};

/// Authenticated user id, extracted by the sweep middleware and consumed
/// by every command handler.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

/// Build the application router.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let commands = Router::new()
        .route("/timeclock/clock-in", post(timeclock::clock_in))
        .route("/timeclock/clock-out", post(timeclock::clock_out))
        .route("/timeclock/break/start", post(timeclock::start_break))
        .route("/timeclock/break/end", post(timeclock::end_break))
        .route("/timeclock/lunch/start", post(timeclock::start_lunch))
        .route("/timeclock/lunch/end", post(timeclock::end_lunch))
        .route("/timeclock/today", get(timeclock::today))
        .route("/tasks/start", post(tasks::start_task))
        .route("/tasks/stop", post(tasks::stop_task))
        .layer(middleware::from_fn_with_state(Arc::clone(&ctx), sweep_stale_sessions));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", commands)
        .with_state(ctx)
}

/// Request-pipeline hook for the rollover sweeper.
///
/// Runs before any timeclock command dispatches, so a session left open
/// across midnight is finalized before today's state is examined.
async fn sweep_stale_sessions(
    State(ctx): State<Arc<AppContext>>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let user_id = extract_user(request.headers())?;
    let today = Local::now().naive_local().date();
    ctx.sweeper.sweep_user(&user_id, today).await?;

    request.extensions_mut().insert(UserId(user_id));
    Ok(next.run(request).await)
}

fn extract_user(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("X-User-Id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingUserHeader)
}
