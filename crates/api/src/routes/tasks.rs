//! Task timer command handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::{Extension, Json};
use chrono::Local;
use punchclock_domain::TimeSession;
use serde::Deserialize;

use super::UserId;
use crate::context::AppContext;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct StartTaskRequest {
    pub task_id: String,
}

/// POST /api/tasks/start
pub async fn start_task(
    State(ctx): State<Arc<AppContext>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<StartTaskRequest>,
) -> ApiResult<Json<TimeSession>> {
    let now = Local::now().naive_local();
    Ok(Json(ctx.timeclock.start_task(&user.0, &body.task_id, now).await?))
}

/// POST /api/tasks/stop
pub async fn stop_task(
    State(ctx): State<Arc<AppContext>>,
    Extension(user): Extension<UserId>,
) -> ApiResult<Json<TimeSession>> {
    let now = Local::now().naive_local();
    Ok(Json(ctx.timeclock.stop_task(&user.0, now).await?))
}
