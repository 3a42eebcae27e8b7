//! Work/break/lunch command handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::Local;
use punchclock_domain::{TimeSession, WorkDayView};
use serde::Deserialize;

use super::UserId;
use crate::context::AppContext;
use crate::error::ApiResult;

#[derive(Debug, Default, Deserialize)]
pub struct ClockInQuery {
    /// Optionally start this task's timer together with the work session.
    pub task_id: Option<String>,
}

/// POST /api/timeclock/clock-in
pub async fn clock_in(
    State(ctx): State<Arc<AppContext>>,
    Extension(user): Extension<UserId>,
    Query(query): Query<ClockInQuery>,
) -> ApiResult<Json<TimeSession>> {
    let now = Local::now().naive_local();
    Ok(Json(ctx.timeclock.clock_in(&user.0, now, query.task_id.as_deref()).await?))
}

/// POST /api/timeclock/clock-out
pub async fn clock_out(
    State(ctx): State<Arc<AppContext>>,
    Extension(user): Extension<UserId>,
) -> ApiResult<Json<TimeSession>> {
    let now = Local::now().naive_local();
    Ok(Json(ctx.timeclock.clock_out(&user.0, now).await?))
}

/// POST /api/timeclock/break/start
pub async fn start_break(
    State(ctx): State<Arc<AppContext>>,
    Extension(user): Extension<UserId>,
) -> ApiResult<Json<TimeSession>> {
    let now = Local::now().naive_local();
    Ok(Json(ctx.timeclock.start_break(&user.0, now).await?))
}

/// POST /api/timeclock/break/end
pub async fn end_break(
    State(ctx): State<Arc<AppContext>>,
    Extension(user): Extension<UserId>,
) -> ApiResult<Json<TimeSession>> {
    let now = Local::now().naive_local();
    Ok(Json(ctx.timeclock.end_break(&user.0, now).await?))
}

/// POST /api/timeclock/lunch/start
pub async fn start_lunch(
    State(ctx): State<Arc<AppContext>>,
    Extension(user): Extension<UserId>,
) -> ApiResult<Json<TimeSession>> {
    let now = Local::now().naive_local();
    Ok(Json(ctx.timeclock.start_lunch(&user.0, now).await?))
}

/// POST /api/timeclock/lunch/end
pub async fn end_lunch(
    State(ctx): State<Arc<AppContext>>,
    Extension(user): Extension<UserId>,
) -> ApiResult<Json<TimeSession>> {
    let now = Local::now().naive_local();
    Ok(Json(ctx.timeclock.end_lunch(&user.0, now).await?))
}

/// GET /api/timeclock/today - the day's ledger with mirrored break fields.
pub async fn today(
    State(ctx): State<Arc<AppContext>>,
    Extension(user): Extension<UserId>,
) -> ApiResult<Json<WorkDayView>> {
    let today = Local::now().naive_local().date();
    Ok(Json(ctx.timeclock.work_day(&user.0, today).await?))
}
