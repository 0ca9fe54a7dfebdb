//! Monitor endpoints

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    actors::{CheckOutcome, DueMonitor},
    api::{error::ApiResult, state::ApiState},
    identity::Caller,
    monitor::{Monitor, MonitorId, MonitorPatch, NewMonitor},
    service::MonitorStats,
};

/// GET /api/v1/monitors
pub async fn list_monitors(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<Monitor>>> {
    Ok(Json(state.monitors.list_monitors(&caller).await?))
}

/// POST /api/v1/monitors
pub async fn create_monitor(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<NewMonitor>,
) -> ApiResult<(StatusCode, Json<Monitor>)> {
    let monitor = state.monitors.create_monitor(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(monitor)))
}

/// GET /api/v1/monitors/stats
pub async fn monitor_stats(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<MonitorStats>> {
    Ok(Json(state.monitors.stats(&caller).await?))
}

/// GET /api/v1/monitors/:id
pub async fn get_monitor(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<MonitorId>,
) -> ApiResult<Json<Monitor>> {
    Ok(Json(state.monitors.get_monitor(&caller, id).await?))
}

/// PATCH /api/v1/monitors/:id
pub async fn update_monitor(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<MonitorId>,
    Json(patch): Json<MonitorPatch>,
) -> ApiResult<Json<Monitor>> {
    Ok(Json(state.monitors.update_monitor(&caller, id, patch).await?))
}

/// DELETE /api/v1/monitors/:id
pub async fn delete_monitor(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<MonitorId>,
) -> ApiResult<StatusCode> {
    state.monitors.delete_monitor(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/monitors/:id/toggle
pub async fn toggle_monitor(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<MonitorId>,
) -> ApiResult<Json<Monitor>> {
    Ok(Json(state.monitors.toggle_active(&caller, id).await?))
}

/// POST /api/v1/monitors/:id/check
///
/// Runs the check now and returns its outcome; a failed check answers with
/// an error status and an actionable `hint`
pub async fn check_monitor(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<MonitorId>,
) -> ApiResult<Json<CheckOutcome>> {
    Ok(Json(state.monitors.run_now(&caller, id).await?))
}

/// GET /api/v1/scheduler/due
pub async fn list_due(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<DueMonitor>>> {
    Ok(Json(state.monitors.list_due(&caller).await?))
}
