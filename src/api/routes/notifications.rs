//! Notification endpoints

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    api::{
        error::ApiResult,
        state::ApiState,
        types::{
            DeleteAllQuery, DeletedResponse, MarkReadRequest, UnreadCountResponse, UpdatedResponse,
        },
    },
    identity::Caller,
    notification::{Notification, NotificationId, NotificationQuery, NotificationStats},
};

/// GET /api/v1/notifications?unread_only=true&kind=warning&limit=20
pub async fn list_notifications(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(state.notifications.list(&caller, &query).await?))
}

/// GET /api/v1/notifications/:id
pub async fn get_notification(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<NotificationId>,
) -> ApiResult<Json<Notification>> {
    Ok(Json(state.notifications.get(&caller, id).await?))
}

/// GET /api/v1/notifications/unread/count
pub async fn unread_count(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let unread_count = state.notifications.unread_count(&caller).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

/// GET /api/v1/notifications/stats
pub async fn notification_stats(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<NotificationStats>> {
    Ok(Json(state.notifications.stats(&caller).await?))
}

/// POST /api/v1/notifications/read
pub async fn mark_read(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<MarkReadRequest>,
) -> ApiResult<Json<UpdatedResponse>> {
    let updated = state.notifications.mark_read(&caller, &request.ids).await?;
    Ok(Json(UpdatedResponse { updated }))
}

/// POST /api/v1/notifications/read-all
pub async fn mark_all_read(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<UpdatedResponse>> {
    let updated = state.notifications.mark_all_read(&caller).await?;
    Ok(Json(UpdatedResponse { updated }))
}

/// DELETE /api/v1/notifications/:id
pub async fn delete_notification(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<NotificationId>,
) -> ApiResult<StatusCode> {
    state.notifications.delete(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/notifications?read_only=true
pub async fn delete_all_notifications(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<DeleteAllQuery>,
) -> ApiResult<Json<DeletedResponse>> {
    let deleted = state.notifications.delete_all(&caller, query.read_only).await?;
    Ok(Json(DeletedResponse { deleted }))
}
