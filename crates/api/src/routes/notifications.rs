//! Notification read and global-notification routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;

use herald_common::error::AppError;
use herald_common::types::{GlobalNotification, Notification};
use herald_fanout::notifications::{CreateGlobalNotificationParams, NotificationService};

use crate::middleware::auth::{AdminUser, AuthUser};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/notifications", get(list_notifications))
        .route(
            "/api/v1/notifications/global",
            get(list_global_notifications).post(create_global_notification),
        )
        .route(
            "/api/v1/notifications/global/{id}",
            put(mark_global_notification_as_read),
        )
}

/// Pagination query parameters; both are required.
#[derive(Debug, Deserialize)]
struct PageParams {
    limit: i64,
    offset: i64,
}

/// GET /api/v1/notifications — One page of the caller's notifications.
async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = NotificationService::get_user_notifications(
        &state.pool,
        &state.redis,
        auth.user_id,
        page.limit,
        page.offset,
    )
    .await?;
    Ok(Json(notifications))
}

/// GET /api/v1/notifications/global — Global notifications the caller has not read.
async fn list_global_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<GlobalNotification>>, AppError> {
    let notifications = NotificationService::get_global_notifications(
        &state.pool,
        auth.user_id,
        page.limit,
        page.offset,
    )
    .await?;
    Ok(Json(notifications))
}

/// POST /api/v1/notifications/global — Publish a global notification (admin only).
async fn create_global_notification(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(params): Json<CreateGlobalNotificationParams>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let id =
        NotificationService::create_global_notification(&state.pool, admin.user_id, &params)
            .await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// PUT /api/v1/notifications/global/:id — Mark a global notification as read.
async fn mark_global_notification_as_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    NotificationService::mark_global_notification_as_read(&state.pool, auth.user_id, id).await?;
    Ok(Json(serde_json::json!({})))
}
