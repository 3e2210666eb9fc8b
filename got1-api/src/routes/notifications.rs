use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use got1_shared::clients::db::get_conn;
use got1_shared::errors::AppResult;
use got1_shared::middleware::AdminUser;
use got1_shared::types::api::ApiResponse;
use got1_shared::types::auth::AuthUser;
use got1_shared::types::pagination::{Paginated, PaginationParams};

use crate::models::{NewNotification, Notification};
use crate::services::notification_service;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct NotificationBody {
    #[serde(rename = "type", default)]
    #[validate(length(min = 1, message = "type is required"))]
    pub kind: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "title is required"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "message is required"))]
    pub message: String,
    pub link: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NotificationBody {
    fn into_new(self, user_id: Uuid) -> NewNotification {
        NewNotification {
            user_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            link: self.link,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateForUserRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    #[validate]
    pub body: NotificationBody,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

/// POST /notifications/create
/// Create a notification addressed to the caller.
pub async fn create_notification(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NotificationBody>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    req.validate()?;
    let mut conn = get_conn(&state.db)?;
    let notification = notification_service::create_notification(&mut conn, &req.into_new(user.id))?;

    Ok(Json(ApiResponse::ok(notification)))
}

/// POST /notifications/create-for-user
/// Admins can address any user.
pub async fn create_for_user(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateForUserRequest>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    req.validate()?;
    let target = req.user_id;
    let mut conn = get_conn(&state.db)?;
    let notification = notification_service::create_notification(&mut conn, &req.body.into_new(target))?;

    tracing::info!(admin_id = %admin.id, user_id = %target, kind = %notification.kind, "admin notification sent");
    Ok(Json(ApiResponse::ok(notification)))
}

/// GET /notifications
pub async fn list_notifications(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Notification>>>> {
    let mut conn = get_conn(&state.db)?;
    let (items, total) =
        notification_service::list_notifications(&mut conn, user.id, params.limit(), params.offset())?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &params))))
}

/// GET /notifications/unread-count
pub async fn unread_count(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let mut conn = get_conn(&state.db)?;
    let count = notification_service::count_unread(&mut conn, user.id)?;

    Ok(Json(ApiResponse::ok(UnreadCountResponse { count })))
}

/// POST /notifications/:id/read
pub async fn mark_read(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let mut conn = get_conn(&state.db)?;
    let notification = notification_service::mark_read(&mut conn, id, user.id)?;

    Ok(Json(ApiResponse::ok(notification)))
}

/// POST /notifications/mark-all-read
pub async fn mark_all_read(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<MarkAllReadResponse>>> {
    let mut conn = get_conn(&state.db)?;
    let updated = notification_service::mark_all_read(&mut conn, user.id)?;

    Ok(Json(ApiResponse::ok(MarkAllReadResponse { updated })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_reads_type_field() {
        let body: NotificationBody = serde_json::from_value(serde_json::json!({
            "type": "evaluation_requested",
            "title": "New request",
            "message": "A player requested an evaluation",
        }))
        .unwrap();
        assert!(body.validate().is_ok());

        let new = body.into_new(Uuid::nil());
        assert_eq!(new.kind, "evaluation_requested");
        assert!(new.link.is_none());
    }

    #[test]
    fn blank_title_is_rejected() {
        let body = NotificationBody {
            kind: "system".into(),
            title: String::new(),
            message: "hello".into(),
            link: None,
            metadata: None,
        };
        assert!(body.validate().unwrap_err().field_errors().contains_key("title"));
    }

    #[test]
    fn create_for_user_flattens_body() {
        let target = Uuid::new_v4();
        let req: CreateForUserRequest = serde_json::from_value(serde_json::json!({
            "userId": target,
            "type": "system",
            "title": "Welcome",
            "message": "Thanks for joining",
            "link": "/profile",
        }))
        .unwrap();
        assert_eq!(req.user_id, target);
        assert_eq!(req.body.link.as_deref(), Some("/profile"));
    }
}
