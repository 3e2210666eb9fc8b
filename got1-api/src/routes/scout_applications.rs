use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use got1_shared::clients::db::get_conn;
use got1_shared::errors::{AppError, AppResult, ErrorCode};
use got1_shared::middleware::AdminUser;
use got1_shared::types::api::ApiResponse;
use got1_shared::types::auth::{AuthUser, ProfileRole};

use crate::models::{NewNotification, NewScoutApplication, ScoutApplication};
use crate::routes::{best_effort, Decision};
use crate::schema::{profiles, scout_applications};
use crate::services::{notification_service, profile_service};
use crate::AppState;

pub const APPLICATION_PENDING: &str = "pending";

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitApplicationRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "current_workplace is required"))]
    pub current_workplace: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "current_position is required"))]
    pub current_position: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "work_history is required"))]
    pub work_history: String,
    pub additional_info: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub decision: &'static str,
}

// --- POST /scout-application/submit ---

pub async fn submit_application(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitApplicationRequest>,
) -> AppResult<Json<ApiResponse<ScoutApplication>>> {
    req.validate()?;
    let mut conn = get_conn(&state.db)?;

    let profile = profile_service::require_profile(&mut conn, user.id)?;
    if profile_service::role_of(&profile) == Some(ProfileRole::Scout) {
        return Err(AppError::new(ErrorCode::AlreadyScout, "Already a scout"));
    }

    let pending: i64 = scout_applications::table
        .filter(scout_applications::user_id.eq(user.id))
        .filter(scout_applications::status.eq(APPLICATION_PENDING))
        .count()
        .get_result(&mut conn)?;
    if pending > 0 {
        return Err(AppError::new(ErrorCode::ApplicationAlreadyPending, "Application already pending"));
    }

    let application = diesel::insert_into(scout_applications::table)
        .values(&NewScoutApplication {
            user_id: user.id,
            current_workplace: req.current_workplace.trim().to_string(),
            current_position: req.current_position.trim().to_string(),
            work_history: req.work_history,
            additional_info: req.additional_info.filter(|s| !s.trim().is_empty()),
            status: APPLICATION_PENDING.into(),
        })
        .get_result::<ScoutApplication>(&mut conn)?;

    notification_service::notify(
        &mut conn,
        NewNotification::new(
            user.id,
            "scout_application_received",
            "Application Received",
            "We've received your scout application and will review it shortly. You'll be notified once a decision has been made.",
        )
        .link("/profile")
        .metadata(serde_json::json!({
            "application_id": application.id,
            "submitted_at": application.created_at,
        })),
    );

    best_effort(
        "application_received_email",
        state.email.send_application_received(
            &state.config.ops_inbox,
            profile.display_name(),
            &application.current_workplace,
            &application.current_position,
            &application.id.to_string(),
        ),
    )
    .await;

    tracing::info!(application_id = %application.id, user_id = %user.id, "scout application submitted");
    Ok(Json(ApiResponse::ok(application)))
}

// --- POST /scout-application/:id/decision ---

pub async fn decide_application(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> AppResult<Json<ApiResponse<DecisionResponse>>> {
    let decision = Decision::parse(req.decision.as_deref())?;
    let mut conn = get_conn(&state.db)?;

    let application = scout_applications::table
        .find(id)
        .first::<ScoutApplication>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ApplicationNotFound, "Application not found"))?;

    if application.status != APPLICATION_PENDING {
        return Err(AppError::new(ErrorCode::ApplicationAlreadyProcessed, "Application already processed"));
    }

    let now = Utc::now();
    diesel::update(scout_applications::table.find(id))
        .set((
            scout_applications::status.eq(decision.as_str()),
            scout_applications::reviewed_at.eq(Some(now)),
            scout_applications::reviewed_by.eq(Some(admin.id)),
        ))
        .execute(&mut conn)?;

    if decision == Decision::Approved {
        diesel::update(profiles::table.filter(profiles::user_id.eq(application.user_id)))
            .set((
                profiles::role.eq(ProfileRole::Scout.as_str()),
                profiles::organization.eq(Some(application.current_workplace.as_str())),
                profiles::position.eq(Some(application.current_position.as_str())),
                profiles::work_history.eq(Some(application.work_history.as_str())),
                profiles::additional_info.eq(application.additional_info.as_deref()),
                profiles::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
    }

    let applicant = profile_service::find_profile(&mut conn, application.user_id)?;
    if let Some(to) = applicant.as_ref().and_then(|p| p.email.as_deref()) {
        let name = applicant.as_ref().and_then(|p| p.full_name.as_deref()).unwrap_or("there");
        best_effort(
            "application_decision_email",
            state.email.send_application_decision(to, name, decision == Decision::Approved),
        )
        .await;
    }

    let notification = match decision {
        Decision::Approved => NewNotification::new(
            application.user_id,
            "scout_application_approved",
            "Scout Application Approved",
            "Congratulations! Your scout application has been approved. You can now start receiving evaluation requests.",
        )
        .link("/profile")
        .metadata(serde_json::json!({
            "application_id": id,
            "organization": application.current_workplace,
        })),
        Decision::Denied => NewNotification::new(
            application.user_id,
            "scout_application_denied",
            "Scout Application Denied",
            "Your scout application has been reviewed and unfortunately was not approved at this time.",
        )
        .link("/profile/scout-application")
        .metadata(serde_json::json!({ "application_id": id })),
    };
    notification_service::notify(&mut conn, notification);

    tracing::info!(application_id = %id, admin_id = %admin.id, decision = decision.as_str(), "scout application reviewed");
    Ok(Json(ApiResponse::ok(DecisionResponse { decision: decision.as_str() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_requires_fields() {
        let req: SubmitApplicationRequest = serde_json::from_value(serde_json::json!({
            "current_workplace": "",
            "current_position": "Area scout",
            "work_history": "10 years in the Big Ten",
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("current_workplace"));
        assert!(req.additional_info.is_none());
    }

    #[test]
    fn decision_response_shape() {
        let value = serde_json::to_value(DecisionResponse { decision: Decision::Denied.as_str() }).unwrap();
        assert_eq!(value, serde_json::json!({ "decision": "denied" }));
    }
}
