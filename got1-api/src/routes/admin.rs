use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use got1_shared::clients::db::get_conn;
use got1_shared::errors::{AppError, AppResult, ErrorCode};
use got1_shared::middleware::AdminUser;
use got1_shared::types::api::{ApiResponse, Done};
use got1_shared::types::auth::ProfileRole;

use crate::models::{NewNotification, Profile, Referral, ReferralApplication};
use crate::routes::Decision;
use crate::schema::{high_schools, profiles, referral_program_applications, referrals, scout_applications};
use crate::services::referral_service::{self, STATUS_APPROVED, STATUS_DENIED};
use crate::services::{notification_service, profile_service, school_service};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    pub days: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuspendResponse {
    pub suspended_until: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReferralActionRequest {
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolDecisionResponse {
    pub decision: &'static str,
    pub referral_bonus_transfer_id: Option<String>,
}

/// Referral program reviews use `approve` / `deny`.
fn referral_action(raw: Option<&str>) -> AppResult<Decision> {
    match raw {
        Some("approve") => Ok(Decision::Approved),
        Some("deny") => Ok(Decision::Denied),
        _ => Err(AppError::bad_request(r#"Invalid action. Must be "approve" or "deny""#)),
    }
}

/// Ten years; anything longer is a revoke.
const MAX_SUSPENSION_DAYS: i64 = 3650;

fn suspension_days(days: Option<i64>) -> AppResult<i64> {
    match days {
        Some(d) if (1..=MAX_SUSPENSION_DAYS).contains(&d) => Ok(d),
        _ => Err(AppError::bad_request("Invalid number of days")),
    }
}

fn require_scout(profile: &Profile) -> AppResult<()> {
    if profile_service::role_of(profile) != Some(ProfileRole::Scout) {
        return Err(AppError::with_details(
            ErrorCode::NotAScout,
            "User is not a scout",
            serde_json::json!({ "currentRole": profile.role }),
        ));
    }
    Ok(())
}

// --- POST /admin/scouts/:user_id/suspend ---

pub async fn suspend_scout(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SuspendRequest>,
) -> AppResult<Json<ApiResponse<SuspendResponse>>> {
    let days = suspension_days(req.days)?;
    let mut conn = get_conn(&state.db)?;
    let profile = profile_service::require_profile(&mut conn, user_id)?;
    require_scout(&profile)?;

    let now = Utc::now();
    let suspended_until = now + Duration::days(days);
    diesel::update(profiles::table.filter(profiles::user_id.eq(user_id)))
        .set((
            profiles::suspended_until.eq(Some(suspended_until)),
            profiles::suspended_reason.eq(req.reason.filter(|r| !r.trim().is_empty())),
            profiles::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    tracing::info!(user_id = %user_id, admin_id = %admin.id, days, "scout suspended");
    Ok(Json(ApiResponse::ok(SuspendResponse { suspended_until })))
}

// --- POST /admin/scouts/:user_id/unsuspend ---

pub async fn unsuspend_scout(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Done>>> {
    let mut conn = get_conn(&state.db)?;
    profile_service::require_profile(&mut conn, user_id)?;

    diesel::update(profiles::table.filter(profiles::user_id.eq(user_id)))
        .set((
            profiles::suspended_until.eq(None::<DateTime<Utc>>),
            profiles::suspended_reason.eq(None::<String>),
            profiles::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    tracing::info!(user_id = %user_id, admin_id = %admin.id, "scout suspension lifted");
    Ok(Json(ApiResponse::ok(Done::yes())))
}

// --- POST /admin/scouts/:user_id/revoke ---

pub async fn revoke_scout(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let mut conn = get_conn(&state.db)?;
    let profile = profile_service::require_profile(&mut conn, user_id)?;
    require_scout(&profile)?;

    let now = Utc::now();
    let denied = diesel::update(
        scout_applications::table
            .filter(scout_applications::user_id.eq(user_id))
            .filter(scout_applications::status.eq(STATUS_APPROVED)),
    )
    .set((
        scout_applications::status.eq(STATUS_DENIED),
        scout_applications::reviewed_at.eq(Some(now)),
        scout_applications::reviewed_by.eq(Some(admin.id)),
    ))
    .execute(&mut conn)?;

    let updated = diesel::update(profiles::table.filter(profiles::user_id.eq(user_id)))
        .set((
            profiles::role.eq(ProfileRole::User.as_str()),
            profiles::organization.eq(None::<String>),
            profiles::price_per_eval_cents.eq(None::<i64>),
            profiles::updated_at.eq(now),
        ))
        .get_result::<Profile>(&mut conn)?;

    notification_service::notify(
        &mut conn,
        NewNotification::new(
            user_id,
            "scout_status_revoked",
            "Scout Status Revoked",
            "Your scout status has been revoked. You can reapply to become a scout from your profile page.",
        )
        .link("/profile")
        .metadata(serde_json::json!({ "revoked_by": admin.id, "revoked_at": now })),
    );

    tracing::info!(user_id = %user_id, admin_id = %admin.id, applications_denied = denied, "scout status revoked");
    Ok(Json(ApiResponse::ok(updated)))
}

// --- POST /admin/high-schools/:id/decision ---

pub async fn decide_high_school(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> AppResult<Json<ApiResponse<SchoolDecisionResponse>>> {
    let decision = Decision::parse(req.decision.as_deref())
        .map_err(|_| AppError::bad_request(r#"Decision must be "approved" or "denied""#))?;

    let mut conn = get_conn(&state.db)?;
    let school = school_service::find_school(&mut conn, school_id)?;

    diesel::update(high_schools::table.find(school_id))
        .set(high_schools::admin_status.eq(decision.as_str()))
        .execute(&mut conn)?;

    let mut transfer_id = None;
    if let (Decision::Approved, Some(referrer)) = (decision, school.referral_school_id) {
        if let Some(referral) = referral_service::pending_referral_for(&mut conn, referrer, school_id)? {
            match referral_service::pay_referral_bonus(&mut conn, &state.payments, referral.id).await {
                Ok(id) => transfer_id = id,
                Err(e) => tracing::warn!(
                    referral_id = %referral.id,
                    school_id = %school_id,
                    error = %e,
                    "referral bonus payout failed; left pending"
                ),
            }
        }
    }

    let (kind, title) = match decision {
        Decision::Approved => ("admin_accepted", "School Approved"),
        Decision::Denied => ("admin_denied", "School Denied"),
    };
    let message = format!(
        r#"Your high school page "{}" has been {} by admin review."#,
        school.name,
        decision.as_str()
    );
    notification_service::notify_school_admins(&mut conn, school_id, Some(school.created_by), |admin_id| {
        NewNotification::new(admin_id, kind, title, message.clone())
            .link(format!("/high-school/{school_id}/settings"))
            .metadata(serde_json::json!({
                "school_id": school_id,
                "decision": decision.as_str(),
                "reviewed_by": admin.id,
            }))
    });

    tracing::info!(school_id = %school_id, admin_id = %admin.id, decision = decision.as_str(), "high school reviewed");
    Ok(Json(ApiResponse::ok(SchoolDecisionResponse {
        decision: decision.as_str(),
        referral_bonus_transfer_id: transfer_id,
    })))
}

// --- POST /admin/referrals/:id/decision ---

pub async fn decide_referral_application(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReferralActionRequest>,
) -> AppResult<Json<ApiResponse<ReferralApplication>>> {
    let decision = referral_action(req.action.as_deref())?;
    let mut conn = get_conn(&state.db)?;

    let application = diesel::update(referral_program_applications::table.find(id))
        .set((
            referral_program_applications::status.eq(decision.as_str()),
            referral_program_applications::reviewed_at.eq(Some(Utc::now())),
            referral_program_applications::reviewed_by.eq(Some(admin.id)),
        ))
        .get_result::<ReferralApplication>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ApplicationNotFound, "Application not found"))?;

    tracing::info!(application_id = %id, admin_id = %admin.id, decision = decision.as_str(), "referral application reviewed");
    Ok(Json(ApiResponse::ok_with_message(
        application,
        format!("Application {} successfully", decision.as_str()),
    )))
}

// --- POST /admin/referrals/:id/approve ---

pub async fn approve_referral(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Referral>>> {
    let mut conn = get_conn(&state.db)?;

    let referral = diesel::update(referrals::table.find(id))
        .set(referrals::status.eq(STATUS_APPROVED))
        .get_result::<Referral>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ReferralNotFound, "Referral not found"))?;

    tracing::info!(referral_id = %id, admin_id = %admin.id, "user referral approved");
    Ok(Json(ApiResponse::ok_with_message(referral, "Referral approved successfully")))
}

// --- POST /admin/referrals/user/:user_id/revoke ---

pub async fn revoke_referrer(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Done>>> {
    let mut conn = get_conn(&state.db)?;

    let revoked = diesel::update(
        referral_program_applications::table
            .filter(referral_program_applications::user_id.eq(user_id))
            .filter(referral_program_applications::status.eq(STATUS_APPROVED)),
    )
    .set((
        referral_program_applications::status.eq(STATUS_DENIED),
        referral_program_applications::reviewed_at.eq(Some(Utc::now())),
        referral_program_applications::reviewed_by.eq(Some(admin.id)),
    ))
    .execute(&mut conn)?;

    tracing::info!(user_id = %user_id, admin_id = %admin.id, revoked, "referrer status revoked");
    Ok(Json(ApiResponse::ok_with_message(Done::yes(), "Referrer status revoked successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspension_needs_at_least_one_day() {
        assert!(suspension_days(None).is_err());
        assert!(suspension_days(Some(0)).is_err());
        assert!(suspension_days(Some(-3)).is_err());
        assert_eq!(suspension_days(Some(7)).unwrap(), 7);
        assert_eq!(suspension_days(Some(MAX_SUSPENSION_DAYS)).unwrap(), MAX_SUSPENSION_DAYS);
        assert!(suspension_days(Some(MAX_SUSPENSION_DAYS + 1)).is_err());
        assert!(suspension_days(Some(1_000_000_000_000)).is_err());
    }

    #[test]
    fn referral_actions_map_to_decisions() {
        assert_eq!(referral_action(Some("approve")).unwrap(), Decision::Approved);
        assert_eq!(referral_action(Some("deny")).unwrap(), Decision::Denied);
        assert!(referral_action(Some("approved")).is_err());
    }

    #[test]
    fn revoke_requires_scout_role() {
        assert!(require_scout(&profile_service::test_profile("scout")).is_ok());

        let err = require_scout(&profile_service::test_profile("player")).unwrap_err();
        match err {
            AppError::Known { code, details, .. } => {
                assert_eq!(code, ErrorCode::NotAScout);
                assert_eq!(details.unwrap()["currentRole"], "player");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
