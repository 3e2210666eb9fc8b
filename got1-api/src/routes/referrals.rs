use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use got1_shared::clients::db::get_conn;
use got1_shared::errors::{AppError, AppResult, ErrorCode};
use got1_shared::types::api::ApiResponse;
use got1_shared::types::auth::{AuthUser, ProfileRole};

use crate::models::{NewReferral, NewReferralApplication, Referral, ReferralApplication};
use crate::schema::{referral_program_applications, referrals};
use crate::services::referral_service::{self, STATUS_APPROVED, STATUS_PENDING};
use crate::services::profile_service;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReferralRequest {
    pub referrer_id: Option<Uuid>,
    pub referred_id: Option<Uuid>,
    pub referred_role: Option<String>,
}

/// Only players and scouts earn or generate referral credit.
fn referral_role(raw: &str) -> Option<ProfileRole> {
    match raw.parse::<ProfileRole>() {
        Ok(role @ (ProfileRole::Player | ProfileRole::Scout)) => Some(role),
        _ => None,
    }
}

// --- POST /referrals/apply ---

pub async fn apply(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<ReferralApplication>>> {
    let mut conn = get_conn(&state.db)?;

    let is_scout = profile_service::find_profile(&mut conn, user.id)?
        .and_then(|p| profile_service::role_of(&p))
        == Some(ProfileRole::Scout);
    if !is_scout {
        return Err(AppError::forbidden("Only verified scouts can apply for the referral program"));
    }

    if let Some(existing) = referral_service::find_program_application(&mut conn, user.id)? {
        match existing.status.as_str() {
            STATUS_PENDING => {
                return Err(AppError::new(
                    ErrorCode::ReferralApplicationPending,
                    "You already have a pending application",
                ))
            }
            STATUS_APPROVED => {
                return Err(AppError::new(
                    ErrorCode::AlreadyInReferralProgram,
                    "You are already approved for the referral program",
                ))
            }
            _ => {
                diesel::delete(referral_program_applications::table.find(existing.id)).execute(&mut conn)?;
            }
        }
    }

    let application = diesel::insert_into(referral_program_applications::table)
        .values(&NewReferralApplication { user_id: user.id, status: STATUS_PENDING.into() })
        .get_result::<ReferralApplication>(&mut conn)?;

    tracing::info!(application_id = %application.id, user_id = %user.id, "referral program application submitted");
    Ok(Json(ApiResponse::ok_with_message(
        application,
        "Application submitted successfully! We will review it soon.",
    )))
}

// --- POST /referrals/create ---

/// Recorded at sign-up when the new user picks who referred them.
pub async fn create_referral(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateReferralRequest>,
) -> AppResult<Json<ApiResponse<Referral>>> {
    let (Some(referrer_id), Some(referred_id), Some(referred_role)) =
        (req.referrer_id, req.referred_id, req.referred_role.as_deref())
    else {
        return Err(AppError::bad_request(
            "Missing required fields: referrer_id, referred_id, referred_role",
        ));
    };

    if referrer_id == referred_id {
        return Err(AppError::new(ErrorCode::CannotReferSelf, "Cannot refer yourself"));
    }
    if referred_id != user.id && !state.auth.is_admin(&user) {
        return Err(AppError::forbidden("You can only record your own referral"));
    }
    let referred_role = referral_role(referred_role)
        .ok_or_else(|| AppError::bad_request("Referred role must be player or scout"))?;

    let mut conn = get_conn(&state.db)?;

    if !referral_service::is_approved_referrer(&mut conn, referrer_id)? {
        return Err(AppError::new(
            ErrorCode::ReferrerNotApproved,
            "Referrer is not approved for the referral program",
        ));
    }

    let referrer_role = profile_service::find_profile(&mut conn, referrer_id)?
        .and_then(|p| profile_service::role_of(&p))
        .filter(|r| matches!(r, ProfileRole::Player | ProfileRole::Scout))
        .ok_or_else(|| AppError::new(ErrorCode::ReferrerNotApproved, "Referrer must be a player or scout"))?;

    let existing: i64 = referrals::table
        .filter(referrals::referrer_id.eq(referrer_id))
        .filter(referrals::referred_id.eq(referred_id))
        .count()
        .get_result(&mut conn)?;
    if existing > 0 {
        return Err(AppError::new(ErrorCode::ReferralExists, "Referral already exists"));
    }

    let amount = referral_service::user_referral_amount(referred_role).unwrap_or(0);
    let referral = diesel::insert_into(referrals::table)
        .values(&NewReferral {
            referrer_id,
            referred_id,
            referrer_role: referrer_role.as_str().into(),
            referred_role: referred_role.as_str().into(),
            amount_earned_cents: amount,
            status: STATUS_PENDING.into(),
        })
        .get_result::<Referral>(&mut conn)?;

    tracing::info!(
        referral_id = %referral.id,
        referrer_id = %referrer_id,
        referred_id = %referred_id,
        amount_earned_cents = amount,
        "user referral recorded"
    );
    Ok(Json(ApiResponse::ok(referral)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_players_and_scouts_are_referral_roles() {
        assert_eq!(referral_role("scout"), Some(ProfileRole::Scout));
        assert_eq!(referral_role("player"), Some(ProfileRole::Player));
        assert_eq!(referral_role("parent"), None);
        assert_eq!(referral_role("admin"), None);
    }

    #[test]
    fn create_request_uses_snake_case() {
        let req: CreateReferralRequest = serde_json::from_value(serde_json::json!({
            "referrer_id": Uuid::nil(),
            "referred_role": "player",
        }))
        .unwrap();
        assert_eq!(req.referrer_id, Some(Uuid::nil()));
        assert!(req.referred_id.is_none());
    }
}
