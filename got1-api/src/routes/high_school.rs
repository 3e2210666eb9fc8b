use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use got1_shared::clients::db::get_conn;
use got1_shared::errors::{AppError, AppResult, ErrorCode};
use got1_shared::types::api::{ApiResponse, Done};
use got1_shared::types::auth::AuthUser;

use crate::models::{
    HighSchool, NewHighSchool, NewHighSchoolAdmin, NewNotification, NewRosterPlayer,
    NewSchoolEvaluation, RosterPlayer, SchoolEvaluation, SchoolReferral,
};
use crate::routes::best_effort;
use crate::schema::{high_school_admins, high_school_evaluations, high_school_players, high_schools, profiles};
use crate::services::referral_service::{self, ReferralBonus};
use crate::services::roster_service::{self, ReleaseOutcome, REQUEST_DENIED, REQUEST_PENDING};
use crate::services::{evaluation_service, notification_service, profile_service, school_service};
use crate::AppState;

pub const SCHOOL_PENDING: &str = "pending";
pub const PAID_BY_SCHOOL: &str = "school";

#[derive(Debug, Deserialize)]
pub struct CreateSchoolRequest {
    pub name: Option<String>,
    pub username: Option<String>,
    pub referral_school_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddPlayerRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub positions: Vec<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPlayerResponse {
    pub player_id: Uuid,
    pub is_request: bool,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub outcome: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteResponse {
    pub school_id: Uuid,
    pub player_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RespondResponse {
    pub action: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolEvaluationRequest {
    pub evaluation_id: Option<Uuid>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RosterAnswer {
    Accept,
    Deny,
}

impl RosterAnswer {
    fn parse(raw: Option<&str>) -> AppResult<Self> {
        match raw {
            Some("accept") => Ok(Self::Accept),
            Some("deny") => Ok(Self::Deny),
            _ => Err(AppError::bad_request(r#"Invalid action. Must be "accept" or "deny""#)),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Deny => "deny",
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

/// Stand-in address for roster requests to users whose email is unknown.
fn placeholder_email(user_id: Uuid) -> String {
    let id = user_id.simple().to_string();
    format!("{}@got1.app", &id[..8])
}

fn release_outcome(outcome: ReleaseOutcome) -> &'static str {
    match outcome {
        ReleaseOutcome::InviteDeleted => "invite_deleted",
        ReleaseOutcome::Released => "released",
    }
}

fn required_evaluation(id: Option<Uuid>) -> AppResult<Uuid> {
    id.ok_or_else(|| AppError::bad_request("Evaluation ID is required"))
}

fn find_school_evaluation(
    conn: &mut PgConnection,
    school_id: Uuid,
    evaluation_id: Uuid,
) -> AppResult<SchoolEvaluation> {
    high_school_evaluations::table
        .filter(high_school_evaluations::high_school_id.eq(school_id))
        .filter(high_school_evaluations::evaluation_id.eq(evaluation_id))
        .first::<SchoolEvaluation>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::SchoolEvaluationNotFound, "Evaluation not found"))
}

fn evaluations_link(school_id: Uuid) -> String {
    format!("/high-school/{school_id}/evaluations")
}

fn require_cancelling_admin(is_admin: bool) -> AppResult<()> {
    if !is_admin {
        return Err(AppError::forbidden("Unauthorized: You must be an admin of this school"));
    }
    Ok(())
}

fn check_school_paid(link: &SchoolEvaluation) -> AppResult<()> {
    if link.paid_by != PAID_BY_SCHOOL {
        return Err(AppError::new(
            ErrorCode::NotSchoolPaid,
            "Only school-paid evaluations can be cancelled by school",
        ));
    }
    Ok(())
}

// --- POST /high-school/create ---

pub async fn create_school(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSchoolRequest>,
) -> AppResult<Json<ApiResponse<HighSchool>>> {
    let (Some(name), Some(raw_username)) = (non_blank(req.name.as_deref()), req.username.as_deref()) else {
        return Err(AppError::bad_request("Name and username are required"));
    };
    let username = school_service::normalize_username(raw_username)?;

    let mut conn = get_conn(&state.db)?;
    if !school_service::username_available(&mut conn, &username)? {
        return Err(AppError::new(ErrorCode::SchoolUsernameTaken, "Username is already taken"));
    }

    let program_open = state.config.referral_program_open(Utc::now());
    if let (Some(referrer), true) = (req.referral_school_id, program_open) {
        let exists: i64 = high_schools::table
            .filter(high_schools::id.eq(referrer))
            .count()
            .get_result(&mut conn)?;
        if exists == 0 {
            return Err(AppError::bad_request("Invalid referring school"));
        }
    }

    // A school without its creator as admin could never be managed.
    let school = conn.transaction::<_, AppError, _>(|conn| {
        let school = diesel::insert_into(high_schools::table)
            .values(&NewHighSchool {
                username,
                name,
                admin_status: SCHOOL_PENDING.into(),
                referral_school_id: req.referral_school_id,
                created_by: user.id,
            })
            .get_result::<HighSchool>(conn)?;

        diesel::insert_into(high_school_admins::table)
            .values(&NewHighSchoolAdmin { high_school_id: school.id, user_id: user.id })
            .on_conflict_do_nothing()
            .execute(conn)?;
        Ok(school)
    })?;

    if let (Some(referrer), true) = (school.referral_school_id, program_open) {
        if let Err(e) =
            referral_service::track_referral(&mut conn, &state.bonus_tiers, program_open, referrer, school.id)
        {
            tracing::warn!(referring_school_id = %referrer, school_id = %school.id, error = %e, "failed to track school referral");
        }
    }

    tracing::info!(school_id = %school.id, username = %school.username, created_by = %user.id, "high school created");
    Ok(Json(ApiResponse::ok(school)))
}

// --- GET /high-school/:id/players/list ---

pub async fn list_players(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<RosterPlayer>>>> {
    let mut conn = get_conn(&state.db)?;
    school_service::require_school_admin(&mut conn, user.id, school_id)?;

    let players = high_school_players::table
        .filter(high_school_players::high_school_id.eq(school_id))
        .order(high_school_players::created_at.asc())
        .load::<RosterPlayer>(&mut conn)?;

    Ok(Json(ApiResponse::ok(players)))
}

// --- POST /high-school/:id/players/add ---

/// Existing users get a roster request they must accept; anyone else is
/// invited by email with a one-time token.
pub async fn add_player(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<Uuid>,
    Json(req): Json<AddPlayerRequest>,
) -> AppResult<Json<ApiResponse<AddPlayerResponse>>> {
    let email = non_blank(req.email.as_deref()).map(|e| e.to_lowercase());
    let username = non_blank(req.username.as_deref());
    let Some(name) = non_blank(req.name.as_deref()) else {
        return Err(AppError::bad_request("Name, positions, and either email or user ID are required"));
    };
    if req.positions.is_empty() || (email.is_none() && req.user_id.is_none()) {
        return Err(AppError::bad_request("Name, positions, and either email or user ID are required"));
    }

    let mut conn = get_conn(&state.db)?;
    school_service::require_school_admin(&mut conn, user.id, school_id)?;
    roster_service::validate_positions(&req.positions)?;
    let school = school_service::find_school(&mut conn, school_id)?;

    let linked_user = match (req.user_id, username.as_deref()) {
        (Some(id), _) => Some(id),
        (None, Some(handle)) => profiles::table
            .filter(profiles::username.eq(handle))
            .select(profiles::user_id)
            .first::<Uuid>(&mut conn)
            .optional()?,
        (None, None) => None,
    };

    let Some(target) = linked_user else {
        let Some(email) = email else {
            return Err(AppError::bad_request("A valid email is required to add this player"));
        };
        let token = roster_service::generate_invite_token();
        let player = diesel::insert_into(high_school_players::table)
            .values(&NewRosterPlayer {
                high_school_id: school_id,
                user_id: None,
                name,
                positions: req.positions,
                email: Some(email.clone()),
                username,
                request_status: None,
                invite_token: Some(token.clone()),
                added_by: user.id,
            })
            .get_result::<RosterPlayer>(&mut conn)?;

        best_effort("roster_invite_email", state.email.send_roster_invite(&email, &school.name, &token)).await;

        tracing::info!(school_id = %school_id, player_id = %player.id, "roster invite sent");
        return Ok(Json(ApiResponse::ok(AddPlayerResponse { player_id: player.id, is_request: false })));
    };

    let existing = roster_service::find_school_player(&mut conn, school_id, target)?;
    roster_service::check_existing_request(existing.as_ref())?;

    let resolved_email = match email {
        Some(e) => e,
        None => profile_service::find_profile(&mut conn, target)?
            .and_then(|p| p.email)
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| placeholder_email(target)),
    };

    // A previously denied request is reopened in place; (school, user) is unique.
    let player = match existing {
        Some(row) if row.request_status.as_deref() == Some(REQUEST_DENIED) => {
            diesel::update(high_school_players::table.find(row.id))
                .set((
                    high_school_players::name.eq(&name),
                    high_school_players::positions.eq(&req.positions),
                    high_school_players::email.eq(Some(&resolved_email)),
                    high_school_players::request_status.eq(Some(REQUEST_PENDING)),
                    high_school_players::added_by.eq(user.id),
                ))
                .get_result::<RosterPlayer>(&mut conn)?
        }
        _ => diesel::insert_into(high_school_players::table)
            .values(&NewRosterPlayer {
                high_school_id: school_id,
                user_id: Some(target),
                name,
                positions: req.positions,
                email: Some(resolved_email),
                username,
                request_status: Some(REQUEST_PENDING.into()),
                invite_token: None,
                added_by: user.id,
            })
            .get_result::<RosterPlayer>(&mut conn)?,
    };

    notification_service::notify(
        &mut conn,
        NewNotification::new(
            target,
            "school_roster_request",
            "Roster Join Request",
            format!("{} has requested you to join their roster.", school.name),
        )
        .link("/notifications")
        .metadata(serde_json::json!({
            "school_id": school_id,
            "player_id": player.id,
            "requested_by": user.id,
        })),
    );

    tracing::info!(school_id = %school_id, player_id = %player.id, user_id = %target, "roster request created");
    Ok(Json(ApiResponse::ok(AddPlayerResponse { player_id: player.id, is_request: true })))
}

// --- POST /high-school/:id/players/:player_id/release ---

pub async fn release_player(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((school_id, player_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<ReleaseResponse>>> {
    let mut conn = get_conn(&state.db)?;
    school_service::require_school_admin(&mut conn, user.id, school_id)?;

    let outcome = roster_service::release_player(&mut conn, school_id, player_id)?;

    tracing::info!(school_id = %school_id, player_id = %player_id, outcome = release_outcome(outcome), "roster player released");
    Ok(Json(ApiResponse::ok(ReleaseResponse { outcome: release_outcome(outcome) })))
}

// --- POST /high-school/players/accept-invite/:token ---

/// Claim an emailed roster invite for the signed-in user.
pub async fn accept_invite(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> AppResult<Json<ApiResponse<AcceptInviteResponse>>> {
    let mut conn = get_conn(&state.db)?;

    let invite = roster_service::find_open_invite(&mut conn, token.trim())?;
    let school = school_service::find_school(&mut conn, invite.high_school_id)?;

    // (school, user) is unique: a denied request for this user makes way for
    // the invite, anything live blocks it.
    let existing = roster_service::find_school_player(&mut conn, school.id, user.id)?;
    roster_service::check_existing_request(existing.as_ref())?;
    if let Some(stale) = existing {
        diesel::delete(high_school_players::table.find(stale.id)).execute(&mut conn)?;
    }

    let player = roster_service::accept_invite(&mut conn, &invite, user.id, user.email.as_deref(), &school)?;

    notification_service::notify(
        &mut conn,
        NewNotification::new(
            user.id,
            "player_joined_school",
            "Joined School Roster",
            format!("You've successfully joined the {} roster.", school.name),
        )
        .link(school_service::school_link(Some(&school), school.id, "roster"))
        .metadata(serde_json::json!({ "school_id": school.id })),
    );

    tracing::info!(school_id = %school.id, player_id = %player.id, user_id = %user.id, "roster invite accepted");
    Ok(Json(ApiResponse::ok(AcceptInviteResponse { school_id: school.id, player_id: player.id })))
}

// --- DELETE /high-school/:id/players/:player_id/cancel-invite ---

pub async fn cancel_invite(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((school_id, player_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<Done>>> {
    let mut conn = get_conn(&state.db)?;
    school_service::require_school_admin(&mut conn, user.id, school_id)?;

    let player = roster_service::find_roster_row(&mut conn, school_id, player_id)?;
    roster_service::check_cancellable(&player)?;

    diesel::delete(high_school_players::table.find(player.id)).execute(&mut conn)?;

    tracing::info!(school_id = %school_id, player_id = %player_id, admin_id = %user.id, "roster invite cancelled");
    Ok(Json(ApiResponse::ok(Done::yes())))
}

// --- POST /high-school/:id/players/:player_id/resend-invite ---

pub async fn resend_invite(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((school_id, player_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<Done>>> {
    let mut conn = get_conn(&state.db)?;
    school_service::require_school_admin(&mut conn, user.id, school_id)?;

    let player = roster_service::find_roster_row(&mut conn, school_id, player_id)?;
    let email = roster_service::resend_address(&player)?;
    let token = roster_service::ensure_invite_token(&mut conn, &player)?;
    let school = school_service::find_school(&mut conn, school_id)?;

    state.email.send_roster_invite(email, &school.name, &token).await?;

    tracing::info!(school_id = %school_id, player_id = %player_id, admin_id = %user.id, "roster invite resent");
    Ok(Json(ApiResponse::ok(Done::yes())))
}

// --- POST /high-school/players/request-release ---

pub async fn request_release(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Done>>> {
    let mut conn = get_conn(&state.db)?;

    let entry = roster_service::active_roster_entry(&mut conn, user.id)?
        .ok_or_else(|| AppError::new(ErrorCode::NotOnRoster, "You are not on a school roster"))?;
    if entry.release_requested_at.is_some() {
        return Err(AppError::new(ErrorCode::ReleaseAlreadyRequested, "Release already requested"));
    }

    diesel::update(high_school_players::table.find(entry.id))
        .set(high_school_players::release_requested_at.eq(Some(Utc::now())))
        .execute(&mut conn)?;

    let school = high_schools::table
        .find(entry.high_school_id)
        .first::<HighSchool>(&mut conn)
        .optional()?;
    let player_name = profile_service::find_profile(&mut conn, user.id)?
        .and_then(|p| p.full_name)
        .unwrap_or_else(|| "A player".into());
    let school_name = school.as_ref().map(|s| s.name.clone()).unwrap_or_else(|| "the roster".into());
    let link = school_service::school_link(school.as_ref(), entry.high_school_id, "roster");

    notification_service::notify_school_admins(&mut conn, entry.high_school_id, None, |admin_id| {
        NewNotification::new(
            admin_id,
            "player_release_request",
            "Player Release Request",
            format!("{player_name} has requested to be released from {school_name}."),
        )
        .link(link.clone())
        .metadata(serde_json::json!({
            "school_id": entry.high_school_id,
            "player_id": entry.id,
            "user_id": user.id,
        }))
    });

    tracing::info!(school_id = %entry.high_school_id, player_id = %entry.id, "release requested");
    Ok(Json(ApiResponse::ok(Done::yes())))
}

// --- POST /high-school/players/:player_id/respond-to-request ---

pub async fn respond_to_request(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> AppResult<Json<ApiResponse<RespondResponse>>> {
    let answer = RosterAnswer::parse(req.action.as_deref())?;
    let mut conn = get_conn(&state.db)?;

    let row = high_school_players::table
        .filter(high_school_players::id.eq(player_id))
        .filter(high_school_players::user_id.eq(user.id))
        .first::<RosterPlayer>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::RosterPlayerNotFound, "Request not found"))?;

    if row.request_status.as_deref() != Some(REQUEST_PENDING) {
        return Err(AppError::new(
            ErrorCode::RosterRequestAlreadyAnswered,
            "This request has already been responded to",
        ));
    }

    let school = school_service::find_school(&mut conn, row.high_school_id)?;
    let link = school_service::school_link(Some(&school), school.id, "roster");

    let notification = match answer {
        RosterAnswer::Accept => {
            roster_service::link_player(&mut conn, &row, user.id, &school)?;
            NewNotification::new(
                row.added_by,
                "school_roster_accepted",
                "Roster Request Accepted",
                format!("{} has accepted your request to join {}.", row.name, school.name),
            )
            .link(link)
            .metadata(serde_json::json!({
                "school_id": school.id,
                "player_id": player_id,
                "accepted_by": user.id,
            }))
        }
        RosterAnswer::Deny => {
            diesel::update(high_school_players::table.find(player_id))
                .set(high_school_players::request_status.eq(Some(REQUEST_DENIED)))
                .execute(&mut conn)?;
            NewNotification::new(
                row.added_by,
                "school_roster_denied",
                "Roster Request Denied",
                format!("{} has denied your request to join {}.", row.name, school.name),
            )
            .link(link)
            .metadata(serde_json::json!({
                "school_id": school.id,
                "player_id": player_id,
                "denied_by": user.id,
            }))
        }
    };
    notification_service::notify(&mut conn, notification);

    tracing::info!(school_id = %school.id, player_id = %player_id, action = answer.as_str(), "roster request answered");
    Ok(Json(ApiResponse::ok(RespondResponse { action: answer.as_str() })))
}

// --- POST /high-school/:id/evaluations/request-payment ---

pub async fn request_payment(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<Uuid>,
    Json(req): Json<SchoolEvaluationRequest>,
) -> AppResult<Json<ApiResponse<SchoolEvaluation>>> {
    let evaluation_id = required_evaluation(req.evaluation_id)?;
    let mut conn = get_conn(&state.db)?;

    let evaluation = evaluation_service::find_evaluation(&mut conn, evaluation_id)?;
    if evaluation.player_id != user.id {
        return Err(AppError::forbidden("Only the evaluated player can request school payment"));
    }
    school_service::find_school(&mut conn, school_id)?;

    let existing: i64 = high_school_evaluations::table
        .filter(high_school_evaluations::high_school_id.eq(school_id))
        .filter(high_school_evaluations::evaluation_id.eq(evaluation_id))
        .count()
        .get_result(&mut conn)?;
    if existing > 0 {
        return Err(AppError::bad_request("This evaluation is already linked to the school"));
    }

    let link = diesel::insert_into(high_school_evaluations::table)
        .values(&NewSchoolEvaluation {
            high_school_id: school_id,
            evaluation_id,
            player_id: user.id,
            paid_by: PAID_BY_SCHOOL.into(),
            shared_by_player: false,
        })
        .get_result::<SchoolEvaluation>(&mut conn)?;

    notification_service::notify_school_admins(&mut conn, school_id, None, |admin_id| {
        NewNotification::new(
            admin_id,
            "school_payment_requested",
            "Evaluation Payment Requested",
            "A player has requested the school to pay for an evaluation.",
        )
        .link(evaluations_link(school_id))
        .metadata(serde_json::json!({
            "school_id": school_id,
            "evaluation_id": evaluation_id,
            "player_id": user.id,
        }))
    });

    tracing::info!(school_id = %school_id, evaluation_id = %evaluation_id, "school payment requested");
    Ok(Json(ApiResponse::ok(link)))
}

// --- POST /high-school/:id/evaluations/confirm-payment ---

pub async fn confirm_payment(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<Uuid>,
    Json(req): Json<SchoolEvaluationRequest>,
) -> AppResult<Json<ApiResponse<Done>>> {
    let mut conn = get_conn(&state.db)?;
    school_service::require_school_admin(&mut conn, user.id, school_id)?;
    let evaluation_id = required_evaluation(req.evaluation_id)?;

    let link = find_school_evaluation(&mut conn, school_id, evaluation_id)?;
    let school = school_service::find_school(&mut conn, school_id)?;
    if school.stripe_account_id.is_none() {
        return Err(AppError::bad_request("School does not have Stripe account set up"));
    }

    notification_service::notify(
        &mut conn,
        NewNotification::new(
            link.player_id,
            "school_payment_accepted",
            "School Payment Accepted",
            "Your school has approved payment for your evaluation request.",
        )
        .link(format!("/evaluations/{evaluation_id}"))
        .metadata(serde_json::json!({
            "school_id": school_id,
            "evaluation_id": evaluation_id,
            "confirmed_by": user.id,
        })),
    );
    notification_service::notify_school_admins(&mut conn, school_id, Some(user.id), |admin_id| {
        NewNotification::new(
            admin_id,
            "admin_accepted",
            "Payment Request Accepted",
            "Your co-admin has accepted a payment request.",
        )
        .link(evaluations_link(school_id))
        .metadata(serde_json::json!({
            "school_id": school_id,
            "evaluation_id": evaluation_id,
            "accepted_by": user.id,
        }))
    });

    tracing::info!(school_id = %school_id, evaluation_id = %evaluation_id, admin_id = %user.id, "school payment confirmed");
    Ok(Json(ApiResponse::ok(Done::yes())))
}

// --- POST /high-school/:id/evaluations/deny-payment ---

pub async fn deny_payment(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<Uuid>,
    Json(req): Json<SchoolEvaluationRequest>,
) -> AppResult<Json<ApiResponse<Done>>> {
    let mut conn = get_conn(&state.db)?;
    school_service::require_school_admin(&mut conn, user.id, school_id)?;
    let evaluation_id = required_evaluation(req.evaluation_id)?;

    let link = find_school_evaluation(&mut conn, school_id, evaluation_id)?;
    diesel::delete(high_school_evaluations::table.find(link.id)).execute(&mut conn)?;

    let reason = non_blank(req.reason.as_deref());
    let message = match &reason {
        Some(r) => format!("Your school has denied payment for your evaluation. Reason: {r}"),
        None => "Your school has denied payment for your evaluation. You can still pay for it yourself.".into(),
    };
    notification_service::notify(
        &mut conn,
        NewNotification::new(link.player_id, "school_payment_denied", "School Payment Denied", message)
            .link(format!("/evaluations/{evaluation_id}"))
            .metadata(serde_json::json!({
                "school_id": school_id,
                "evaluation_id": evaluation_id,
                "denied_by": user.id,
                "reason": reason,
            })),
    );
    notification_service::notify_school_admins(&mut conn, school_id, Some(user.id), |admin_id| {
        NewNotification::new(
            admin_id,
            "admin_denied",
            "Payment Request Denied",
            "Your co-admin has denied a payment request.",
        )
        .link(evaluations_link(school_id))
        .metadata(serde_json::json!({
            "school_id": school_id,
            "evaluation_id": evaluation_id,
            "denied_by": user.id,
        }))
    });

    tracing::info!(school_id = %school_id, evaluation_id = %evaluation_id, admin_id = %user.id, "school payment denied");
    Ok(Json(ApiResponse::ok(Done::yes())))
}

// --- POST /high-school/:id/evaluations/cancel ---

pub async fn cancel_school_evaluation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<Uuid>,
    Json(req): Json<SchoolEvaluationRequest>,
) -> AppResult<Json<ApiResponse<Done>>> {
    let mut conn = get_conn(&state.db)?;
    require_cancelling_admin(school_service::is_high_school_admin(&mut conn, user.id, school_id)?)?;
    let evaluation_id = required_evaluation(req.evaluation_id)?;

    let link = find_school_evaluation(&mut conn, school_id, evaluation_id)?;
    check_school_paid(&link)?;

    diesel::update(high_school_evaluations::table.find(link.id))
        .set(high_school_evaluations::school_cancelled_at.eq(Some(Utc::now())))
        .execute(&mut conn)?;

    notification_service::notify(
        &mut conn,
        NewNotification::new(
            link.player_id,
            "school_eval_cancelled",
            "Evaluation Cancelled by School",
            "Your school cancelled your evaluation request. Would you like to pay for it yourself?",
        )
        .link(format!("/evaluations/{evaluation_id}"))
        .metadata(serde_json::json!({
            "school_id": school_id,
            "evaluation_id": evaluation_id,
            "cancelled_by": user.id,
            "can_pay_self": true,
        })),
    );

    tracing::info!(school_id = %school_id, evaluation_id = %evaluation_id, admin_id = %user.id, "school-paid evaluation cancelled");
    Ok(Json(ApiResponse::ok(Done::yes())))
}

// --- GET /high-school/:id/referral/list ---

pub async fn list_referrals(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<SchoolReferral>>>> {
    let mut conn = get_conn(&state.db)?;
    school_service::require_school_admin(&mut conn, user.id, school_id)?;

    Ok(Json(ApiResponse::ok(referral_service::list_referrals(&mut conn, school_id)?)))
}

// --- GET /high-school/:id/referral/stats ---

pub async fn referral_stats(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ReferralBonus>>> {
    let mut conn = get_conn(&state.db)?;
    school_service::require_school_admin(&mut conn, user.id, school_id)?;

    Ok(Json(ApiResponse::ok(referral_service::calculate_referral_bonus(&mut conn, school_id)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn roster_answers() {
        assert_eq!(RosterAnswer::parse(Some("accept")).unwrap(), RosterAnswer::Accept);
        assert_eq!(RosterAnswer::parse(Some("deny")).unwrap().as_str(), "deny");
        assert!(RosterAnswer::parse(Some("denied")).is_err());
        assert!(RosterAnswer::parse(None).is_err());
    }

    #[test]
    fn placeholder_uses_first_eight_hex_chars() {
        let id: Uuid = "3f2a9c1d-0000-4000-8000-000000000000".parse().unwrap();
        assert_eq!(placeholder_email(id), "3f2a9c1d@got1.app");
    }

    #[test]
    fn blank_fields_are_dropped() {
        assert_eq!(non_blank(Some("  Jordan  ")).as_deref(), Some("Jordan"));
        assert!(non_blank(Some("   ")).is_none());
        assert!(non_blank(None).is_none());
    }

    #[test]
    fn add_player_defaults_positions() {
        let req: AddPlayerRequest = serde_json::from_value(serde_json::json!({
            "name": "Jordan",
            "email": "Jordan@Example.com",
        }))
        .unwrap();
        assert!(req.positions.is_empty());
        assert!(req.user_id.is_none());
    }

    #[test]
    fn evaluation_request_is_camel_case() {
        let id = Uuid::new_v4();
        let req: SchoolEvaluationRequest =
            serde_json::from_value(serde_json::json!({ "evaluationId": id, "reason": "budget" })).unwrap();
        assert_eq!(required_evaluation(req.evaluation_id).unwrap(), id);
        assert!(required_evaluation(None).is_err());
    }

    #[test]
    fn only_school_admins_cancel_school_evaluations() {
        assert!(require_cancelling_admin(true).is_ok());

        let err = require_cancelling_admin(false).unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::Forbidden, .. }));
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn only_school_paid_links_are_cancellable() {
        let now = Utc::now();
        let link = SchoolEvaluation {
            id: Uuid::new_v4(),
            high_school_id: Uuid::new_v4(),
            evaluation_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            paid_by: PAID_BY_SCHOOL.into(),
            shared_by_player: false,
            school_cancelled_at: None,
            created_at: now,
        };
        assert!(check_school_paid(&link).is_ok());

        let shared = SchoolEvaluation { paid_by: "player".into(), shared_by_player: true, ..link };
        assert!(matches!(
            check_school_paid(&shared),
            Err(AppError::Known { code: ErrorCode::NotSchoolPaid, .. })
        ));
    }

    #[test]
    fn accept_invite_response_is_camel_case() {
        let school_id = Uuid::new_v4();
        let player_id = Uuid::new_v4();
        let body = serde_json::to_value(AcceptInviteResponse { school_id, player_id }).unwrap();
        assert_eq!(body, serde_json::json!({ "schoolId": school_id, "playerId": player_id }));
    }

    #[test]
    fn release_outcomes_render() {
        assert_eq!(release_outcome(ReleaseOutcome::InviteDeleted), "invite_deleted");
        assert_eq!(release_outcome(ReleaseOutcome::Released), "released");
    }
}
