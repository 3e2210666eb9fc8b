use axum::extract::{Query, State};
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use got1_shared::clients::db::get_conn;
use got1_shared::errors::{AppError, AppResult, ErrorCode};
use got1_shared::types::auth::AuthUser;
use got1_shared::types::{ApiResponse, Done};

use crate::models::NewFollow;
use crate::schema::follows;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequest {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResponse {
    pub already_following: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsFollowingResponse {
    pub is_following: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowerCountResponse {
    pub follower_count: i64,
}

fn required(user_id: Option<Uuid>) -> AppResult<Uuid> {
    user_id.ok_or_else(|| AppError::bad_request("userId is required"))
}

fn follow_target(follower: Uuid, user_id: Option<Uuid>) -> AppResult<Uuid> {
    let target = required(user_id)?;
    if target == follower {
        return Err(AppError::new(ErrorCode::CannotFollowSelf, "You cannot follow yourself"));
    }
    Ok(target)
}

/// A follow row is written only when the pair does not exist yet.
fn follow_outcome(existing_rows: i64) -> FollowResponse {
    FollowResponse { already_following: existing_rows > 0 }
}

// --- POST /follows/follow ---

pub async fn follow(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<FollowRequest>,
) -> AppResult<Json<ApiResponse<FollowResponse>>> {
    let target = follow_target(user.id, req.user_id)?;
    let mut conn = get_conn(&state.db)?;

    let existing: i64 = follows::table
        .filter(follows::follower_id.eq(user.id))
        .filter(follows::following_id.eq(target))
        .count()
        .get_result(&mut conn)?;
    let outcome = follow_outcome(existing);
    if outcome.already_following {
        return Ok(Json(ApiResponse::ok(outcome)));
    }

    // (follower, following) is unique; a concurrent follow is a no-op.
    diesel::insert_into(follows::table)
        .values(&NewFollow { follower_id: user.id, following_id: target })
        .on_conflict_do_nothing()
        .execute(&mut conn)?;

    tracing::debug!(follower_id = %user.id, following_id = %target, "follow created");
    Ok(Json(ApiResponse::ok(outcome)))
}

// --- POST /follows/unfollow ---

pub async fn unfollow(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<FollowRequest>,
) -> AppResult<Json<ApiResponse<Done>>> {
    let target = required(req.user_id)?;
    let mut conn = get_conn(&state.db)?;

    diesel::delete(
        follows::table
            .filter(follows::follower_id.eq(user.id))
            .filter(follows::following_id.eq(target)),
    )
    .execute(&mut conn)?;

    Ok(Json(ApiResponse::ok(Done::yes())))
}

// --- GET /follows/check?userId= ---

pub async fn check(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<FollowQuery>,
) -> AppResult<Json<ApiResponse<IsFollowingResponse>>> {
    let target = required(query.user_id)?;
    let mut conn = get_conn(&state.db)?;

    let count: i64 = follows::table
        .filter(follows::follower_id.eq(user.id))
        .filter(follows::following_id.eq(target))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(ApiResponse::ok(IsFollowingResponse { is_following: count > 0 })))
}

// --- GET /follows/count?userId= (public) ---

pub async fn count(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FollowQuery>,
) -> AppResult<Json<ApiResponse<FollowerCountResponse>>> {
    let target = required(query.user_id)?;
    let mut conn = get_conn(&state.db)?;

    let follower_count: i64 = follows::table
        .filter(follows::following_id.eq(target))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(ApiResponse::ok(FollowerCountResponse { follower_count })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_must_be_present_and_not_self() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert_eq!(follow_target(me, Some(other)).unwrap(), other);
        assert!(follow_target(me, None).is_err());

        let err = follow_target(me, Some(me)).unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::CannotFollowSelf, .. }));
    }

    #[test]
    fn existing_follow_short_circuits() {
        assert!(!follow_outcome(0).already_following);
        assert!(follow_outcome(1).already_following);

        let body = serde_json::to_value(follow_outcome(1)).unwrap();
        assert_eq!(body, serde_json::json!({ "alreadyFollowing": true }));
    }
}
