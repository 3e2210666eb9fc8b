use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use got1_shared::clients::db::get_conn;
use got1_shared::errors::{AppError, AppResult, ErrorCode};
use got1_shared::middleware::OptionalAuthUser;
use got1_shared::types::auth::AuthUser;
use got1_shared::types::pagination::{Paginated, PaginationParams};
use got1_shared::types::{ApiResponse, Done};

use crate::models::{NewPost, NewPostLike, Post};
use crate::schema::{follows, post_likes, posts};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub video_thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub content: Option<String>,
}

/// `pinned` is kept untyped so a non-boolean is a 400 with our envelope.
#[derive(Debug, Deserialize)]
pub struct PinRequest {
    #[serde(default)]
    pub pinned: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub mode: FeedMode,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl FeedQuery {
    fn pagination(&self) -> PaginationParams {
        let defaults = PaginationParams::default();
        PaginationParams {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
    }
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    #[default]
    All,
    Following,
}

pub(crate) fn trimmed_content(content: Option<&str>) -> AppResult<String> {
    content
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .ok_or_else(|| AppError::bad_request("Post content is required"))
}

pub(crate) fn check_single_media(image_url: Option<&str>, video_url: Option<&str>) -> AppResult<()> {
    let present = |v: Option<&str>| v.map(|s| !s.trim().is_empty()).unwrap_or(false);
    if present(image_url) && present(video_url) {
        return Err(AppError::new(
            ErrorCode::PostMediaConflict,
            "A post can only have either an image or video, not both",
        ));
    }
    Ok(())
}

pub(crate) fn pinned_flag(value: &serde_json::Value) -> AppResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| AppError::bad_request("pinned must be a boolean"))
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

/// Load a live post and check the caller owns it.
fn owned_post(conn: &mut PgConnection, post_id: Uuid, user_id: Uuid) -> AppResult<Post> {
    let post = posts::table
        .find(post_id)
        .filter(posts::deleted_at.is_null())
        .first::<Post>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "Post not found"))?;

    check_owner(&post, user_id)?;
    Ok(post)
}

fn check_owner(post: &Post, user_id: Uuid) -> AppResult<()> {
    if post.user_id != user_id {
        return Err(AppError::forbidden("You can only modify your own posts"));
    }
    Ok(())
}

// --- POST /posts/create ---

pub async fn create_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<Json<ApiResponse<Post>>> {
    let content = trimmed_content(req.content.as_deref())?;
    check_single_media(req.image_url.as_deref(), req.video_url.as_deref())?;

    let mut conn = get_conn(&state.db)?;
    let post = diesel::insert_into(posts::table)
        .values(&NewPost {
            user_id: user.id,
            content,
            image_url: non_empty(req.image_url),
            video_url: non_empty(req.video_url),
            video_thumbnail_url: non_empty(req.video_thumbnail_url),
        })
        .get_result::<Post>(&mut conn)?;

    tracing::debug!(post_id = %post.id, user_id = %user.id, "post created");
    Ok(Json(ApiResponse::ok(post)))
}

// --- PUT /posts/:id ---

pub async fn update_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<UpdatePostRequest>,
) -> AppResult<Json<ApiResponse<Post>>> {
    let content = trimmed_content(req.content.as_deref())?;
    let mut conn = get_conn(&state.db)?;
    owned_post(&mut conn, post_id, user.id)?;

    let post = diesel::update(posts::table.find(post_id))
        .set((posts::content.eq(content), posts::updated_at.eq(Utc::now())))
        .get_result::<Post>(&mut conn)?;

    Ok(Json(ApiResponse::ok(post)))
}

// --- DELETE /posts/:id (soft delete) ---

pub async fn delete_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Done>>> {
    let mut conn = get_conn(&state.db)?;
    owned_post(&mut conn, post_id, user.id)?;

    diesel::update(posts::table.find(post_id))
        .set(posts::deleted_at.eq(Some(Utc::now())))
        .execute(&mut conn)?;

    tracing::debug!(post_id = %post_id, "post soft deleted");
    Ok(Json(ApiResponse::ok(Done::yes())))
}

// --- PATCH /posts/:id/pin ---

pub async fn pin_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<PinRequest>,
) -> AppResult<Json<ApiResponse<Post>>> {
    let pinned = pinned_flag(&req.pinned)?;
    let mut conn = get_conn(&state.db)?;
    owned_post(&mut conn, post_id, user.id)?;

    let post = diesel::update(posts::table.find(post_id))
        .set(posts::pinned.eq(pinned))
        .get_result::<Post>(&mut conn)?;

    Ok(Json(ApiResponse::ok(post)))
}

fn like_count(conn: &mut PgConnection, post_id: Uuid) -> AppResult<i64> {
    let count = post_likes::table
        .filter(post_likes::post_id.eq(post_id))
        .count()
        .get_result(conn)?;
    Ok(count)
}

// --- POST /posts/:id/like (toggle) ---

pub async fn toggle_like(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<LikeResponse>>> {
    let mut conn = get_conn(&state.db)?;

    let exists: i64 = posts::table
        .find(post_id)
        .filter(posts::deleted_at.is_null())
        .count()
        .get_result(&mut conn)?;
    if exists == 0 {
        return Err(AppError::new(ErrorCode::PostNotFound, "Post not found"));
    }

    let removed = diesel::delete(
        post_likes::table
            .filter(post_likes::post_id.eq(post_id))
            .filter(post_likes::user_id.eq(user.id)),
    )
    .execute(&mut conn)?;

    let liked = if removed == 0 {
        diesel::insert_into(post_likes::table)
            .values(&NewPostLike { post_id, user_id: user.id })
            .execute(&mut conn)?;
        true
    } else {
        false
    };

    let like_count = like_count(&mut conn, post_id)?;
    Ok(Json(ApiResponse::ok(LikeResponse { liked, like_count })))
}

// --- GET /posts/:id/like ---

pub async fn like_status(
    OptionalAuthUser(user): OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<LikeResponse>>> {
    let mut conn = get_conn(&state.db)?;
    let like_count = like_count(&mut conn, post_id)?;

    let liked = match user {
        Some(user) => {
            let mine: i64 = post_likes::table
                .filter(post_likes::post_id.eq(post_id))
                .filter(post_likes::user_id.eq(user.id))
                .count()
                .get_result(&mut conn)?;
            mine > 0
        }
        None => false,
    };

    Ok(Json(ApiResponse::ok(LikeResponse { liked, like_count })))
}

// --- GET /posts/feed ---

pub async fn feed(
    OptionalAuthUser(user): OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Post>>>> {
    let mut conn = get_conn(&state.db)?;
    let params = &query.pagination();

    let mut items_query = posts::table.filter(posts::deleted_at.is_null()).into_boxed();
    let mut count_query = posts::table.filter(posts::deleted_at.is_null()).into_boxed();

    if query.mode == FeedMode::Following {
        let user = user.ok_or_else(|| AppError::unauthorized("Unauthorized"))?;
        let followed = follows::table
            .filter(follows::follower_id.eq(user.id))
            .select(follows::following_id);
        items_query = items_query.filter(posts::user_id.eq_any(followed));
        let followed = follows::table
            .filter(follows::follower_id.eq(user.id))
            .select(follows::following_id);
        count_query = count_query.filter(posts::user_id.eq_any(followed));
    }

    let total: i64 = count_query.count().get_result(&mut conn)?;
    let items = items_query
        .order(posts::created_at.desc())
        .limit(params.limit())
        .offset(params.offset())
        .load::<Post>(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, params))))
}

// --- GET /posts/user/:user_id ---

pub async fn user_posts(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Post>>>> {
    let mut conn = get_conn(&state.db)?;

    let total: i64 = posts::table
        .filter(posts::user_id.eq(user_id))
        .filter(posts::deleted_at.is_null())
        .count()
        .get_result(&mut conn)?;

    let items = posts::table
        .filter(posts::user_id.eq(user_id))
        .filter(posts::deleted_at.is_null())
        .order((posts::pinned.desc(), posts::created_at.desc()))
        .limit(params.limit())
        .offset(params.offset())
        .load::<Post>(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &params))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn content_is_trimmed_and_required() {
        assert_eq!(trimmed_content(Some("  hello  ")).unwrap(), "hello");
        assert!(trimmed_content(Some("   ")).is_err());
        assert!(trimmed_content(None).is_err());
    }

    #[test]
    fn image_and_video_together_is_rejected() {
        let err = check_single_media(Some("a.png"), Some("b.mp4")).unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::PostMediaConflict, .. }));
        assert!(check_single_media(Some("a.png"), None).is_ok());
        assert!(check_single_media(Some("a.png"), Some("")).is_ok());
    }

    #[test]
    fn pinned_must_be_boolean() {
        assert!(pinned_flag(&serde_json::json!(true)).unwrap());
        assert!(pinned_flag(&serde_json::json!("true")).is_err());
        assert!(pinned_flag(&serde_json::Value::Null).is_err());
    }

    fn post_by(user_id: Uuid) -> Post {
        let now = Utc::now();
        Post {
            id: Uuid::new_v4(),
            user_id,
            content: "Friday night film".into(),
            image_url: None,
            video_url: None,
            video_thumbnail_url: None,
            pinned: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_the_author_may_modify_a_post() {
        let author = Uuid::new_v4();
        let post = post_by(author);
        assert!(check_owner(&post, author).is_ok());

        let err = check_owner(&post, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::Forbidden, .. }));
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn feed_mode_parses_lowercase() {
        let q: FeedQuery = serde_json::from_value(serde_json::json!({ "mode": "following", "per_page": 5 })).unwrap();
        assert_eq!(q.mode, FeedMode::Following);
        assert_eq!(q.pagination().page, 1);
        assert_eq!(q.pagination().limit(), 5);
    }
}
