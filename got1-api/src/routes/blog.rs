use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use got1_shared::clients::db::get_conn;
use got1_shared::errors::{AppError, AppResult, ErrorCode};
use got1_shared::types::auth::{AuthUser, ProfileRole};
use got1_shared::types::{ApiResponse, Done};

use crate::models::{BlogPost, BlogPostChanges, NewBlogPost};
use crate::routes::posts::{pinned_flag, PinRequest};
use crate::schema::blog_posts;
use crate::services::profile_service;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlogRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 120, message = "slug must be 1 to 120 characters"))]
    pub slug: String,
    #[serde(flatten)]
    #[validate]
    pub body: BlogBody,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BlogBody {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "title is required"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 500, message = "excerpt is required"))]
    pub excerpt: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "content is required"))]
    pub content: String,
    #[serde(default)]
    #[validate(url(message = "imageUrl must be a URL"))]
    pub image_url: String,
}

impl BlogBody {
    /// Trim before validating so whitespace-only fields count as missing.
    /// Content keeps its formatting unless it is blank.
    fn trimmed(self) -> Self {
        let content = if self.content.trim().is_empty() { String::new() } else { self.content };
        Self {
            title: self.title.trim().to_string(),
            excerpt: self.excerpt.trim().to_string(),
            content,
            image_url: self.image_url.trim().to_string(),
        }
    }
}

/// Lowercase letters, digits and single hyphens between them.
pub(crate) fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn authored_post(conn: &mut PgConnection, slug: &str, user_id: Uuid) -> AppResult<BlogPost> {
    let post = blog_posts::table
        .filter(blog_posts::slug.eq(slug))
        .first::<BlogPost>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::BlogPostNotFound, "Blog post not found"))?;

    if post.scout_id != user_id {
        return Err(AppError::forbidden("Only the author can modify this blog post"));
    }
    Ok(post)
}

// --- POST /blog ---

pub async fn create_blog_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBlogRequest>,
) -> AppResult<Json<ApiResponse<BlogPost>>> {
    let req = CreateBlogRequest { slug: req.slug, body: req.body.trimmed() };
    req.validate()?;
    let slug = req.slug.trim().to_lowercase();
    if !valid_slug(&slug) {
        return Err(AppError::Validation(
            "slug can only contain lowercase letters, numbers, and hyphens".into(),
        ));
    }

    let mut conn = get_conn(&state.db)?;
    profile_service::require_role(&mut conn, user.id, ProfileRole::Scout)?;

    let taken: i64 = blog_posts::table
        .filter(blog_posts::slug.eq(&slug))
        .count()
        .get_result(&mut conn)?;
    if taken > 0 {
        return Err(AppError::new(ErrorCode::SlugTaken, "A blog post with this slug already exists"));
    }

    let post = diesel::insert_into(blog_posts::table)
        .values(&NewBlogPost {
            scout_id: user.id,
            slug,
            title: req.body.title,
            excerpt: req.body.excerpt,
            content: req.body.content,
            image_url: Some(req.body.image_url),
        })
        .get_result::<BlogPost>(&mut conn)?;

    tracing::info!(blog_post_id = %post.id, slug = %post.slug, scout_id = %user.id, "blog post created");
    Ok(Json(ApiResponse::ok(post)))
}

// --- PUT /blog/:slug ---

pub async fn update_blog_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(req): Json<BlogBody>,
) -> AppResult<Json<ApiResponse<BlogPost>>> {
    let req = req.trimmed();
    req.validate()?;
    let mut conn = get_conn(&state.db)?;
    let post = authored_post(&mut conn, &slug, user.id)?;

    let updated = diesel::update(blog_posts::table.find(post.id))
        .set(&BlogPostChanges {
            title: req.title,
            excerpt: req.excerpt,
            content: req.content,
            image_url: req.image_url,
            updated_at: Utc::now(),
        })
        .get_result::<BlogPost>(&mut conn)?;

    Ok(Json(ApiResponse::ok(updated)))
}

// --- DELETE /blog/:slug ---

pub async fn delete_blog_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> AppResult<Json<ApiResponse<Done>>> {
    let mut conn = get_conn(&state.db)?;
    let post = authored_post(&mut conn, &slug, user.id)?;

    diesel::delete(blog_posts::table.find(post.id)).execute(&mut conn)?;

    tracing::info!(blog_post_id = %post.id, slug = %slug, "blog post deleted");
    Ok(Json(ApiResponse::ok_with_message(Done::yes(), "Blog post deleted successfully")))
}

// --- PATCH /blog/:slug/pin ---

pub async fn pin_blog_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(req): Json<PinRequest>,
) -> AppResult<Json<ApiResponse<BlogPost>>> {
    let pinned = pinned_flag(&req.pinned)?;
    let mut conn = get_conn(&state.db)?;
    let post = authored_post(&mut conn, &slug, user.id)?;

    let updated = diesel::update(blog_posts::table.find(post.id))
        .set(blog_posts::pinned.eq(pinned))
        .get_result::<BlogPost>(&mut conn)?;

    Ok(Json(ApiResponse::ok(updated)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rules() {
        assert!(valid_slug("how-to-get-recruited-2025"));
        assert!(!valid_slug("How-To"));
        assert!(!valid_slug("-leading"));
        assert!(!valid_slug("double--hyphen"));
        assert!(!valid_slug("under_score"));
        assert!(!valid_slug(""));
    }

    #[test]
    fn body_validation_requires_fields_and_url() {
        let body = BlogBody {
            title: "Combine prep".into(),
            excerpt: "What scouts look for".into(),
            content: "...".into(),
            image_url: "https://cdn.got1.app/combine.jpg".into(),
        };
        assert!(body.validate().is_ok());

        let bad = BlogBody { image_url: "not a url".into(), title: String::new(), ..body };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("image_url"));
    }

    #[test]
    fn whitespace_only_fields_fail_after_trimming() {
        let body = BlogBody {
            title: "   ".into(),
            excerpt: "\t\n".into(),
            content: "  ".into(),
            image_url: " https://cdn.got1.app/combine.jpg ".into(),
        }
        .trimmed();
        let errors = body.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("excerpt"));
        assert!(fields.contains_key("content"));
        assert!(!fields.contains_key("image_url"));
    }

    #[test]
    fn trimming_keeps_content_formatting() {
        let body = BlogBody {
            title: "  Combine prep ".into(),
            excerpt: "What scouts look for".into(),
            content: "  indented\n".into(),
            image_url: "https://cdn.got1.app/combine.jpg".into(),
        }
        .trimmed();
        assert_eq!(body.title, "Combine prep");
        assert_eq!(body.content, "  indented\n");
    }
}
