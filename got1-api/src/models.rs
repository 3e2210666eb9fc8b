use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::{
    blog_posts, evaluations, follows, high_school_admins, high_school_evaluations,
    high_school_players, high_schools, notifications, post_likes, posts, profiles,
    referral_program_applications, referrals, school_referrals, scout_applications,
};

// --- Profile ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub role: String,
    pub organization: Option<String>,
    pub position: Option<String>,
    pub work_history: Option<String>,
    pub additional_info: Option<String>,
    pub price_per_eval_cents: Option<i64>,
    #[serde(skip_serializing)]
    pub stripe_account_id: Option<String>,
    pub high_school_id: Option<Uuid>,
    pub school: Option<String>,
    pub suspended_until: Option<DateTime<Utc>>,
    pub suspended_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("A user")
    }
}

// --- Follow ---

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = follows)]
pub struct Follow {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub following_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = follows)]
pub struct NewFollow {
    pub follower_id: Uuid,
    pub following_id: Uuid,
}

// --- Notification ---

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

// --- Post ---

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = posts)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub video_thumbnail_url: Option<String>,
    pub pinned: bool,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost {
    pub user_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub video_thumbnail_url: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = post_likes)]
pub struct NewPostLike {
    pub post_id: Uuid,
    pub user_id: Uuid,
}

// --- Blog ---

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = blog_posts)]
pub struct BlogPost {
    pub id: Uuid,
    pub scout_id: Uuid,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub image_url: Option<String>,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = blog_posts)]
pub struct NewBlogPost {
    pub scout_id: Uuid,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub image_url: Option<String>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = blog_posts)]
pub struct BlogPostChanges {
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub image_url: String,
    pub updated_at: DateTime<Utc>,
}

// --- Evaluation ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = evaluations)]
pub struct Evaluation {
    pub id: Uuid,
    pub scout_id: Uuid,
    pub player_id: Uuid,
    pub status: String,
    pub price_cents: i64,
    pub platform_fee_cents: i64,
    pub scout_payout_cents: i64,
    pub payment_status: String,
    pub payment_intent_id: Option<String>,
    pub transfer_id: Option<String>,
    pub purchased_by: Option<Uuid>,
    pub purchased_by_type: Option<String>,
    pub notes: Option<String>,
    pub denied_reason: Option<String>,
    pub cancelled_reason: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = evaluations)]
pub struct NewEvaluation {
    pub scout_id: Uuid,
    pub player_id: Uuid,
    pub status: String,
    pub price_cents: i64,
    pub platform_fee_cents: i64,
    pub scout_payout_cents: i64,
    pub payment_status: String,
    pub payment_intent_id: Option<String>,
    pub purchased_by: Option<Uuid>,
    pub purchased_by_type: Option<String>,
}

// --- Scout application ---

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = scout_applications)]
pub struct ScoutApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub current_workplace: String,
    pub current_position: String,
    pub work_history: String,
    pub additional_info: Option<String>,
    pub status: String,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = scout_applications)]
pub struct NewScoutApplication {
    pub user_id: Uuid,
    pub current_workplace: String,
    pub current_position: String,
    pub work_history: String,
    pub additional_info: Option<String>,
    pub status: String,
}

// --- High school ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = high_schools)]
pub struct HighSchool {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub admin_status: String,
    pub referral_school_id: Option<Uuid>,
    #[serde(skip_serializing)]
    pub stripe_account_id: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = high_schools)]
pub struct NewHighSchool {
    pub username: String,
    pub name: String,
    pub admin_status: String,
    pub referral_school_id: Option<Uuid>,
    pub created_by: Uuid,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = high_school_admins)]
pub struct NewHighSchoolAdmin {
    pub high_school_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = high_school_players)]
pub struct RosterPlayer {
    pub id: Uuid,
    pub high_school_id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub positions: Vec<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub request_status: Option<String>,
    #[serde(skip_serializing)]
    pub invite_token: Option<String>,
    pub added_by: Uuid,
    pub joined_at: Option<DateTime<Utc>>,
    pub release_requested_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = high_school_players)]
pub struct NewRosterPlayer {
    pub high_school_id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub positions: Vec<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub request_status: Option<String>,
    pub invite_token: Option<String>,
    pub added_by: Uuid,
}

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = high_school_evaluations)]
pub struct SchoolEvaluation {
    pub id: Uuid,
    pub high_school_id: Uuid,
    pub evaluation_id: Uuid,
    pub player_id: Uuid,
    pub paid_by: String,
    pub shared_by_player: bool,
    pub school_cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = high_school_evaluations)]
pub struct NewSchoolEvaluation {
    pub high_school_id: Uuid,
    pub evaluation_id: Uuid,
    pub player_id: Uuid,
    pub paid_by: String,
    pub shared_by_player: bool,
}

// --- Referrals ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = school_referrals)]
pub struct SchoolReferral {
    pub id: Uuid,
    pub referring_school_id: Uuid,
    pub referred_school_id: Uuid,
    pub bonus_amount_cents: i64,
    pub bonus_status: String,
    pub stripe_transfer_id: Option<String>,
    pub bonus_paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = school_referrals)]
pub struct NewSchoolReferral {
    pub referring_school_id: Uuid,
    pub referred_school_id: Uuid,
    pub bonus_amount_cents: i64,
    pub bonus_status: String,
}

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = referrals)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_id: Uuid,
    pub referrer_role: String,
    pub referred_role: String,
    pub amount_earned_cents: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = referrals)]
pub struct NewReferral {
    pub referrer_id: Uuid,
    pub referred_id: Uuid,
    pub referrer_role: String,
    pub referred_role: String,
    pub amount_earned_cents: i64,
    pub status: String,
}

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = referral_program_applications)]
pub struct ReferralApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = referral_program_applications)]
pub struct NewReferralApplication {
    pub user_id: Uuid,
    pub status: String,
}
