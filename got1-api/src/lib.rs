pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;

use got1_shared::clients::db::DbPool;
use got1_shared::clients::email::EmailClient;
use got1_shared::clients::payments::PaymentsClient;
use got1_shared::middleware::metrics_middleware;
use got1_shared::types::auth::{AuthSettings, AuthState};

use crate::config::AppConfig;
use crate::services::referral_service::BonusTiers;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub auth: AuthSettings,
    pub email: EmailClient,
    pub payments: PaymentsClient,
    pub bonus_tiers: BonusTiers,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AuthState for AppState {
    fn auth_settings(&self) -> &AuthSettings {
        &self.auth
    }
}

fn cors_layer(app_url: &str) -> CorsLayer {
    let origin = match routes::app_base(app_url).parse::<HeaderValue>() {
        Ok(origin) => origin,
        Err(_) => {
            tracing::warn!(app_url, "app url is not a valid origin, CORS falls back to permissive");
            return CorsLayer::permissive();
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_credentials(true)
}

fn api_routes() -> Router<Arc<AppState>> {
    use routes::{
        admin, blog, evaluations, follows, high_school, notifications, posts, referrals,
        scout_applications, stripe_webhook,
    };

    Router::new()
        // Social
        .route("/follows/follow", post(follows::follow))
        .route("/follows/unfollow", post(follows::unfollow))
        .route("/follows/check", get(follows::check))
        .route("/follows/count", get(follows::count))
        .route("/posts/create", post(posts::create_post))
        .route("/posts/feed", get(posts::feed))
        .route("/posts/user/:user_id", get(posts::user_posts))
        .route("/posts/:id", put(posts::update_post).delete(posts::delete_post))
        .route("/posts/:id/pin", patch(posts::pin_post))
        .route("/posts/:id/like", post(posts::toggle_like).get(posts::like_status))
        .route("/blog", post(blog::create_blog_post))
        .route("/blog/:slug", put(blog::update_blog_post).delete(blog::delete_blog_post))
        .route("/blog/:slug/pin", patch(blog::pin_blog_post))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/create", post(notifications::create_notification))
        .route("/notifications/create-for-user", post(notifications::create_for_user))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/mark-all-read", post(notifications::mark_all_read))
        .route("/notifications/:id/read", post(notifications::mark_read))
        // Evaluations and payments
        .route("/evaluation/create", post(evaluations::create_evaluation))
        .route("/evaluation/confirm", post(evaluations::confirm_evaluation))
        .route("/evaluation/complete", post(evaluations::complete_evaluation))
        .route("/evaluation/cancel", post(evaluations::cancel_evaluation))
        .route("/stripe/webhook", post(stripe_webhook::stripe_webhook))
        // Scouts
        .route("/scout-application/submit", post(scout_applications::submit_application))
        .route("/scout-application/:id/decision", post(scout_applications::decide_application))
        // Admin
        .route("/admin/scouts/:user_id/suspend", post(admin::suspend_scout))
        .route("/admin/scouts/:user_id/unsuspend", post(admin::unsuspend_scout))
        .route("/admin/scouts/:user_id/revoke", post(admin::revoke_scout))
        .route("/admin/high-schools/:id/decision", post(admin::decide_high_school))
        .route("/admin/referrals/user/:user_id/revoke", post(admin::revoke_referrer))
        .route("/admin/referrals/:id/decision", post(admin::decide_referral_application))
        .route("/admin/referrals/:id/approve", post(admin::approve_referral))
        // Referrals
        .route("/referrals/apply", post(referrals::apply))
        .route("/referrals/create", post(referrals::create_referral))
        // High schools
        .route("/high-school/create", post(high_school::create_school))
        .route("/high-school/players/request-release", post(high_school::request_release))
        .route("/high-school/players/accept-invite/:token", post(high_school::accept_invite))
        .route(
            "/high-school/players/:player_id/respond-to-request",
            post(high_school::respond_to_request),
        )
        .route("/high-school/:id/players/list", get(high_school::list_players))
        .route("/high-school/:id/players/add", post(high_school::add_player))
        .route("/high-school/:id/players/:player_id/release", post(high_school::release_player))
        .route(
            "/high-school/:id/players/:player_id/cancel-invite",
            delete(high_school::cancel_invite),
        )
        .route(
            "/high-school/:id/players/:player_id/resend-invite",
            post(high_school::resend_invite),
        )
        .route("/high-school/:id/evaluations/request-payment", post(high_school::request_payment))
        .route("/high-school/:id/evaluations/confirm-payment", post(high_school::confirm_payment))
        .route("/high-school/:id/evaluations/deny-payment", post(high_school::deny_payment))
        .route("/high-school/:id/evaluations/cancel", post(high_school::cancel_school_evaluation))
        .route("/high-school/:id/referral/list", get(high_school::list_referrals))
        .route("/high-school/:id/referral/stats", get(high_school::referral_stats))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.app_url);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .nest("/api", api_routes())
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
