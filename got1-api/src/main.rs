use std::sync::Arc;
use std::time::Duration;

use got1_api::config::AppConfig;
use got1_api::services::referral_service::BonusTiers;
use got1_api::{build_router, AppState};
use got1_shared::clients::db::create_pool;
use got1_shared::clients::email::EmailClient;
use got1_shared::clients::payments::PaymentsClient;
use got1_shared::types::auth::AuthSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    got1_shared::middleware::init_tracing("got1-api");

    let config = AppConfig::load()?;
    let port = config.port;

    let db = create_pool(&config.database_url, config.db_pool_size)?;

    let bonus_tiers: BonusTiers = config
        .referral_bonus_tiers
        .parse()
        .map_err(|e: String| anyhow::anyhow!("invalid GOT1__REFERRAL_BONUS_TIERS: {e}"))?;

    // A second install in the same process fails; the service then runs without /metrics.
    let metrics_handle = match got1_shared::middleware::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder not installed");
            None
        }
    };

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    if config.resend_api_key.is_none() {
        tracing::warn!("GOT1__RESEND_API_KEY not set, outgoing email is logged and skipped");
    }
    if config.stripe_webhook_secret.is_empty() {
        tracing::warn!("GOT1__STRIPE_WEBHOOK_SECRET not set, Stripe webhooks are rejected");
    }
    let email = EmailClient::new(
        http_client.clone(),
        config.resend_api_key.clone(),
        &config.email_from,
        &config.email_reply_to,
        &config.app_url,
    );
    let payments = PaymentsClient::new(http_client, &config.stripe_secret_key, &config.stripe_webhook_secret);

    let auth = AuthSettings::new(
        config.jwt_secret.clone(),
        config.jwt_audience.clone(),
        config.admin_user_ids.clone(),
        config.admin_emails.clone(),
    );

    let state = Arc::new(AppState {
        db,
        config,
        auth,
        email,
        payments,
        bonus_tiers,
        metrics_handle,
    });

    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "got1-api starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
