use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use got1_shared::clients::db::get_conn;
use got1_shared::errors::{AppError, AppResult};
use got1_shared::types::api::ApiResponse;

use crate::models::{Evaluation, NewEvaluation, NewNotification};
use crate::routes::best_effort;
use crate::schema::evaluations;
use crate::services::evaluation_service::{self, EvaluationStatus, PaymentStatus};
use crate::services::{notification_service, profile_service};
use crate::AppState;

/// Checkout metadata flag set by `/evaluation/create`.
pub const UPFRONT_PAYMENT: &str = "upfront_payment";

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl WebhookAck {
    fn received() -> Self {
        Self { received: true, ..Default::default() }
    }

    fn warning(message: &str) -> Self {
        Self { received: true, warning: Some(message.to_string()), ..Default::default() }
    }
}

/// The fields of a completed Checkout session that describe an upfront
/// evaluation payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpfrontPayment {
    pub scout_id: Uuid,
    pub player_id: Uuid,
    pub price_cents: i64,
    pub payment_intent_id: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Upfront(UpfrontPayment),
    Unpaid,
    /// Some other Checkout flow; acknowledged and ignored.
    Other,
}

fn metadata_str<'a>(session: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    session.get("metadata")?.get(key)?.as_str()
}

/// Read a `checkout.session` object. Missing or malformed metadata on an
/// upfront payment is a 400 so Stripe surfaces the failed delivery.
pub fn parse_session(session: &serde_json::Value) -> AppResult<SessionOutcome> {
    if session.get("payment_status").and_then(|v| v.as_str()) != Some("paid") {
        return Ok(SessionOutcome::Unpaid);
    }
    if metadata_str(session, "action") != Some(UPFRONT_PAYMENT) {
        return Ok(SessionOutcome::Other);
    }

    let uuid = |key: &str| {
        metadata_str(session, key)
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| AppError::bad_request(format!("Missing required metadata: {key}")))
    };
    let scout_id = uuid("scout_id")?;
    let player_id = uuid("player_id")?;

    let price_cents = metadata_str(session, "price_cents")
        .and_then(|v| v.parse::<i64>().ok())
        .or_else(|| session.get("amount_total").and_then(|v| v.as_i64()))
        .filter(|cents| *cents > 0)
        .ok_or_else(|| AppError::bad_request("Invalid price"))?;

    let payment_intent_id = session
        .get("payment_intent")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::bad_request("Missing payment intent"))?
        .to_string();

    Ok(SessionOutcome::Upfront(UpfrontPayment { scout_id, player_id, price_cents, payment_intent_id }))
}

/// Find or create the evaluation for a paid session. Redelivered events hit
/// the payment intent lookup; a row created by an earlier flow for the same
/// pair is adopted. Returns the row and whether it was inserted now.
fn record_upfront_payment(conn: &mut PgConnection, payment: &UpfrontPayment) -> AppResult<(Evaluation, bool)> {
    if let Some(existing) = evaluation_service::find_by_payment_intent(conn, &payment.payment_intent_id)? {
        return Ok((existing, false));
    }

    if let Some(active) = evaluation_service::find_active(conn, payment.scout_id, payment.player_id)? {
        let adopted = diesel::update(evaluations::table.find(active.id))
            .set((
                evaluations::payment_intent_id.eq(Some(payment.payment_intent_id.as_str())),
                evaluations::payment_status.eq(PaymentStatus::Paid.as_str()),
                evaluations::updated_at.eq(chrono::Utc::now()),
            ))
            .get_result::<Evaluation>(conn)?;
        return Ok((adopted, false));
    }

    let split = evaluation_service::split_fee(payment.price_cents);
    let evaluation = diesel::insert_into(evaluations::table)
        .values(&NewEvaluation {
            scout_id: payment.scout_id,
            player_id: payment.player_id,
            status: EvaluationStatus::Requested.as_str().into(),
            price_cents: payment.price_cents,
            platform_fee_cents: split.platform_fee_cents,
            scout_payout_cents: split.scout_payout_cents,
            payment_status: PaymentStatus::Paid.as_str().into(),
            payment_intent_id: Some(payment.payment_intent_id.clone()),
            purchased_by: Some(payment.player_id),
            purchased_by_type: Some("player".into()),
        })
        .get_result::<Evaluation>(conn)?;
    Ok((evaluation, true))
}

// --- POST /stripe/webhook ---

pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::bad_request("Missing stripe-signature header"))?;

    let event = state.payments.construct_event(&body, signature)?;
    tracing::info!(event_id = %event.id, event_type = %event.event_type, "stripe webhook received");

    if event.event_type != CHECKOUT_COMPLETED {
        return Ok(Json(ApiResponse::ok(WebhookAck::received())));
    }

    let payment = match parse_session(&event.data.object)? {
        SessionOutcome::Upfront(payment) => payment,
        SessionOutcome::Unpaid => {
            tracing::warn!(event_id = %event.id, "checkout completed without payment");
            return Ok(Json(ApiResponse::ok(WebhookAck::warning("Payment not completed"))));
        }
        SessionOutcome::Other => {
            tracing::warn!(event_id = %event.id, "checkout session without upfront payment metadata ignored");
            return Ok(Json(ApiResponse::ok(WebhookAck::received())));
        }
    };

    let mut conn = get_conn(&state.db)?;
    let (evaluation, inserted) = record_upfront_payment(&mut conn, &payment)?;

    if inserted {
        tracing::info!(
            evaluation_id = %evaluation.id,
            scout_id = %evaluation.scout_id,
            player_id = %evaluation.player_id,
            price_cents = evaluation.price_cents,
            "evaluation created from checkout"
        );

        let player = profile_service::find_profile(&mut conn, evaluation.player_id)?;
        let player_name = player.as_ref().map(|p| p.display_name().to_string()).unwrap_or_else(|| "A player".into());
        let price = evaluation_service::format_dollars(evaluation.price_cents);

        notification_service::notify(
            &mut conn,
            NewNotification::new(
                evaluation.scout_id,
                "evaluation_requested",
                "New Evaluation Request",
                format!("{player_name} requested an evaluation ({price})."),
            )
            .link("/my-evals")
            .metadata(serde_json::json!({
                "evaluation_id": evaluation.id,
                "player_id": evaluation.player_id,
            })),
        );

        if let Some(scout) = profile_service::find_profile(&mut conn, evaluation.scout_id)? {
            if let Some(to) = scout.email.as_deref() {
                best_effort(
                    "evaluation_requested_email",
                    state.email.send_evaluation_requested(to, scout.display_name(), &player_name, &price),
                )
                .await;
            }
        }
    }

    Ok(Json(ApiResponse::ok(WebhookAck {
        received: true,
        evaluation_id: Some(evaluation.id),
        warning: None,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(metadata: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "payment_intent": "pi_123",
            "amount_total": 4999,
            "metadata": metadata,
        })
    }

    #[test]
    fn upfront_session_is_parsed() {
        let scout = Uuid::new_v4();
        let player = Uuid::new_v4();
        let outcome = parse_session(&session(json!({
            "action": "upfront_payment",
            "scout_id": scout.to_string(),
            "player_id": player.to_string(),
            "price_cents": "4999",
        })))
        .unwrap();

        assert_eq!(
            outcome,
            SessionOutcome::Upfront(UpfrontPayment {
                scout_id: scout,
                player_id: player,
                price_cents: 4_999,
                payment_intent_id: "pi_123".into(),
            })
        );
    }

    #[test]
    fn price_falls_back_to_amount_total() {
        let outcome = parse_session(&session(json!({
            "action": "upfront_payment",
            "scout_id": Uuid::new_v4().to_string(),
            "player_id": Uuid::new_v4().to_string(),
        })))
        .unwrap();
        match outcome {
            SessionOutcome::Upfront(p) => assert_eq!(p.price_cents, 4_999),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn unpaid_and_foreign_sessions_are_not_recorded() {
        let mut unpaid = session(json!({ "action": "upfront_payment" }));
        unpaid["payment_status"] = json!("unpaid");
        assert_eq!(parse_session(&unpaid).unwrap(), SessionOutcome::Unpaid);

        assert_eq!(parse_session(&session(json!({ "action": "gift" }))).unwrap(), SessionOutcome::Other);
    }

    #[test]
    fn missing_ids_are_rejected() {
        let err = parse_session(&session(json!({ "action": "upfront_payment", "scout_id": "nope" })));
        assert!(err.is_err());
    }

    #[test]
    fn ack_omits_empty_fields() {
        let value = serde_json::to_value(WebhookAck::received()).unwrap();
        assert_eq!(value, json!({ "received": true }));
    }
}
