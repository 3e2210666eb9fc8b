use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use got1_shared::clients::db::get_conn;
use got1_shared::clients::payments::{CheckoutRequest, TransferRequest};
use got1_shared::errors::{AppError, AppResult, ErrorCode};
use got1_shared::types::api::ApiResponse;
use got1_shared::types::auth::{AuthUser, ProfileRole};

use crate::models::{NewNotification, Profile};
use crate::routes::{app_base, best_effort};
use crate::schema::{evaluations, profiles};
use crate::services::evaluation_service::{self, EvaluationStatus, PaymentStatus};
use crate::services::{notification_service, profile_service};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvaluationRequest {
    pub scout_id: Option<Uuid>,
    pub price: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub evaluation_id: Option<Uuid>,
    pub action: Option<String>,
    pub denied_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    Confirm,
    Deny,
}

impl ConfirmAction {
    fn parse(raw: &str) -> AppResult<Self> {
        match raw {
            "confirm" => Ok(Self::Confirm),
            "deny" => Ok(Self::Deny),
            _ => Err(AppError::bad_request(r#"Invalid action. Must be "confirm" or "deny""#)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub evaluation_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub evaluation_id: Option<Uuid>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunded: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub transfer_id: Option<String>,
    pub payout_processed: bool,
}

fn required_id(id: Option<Uuid>) -> AppResult<Uuid> {
    id.ok_or_else(|| AppError::bad_request("Missing evaluationId"))
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn name_or(profile: Option<&Profile>, fallback: &str) -> String {
    profile
        .and_then(|p| p.full_name.clone())
        .unwrap_or_else(|| fallback.to_string())
}

/// Refund message shown to the player, by Stripe refund status.
fn refund_message(status: Option<&str>, price_cents: i64) -> String {
    let amount = evaluation_service::format_dollars(price_cents);
    match status {
        Some("succeeded") => format!(
            "Your refund of {amount} has been processed and will appear in your account within 5-10 business days."
        ),
        Some("pending") => format!(
            "Your refund of {amount} has been initiated and is processing. The funds will be returned to your original payment method within 5-10 business days."
        ),
        _ => format!(
            "Your refund of {amount} has been requested. If you don't see the refund in 5-10 business days, please contact support."
        ),
    }
}

// --- POST /evaluation/create ---

/// Players pay up front: this only opens a Checkout session. The evaluation
/// row is written by the webhook once the payment succeeds.
pub async fn create_evaluation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEvaluationRequest>,
) -> AppResult<Json<ApiResponse<CheckoutResponse>>> {
    let (Some(scout_profile_id), Some(client_price)) = (req.scout_id, req.price) else {
        return Err(AppError::bad_request("Missing scoutId or price"));
    };

    let mut conn = get_conn(&state.db)?;

    let scout = profiles::table
        .find(scout_profile_id)
        .first::<Profile>(&mut conn)
        .optional()?
        .filter(|p| profile_service::role_of(p) == Some(ProfileRole::Scout))
        .ok_or_else(|| AppError::new(ErrorCode::InvalidScout, "Invalid scout"))?;

    if scout.user_id == user.id {
        return Err(AppError::bad_request("You cannot request an evaluation from yourself"));
    }
    if profile_service::is_suspended(&scout, Utc::now()) {
        return Err(AppError::new(ErrorCode::InvalidScout, "This scout is not accepting requests right now"));
    }

    let player = profile_service::find_profile(&mut conn, user.id)?
        .filter(|p| profile_service::role_of(p) == Some(ProfileRole::Player))
        .ok_or_else(|| AppError::new(ErrorCode::InvalidPlayer, "Invalid player"))?;

    let price_cents = evaluation_service::validate_scout_price(scout.price_per_eval_cents)?;
    if !evaluation_service::price_matches(client_price, price_cents) {
        tracing::warn!(
            scout_id = %scout.user_id,
            player_id = %player.user_id,
            client_price,
            price_cents,
            "client price does not match scout price"
        );
        return Err(AppError::new(ErrorCode::InvalidPrice, "Invalid price provided"));
    }

    if let Some(existing) = evaluation_service::find_active(&mut conn, scout.user_id, player.user_id)? {
        return Err(AppError::with_details(
            ErrorCode::EvaluationAlreadyActive,
            "Evaluation already requested or in progress",
            serde_json::json!({ "evaluationId": existing.id, "status": existing.status }),
        ));
    }

    let base = app_base(&state.config.app_url);
    let success_url = format!("{base}/evaluations/payment-success?session_id={{CHECKOUT_SESSION_ID}}");
    let cancel_url = format!("{base}/profile/{scout_profile_id}");
    let product_name = format!("Evaluation from {}", scout.full_name.as_deref().unwrap_or("Scout"));
    let customer_email = player.email.as_deref().or(user.email.as_deref());

    let session = state
        .payments
        .create_checkout_session(&CheckoutRequest {
            customer_email,
            product_name: &product_name,
            product_description: "HUDL evaluation service",
            unit_amount_cents: price_cents,
            success_url: &success_url,
            cancel_url: &cancel_url,
            metadata: vec![
                ("scout_id", scout.user_id.to_string()),
                ("player_id", player.user_id.to_string()),
                ("price_cents", price_cents.to_string()),
                ("scout_profile_id", scout.id.to_string()),
                ("action", crate::routes::stripe_webhook::UPFRONT_PAYMENT.to_string()),
            ],
        })
        .await?;

    Ok(Json(ApiResponse::ok(CheckoutResponse { session_id: session.id, url: session.url })))
}

// --- POST /evaluation/confirm ---

pub async fn confirm_evaluation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfirmRequest>,
) -> AppResult<Json<ApiResponse<StatusResponse>>> {
    let (Some(evaluation_id), Some(action)) = (req.evaluation_id, req.action.as_deref()) else {
        return Err(AppError::bad_request("Missing evaluationId or action"));
    };
    let action = ConfirmAction::parse(action)?;

    let mut conn = get_conn(&state.db)?;
    let evaluation = evaluation_service::find_evaluation(&mut conn, evaluation_id)?;

    if evaluation.scout_id != user.id {
        return Err(AppError::forbidden("Only the scout can confirm or deny this evaluation"));
    }
    evaluation_service::require_status(&evaluation, EvaluationStatus::Requested)?;

    let player = profile_service::find_profile(&mut conn, evaluation.player_id)?;
    let scout = profile_service::find_profile(&mut conn, evaluation.scout_id)?;
    let player_name = name_or(player.as_ref(), "Player");
    let scout_name = name_or(scout.as_ref(), "Scout");
    let player_email = player.as_ref().and_then(|p| p.email.clone());

    if action == ConfirmAction::Deny {
        let mut refunded = false;
        if let (true, Some(intent)) = (evaluation_service::is_paid(&evaluation), evaluation.payment_intent_id.as_deref()) {
            match state.payments.create_refund(intent).await {
                Ok(_) => refunded = true,
                Err(e) => tracing::error!(
                    evaluation_id = %evaluation_id,
                    error = %e,
                    "refund on denial failed; denying anyway"
                ),
            }
        }

        let denied_reason = blank_to_none(req.denied_reason);
        diesel::update(evaluations::table.find(evaluation_id))
            .set((
                evaluations::status.eq(EvaluationStatus::Denied.as_str()),
                evaluations::denied_reason.eq(&denied_reason),
                evaluations::payment_status.eq(if refunded {
                    PaymentStatus::Refunded.as_str()
                } else {
                    evaluation.payment_status.as_str()
                }),
                evaluations::platform_fee_cents.eq(if refunded { 0 } else { evaluation.platform_fee_cents }),
                evaluations::scout_payout_cents.eq(if refunded { 0 } else { evaluation.scout_payout_cents }),
                evaluations::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        if let Some(to) = player_email.as_deref() {
            let reason = denied_reason.as_deref().unwrap_or("No reason provided");
            best_effort("evaluation_denied_email", state.email.send_evaluation_denied(to, &player_name, &scout_name, reason)).await;
        }

        tracing::info!(evaluation_id = %evaluation_id, refunded, "evaluation denied");
        let message = if refunded {
            "Evaluation request denied and payment refunded"
        } else {
            "Evaluation request denied"
        };
        return Ok(Json(ApiResponse::ok_with_message(
            StatusResponse { status: EvaluationStatus::Denied.as_str(), refunded: Some(refunded) },
            message,
        )));
    }

    if evaluation.payment_status != PaymentStatus::Paid.as_str() {
        return Err(AppError::with_details(
            ErrorCode::PaymentIncomplete,
            "Payment not completed yet. Player must finish checkout before confirmation.",
            serde_json::json!({ "status": evaluation.payment_status }),
        ));
    }

    let now = Utc::now();
    diesel::update(evaluations::table.find(evaluation_id))
        .set((
            evaluations::status.eq(EvaluationStatus::Confirmed.as_str()),
            evaluations::confirmed_at.eq(Some(now)),
            evaluations::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    if let Some(to) = player_email.as_deref() {
        let price = evaluation_service::format_dollars(evaluation.price_cents);
        best_effort(
            "evaluation_confirmed_email",
            state.email.send_evaluation_confirmed(to, &player_name, &scout_name, &evaluation_id.to_string(), &price),
        )
        .await;
    }

    tracing::info!(evaluation_id = %evaluation_id, scout_id = %user.id, "evaluation confirmed");
    Ok(Json(ApiResponse::ok_with_message(
        StatusResponse { status: EvaluationStatus::Confirmed.as_str(), refunded: None },
        "Evaluation confirmed. Payment already captured and held in escrow.",
    )))
}

// --- POST /evaluation/complete ---

pub async fn complete_evaluation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompleteRequest>,
) -> AppResult<Json<ApiResponse<CompleteResponse>>> {
    let evaluation_id = required_id(req.evaluation_id)?;
    let mut conn = get_conn(&state.db)?;
    let evaluation = evaluation_service::find_evaluation(&mut conn, evaluation_id)?;

    if evaluation.scout_id != user.id {
        return Err(AppError::forbidden("Only the scout can complete this evaluation"));
    }
    if !evaluation_service::can_complete(&evaluation) {
        return Err(AppError::with_details(
            ErrorCode::EvaluationNotPending,
            format!("Evaluation is {}. Only confirmed evaluations can be completed.", evaluation.status),
            serde_json::json!({ "status": evaluation.status }),
        ));
    }
    if evaluation.payment_status != PaymentStatus::Paid.as_str() {
        return Err(AppError::new(
            ErrorCode::PaymentIncomplete,
            "Payment not completed. Cannot process payout.",
        ));
    }

    let player = profile_service::require_profile(&mut conn, evaluation.player_id)?;
    let scout = profile_service::require_profile(&mut conn, evaluation.scout_id)?;

    let mut transfer_id = evaluation.transfer_id.clone();
    match (transfer_id.is_some(), scout.stripe_account_id.as_deref()) {
        (false, Some(account)) => {
            let intent_id = evaluation
                .payment_intent_id
                .as_deref()
                .ok_or_else(|| AppError::bad_request("Payment intent not found"))?;
            let intent = state.payments.retrieve_payment_intent(intent_id).await?;
            let charge = intent
                .latest_charge
                .ok_or_else(|| AppError::bad_request("Payment charge not found"))?;

            let transfer = state
                .payments
                .create_transfer(&TransferRequest {
                    amount_cents: evaluation.scout_payout_cents,
                    destination: account,
                    source_transaction: Some(charge.as_str()),
                    metadata: vec![
                        ("evaluation_id", evaluation_id.to_string()),
                        ("scout_user_id", evaluation.scout_id.to_string()),
                        ("player_user_id", evaluation.player_id.to_string()),
                        ("platform_fee", evaluation.platform_fee_cents.to_string()),
                        ("scout_payout", evaluation.scout_payout_cents.to_string()),
                    ],
                })
                .await?;
            transfer_id = Some(transfer.id);
        }
        (false, None) => {
            tracing::warn!(scout_id = %scout.user_id, evaluation_id = %evaluation_id, "scout has no connected account; payout deferred");
        }
        (true, _) => {}
    }

    let now = Utc::now();
    diesel::update(evaluations::table.find(evaluation_id))
        .set((
            evaluations::status.eq(EvaluationStatus::Completed.as_str()),
            evaluations::completed_at.eq(Some(now)),
            evaluations::notes.eq(blank_to_none(req.notes).or(evaluation.notes.clone())),
            evaluations::transfer_id.eq(&transfer_id),
            evaluations::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let scout_name = name_or(Some(&scout), "The scout");
    if let Some(to) = player.email.as_deref() {
        best_effort(
            "evaluation_complete_email",
            state.email.send_evaluation_complete(to, player.display_name(), &scout_name, &evaluation_id.to_string()),
        )
        .await;
    }
    notification_service::notify(
        &mut conn,
        NewNotification::new(
            evaluation.player_id,
            "evaluation_completed",
            "Evaluation Completed",
            format!("{scout_name} has completed your evaluation. Check it out now!"),
        )
        .link(format!("/evaluations/{evaluation_id}"))
        .metadata(serde_json::json!({ "evaluation_id": evaluation_id, "scout_id": evaluation.scout_id })),
    );

    tracing::info!(evaluation_id = %evaluation_id, payout_processed = transfer_id.is_some(), "evaluation completed");
    Ok(Json(ApiResponse::ok(CompleteResponse {
        payout_processed: transfer_id.is_some(),
        transfer_id,
    })))
}

// --- POST /evaluation/cancel ---

pub async fn cancel_evaluation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelRequest>,
) -> AppResult<Json<ApiResponse<StatusResponse>>> {
    let evaluation_id = required_id(req.evaluation_id)?;
    let mut conn = get_conn(&state.db)?;
    let evaluation = evaluation_service::find_evaluation(&mut conn, evaluation_id)?;

    if !evaluation_service::can_cancel(&evaluation, user.id) {
        return Err(AppError::forbidden(
            "Only the requesting player or purchasing parent can cancel this evaluation.",
        ));
    }
    evaluation_service::require_status(&evaluation, EvaluationStatus::Requested)?;

    let paid_intent = evaluation
        .payment_intent_id
        .as_deref()
        .filter(|_| evaluation_service::is_paid(&evaluation));
    let refund = match paid_intent {
        Some(intent) => Some(state.payments.create_refund(intent).await.map_err(|e| {
            tracing::error!(evaluation_id = %evaluation_id, error = %e, "refund on cancel failed");
            AppError::new(ErrorCode::PaymentProviderError, "Failed to refund payment. Please contact support.")
        })?),
        None => None,
    };
    let refunded = refund.is_some();

    let now = Utc::now();
    diesel::update(evaluations::table.find(evaluation_id))
        .set((
            evaluations::status.eq(EvaluationStatus::Cancelled.as_str()),
            evaluations::cancelled_at.eq(Some(now)),
            evaluations::cancelled_reason.eq(blank_to_none(req.reason)),
            evaluations::payment_status.eq(if refunded {
                PaymentStatus::Refunded.as_str()
            } else {
                evaluation.payment_status.as_str()
            }),
            evaluations::platform_fee_cents.eq(if refunded { 0 } else { evaluation.platform_fee_cents }),
            evaluations::scout_payout_cents.eq(if refunded { 0 } else { evaluation.scout_payout_cents }),
            evaluations::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let scout = profile_service::find_profile(&mut conn, evaluation.scout_id)?;
    if let Some(to) = scout.as_ref().and_then(|s| s.email.as_deref()) {
        best_effort(
            "evaluation_cancelled_email",
            state.email.send_evaluation_cancelled(to, &evaluation_id.to_string(), refunded),
        )
        .await;
    }

    let player = profile_service::find_profile(&mut conn, evaluation.player_id)?;
    let refund_note = if refunded { " Payment has been refunded." } else { "" };
    notification_service::notify(
        &mut conn,
        NewNotification::new(
            evaluation.scout_id,
            "evaluation_cancelled",
            "Evaluation Cancelled",
            format!("{} has cancelled their evaluation request.{refund_note}", name_or(player.as_ref(), "A player")),
        )
        .link("/my-evals")
        .metadata(serde_json::json!({
            "evaluation_id": evaluation_id,
            "player_id": evaluation.player_id,
            "refunded": refunded,
        })),
    );

    if let Some(refund) = &refund {
        notification_service::notify(
            &mut conn,
            NewNotification::new(
                evaluation.player_id,
                "payment_refunded",
                "Payment Refunded",
                refund_message(refund.status.as_deref(), evaluation.price_cents),
            )
            .link(format!("/evaluations/{evaluation_id}"))
            .metadata(serde_json::json!({
                "evaluation_id": evaluation_id,
                "amount_cents": evaluation.price_cents,
                "refund_id": refund.id,
                "refund_status": refund.status,
                "refund_reason": "cancelled_by_player",
            })),
        );
    }

    tracing::info!(evaluation_id = %evaluation_id, refunded, "evaluation cancelled");
    Ok(Json(ApiResponse::ok(StatusResponse {
        status: EvaluationStatus::Cancelled.as_str(),
        refunded: Some(refunded),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_action_parsing() {
        assert_eq!(ConfirmAction::parse("confirm").unwrap(), ConfirmAction::Confirm);
        assert_eq!(ConfirmAction::parse("deny").unwrap(), ConfirmAction::Deny);
        assert!(ConfirmAction::parse("approve").is_err());
    }

    #[test]
    fn refund_message_depends_on_status() {
        assert!(refund_message(Some("succeeded"), 4_999).starts_with("Your refund of $49.99 has been processed"));
        assert!(refund_message(Some("pending"), 4_999).contains("is processing"));
        assert!(refund_message(None, 4_999).contains("contact support"));
    }

    #[test]
    fn blank_reasons_are_dropped() {
        assert_eq!(blank_to_none(Some("   ".into())), None);
        assert_eq!(blank_to_none(Some(" busy ".into())).as_deref(), Some("busy"));
    }

    #[test]
    fn create_request_reads_camel_case() {
        let scout = Uuid::new_v4();
        let req: CreateEvaluationRequest =
            serde_json::from_value(serde_json::json!({ "scoutId": scout, "price": 49.99 })).unwrap();
        assert_eq!(req.scout_id, Some(scout));
        assert_eq!(req.price, Some(49.99));
    }

    #[test]
    fn complete_response_shape() {
        let value = serde_json::to_value(CompleteResponse { transfer_id: None, payout_processed: false }).unwrap();
        assert_eq!(value, serde_json::json!({ "transferId": null, "payoutProcessed": false }));
    }
}
