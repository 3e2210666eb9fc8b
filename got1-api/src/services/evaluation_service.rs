use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use got1_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::Evaluation;
use crate::schema::evaluations;

/// Platform share of every evaluation, in basis points.
pub const PLATFORM_FEE_BPS: i64 = 1_000;

/// Scouts may charge at most $10,000.
pub const MAX_PRICE_CENTS: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationStatus {
    Requested,
    Confirmed,
    InProgress,
    Completed,
    Denied,
    Cancelled,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses that block a second request for the same scout and player.
    pub fn active() -> [&'static str; 3] {
        [Self::Requested.as_str(), Self::Confirmed.as_str(), Self::InProgress.as_str()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub platform_fee_cents: i64,
    pub scout_payout_cents: i64,
}

/// Fee rounds half up to the cent; the payout takes the remainder so the two
/// always sum to the price.
pub fn split_fee(price_cents: i64) -> FeeSplit {
    let platform_fee_cents = (price_cents * PLATFORM_FEE_BPS + 5_000) / 10_000;
    FeeSplit {
        platform_fee_cents,
        scout_payout_cents: price_cents - platform_fee_cents,
    }
}

pub fn validate_scout_price(price_cents: Option<i64>) -> AppResult<i64> {
    match price_cents {
        Some(cents) if cents > 0 && cents <= MAX_PRICE_CENTS => Ok(cents),
        _ => Err(AppError::new(
            ErrorCode::InvalidPrice,
            "Scout has not configured a valid evaluation price",
        )),
    }
}

pub fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}

/// The price shown to the client may drift by at most one cent.
pub fn price_matches(client_dollars: f64, price_cents: i64) -> bool {
    client_dollars.is_finite() && (dollars_to_cents(client_dollars) - price_cents).abs() <= 1
}

pub fn format_dollars(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

pub fn find_evaluation(conn: &mut PgConnection, evaluation_id: Uuid) -> AppResult<Evaluation> {
    evaluations::table
        .find(evaluation_id)
        .first::<Evaluation>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::EvaluationNotFound, "Evaluation not found"))
}

pub fn find_active(conn: &mut PgConnection, scout_id: Uuid, player_id: Uuid) -> AppResult<Option<Evaluation>> {
    let existing = evaluations::table
        .filter(evaluations::scout_id.eq(scout_id))
        .filter(evaluations::player_id.eq(player_id))
        .filter(evaluations::status.eq_any(EvaluationStatus::active()))
        .first::<Evaluation>(conn)
        .optional()?;
    Ok(existing)
}

pub fn find_by_payment_intent(conn: &mut PgConnection, payment_intent_id: &str) -> AppResult<Option<Evaluation>> {
    let existing = evaluations::table
        .filter(evaluations::payment_intent_id.eq(payment_intent_id))
        .first::<Evaluation>(conn)
        .optional()?;
    Ok(existing)
}

pub fn require_status(evaluation: &Evaluation, status: EvaluationStatus) -> AppResult<()> {
    if evaluation.status != status.as_str() {
        return Err(AppError::with_details(
            ErrorCode::EvaluationNotPending,
            format!("Evaluation is not in {} status", status.as_str()),
            serde_json::json!({ "status": evaluation.status }),
        ));
    }
    Ok(())
}

pub fn is_paid(evaluation: &Evaluation) -> bool {
    evaluation.payment_status == PaymentStatus::Paid.as_str() && evaluation.payment_intent_id.is_some()
}

pub const PURCHASER_PARENT: &str = "parent";

/// The player or the parent who bought it.
pub fn can_cancel(evaluation: &Evaluation, user_id: Uuid) -> bool {
    evaluation.player_id == user_id
        || (evaluation.purchased_by == Some(user_id)
            && evaluation.purchased_by_type.as_deref() == Some(PURCHASER_PARENT))
}

/// Statuses a scout can deliver from.
pub fn can_complete(evaluation: &Evaluation) -> bool {
    evaluation.status == EvaluationStatus::Confirmed.as_str()
        || evaluation.status == EvaluationStatus::InProgress.as_str()
}

#[cfg(test)]
pub(crate) fn test_evaluation(status: EvaluationStatus, payment: PaymentStatus) -> Evaluation {
    let now = chrono::Utc::now();
    let split = split_fee(5_000);
    Evaluation {
        id: Uuid::new_v4(),
        scout_id: Uuid::new_v4(),
        player_id: Uuid::new_v4(),
        status: status.as_str().into(),
        price_cents: 5_000,
        platform_fee_cents: split.platform_fee_cents,
        scout_payout_cents: split.scout_payout_cents,
        payment_status: payment.as_str().into(),
        payment_intent_id: Some("pi_123".into()),
        transfer_id: None,
        purchased_by: None,
        purchased_by_type: None,
        notes: None,
        denied_reason: None,
        cancelled_reason: None,
        confirmed_at: None,
        completed_at: None,
        cancelled_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_split_is_ten_percent() {
        assert_eq!(split_fee(5_000), FeeSplit { platform_fee_cents: 500, scout_payout_cents: 4_500 });
    }

    #[test]
    fn fee_split_rounds_and_sums_to_price() {
        let split = split_fee(4_999);
        assert_eq!(split.platform_fee_cents, 500);
        assert_eq!(split.scout_payout_cents, 4_499);

        for price in [1, 15, 333, 99_999, MAX_PRICE_CENTS] {
            let s = split_fee(price);
            assert_eq!(s.platform_fee_cents + s.scout_payout_cents, price);
        }
    }

    #[test]
    fn price_bounds() {
        assert!(validate_scout_price(None).is_err());
        assert!(validate_scout_price(Some(0)).is_err());
        assert!(validate_scout_price(Some(MAX_PRICE_CENTS + 1)).is_err());
        assert_eq!(validate_scout_price(Some(MAX_PRICE_CENTS)).unwrap(), MAX_PRICE_CENTS);
    }

    #[test]
    fn client_price_tolerates_one_cent() {
        assert!(price_matches(49.99, 4_999));
        assert!(price_matches(50.00, 4_999));
        assert!(!price_matches(50.01, 4_999));
        assert!(!price_matches(f64::NAN, 4_999));
    }

    #[test]
    fn dollars_format() {
        assert_eq!(format_dollars(4_999), "$49.99");
        assert_eq!(format_dollars(500), "$5.00");
    }

    #[test]
    fn parent_purchaser_can_cancel() {
        let mut eval = test_evaluation(EvaluationStatus::Requested, PaymentStatus::Paid);
        let parent = Uuid::new_v4();
        assert!(can_cancel(&eval, eval.player_id));
        assert!(!can_cancel(&eval, parent));

        eval.purchased_by = Some(parent);
        assert!(!can_cancel(&eval, parent));

        eval.purchased_by_type = Some(PURCHASER_PARENT.into());
        assert!(can_cancel(&eval, parent));
    }

    #[test]
    fn only_confirmed_work_can_be_completed() {
        assert!(can_complete(&test_evaluation(EvaluationStatus::Confirmed, PaymentStatus::Paid)));
        assert!(can_complete(&test_evaluation(EvaluationStatus::InProgress, PaymentStatus::Paid)));
        assert!(!can_complete(&test_evaluation(EvaluationStatus::Requested, PaymentStatus::Paid)));
        assert!(!can_complete(&test_evaluation(EvaluationStatus::Completed, PaymentStatus::Paid)));
    }

    #[test]
    fn status_guard_reports_current_status() {
        let eval = test_evaluation(EvaluationStatus::Confirmed, PaymentStatus::Paid);
        assert!(require_status(&eval, EvaluationStatus::Requested).is_err());
        assert!(require_status(&eval, EvaluationStatus::Confirmed).is_ok());
        assert!(is_paid(&eval));
    }
}
