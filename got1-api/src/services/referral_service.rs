//! School referral bonuses and the user referral program.
//!
//! A school's bonus is fixed when the referral is tracked: the tier table is
//! looked up with the number of referrals that school already has, so later
//! referrals can earn more than earlier ones. Totals are always recomputed
//! from the rows.

use std::str::FromStr;

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use got1_shared::clients::payments::{PaymentsClient, TransferRequest};
use got1_shared::errors::{AppError, AppResult, ErrorCode};
use got1_shared::types::auth::ProfileRole;

use crate::models::{NewSchoolReferral, ReferralApplication, SchoolReferral};
use crate::schema::{high_schools, referral_program_applications, school_referrals};

pub const BONUS_PENDING: &str = "pending";
pub const BONUS_PAID: &str = "paid";

/// `referral_program_applications.status` and `referrals.status` values.
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPROVED: &str = "approved";
pub const STATUS_DENIED: &str = "denied";

/// Credit for a referred scout, in cents.
pub const SCOUT_REFERRAL_CENTS: i64 = 500;
/// Credit for a referred player, in cents.
pub const PLAYER_REFERRAL_CENTS: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BonusTier {
    pub min_referrals: i64,
    pub amount_cents: i64,
}

/// Ascending by `min_referrals`; the first tier always starts at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BonusTiers {
    tiers: Vec<BonusTier>,
}

impl BonusTiers {
    pub fn new(mut tiers: Vec<BonusTier>) -> Result<Self, String> {
        if tiers.is_empty() {
            return Err("bonus tier table is empty".into());
        }
        tiers.sort_by_key(|t| t.min_referrals);
        if tiers[0].min_referrals != 0 {
            return Err("first bonus tier must start at 0 referrals".into());
        }
        if tiers.windows(2).any(|w| w[0].min_referrals == w[1].min_referrals) {
            return Err("bonus tier thresholds must be distinct".into());
        }
        if tiers.iter().any(|t| t.amount_cents < 0) {
            return Err("bonus tier amounts must not be negative".into());
        }
        Ok(Self { tiers })
    }

    /// Bonus for the next referral of a school that already has `existing`.
    pub fn amount_for(&self, existing: i64) -> i64 {
        self.tiers
            .iter()
            .rev()
            .find(|t| existing >= t.min_referrals)
            .map(|t| t.amount_cents)
            .unwrap_or(0)
    }
}

impl FromStr for BonusTiers {
    type Err = String;

    /// `min:cents` pairs separated by commas, e.g. `0:5000,5:7500`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let tiers = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|pair| {
                let (min, amount) = pair
                    .split_once(':')
                    .ok_or_else(|| format!("bonus tier `{pair}` is not min:cents"))?;
                Ok(BonusTier {
                    min_referrals: min.trim().parse().map_err(|_| format!("bad threshold in `{pair}`"))?,
                    amount_cents: amount.trim().parse().map_err(|_| format!("bad amount in `{pair}`"))?,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Self::new(tiers)
    }
}

impl Default for BonusTiers {
    fn default() -> Self {
        Self {
            tiers: vec![
                BonusTier { min_referrals: 0, amount_cents: 5_000 },
                BonusTier { min_referrals: 5, amount_cents: 7_500 },
                BonusTier { min_referrals: 10, amount_cents: 10_000 },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferralBonus {
    pub total: i64,
    pub pending: i64,
    pub paid: i64,
    pub total_referred: i64,
}

pub fn summarize(rows: &[SchoolReferral]) -> ReferralBonus {
    rows.iter().fold(ReferralBonus::default(), |mut acc, r| {
        acc.total += r.bonus_amount_cents;
        acc.total_referred += 1;
        match r.bonus_status.as_str() {
            BONUS_PENDING => acc.pending += r.bonus_amount_cents,
            BONUS_PAID => acc.paid += r.bonus_amount_cents,
            _ => {}
        }
        acc
    })
}

pub fn list_referrals(conn: &mut PgConnection, school_id: Uuid) -> AppResult<Vec<SchoolReferral>> {
    let rows = school_referrals::table
        .filter(school_referrals::referring_school_id.eq(school_id))
        .order(school_referrals::created_at.desc())
        .load::<SchoolReferral>(conn)?;
    Ok(rows)
}

pub fn calculate_referral_bonus(conn: &mut PgConnection, school_id: Uuid) -> AppResult<ReferralBonus> {
    Ok(summarize(&list_referrals(conn, school_id)?))
}

/// Record that `referring` brought in `referred`. Returns the existing row
/// when the pair was already tracked.
pub fn track_referral(
    conn: &mut PgConnection,
    tiers: &BonusTiers,
    program_open: bool,
    referring: Uuid,
    referred: Uuid,
) -> AppResult<SchoolReferral> {
    if !program_open {
        return Err(AppError::new(ErrorCode::ReferralProgramClosed, "Referral feature is no longer active"));
    }
    if referring == referred {
        return Err(AppError::new(ErrorCode::CannotReferSelf, "A school cannot refer itself"));
    }

    let existing = school_referrals::table
        .filter(school_referrals::referring_school_id.eq(referring))
        .filter(school_referrals::referred_school_id.eq(referred))
        .first::<SchoolReferral>(conn)
        .optional()?;
    if let Some(row) = existing {
        return Ok(row);
    }

    let already: i64 = school_referrals::table
        .filter(school_referrals::referring_school_id.eq(referring))
        .count()
        .get_result(conn)?;

    let row = diesel::insert_into(school_referrals::table)
        .values(&NewSchoolReferral {
            referring_school_id: referring,
            referred_school_id: referred,
            bonus_amount_cents: tiers.amount_for(already),
            bonus_status: BONUS_PENDING.into(),
        })
        .get_result::<SchoolReferral>(conn)?;

    tracing::info!(
        referral_id = %row.id,
        referring_school_id = %referring,
        referred_school_id = %referred,
        bonus_amount_cents = row.bonus_amount_cents,
        "school referral tracked"
    );
    Ok(row)
}

/// Transfer a tracked bonus to the referring school's connected account.
/// An already paid row returns its transfer id without a second transfer.
pub async fn pay_referral_bonus(
    conn: &mut PgConnection,
    payments: &PaymentsClient,
    referral_id: Uuid,
) -> AppResult<Option<String>> {
    let referral = school_referrals::table
        .find(referral_id)
        .first::<SchoolReferral>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ReferralNotFound, "Referral not found"))?;

    if referral.bonus_status == BONUS_PAID {
        return Ok(referral.stripe_transfer_id);
    }

    let account: Option<String> = high_schools::table
        .find(referral.referring_school_id)
        .select(high_schools::stripe_account_id)
        .first::<Option<String>>(conn)
        .optional()?
        .flatten();
    let Some(account) = account else {
        return Err(AppError::bad_request("School does not have Stripe account set up"));
    };

    let transfer = payments
        .create_transfer(&TransferRequest {
            amount_cents: referral.bonus_amount_cents,
            destination: &account,
            source_transaction: None,
            metadata: vec![
                ("referral_id", referral_id.to_string()),
                ("type", "referral_bonus".to_string()),
            ],
        })
        .await?;

    diesel::update(school_referrals::table.find(referral_id))
        .set((
            school_referrals::bonus_status.eq(BONUS_PAID),
            school_referrals::bonus_paid_at.eq(Some(Utc::now())),
            school_referrals::stripe_transfer_id.eq(Some(transfer.id.as_str())),
        ))
        .execute(conn)?;

    tracing::info!(referral_id = %referral_id, transfer_id = %transfer.id, "referral bonus paid");
    Ok(Some(transfer.id))
}

pub fn find_program_application(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Option<ReferralApplication>> {
    let application = referral_program_applications::table
        .filter(referral_program_applications::user_id.eq(user_id))
        .order(referral_program_applications::created_at.desc())
        .first::<ReferralApplication>(conn)
        .optional()?;
    Ok(application)
}

pub fn is_approved_referrer(conn: &mut PgConnection, user_id: Uuid) -> AppResult<bool> {
    let count: i64 = referral_program_applications::table
        .filter(referral_program_applications::user_id.eq(user_id))
        .filter(referral_program_applications::status.eq(STATUS_APPROVED))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Pending referral row for a school that was referred by `referring`.
pub fn pending_referral_for(
    conn: &mut PgConnection,
    referring: Uuid,
    referred: Uuid,
) -> AppResult<Option<SchoolReferral>> {
    let row = school_referrals::table
        .filter(school_referrals::referring_school_id.eq(referring))
        .filter(school_referrals::referred_school_id.eq(referred))
        .filter(school_referrals::bonus_status.eq(BONUS_PENDING))
        .first::<SchoolReferral>(conn)
        .optional()?;
    Ok(row)
}

/// Credit earned by the referrer of a user with the given role.
pub fn user_referral_amount(referred_role: ProfileRole) -> Option<i64> {
    match referred_role {
        ProfileRole::Scout => Some(SCOUT_REFERRAL_CENTS),
        ProfileRole::Player => Some(PLAYER_REFERRAL_CENTS),
        ProfileRole::User | ProfileRole::Parent => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn referral(amount: i64, status: &str) -> SchoolReferral {
        SchoolReferral {
            id: Uuid::new_v4(),
            referring_school_id: Uuid::new_v4(),
            referred_school_id: Uuid::new_v4(),
            bonus_amount_cents: amount,
            bonus_status: status.into(),
            stripe_transfer_id: None,
            bonus_paid_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tiers_pick_highest_reached_threshold() {
        let tiers = BonusTiers::default();
        assert_eq!(tiers.amount_for(0), 5_000);
        assert_eq!(tiers.amount_for(4), 5_000);
        assert_eq!(tiers.amount_for(5), 7_500);
        assert_eq!(tiers.amount_for(9), 7_500);
        assert_eq!(tiers.amount_for(10), 10_000);
        assert_eq!(tiers.amount_for(250), 10_000);
    }

    #[test]
    fn tiers_parse_out_of_order() {
        let tiers: BonusTiers = "3:2000, 0:1000".parse().unwrap();
        assert_eq!(tiers.amount_for(2), 1_000);
        assert_eq!(tiers.amount_for(3), 2_000);
    }

    #[test]
    fn tiers_reject_bad_tables() {
        assert!("".parse::<BonusTiers>().is_err());
        assert!("1:1000".parse::<BonusTiers>().is_err());
        assert!("0:1000,0:2000".parse::<BonusTiers>().is_err());
        assert!("0:abc".parse::<BonusTiers>().is_err());
        assert!("0=1000".parse::<BonusTiers>().is_err());
        assert!("0:-5".parse::<BonusTiers>().is_err());
    }

    #[test]
    fn summary_splits_by_status() {
        let rows = vec![
            referral(5_000, "pending"),
            referral(7_500, "paid"),
            referral(5_000, "paid"),
            referral(10_000, "denied"),
        ];
        assert_eq!(
            summarize(&rows),
            ReferralBonus { total: 27_500, pending: 5_000, paid: 12_500, total_referred: 4 }
        );
    }

    #[test]
    fn summary_of_nothing_is_zero() {
        assert_eq!(summarize(&[]), ReferralBonus::default());
    }

    #[test]
    fn user_referral_amounts() {
        assert_eq!(user_referral_amount(ProfileRole::Scout), Some(500));
        assert_eq!(user_referral_amount(ProfileRole::Player), Some(200));
        assert_eq!(user_referral_amount(ProfileRole::Parent), None);
    }
}
