use std::collections::HashSet;

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use got1_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{HighSchool, RosterPlayer};
use crate::schema::{high_school_players, profiles};

pub const PLAYER_POSITIONS: [&str; 19] = [
    "Coach", "QB", "RB", "FB", "TE", "OT", "OG", "C", "WR", "CB", "S", "LB", "DE", "DT", "NT",
    "K", "P", "KR", "PR",
];

pub const MAX_POSITIONS: usize = 2;

pub const REQUEST_PENDING: &str = "pending";
pub const REQUEST_ACCEPTED: &str = "accepted";
pub const REQUEST_DENIED: &str = "denied";

const INVITE_TOKEN_LEN: usize = 32;

pub fn validate_positions(positions: &[String]) -> AppResult<()> {
    let invalid = |msg: String| AppError::new(ErrorCode::InvalidPositions, msg);

    if positions.is_empty() {
        return Err(invalid("At least one position is required".into()));
    }
    if positions.len() > MAX_POSITIONS {
        return Err(invalid(format!("Maximum {MAX_POSITIONS} positions allowed")));
    }
    if let Some(bad) = positions.iter().find(|p| !PLAYER_POSITIONS.contains(&p.as_str())) {
        return Err(invalid(format!("Invalid position: {bad}")));
    }
    let distinct: HashSet<&String> = positions.iter().collect();
    if distinct.len() != positions.len() {
        return Err(invalid("Duplicate positions are not allowed".into()));
    }
    Ok(())
}

pub fn generate_invite_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INVITE_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// A roster row linked to a user who has not yet answered is still pending;
/// one that was accepted or has a join date is on the roster.
pub fn check_existing_request(existing: Option<&RosterPlayer>) -> AppResult<()> {
    match existing {
        Some(row) if row.request_status.as_deref() == Some(REQUEST_PENDING) => Err(AppError::new(
            ErrorCode::RosterRequestPending,
            "A request is already pending for this player",
        )),
        Some(row) if row.request_status.as_deref() == Some(REQUEST_ACCEPTED) || row.joined_at.is_some() => {
            Err(AppError::new(ErrorCode::AlreadyOnRoster, "This player is already on the roster"))
        }
        _ => Ok(()),
    }
}

pub fn find_school_player(conn: &mut PgConnection, school_id: Uuid, user_id: Uuid) -> AppResult<Option<RosterPlayer>> {
    let row = high_school_players::table
        .filter(high_school_players::high_school_id.eq(school_id))
        .filter(high_school_players::user_id.eq(user_id))
        .first::<RosterPlayer>(conn)
        .optional()?;
    Ok(row)
}

/// The caller's joined, unreleased roster entry.
pub fn active_roster_entry(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Option<RosterPlayer>> {
    let row = high_school_players::table
        .filter(high_school_players::user_id.eq(user_id))
        .filter(high_school_players::joined_at.is_not_null())
        .filter(high_school_players::released_at.is_null())
        .first::<RosterPlayer>(conn)
        .optional()?;
    Ok(row)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Pending email invite: the row was removed.
    InviteDeleted,
    /// Linked player: marked released and unlinked from the profile.
    Released,
}

pub fn find_roster_row(conn: &mut PgConnection, school_id: Uuid, player_id: Uuid) -> AppResult<RosterPlayer> {
    high_school_players::table
        .filter(high_school_players::id.eq(player_id))
        .filter(high_school_players::high_school_id.eq(school_id))
        .first::<RosterPlayer>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::RosterPlayerNotFound, "Player not found"))
}

pub fn release_player(conn: &mut PgConnection, school_id: Uuid, player_id: Uuid) -> AppResult<ReleaseOutcome> {
    let player = find_roster_row(conn, school_id, player_id)?;

    let Some(user_id) = player.user_id else {
        diesel::delete(
            high_school_players::table
                .filter(high_school_players::id.eq(player_id))
                .filter(high_school_players::high_school_id.eq(school_id)),
        )
        .execute(conn)?;
        return Ok(ReleaseOutcome::InviteDeleted);
    };

    diesel::update(high_school_players::table.find(player_id))
        .set((
            high_school_players::released_at.eq(Some(Utc::now())),
            high_school_players::release_requested_at.eq(None::<chrono::DateTime<Utc>>),
        ))
        .execute(conn)?;

    if let Err(e) = diesel::update(
        profiles::table
            .filter(profiles::user_id.eq(user_id))
            .filter(profiles::high_school_id.eq(school_id)),
    )
    .set(profiles::high_school_id.eq(None::<Uuid>))
    .execute(conn)
    {
        tracing::warn!(user_id = %user_id, error = %e, "failed to unlink released player profile");
    }

    Ok(ReleaseOutcome::Released)
}

/// Accepting a roster request: join the roster and point the profile at the school.
pub fn link_player(conn: &mut PgConnection, player: &RosterPlayer, user_id: Uuid, school: &HighSchool) -> AppResult<()> {
    diesel::update(high_school_players::table.find(player.id))
        .set((
            high_school_players::request_status.eq(Some(REQUEST_ACCEPTED)),
            high_school_players::joined_at.eq(Some(Utc::now())),
        ))
        .execute(conn)?;

    link_profile(conn, user_id, school);
    Ok(())
}

fn link_profile(conn: &mut PgConnection, user_id: Uuid, school: &HighSchool) {
    if let Err(e) = diesel::update(profiles::table.filter(profiles::user_id.eq(user_id)))
        .set((
            profiles::high_school_id.eq(Some(school.id)),
            profiles::school.eq(Some(school.name.as_str())),
        ))
        .execute(conn)
    {
        tracing::warn!(user_id = %user_id, school_id = %school.id, error = %e, "failed to link profile to school");
    }
}

fn invalid_invite() -> AppError {
    AppError::new(ErrorCode::InvalidInviteToken, "Invalid or expired invite token")
}

/// An email invite nobody has claimed yet.
pub fn find_open_invite(conn: &mut PgConnection, token: &str) -> AppResult<RosterPlayer> {
    if token.is_empty() {
        return Err(invalid_invite());
    }
    high_school_players::table
        .filter(high_school_players::invite_token.eq(token))
        .filter(high_school_players::user_id.is_null())
        .first::<RosterPlayer>(conn)
        .optional()?
        .ok_or_else(invalid_invite)
}

/// Claim an email invite: the row is linked to `user_id`, joined, and its
/// token cleared so the link cannot be reused. The account email replaces the
/// invited address when known.
pub fn accept_invite(
    conn: &mut PgConnection,
    invite: &RosterPlayer,
    user_id: Uuid,
    account_email: Option<&str>,
    school: &HighSchool,
) -> AppResult<RosterPlayer> {
    let email = account_email.map(str::to_lowercase).or_else(|| invite.email.clone());

    let player = diesel::update(
        high_school_players::table
            .filter(high_school_players::id.eq(invite.id))
            .filter(high_school_players::user_id.is_null()),
    )
    .set((
        high_school_players::user_id.eq(Some(user_id)),
        high_school_players::email.eq(email),
        high_school_players::request_status.eq(Some(REQUEST_ACCEPTED)),
        high_school_players::invite_token.eq(None::<String>),
        high_school_players::joined_at.eq(Some(Utc::now())),
    ))
    .get_result::<RosterPlayer>(conn)
    .optional()?
    // Claimed by someone else between lookup and update.
    .ok_or_else(invalid_invite)?;

    link_profile(conn, user_id, school);
    Ok(player)
}

/// Only rows nobody has joined through and that are still pending (or plain
/// email invites) can be withdrawn.
pub fn check_cancellable(player: &RosterPlayer) -> AppResult<()> {
    if player.joined_at.is_some() {
        return Err(AppError::new(ErrorCode::RosterInviteClosed, "Cannot cancel - player has already joined"));
    }
    match player.request_status.as_deref() {
        None | Some(REQUEST_PENDING) => Ok(()),
        Some(_) => Err(AppError::new(ErrorCode::RosterInviteClosed, "Can only cancel pending requests")),
    }
}

/// Address to resend an email invite to.
pub fn resend_address(player: &RosterPlayer) -> AppResult<&str> {
    if player.user_id.is_some() {
        return Err(AppError::new(
            ErrorCode::RosterInviteClosed,
            "Cannot resend invite for a player who has already joined",
        ));
    }
    player
        .email
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("This invite has no email address"))
}

/// Reuse the outstanding token or mint a new one.
pub fn ensure_invite_token(conn: &mut PgConnection, player: &RosterPlayer) -> AppResult<String> {
    if let Some(token) = player.invite_token.as_deref().filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }
    let token = generate_invite_token();
    diesel::update(high_school_players::table.find(player.id))
        .set(high_school_players::invite_token.eq(Some(token.as_str())))
        .execute(conn)?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn code_of(result: AppResult<()>) -> Option<ErrorCode> {
        match result {
            Err(AppError::Known { code, .. }) => Some(code),
            _ => None,
        }
    }

    #[test]
    fn accepts_one_or_two_known_positions() {
        assert!(validate_positions(&positions(&["QB"])).is_ok());
        assert!(validate_positions(&positions(&["Coach", "KR"])).is_ok());
    }

    #[test]
    fn rejects_bad_position_lists() {
        assert_eq!(code_of(validate_positions(&[])), Some(ErrorCode::InvalidPositions));
        assert!(validate_positions(&positions(&["QB", "RB", "WR"])).is_err());
        assert!(validate_positions(&positions(&["QB", "Quarterback"])).is_err());
        assert!(validate_positions(&positions(&["qb"])).is_err());
        assert!(validate_positions(&positions(&["LB", "LB"])).is_err());
    }

    #[test]
    fn invite_tokens_are_random_alphanumerics() {
        let a = generate_invite_token();
        let b = generate_invite_token();
        assert_eq!(a.len(), INVITE_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    fn roster_row(status: Option<&str>, joined: bool) -> RosterPlayer {
        let now = Utc::now();
        RosterPlayer {
            id: Uuid::new_v4(),
            high_school_id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            name: "Sam".into(),
            positions: vec!["QB".into()],
            email: None,
            username: None,
            request_status: status.map(String::from),
            invite_token: None,
            added_by: Uuid::new_v4(),
            joined_at: joined.then_some(now),
            release_requested_at: None,
            released_at: None,
            created_at: now,
        }
    }

    fn email_invite() -> RosterPlayer {
        RosterPlayer {
            user_id: None,
            email: Some("jordan@example.com".into()),
            invite_token: Some(generate_invite_token()),
            ..roster_row(None, false)
        }
    }

    #[test]
    fn pending_rows_can_be_cancelled() {
        assert!(check_cancellable(&email_invite()).is_ok());
        assert!(check_cancellable(&roster_row(Some("pending"), false)).is_ok());
    }

    #[test]
    fn joined_or_answered_rows_cannot_be_cancelled() {
        assert_eq!(
            code_of(check_cancellable(&roster_row(Some("accepted"), true))),
            Some(ErrorCode::RosterInviteClosed)
        );
        assert_eq!(
            code_of(check_cancellable(&roster_row(Some("denied"), false))),
            Some(ErrorCode::RosterInviteClosed)
        );
        assert!(check_cancellable(&roster_row(None, true)).is_err());
    }

    #[test]
    fn resend_goes_to_the_invited_address() {
        let invite = email_invite();
        assert_eq!(resend_address(&invite).unwrap(), "jordan@example.com");

        let joined = roster_row(Some("accepted"), true);
        assert!(matches!(
            resend_address(&joined),
            Err(AppError::Known { code: ErrorCode::RosterInviteClosed, .. })
        ));

        let no_email = RosterPlayer { email: Some("  ".into()), ..email_invite() };
        assert!(resend_address(&no_email).is_err());
    }

    #[test]
    fn existing_request_states() {
        assert!(check_existing_request(None).is_ok());
        assert_eq!(
            code_of(check_existing_request(Some(&roster_row(Some("pending"), false)))),
            Some(ErrorCode::RosterRequestPending)
        );
        assert_eq!(
            code_of(check_existing_request(Some(&roster_row(None, true)))),
            Some(ErrorCode::AlreadyOnRoster)
        );
        assert!(check_existing_request(Some(&roster_row(Some("denied"), false))).is_ok());
    }
}
