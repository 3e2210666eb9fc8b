use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use got1_shared::errors::{AppError, AppResult, ErrorCode};
use got1_shared::types::auth::ProfileRole;

use crate::models::Profile;
use crate::schema::profiles;

pub fn find_profile(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Option<Profile>> {
    let profile = profiles::table
        .filter(profiles::user_id.eq(user_id))
        .first::<Profile>(conn)
        .optional()?;
    Ok(profile)
}

pub fn require_profile(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Profile> {
    find_profile(conn, user_id)?
        .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "Profile not found"))
}

pub fn role_of(profile: &Profile) -> Option<ProfileRole> {
    profile.role.parse().ok()
}

/// Load the caller's profile and check its stored role. Roles come from the
/// profile row, never from token claims.
pub fn require_role(conn: &mut PgConnection, user_id: Uuid, role: ProfileRole) -> AppResult<Profile> {
    let profile = require_profile(conn, user_id)?;
    if role_of(&profile) != Some(role) {
        tracing::debug!(user_id = %user_id, required = %role, actual = %profile.role, "role check failed");
        return Err(AppError::forbidden(format!("Only {role}s can perform this action")));
    }
    Ok(profile)
}

pub fn is_suspended(profile: &Profile, now: DateTime<Utc>) -> bool {
    profile.suspended_until.map(|until| until > now).unwrap_or(false)
}

#[cfg(test)]
pub(crate) fn test_profile(role: &str) -> Profile {
    let now = Utc::now();
    Profile {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        email: Some("coach@example.com".into()),
        username: Some("coach_k".into()),
        full_name: None,
        role: role.into(),
        organization: None,
        position: None,
        work_history: None,
        additional_info: None,
        price_per_eval_cents: Some(4_999),
        stripe_account_id: None,
        high_school_id: None,
        school: None,
        suspended_until: None,
        suspended_reason: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn unknown_role_text_has_no_role() {
        assert_eq!(role_of(&test_profile("scout")), Some(ProfileRole::Scout));
        assert_eq!(role_of(&test_profile("superuser")), None);
    }

    #[test]
    fn suspension_expires() {
        let now = Utc::now();
        let mut profile = test_profile("scout");
        assert!(!is_suspended(&profile, now));

        profile.suspended_until = Some(now + Duration::days(3));
        assert!(is_suspended(&profile, now));
        assert!(!is_suspended(&profile, now + Duration::days(4)));
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let profile = test_profile("scout");
        assert_eq!(profile.display_name(), "coach_k");
    }
}
