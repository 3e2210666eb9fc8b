use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use got1_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::HighSchool;
use crate::schema::{high_school_admins, high_schools};

pub fn is_high_school_admin(conn: &mut PgConnection, user_id: Uuid, school_id: Uuid) -> AppResult<bool> {
    let count: i64 = high_school_admins::table
        .filter(high_school_admins::high_school_id.eq(school_id))
        .filter(high_school_admins::user_id.eq(user_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub fn require_school_admin(conn: &mut PgConnection, user_id: Uuid, school_id: Uuid) -> AppResult<()> {
    if !is_high_school_admin(conn, user_id, school_id)? {
        tracing::debug!(user_id = %user_id, school_id = %school_id, "school admin check failed");
        return Err(AppError::new(ErrorCode::NotSchoolAdmin, "Forbidden"));
    }
    Ok(())
}

pub fn find_school(conn: &mut PgConnection, school_id: Uuid) -> AppResult<HighSchool> {
    high_schools::table
        .find(school_id)
        .first::<HighSchool>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::SchoolNotFound, "School not found"))
}

pub fn admin_ids(conn: &mut PgConnection, school_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = high_school_admins::table
        .filter(high_school_admins::high_school_id.eq(school_id))
        .select(high_school_admins::user_id)
        .load::<Uuid>(conn)?;
    Ok(ids)
}

/// Lowercase letters, digits, `-` and `_` only.
pub fn normalize_username(raw: &str) -> AppResult<String> {
    let username = raw.trim().to_lowercase();
    let valid = !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(AppError::Validation(
            "Username can only contain lowercase letters, numbers, hyphens, and underscores".into(),
        ));
    }
    Ok(username)
}

pub fn username_available(conn: &mut PgConnection, username: &str) -> AppResult<bool> {
    let count: i64 = high_schools::table
        .filter(high_schools::username.eq(username))
        .count()
        .get_result(conn)?;
    Ok(count == 0)
}

/// Path segment used in school links: the username when known.
pub fn school_link(school: Option<&HighSchool>, school_id: Uuid, suffix: &str) -> String {
    match school {
        Some(s) => format!("/high-school/{}/{suffix}", s.username),
        None => format!("/high-school/{school_id}/{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_is_lowercased_and_trimmed() {
        assert_eq!(normalize_username("  Lincoln-HS_1 ").unwrap(), "lincoln-hs_1");
    }

    #[test]
    fn username_rejects_other_characters() {
        assert!(normalize_username("lincoln hs").is_err());
        assert!(normalize_username("lincoln.hs").is_err());
        assert!(normalize_username("   ").is_err());
    }

    #[test]
    fn link_prefers_username() {
        let id = Uuid::new_v4();
        assert_eq!(school_link(None, id, "roster"), format!("/high-school/{id}/roster"));
    }
}
