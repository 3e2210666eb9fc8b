use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use got1_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewNotification, Notification};
use crate::schema::{high_school_admins, notifications};

impl NewNotification {
    pub fn new(user_id: Uuid, kind: &str, title: &str, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind: kind.to_string(),
            title: title.to_string(),
            message: message.into(),
            link: None,
            metadata: None,
        }
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

pub fn create_notification(conn: &mut PgConnection, new: &NewNotification) -> AppResult<Notification> {
    let notification = diesel::insert_into(notifications::table)
        .values(new)
        .get_result::<Notification>(conn)?;

    tracing::debug!(
        notification_id = %notification.id,
        user_id = %new.user_id,
        kind = %new.kind,
        "notification created"
    );

    Ok(notification)
}

/// Best-effort insert: a failure is logged and swallowed so it never fails
/// the request that triggered it.
pub fn notify(conn: &mut PgConnection, new: NewNotification) {
    if let Err(e) = create_notification(conn, &new) {
        tracing::warn!(user_id = %new.user_id, kind = %new.kind, error = %e, "failed to create notification");
    }
}

/// Notify every admin of a school, optionally skipping the acting admin.
pub fn notify_school_admins(
    conn: &mut PgConnection,
    school_id: Uuid,
    except: Option<Uuid>,
    build: impl Fn(Uuid) -> NewNotification,
) {
    let admins = high_school_admins::table
        .filter(high_school_admins::high_school_id.eq(school_id))
        .select(high_school_admins::user_id)
        .load::<Uuid>(conn);

    match admins {
        Ok(ids) => {
            for admin_id in ids.into_iter().filter(|id| Some(*id) != except) {
                notify(conn, build(admin_id));
            }
        }
        Err(e) => tracing::warn!(school_id = %school_id, error = %e, "failed to load school admins for notification"),
    }
}

pub fn list_notifications(
    conn: &mut PgConnection,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> AppResult<(Vec<Notification>, i64)> {
    let total: i64 = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .count()
        .get_result(conn)?;

    let items = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .order(notifications::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load::<Notification>(conn)?;

    Ok((items, total))
}

pub fn count_unread(conn: &mut PgConnection, user_id: Uuid) -> AppResult<i64> {
    let count: i64 = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .filter(notifications::read.eq(false))
        .count()
        .get_result(conn)?;

    Ok(count)
}

pub fn mark_all_read(conn: &mut PgConnection, user_id: Uuid) -> AppResult<usize> {
    let updated = diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::read.eq(false)),
    )
    .set(notifications::read.eq(true))
    .execute(conn)?;

    Ok(updated)
}

/// Mark a single notification as read (only if it belongs to the user).
pub fn mark_read(conn: &mut PgConnection, notification_id: Uuid, user_id: Uuid) -> AppResult<Notification> {
    diesel::update(
        notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::user_id.eq(user_id)),
    )
    .set(notifications::read.eq(true))
    .get_result::<Notification>(conn)
    .optional()?
    .ok_or_else(|| AppError::new(ErrorCode::NotificationNotFound, "notification not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_optional_fields() {
        let user = Uuid::new_v4();
        let n = NewNotification::new(user, "evaluation_completed", "Evaluation Completed", "done")
            .link("/evaluations/1")
            .metadata(serde_json::json!({ "evaluation_id": "1" }));

        assert_eq!(n.user_id, user);
        assert_eq!(n.kind, "evaluation_completed");
        assert_eq!(n.link.as_deref(), Some("/evaluations/1"));
        assert_eq!(n.metadata.unwrap()["evaluation_id"], "1");
    }
}
