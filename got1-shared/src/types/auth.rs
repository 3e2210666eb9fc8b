use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value of `profiles.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileRole {
    User,
    Player,
    Parent,
    Scout,
}

impl ProfileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileRole::User => "user",
            ProfileRole::Player => "player",
            ProfileRole::Parent => "parent",
            ProfileRole::Scout => "scout",
        }
    }
}

impl std::fmt::Display for ProfileRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProfileRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ProfileRole::User),
            "player" => Ok(ProfileRole::Player),
            "parent" => Ok(ProfileRole::Parent),
            "scout" => Ok(ProfileRole::Scout),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// Claims of an access token issued by the hosted auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: Option<String>, audience: &str, duration_secs: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id,
            email,
            aud: audience.to_string(),
            iat: now,
            exp: now + duration_secs,
        }
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() > self.exp
    }
}

/// The caller of a request, resolved from its bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
        }
    }
}

/// Token verification key plus the admin allow-lists.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub audience: String,
    admin_user_ids: HashSet<Uuid>,
    admin_emails: HashSet<String>,
}

impl AuthSettings {
    pub fn new(
        jwt_secret: impl Into<String>,
        audience: impl Into<String>,
        admin_user_ids: impl IntoIterator<Item = Uuid>,
        admin_emails: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            audience: audience.into(),
            admin_user_ids: admin_user_ids.into_iter().collect(),
            admin_emails: admin_emails
                .into_iter()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// User id is the primary key; email is the fallback for admins whose id
    /// is not configured yet.
    pub fn is_admin(&self, user: &AuthUser) -> bool {
        if self.admin_user_ids.contains(&user.id) {
            return true;
        }
        user.email
            .as_deref()
            .map(|email| self.admin_emails.contains(&email.trim().to_lowercase()))
            .unwrap_or(false)
    }
}

/// Application state that can hand the auth extractors their settings.
pub trait AuthState {
    fn auth_settings(&self) -> &AuthSettings;
}

impl<T: AuthState> AuthState for Arc<T> {
    fn auth_settings(&self) -> &AuthSettings {
        (**self).auth_settings()
    }
}

impl AuthState for AuthSettings {
    fn auth_settings(&self) -> &AuthSettings {
        self
    }
}

/// Parse a comma separated allow-list, skipping blanks.
pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(admin_id: Uuid) -> AuthSettings {
        AuthSettings::new(
            "secret",
            "authenticated",
            [admin_id],
            parse_csv(" Ops@Got1.app , ,coach@example.com"),
        )
    }

    #[test]
    fn admin_by_user_id() {
        let id = Uuid::new_v4();
        let user = AuthUser { id, email: None };
        assert!(settings(id).is_admin(&user));
    }

    #[test]
    fn admin_by_email_fallback_ignores_case() {
        let user = AuthUser { id: Uuid::new_v4(), email: Some("ops@got1.APP".into()) };
        assert!(settings(Uuid::new_v4()).is_admin(&user));
    }

    #[test]
    fn non_admin_is_rejected() {
        let user = AuthUser { id: Uuid::new_v4(), email: Some("player@example.com".into()) };
        assert!(!settings(Uuid::new_v4()).is_admin(&user));

        let anonymous_email = AuthUser { id: Uuid::new_v4(), email: None };
        assert!(!settings(Uuid::new_v4()).is_admin(&anonymous_email));
    }

    #[test]
    fn role_round_trips_through_text() {
        for role in [ProfileRole::User, ProfileRole::Player, ProfileRole::Parent, ProfileRole::Scout] {
            assert_eq!(role.as_str().parse::<ProfileRole>().unwrap(), role);
        }
        assert!("coach".parse::<ProfileRole>().is_err());
    }
}
