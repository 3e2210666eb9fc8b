use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::errors::{AppError, ErrorCode};
use crate::types::auth::{AuthSettings, AuthState, AuthUser, Claims};

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: AuthState + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let claims = validate_jwt(state.auth_settings(), token)?;

        if claims.is_expired() {
            return Err(AppError::new(ErrorCode::TokenExpired, "token has expired"));
        }

        Ok(AuthUser::from(claims))
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "Unauthorized"))?
        .to_str()
        .map_err(|_| AppError::new(ErrorCode::Unauthorized, "invalid authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "authorization header must use Bearer scheme"))
}

pub fn validate_jwt(settings: &AuthSettings, token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_audience(&[settings.audience.as_str()]);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::TokenExpired, "token has expired")
        }
        _ => AppError::new(ErrorCode::TokenInvalid, format!("invalid token: {e}")),
    })?;

    Ok(token_data.claims)
}

/// Sign claims with the shared secret. Used by tooling and tests; production
/// tokens come from the hosted auth provider.
pub fn issue_jwt(settings: &AuthSettings, claims: &Claims) -> Result<String, AppError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("failed to sign token: {e}")))
}

/// Optional auth extractor
pub struct OptionalAuthUser(pub Option<AuthUser>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: AuthState + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(Self(Some(user))),
            Err(_) => Ok(Self(None)),
        }
    }
}

/// Require a caller on the admin allow-list (`ADMIN_USER_IDS` / `ADMIN_EMAILS`).
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: AuthState + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !state.auth_settings().is_admin(&user) {
            tracing::warn!(user_id = %user.id, "admin route denied");
            return Err(AppError::new(ErrorCode::Forbidden, "Forbidden"));
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use uuid::Uuid;

    fn settings(admin: Uuid) -> AuthSettings {
        AuthSettings::new("test-secret", "authenticated", [admin], Vec::<String>::new())
    }

    fn parts_with(header: Option<String>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let state = settings(Uuid::new_v4());
        let err = AuthUser::from_request_parts(&mut parts_with(None), &state).await.unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::Unauthorized, .. }));
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid() {
        let state = settings(Uuid::new_v4());
        let other = AuthSettings::new("other-secret", "authenticated", [], Vec::<String>::new());
        let token = issue_jwt(&other, &Claims::new(Uuid::new_v4(), None, "authenticated", 60)).unwrap();

        let err = AuthUser::from_request_parts(&mut parts_with(Some(format!("Bearer {token}"))), &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::TokenInvalid, .. }));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let state = settings(Uuid::new_v4());
        let token = issue_jwt(&state, &Claims::new(Uuid::new_v4(), None, "authenticated", -3600)).unwrap();

        let err = AuthUser::from_request_parts(&mut parts_with(Some(format!("Bearer {token}"))), &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::TokenExpired, .. }));
    }

    #[tokio::test]
    async fn valid_token_resolves_caller() {
        let state = settings(Uuid::new_v4());
        let id = Uuid::new_v4();
        let token = issue_jwt(&state, &Claims::new(id, Some("p@example.com".into()), "authenticated", 60)).unwrap();

        let user = AuthUser::from_request_parts(&mut parts_with(Some(format!("Bearer {token}"))), &state)
            .await
            .unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email.as_deref(), Some("p@example.com"));
    }

    #[tokio::test]
    async fn admin_extractor_checks_allow_list() {
        let admin = Uuid::new_v4();
        let state = settings(admin);

        let token = issue_jwt(&state, &Claims::new(Uuid::new_v4(), None, "authenticated", 60)).unwrap();
        let err = AdminUser::from_request_parts(&mut parts_with(Some(format!("Bearer {token}"))), &state)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Known { code: ErrorCode::Forbidden, .. }));

        let token = issue_jwt(&state, &Claims::new(admin, None, "authenticated", 60)).unwrap();
        let AdminUser(user) = AdminUser::from_request_parts(&mut parts_with(Some(format!("Bearer {token}"))), &state)
            .await
            .ok()
            .unwrap();
        assert_eq!(user.id, admin);
    }
}
