use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{domain}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Social errors (profiles, follows, posts, blog, notifications)
/// - E2xxx: Evaluation and payment errors
/// - E3xxx: Scout errors
/// - E4xxx: High school errors
/// - E5xxx: Referral errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    BadRequest,
    Conflict,
    TokenExpired,
    TokenInvalid,
    DependencyFailed,

    // Social (E1xxx)
    ProfileNotFound,
    CannotFollowSelf,
    PostNotFound,
    PostMediaConflict,
    BlogPostNotFound,
    SlugTaken,
    NotificationNotFound,

    // Evaluations (E2xxx)
    EvaluationNotFound,
    EvaluationNotPending,
    EvaluationAlreadyActive,
    InvalidScout,
    InvalidPlayer,
    InvalidPrice,
    PaymentIncomplete,
    PaymentProviderError,
    WebhookSignatureInvalid,

    // Scouts (E3xxx)
    ApplicationNotFound,
    ApplicationAlreadyPending,
    ApplicationAlreadyProcessed,
    AlreadyScout,
    NotAScout,

    // High schools (E4xxx)
    SchoolNotFound,
    NotSchoolAdmin,
    SchoolUsernameTaken,
    RosterPlayerNotFound,
    RosterRequestPending,
    AlreadyOnRoster,
    InvalidPositions,
    NotOnRoster,
    ReleaseAlreadyRequested,
    RosterRequestAlreadyAnswered,
    SchoolEvaluationNotFound,
    NotSchoolPaid,
    InvalidInviteToken,
    RosterInviteClosed,

    // Referrals (E5xxx)
    ReferralNotFound,
    ReferralExists,
    CannotReferSelf,
    ReferrerNotApproved,
    ReferralProgramClosed,
    ReferralApplicationPending,
    AlreadyInReferralProgram,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::BadRequest => "E0006",
            Self::Conflict => "E0007",
            Self::TokenExpired => "E0008",
            Self::TokenInvalid => "E0009",
            Self::DependencyFailed => "E0010",

            // Social
            Self::ProfileNotFound => "E1001",
            Self::CannotFollowSelf => "E1002",
            Self::PostNotFound => "E1003",
            Self::PostMediaConflict => "E1004",
            Self::BlogPostNotFound => "E1005",
            Self::SlugTaken => "E1006",
            Self::NotificationNotFound => "E1007",

            // Evaluations
            Self::EvaluationNotFound => "E2001",
            Self::EvaluationNotPending => "E2002",
            Self::EvaluationAlreadyActive => "E2003",
            Self::InvalidScout => "E2004",
            Self::InvalidPlayer => "E2005",
            Self::InvalidPrice => "E2006",
            Self::PaymentIncomplete => "E2007",
            Self::PaymentProviderError => "E2008",
            Self::WebhookSignatureInvalid => "E2009",

            // Scouts
            Self::ApplicationNotFound => "E3001",
            Self::ApplicationAlreadyPending => "E3002",
            Self::ApplicationAlreadyProcessed => "E3003",
            Self::AlreadyScout => "E3004",
            Self::NotAScout => "E3005",

            // High schools
            Self::SchoolNotFound => "E4001",
            Self::NotSchoolAdmin => "E4002",
            Self::SchoolUsernameTaken => "E4003",
            Self::RosterPlayerNotFound => "E4004",
            Self::RosterRequestPending => "E4005",
            Self::AlreadyOnRoster => "E4006",
            Self::InvalidPositions => "E4007",
            Self::NotOnRoster => "E4008",
            Self::ReleaseAlreadyRequested => "E4009",
            Self::RosterRequestAlreadyAnswered => "E4010",
            Self::SchoolEvaluationNotFound => "E4011",
            Self::NotSchoolPaid => "E4012",
            Self::InvalidInviteToken => "E4013",
            Self::RosterInviteClosed => "E4014",

            // Referrals
            Self::ReferralNotFound => "E5001",
            Self::ReferralExists => "E5002",
            Self::CannotReferSelf => "E5003",
            Self::ReferrerNotApproved => "E5004",
            Self::ReferralProgramClosed => "E5005",
            Self::ReferralApplicationPending => "E5006",
            Self::AlreadyInReferralProgram => "E5007",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError | Self::DependencyFailed | Self::PaymentProviderError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ValidationError | Self::BadRequest | Self::CannotFollowSelf
            | Self::PostMediaConflict | Self::EvaluationNotPending
            | Self::EvaluationAlreadyActive | Self::InvalidScout | Self::InvalidPlayer
            | Self::InvalidPrice | Self::WebhookSignatureInvalid
            | Self::ApplicationAlreadyPending | Self::ApplicationAlreadyProcessed
            | Self::AlreadyScout | Self::NotAScout | Self::RosterRequestPending
            | Self::AlreadyOnRoster | Self::InvalidPositions | Self::NotOnRoster
            | Self::ReleaseAlreadyRequested | Self::RosterRequestAlreadyAnswered
            | Self::NotSchoolPaid | Self::InvalidInviteToken | Self::RosterInviteClosed
            | Self::ReferralExists | Self::CannotReferSelf
            | Self::ReferrerNotApproved | Self::ReferralProgramClosed
            | Self::ReferralApplicationPending | Self::AlreadyInReferralProgram => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound | Self::ProfileNotFound | Self::PostNotFound
            | Self::BlogPostNotFound | Self::NotificationNotFound | Self::EvaluationNotFound
            | Self::ApplicationNotFound | Self::SchoolNotFound | Self::RosterPlayerNotFound
            | Self::SchoolEvaluationNotFound | Self::ReferralNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::NotSchoolAdmin => StatusCode::FORBIDDEN,
            Self::Conflict | Self::PaymentIncomplete | Self::SlugTaken
            | Self::SchoolUsernameTaken => StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// A failed call into an external service. The provider's message is
    /// passed through to the caller.
    pub fn dependency(service: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DependencyFailed, format!("{service}: {}", message.into()))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                if status.is_server_error() {
                    tracing::error!(code = code.code(), error = %message, "request failed");
                } else {
                    tracing::debug!(code = code.code(), error = %message, "request rejected");
                }
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0010", err.to_string()),
                    ),
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn known_error_envelope() {
        let (status, value) = body_json(AppError::new(
            ErrorCode::PostMediaConflict,
            "A post can only have either an image or video, not both",
        ))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "E1004");
        assert!(value["error"]["message"].as_str().unwrap().contains("image or video"));
        assert!(value["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn details_are_serialized() {
        let (_, value) = body_json(AppError::with_details(
            ErrorCode::EvaluationAlreadyActive,
            "Evaluation already requested or in progress",
            serde_json::json!({ "status": "requested" }),
        ))
        .await;

        assert_eq!(value["error"]["details"]["status"], "requested");
    }

    #[tokio::test]
    async fn dependency_failure_passes_message_through() {
        let (status, value) = body_json(AppError::dependency("stripe", "No such payment_intent")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(value["error"]["code"], "E0010");
        assert_eq!(value["error"]["message"], "stripe: No such payment_intent");
    }

    #[tokio::test]
    async fn diesel_not_found_maps_to_404() {
        let (status, value) = body_json(AppError::Database(diesel::result::Error::NotFound)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value["error"]["code"], "E0003");
    }

    #[test]
    fn guard_codes_map_to_expected_statuses() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::NotSchoolAdmin.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::PaymentIncomplete.status_code(), StatusCode::CONFLICT);
    }
}
