pub mod admin;
pub mod blog;
pub mod evaluations;
pub mod follows;
pub mod health;
pub mod high_school;
pub mod notifications;
pub mod posts;
pub mod referrals;
pub mod scout_applications;
pub mod stripe_webhook;

use std::future::Future;

use got1_shared::errors::{AppError, AppResult};

/// Review outcome for applications and schools (`approved` / `denied`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Denied,
}

impl Decision {
    pub fn parse(raw: Option<&str>) -> AppResult<Self> {
        match raw {
            Some("approved") => Ok(Self::Approved),
            Some("denied") => Ok(Self::Denied),
            _ => Err(AppError::bad_request("Invalid decision")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }
}

/// Await an outbound side effect (email, provider call) whose failure must
/// not fail the request.
pub(crate) async fn best_effort<F>(what: &str, fut: F)
where
    F: Future<Output = AppResult<()>>,
{
    if let Err(e) = fut.await {
        tracing::warn!(side_effect = what, error = %e, "best-effort side effect failed");
    }
}

/// Base URL without a trailing slash, for building redirect links.
pub(crate) fn app_base(app_url: &str) -> &str {
    app_url.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_values() {
        assert_eq!(Decision::parse(Some("approved")).unwrap(), Decision::Approved);
        assert_eq!(Decision::parse(Some("denied")).unwrap().as_str(), "denied");
        assert!(Decision::parse(Some("maybe")).is_err());
        assert!(Decision::parse(None).is_err());
    }

    #[tokio::test]
    async fn best_effort_swallows_errors() {
        best_effort("email", async { Err(AppError::internal("smtp down")) }).await;
        best_effort("email", async { Ok(()) }).await;
    }

    #[test]
    fn base_url_trims_slash() {
        assert_eq!(app_base("https://got1.app/"), "https://got1.app");
        assert_eq!(app_base("http://localhost:3000"), "http://localhost:3000");
    }
}
