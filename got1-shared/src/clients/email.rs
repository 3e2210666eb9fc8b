use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

const RESEND_URL: &str = "https://api.resend.com/emails";

/// Resend client. Without an API key every message is logged instead of sent.
#[derive(Clone)]
pub struct EmailClient {
    client: Client,
    api_key: Option<String>,
    from_email: String,
    reply_to: String,
    app_url: String,
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    reply_to: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    id: Option<String>,
}

impl EmailClient {
    pub fn new(client: Client, api_key: Option<String>, from_email: &str, reply_to: &str, app_url: &str) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            from_email: from_email.to_string(),
            reply_to: reply_to.to_string(),
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn send_email(&self, to: &str, subject: &str, html: &str) -> AppResult<()> {
        let Some(api_key) = &self.api_key else {
            tracing::info!(to = %to, subject = %subject, "email provider not configured, message logged only");
            return Ok(());
        };

        let request = ResendRequest {
            from: &self.from_email,
            reply_to: &self.reply_to,
            to: [to],
            subject,
            html,
        };

        let response = self.client
            .post(RESEND_URL)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::dependency("resend", e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::dependency("resend", body));
        }

        let sent: ResendResponse = response
            .json()
            .await
            .map_err(|e| AppError::dependency("resend", e.to_string()))?;
        tracing::debug!(to = %to, subject = %subject, email_id = ?sent.id, "email sent");
        Ok(())
    }

    fn layout(&self, heading: &str, body: &str, cta: Option<(&str, &str)>) -> String {
        let button = cta
            .map(|(label, path)| {
                format!(
                    r#"<p style="margin-top: 24px;"><a href="{}{path}" style="background: #233dff; color: #fff; padding: 12px 20px; border-radius: 6px; text-decoration: none;">{label}</a></p>"#,
                    self.app_url
                )
            })
            .unwrap_or_default();
        format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
            <h2 style="color: #233dff;">{heading}</h2>
            {body}
            {button}
            <p style="color: #666; margin-top: 32px;">Got1</p>
            </div>"#
        )
    }

    pub async fn send_evaluation_requested(&self, to: &str, scout_name: &str, player_name: &str, price: &str) -> AppResult<()> {
        let html = self.layout(
            "New evaluation request",
            &format!("<p>Hi {scout_name},</p><p>{player_name} paid {price} for an evaluation. Confirm or deny the request from your dashboard.</p>"),
            Some(("Review request", "/my-evals")),
        );
        self.send_email(to, "Got1 - New evaluation request", &html).await
    }

    pub async fn send_evaluation_cancelled(&self, to: &str, evaluation_id: &str, refunded: bool) -> AppResult<()> {
        let refund_line = if refunded {
            "<p>The player's payment has been refunded.</p>"
        } else {
            ""
        };
        let html = self.layout(
            "Evaluation request cancelled",
            &format!("<p>A player cancelled their evaluation request.</p>{refund_line}"),
            Some(("View your evaluations", &format!("/evaluations/{evaluation_id}"))),
        );
        self.send_email(to, "Got1 - Evaluation request cancelled", &html).await
    }

    pub async fn send_evaluation_denied(&self, to: &str, player_name: &str, scout_name: &str, reason: &str) -> AppResult<()> {
        let html = self.layout(
            "Evaluation request denied",
            &format!("<p>Hi {player_name},</p><p>{scout_name} was unable to take your evaluation request.</p><p>Reason: {reason}</p>"),
            Some(("Browse scouts", "/browse")),
        );
        self.send_email(to, "Got1 - Evaluation request denied", &html).await
    }

    pub async fn send_evaluation_confirmed(&self, to: &str, player_name: &str, scout_name: &str, evaluation_id: &str, price: &str) -> AppResult<()> {
        let html = self.layout(
            "Evaluation confirmed",
            &format!("<p>Hi {player_name},</p><p>{scout_name} confirmed your evaluation request ({price}). Your payment is held until the evaluation is delivered.</p>"),
            Some(("View evaluation", &format!("/evaluations/{evaluation_id}"))),
        );
        self.send_email(to, "Got1 - Evaluation confirmed", &html).await
    }

    pub async fn send_evaluation_complete(&self, to: &str, player_name: &str, scout_name: &str, evaluation_id: &str) -> AppResult<()> {
        let html = self.layout(
            "Your evaluation is ready",
            &format!("<p>Hi {player_name},</p><p>{scout_name} has completed your evaluation.</p>"),
            Some(("Read evaluation", &format!("/evaluations/{evaluation_id}"))),
        );
        self.send_email(to, "Got1 - Your evaluation is ready", &html).await
    }

    pub async fn send_application_received(&self, ops_inbox: &str, applicant: &str, workplace: &str, position: &str, application_id: &str) -> AppResult<()> {
        let html = self.layout(
            "New scout application",
            &format!("<p>{applicant} applied to become a scout.</p><p>Workplace: {workplace}<br/>Position: {position}</p>"),
            Some(("Review application", &format!("/admin/scout-applications/{application_id}"))),
        );
        self.send_email(ops_inbox, "Got1 - New scout application", &html).await
    }

    pub async fn send_application_decision(&self, to: &str, name: &str, approved: bool) -> AppResult<()> {
        let (subject, heading, body) = if approved {
            (
                "Got1 - Scout application approved",
                "Welcome aboard",
                format!("<p>Hi {name},</p><p>Your scout application has been approved. You can now receive evaluation requests.</p>"),
            )
        } else {
            (
                "Got1 - Scout application update",
                "Scout application update",
                format!("<p>Hi {name},</p><p>Your scout application was not approved at this time.</p>"),
            )
        };
        let html = self.layout(heading, &body, Some(("Open profile", "/profile")));
        self.send_email(to, subject, &html).await
    }

    pub async fn send_roster_invite(&self, to: &str, school_name: &str, token: &str) -> AppResult<()> {
        let html = self.layout(
            "You're invited to a roster",
            &format!("<p>{school_name} added you to their roster on Got1.</p>"),
            Some(("Accept invite", &format!("/high-school/invite/{token}"))),
        );
        self.send_email(to, &format!("Got1 - Join the {school_name} roster"), &html).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_client_logs_instead_of_sending() {
        let client = EmailClient::new(Client::new(), Some(String::new()), "noreply@got1.app", "team@got1.app", "http://localhost:3000/");
        assert!(client.send_email("player@example.com", "hi", "<p>hi</p>").await.is_ok());
    }

    #[test]
    fn layout_links_against_app_url() {
        let client = EmailClient::new(Client::new(), None, "noreply@got1.app", "team@got1.app", "https://got1.app/");
        let html = client.layout("Heading", "<p>Body</p>", Some(("Go", "/evaluations/1")));
        assert!(html.contains(r#"href="https://got1.app/evaluations/1""#));
    }
}
