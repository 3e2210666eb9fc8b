use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::{AppError, AppResult, ErrorCode};

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Signed webhook timestamps older than this are rejected.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Stripe REST client. Requests are form encoded as the API expects.
#[derive(Clone)]
pub struct PaymentsClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Refund {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Transfer {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub latest_charge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// One-off card payment for a single line item.
#[derive(Debug)]
pub struct CheckoutRequest<'a> {
    pub customer_email: Option<&'a str>,
    pub product_name: &'a str,
    pub product_description: &'a str,
    pub unit_amount_cents: i64,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
    pub metadata: Vec<(&'a str, String)>,
}

#[derive(Debug)]
pub struct TransferRequest<'a> {
    pub amount_cents: i64,
    pub destination: &'a str,
    pub source_transaction: Option<&'a str>,
    pub metadata: Vec<(&'a str, String)>,
}

/// Event delivered to the webhook endpoint. `data.object` is left untyped;
/// handlers pick out the fields they need.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

impl PaymentsClient {
    pub fn new(client: Client, secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client,
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
            api_base: STRIPE_API.to_string(),
        }
    }

    async fn post_form<T: DeserializeOwned>(&self, path: &str, form: &[(String, String)]) -> AppResult<T> {
        let response = self.client
            .post(format!("{}{path}", self.api_base))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::new(ErrorCode::PaymentProviderError, e.to_string()))?;
        Self::decode(path, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let response = self.client
            .get(format!("{}{path}", self.api_base))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .send()
            .await
            .map_err(|e| AppError::new(ErrorCode::PaymentProviderError, e.to_string()))?;
        Self::decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> AppResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or(body);
            tracing::error!(path, status = status.as_u16(), error = %message, "stripe request failed");
            return Err(AppError::new(ErrorCode::PaymentProviderError, message));
        }
        response
            .json()
            .await
            .map_err(|e| AppError::new(ErrorCode::PaymentProviderError, e.to_string()))
    }

    pub async fn create_checkout_session(&self, req: &CheckoutRequest<'_>) -> AppResult<CheckoutSession> {
        let session: CheckoutSession = self.post_form("/checkout/sessions", &checkout_form(req)).await?;
        tracing::info!(session_id = %session.id, amount_cents = req.unit_amount_cents, "checkout session created");
        Ok(session)
    }

    /// Full refund of a payment intent.
    pub async fn create_refund(&self, payment_intent_id: &str) -> AppResult<Refund> {
        let form = vec![
            ("payment_intent".to_string(), payment_intent_id.to_string()),
            ("reason".to_string(), "requested_by_customer".to_string()),
        ];
        let refund: Refund = self.post_form("/refunds", &form).await?;
        tracing::info!(refund_id = %refund.id, payment_intent_id, amount_cents = refund.amount, "refund issued");
        Ok(refund)
    }

    pub async fn create_transfer(&self, req: &TransferRequest<'_>) -> AppResult<Transfer> {
        let mut form = vec![
            ("amount".to_string(), req.amount_cents.to_string()),
            ("currency".to_string(), "usd".to_string()),
            ("destination".to_string(), req.destination.to_string()),
        ];
        if let Some(charge) = req.source_transaction {
            form.push(("source_transaction".to_string(), charge.to_string()));
        }
        push_metadata(&mut form, &req.metadata);

        let transfer: Transfer = self.post_form("/transfers", &form).await?;
        tracing::info!(transfer_id = %transfer.id, destination = req.destination, amount_cents = req.amount_cents, "transfer created");
        Ok(transfer)
    }

    pub async fn retrieve_payment_intent(&self, payment_intent_id: &str) -> AppResult<PaymentIntent> {
        self.get(&format!("/payment_intents/{payment_intent_id}")).await
    }

    /// Check the `Stripe-Signature` header and parse the event body.
    pub fn construct_event(&self, payload: &[u8], signature_header: &str) -> AppResult<WebhookEvent> {
        // An empty key would let anyone sign events.
        if self.webhook_secret.is_empty() {
            return Err(AppError::dependency("stripe", "webhook secret is not configured"));
        }
        verify_signature(
            &self.webhook_secret,
            payload,
            signature_header,
            chrono::Utc::now().timestamp(),
            WEBHOOK_TOLERANCE_SECS,
        )?;
        serde_json::from_slice(payload)
            .map_err(|e| AppError::bad_request(format!("invalid webhook payload: {e}")))
    }
}

fn push_metadata(form: &mut Vec<(String, String)>, metadata: &[(&str, String)]) {
    for (key, value) in metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
}

fn checkout_form(req: &CheckoutRequest<'_>) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = [
        ("mode", "payment".to_string()),
        ("payment_method_types[0]", "card".to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price_data][currency]", "usd".to_string()),
        ("line_items[0][price_data][unit_amount]", req.unit_amount_cents.to_string()),
        ("line_items[0][price_data][product_data][name]", req.product_name.to_string()),
        ("line_items[0][price_data][product_data][description]", req.product_description.to_string()),
        ("success_url", req.success_url.to_string()),
        ("cancel_url", req.cancel_url.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    if let Some(email) = req.customer_email {
        form.push(("customer_email".to_string(), email.to_string()));
    }
    push_metadata(&mut form, &req.metadata);
    form
}

pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::internal(format!("invalid webhook secret: {e}")))?;
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a `t=<unix>,v1=<hex>[,v1=...]` header against `{t}.{payload}`.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
    tolerance_secs: i64,
) -> AppResult<()> {
    let invalid = |msg: &str| AppError::new(ErrorCode::WebhookSignatureInvalid, msg.to_string());

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| invalid("missing signature timestamp"))?;
    if signatures.is_empty() {
        return Err(invalid("missing v1 signature"));
    }
    if now.abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        return Err(invalid("signature timestamp outside tolerance"));
    }

    let expected = sign_payload(secret, timestamp, payload)?;
    let matched = signatures
        .iter()
        .any(|sig| bool::from(expected.as_bytes().ct_eq(sig.as_bytes())));
    if !matched {
        return Err(invalid("no matching signature"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{}}}"#;

    fn header(ts: i64, secret: &str) -> String {
        format!("t={ts},v1={}", sign_payload(secret, ts, BODY).unwrap())
    }

    #[test]
    fn accepts_fresh_signature() {
        let now = 1_700_000_000;
        assert!(verify_signature(SECRET, BODY, &header(now - 10, SECRET), now, 300).is_ok());
    }

    #[test]
    fn accepts_any_of_several_signatures() {
        let now = 1_700_000_000;
        let good = sign_payload(SECRET, now, BODY).unwrap();
        let h = format!("t={now},v1=deadbeef,v1={good}");
        assert!(verify_signature(SECRET, BODY, &h, now, 300).is_ok());
    }

    #[test]
    fn rejects_wrong_secret() {
        let now = 1_700_000_000;
        let err = verify_signature(SECRET, BODY, &header(now, "whsec_other"), now, 300).unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::WebhookSignatureInvalid, .. }));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let now = 1_700_000_000;
        assert!(verify_signature(SECRET, BODY, &header(now - 301, SECRET), now, 300).is_err());
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(verify_signature(SECRET, BODY, "v1=abc", 0, 300).is_err());
        assert!(verify_signature(SECRET, BODY, "t=0", 0, 300).is_err());
    }

    #[test]
    fn rejects_extreme_timestamps() {
        let now = 1_700_000_000;
        for ts in [i64::MIN, i64::MAX] {
            let err = verify_signature(SECRET, BODY, &format!("t={ts},v1=00"), now, 300).unwrap_err();
            assert!(matches!(err, AppError::Known { code: ErrorCode::WebhookSignatureInvalid, .. }));
        }
    }

    #[test]
    fn construct_event_refuses_without_secret() {
        let client = PaymentsClient::new(Client::new(), "sk_test", "");
        let now = chrono::Utc::now().timestamp();
        let err = client.construct_event(BODY, &header(now, "")).unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::DependencyFailed, .. }));
    }

    #[test]
    fn construct_event_parses_type() {
        let client = PaymentsClient::new(Client::new(), "sk_test", SECRET);
        let now = chrono::Utc::now().timestamp();
        let event = client.construct_event(BODY, &header(now, SECRET)).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
    }

    #[test]
    fn checkout_form_flattens_metadata() {
        let req = CheckoutRequest {
            customer_email: None,
            product_name: "Evaluation from Coach",
            product_description: "Film evaluation",
            unit_amount_cents: 4999,
            success_url: "https://got1.app/ok",
            cancel_url: "https://got1.app/cancel",
            metadata: vec![("action", "upfront_payment".to_string())],
        };
        let form = checkout_form(&req);
        assert!(form.contains(&("metadata[action]".to_string(), "upfront_payment".to_string())));
        assert!(form.contains(&("line_items[0][price_data][unit_amount]".to_string(), "4999".to_string())));
        assert!(!form.iter().any(|(k, _)| k == "customer_email"));
    }
}
