//! Stripe checkout and webhook handling over the plain HTTP API.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::{
    config::StripeConfig,
    db::payment::CreditPackage,
    error::{AppError, AppResult},
    utils::auth::UserId,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    success_url: String,
    cancel_url: String,
}

impl StripeClient {
    pub fn new(http: reqwest::Client, config: &StripeConfig) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
        }
    }

    /// Opens a one-off payment session for `package`, tagged with the buyer so
    /// the webhook can be traced back.
    pub async fn create_checkout_session(
        &self,
        user_id: UserId,
        package: &CreditPackage,
    ) -> AppResult<CheckoutSession> {
        if self.secret_key.is_empty() {
            return Err(AppError::Anyhow(anyhow::anyhow!(
                "stripe secret key is not configured"
            )));
        }

        let form = checkout_form(user_id, package, &self.success_url, &self.cancel_url);
        let session = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json::<CheckoutSession>()
            .await?;

        tracing::info!(user_id, package_id = package.id, session_id = %session.id, "checkout session created");
        Ok(session)
    }
}

fn checkout_form(
    user_id: UserId,
    package: &CreditPackage,
    success_url: &str,
    cancel_url: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("mode", "payment".to_string()),
        ("success_url", success_url.to_string()),
        ("cancel_url", cancel_url.to_string()),
        ("client_reference_id", user_id.to_string()),
        ("metadata[user_id]", user_id.to_string()),
        ("metadata[package_id]", package.id.to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price_data][currency]", package.currency.clone()),
        ("line_items[0][price_data][unit_amount]", package.price_cents.to_string()),
        (
            "line_items[0][price_data][product_data][name]",
            format!("{} ({} credits)", package.name, package.credits),
        ),
    ]
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against
/// the raw request body.
pub fn verify_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> AppResult<()> {
    let invalid = || AppError::BadRequest("invalid webhook signature".to_string());

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(invalid)?;
    if signatures.is_empty() || secret.is_empty() {
        return Err(invalid());
    }
    let tolerance = u64::try_from(tolerance_secs).unwrap_or(0);
    if now.abs_diff(timestamp) > tolerance {
        return Err(AppError::BadRequest("webhook timestamp outside tolerance".to_string()));
    }

    let matches = signatures.iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err(invalid())
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: SessionObject,
}

/// The fields of a checkout session the webhook cares about. Other event
/// types deserialize with the same shape and are ignored by kind.
#[derive(Debug, Deserialize)]
pub struct SessionObject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub payment_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent<'a> {
    Paid(&'a str),
    Expired(&'a str),
    Ignored,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> AppResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|err| AppError::BadRequest(format!("malformed webhook payload: {err}")))
    }

    pub fn session_event(&self) -> SessionEvent<'_> {
        let session = &self.data.object;
        match self.kind.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded"
                if session.payment_status.as_deref() != Some("unpaid") =>
            {
                SessionEvent::Paid(&session.id)
            }
            "checkout.session.expired" | "checkout.session.async_payment_failed" => {
                SessionEvent::Expired(&session.id)
            }
            _ => SessionEvent::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    fn sign(timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = format!("t=1700000000,v1={}", sign(1_700_000_000, payload));
        assert!(verify_signature(&header, payload, SECRET, 300, 1_700_000_100).is_ok());
    }

    #[test]
    fn any_matching_v1_signature_is_enough() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = format!(
            "t=1700000000,v1={},v1={}",
            "00".repeat(32),
            sign(1_700_000_000, payload)
        );
        assert!(verify_signature(&header, payload, SECRET, 300, 1_700_000_000).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = format!("t=1700000000,v1={}", sign(1_700_000_000, b"original"));
        assert!(matches!(
            verify_signature(&header, b"tampered", SECRET, 300, 1_700_000_000),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = b"{}";
        let header = format!("t=1700000000,v1={}", sign(1_700_000_000, payload));
        assert!(verify_signature(&header, payload, SECRET, 300, 1_700_000_301).is_err());
    }

    #[test]
    fn extreme_timestamps_are_rejected() {
        let payload = b"{}";
        for timestamp in [i64::MIN, i64::MAX] {
            let header = format!("t={timestamp},v1={}", sign(timestamp, payload));
            assert!(matches!(
                verify_signature(&header, payload, SECRET, 300, 1_700_000_000),
                Err(AppError::BadRequest(_))
            ));
        }
        let header = "t=-9223372036854775808,v1=00";
        assert!(verify_signature(header, payload, SECRET, 300, -1).is_err());
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for header in ["", "t=abc,v1=00", "v1=00", "t=1700000000", "t=1700000000,v1=zz"] {
            assert!(verify_signature(header, b"{}", SECRET, 300, 1_700_000_000).is_err());
        }
    }

    #[test]
    fn checkout_events_are_classified() {
        let event = WebhookEvent::parse(
            br#"{"id":"evt_1","type":"checkout.session.completed",
                "data":{"object":{"id":"cs_123","payment_status":"paid"}}}"#,
        )
        .unwrap();
        assert_eq!(event.session_event(), SessionEvent::Paid("cs_123"));

        let event = WebhookEvent::parse(
            br#"{"id":"evt_2","type":"checkout.session.completed",
                "data":{"object":{"id":"cs_123","payment_status":"unpaid"}}}"#,
        )
        .unwrap();
        assert_eq!(event.session_event(), SessionEvent::Ignored);

        let event = WebhookEvent::parse(
            br#"{"id":"evt_3","type":"checkout.session.expired","data":{"object":{"id":"cs_9"}}}"#,
        )
        .unwrap();
        assert_eq!(event.session_event(), SessionEvent::Expired("cs_9"));

        let event = WebhookEvent::parse(
            br#"{"id":"evt_4","type":"customer.created","data":{"object":{"id":"cus_1"}}}"#,
        )
        .unwrap();
        assert_eq!(event.session_event(), SessionEvent::Ignored);
    }

    #[test]
    fn checkout_form_carries_the_package() {
        let package = CreditPackage {
            id: 2,
            name: "Student".into(),
            credits: 60,
            price_cents: 499,
            currency: "usd".into(),
        };
        let form = checkout_form(7, &package, "https://s", "https://c");
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("mode"), "payment");
        assert_eq!(get("metadata[package_id]"), "2");
        assert_eq!(get("client_reference_id"), "7");
        assert_eq!(get("line_items[0][price_data][unit_amount]"), "499");
        assert_eq!(
            get("line_items[0][price_data][product_data][name]"),
            "Student (60 credits)"
        );
    }
}
