//! Payment provider webhook verification and parsing.
//!
//! Deliveries carry `Payment-Signature: t=<unix seconds>,v1=<hex>` where the
//! MAC is `HMAC-SHA256("<t>.<raw body>", webhook_secret)`.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::models::ActivateEnrollment;

pub const SIGNATURE_HEADER: &str = "Payment-Signature";
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

type HmacSha256 = Hmac<Sha256>;

/// Provider webhook envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub object: CheckoutSession,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutSession {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: CheckoutMetadata,
}

/// Identifiers attached to the session when checkout was created.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutMetadata {
    pub org_id: Option<String>,
    pub course_id: Option<String>,
    pub user_id: Option<String>,
}

impl CheckoutSession {
    /// The enrollment this session paid for, if all identifiers are present
    /// and well formed.
    pub fn enrollment(&self) -> Option<ActivateEnrollment> {
        let parse = |v: &Option<String>| v.as_deref().and_then(|s| Uuid::parse_str(s).ok());
        Some(ActivateEnrollment {
            org_id: parse(&self.metadata.org_id)?,
            course_id: parse(&self.metadata.course_id)?,
            user_id: parse(&self.metadata.user_id)?,
            payment_reference: self.id.clone(),
        })
    }
}

/// Verifies webhook signatures against the shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Secret<String>,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: Secret<String>, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    /// Check `header` against `body` at time `now` (unix seconds).
    pub fn verify(&self, body: &[u8], header: &str, now: i64) -> Result<()> {
        let (timestamp, signatures) = parse_signature_header(header)?;

        let outside_tolerance = now
            .checked_sub(timestamp)
            .and_then(i64::checked_abs)
            .map_or(true, |skew| skew > self.tolerance_secs);
        if outside_tolerance {
            return Err(anyhow!(
                "Signature timestamp {} outside tolerance of {}s",
                timestamp,
                self.tolerance_secs
            ));
        }

        let expected = self.compute(timestamp, body)?;
        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| bool::from(bytes.as_slice().ct_eq(expected.as_slice())))
                .unwrap_or(false)
        });

        if matched {
            Ok(())
        } else {
            Err(anyhow!("No matching v1 signature"))
        }
    }

    /// Hex signature for `body` at `timestamp`, as the provider would send it.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> Result<String> {
        Ok(hex::encode(self.compute(timestamp, body)?))
    }

    fn compute(&self, timestamp: i64, body: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| anyhow!("Invalid key length"))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn parse_signature_header(header: &str) -> Result<(i64, Vec<&str>)> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| anyhow!("Signature header has no timestamp"))?;
    if signatures.is_empty() {
        return Err(anyhow!("Signature header has no v1 signature"));
    }
    Ok((timestamp, signatures))
}

pub fn parse_event(body: &[u8]) -> Result<WebhookEvent> {
    Ok(serde_json::from_slice(body)?)
}
