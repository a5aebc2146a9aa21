//! Lifetime upgrade payments: order creation and callback verification.

use crate::error::{PaymentError, VerifyError};
use crate::ledger::UsageLedger;
use crate::metrics::{ENTITLEMENTS_GRANTED, SIGNATURE_REJECTIONS};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `order_id|payment_id`, the provider's callback proof.
pub fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Sole path by which a user becomes entitled.
pub struct EntitlementVerifier {
    secret: Option<String>,
    ledger: Arc<UsageLedger>,
}

impl EntitlementVerifier {
    pub fn new(secret: Option<String>, ledger: Arc<UsageLedger>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            ledger,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(
        &self,
        user_id: &str,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), VerifyError> {
        let secret = self.secret.as_deref().ok_or(VerifyError::NotConfigured)?;
        let expected = sign(secret, order_id, payment_id);

        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            SIGNATURE_REJECTIONS.inc();
            warn!(user_id, order_id, "payment signature mismatch");
            return Err(VerifyError::InvalidSignature);
        }

        let record = self.ledger.grant_entitlement(user_id);
        ENTITLEMENTS_GRANTED.inc();
        info!(user_id, order_id, entitled = record.is_entitled, "lifetime access granted");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub key_id: String,
    pub key_secret: String,
}

impl ProviderCredentials {
    /// Both halves are needed; either one missing means not configured.
    pub fn from_parts(key_id: Option<String>, key_secret: Option<String>) -> Option<Self> {
        match (key_id, key_secret) {
            (Some(key_id), Some(key_secret)) if !key_id.is_empty() && !key_secret.is_empty() => {
                Some(Self { key_id, key_secret })
            }
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct OrderRequest<'a> {
    amount: u64,
    currency: &'a str,
    receipt: String,
    notes: OrderNotes<'a>,
}

#[derive(Serialize)]
struct OrderNotes<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: u64,
    pub currency: String,
}

/// Order-creation client for the payment provider's REST API.
pub struct PaymentClient {
    http: reqwest::Client,
    credentials: Option<ProviderCredentials>,
    api_base: String,
    amount: u64,
    currency: String,
}

impl PaymentClient {
    pub fn new(
        http: reqwest::Client,
        credentials: Option<ProviderCredentials>,
        api_base: &str,
        amount: u64,
        currency: &str,
    ) -> Self {
        Self {
            http,
            credentials,
            api_base: api_base.trim_end_matches('/').to_string(),
            amount,
            currency: currency.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Public key id handed to the browser checkout.
    pub fn key_id(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.key_id.as_str())
    }

    pub async fn create_order(&self, user_id: &str) -> Result<ProviderOrder, PaymentError> {
        let credentials = self.credentials.as_ref().ok_or(PaymentError::NotConfigured)?;

        let body = OrderRequest {
            amount: self.amount,
            currency: &self.currency,
            receipt: format!("order_rcptid_{}", chrono::Utc::now().timestamp_millis()),
            notes: OrderNotes { user_id },
        };

        let res = self
            .http
            .post(format!("{}/v1/orders", self.api_base))
            .basic_auth(&credentials.key_id, Some(&credentials.key_secret))
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let order = res.json::<ProviderOrder>().await?;
        info!(user_id, order_id = %order.id, amount = order.amount, "payment order created");
        Ok(order)
    }
}
