// src/services/payment.rs
use crate::errors::PortraitError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Succeeded { amount_cents: u64 },
    Pending,
    Failed,
}

/// Confirms that a payment has been captured before full-resolution delivery.
#[async_trait]
pub trait PaymentGate: Send + Sync {
    async fn verify(&self, payment_id: &str) -> Result<PaymentStatus, PortraitError>;
}

pub struct StripePaymentGate {
    secret_key: String,
    currency: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    status: String,
    #[serde(default)]
    amount_received: u64,
    #[serde(default)]
    currency: String,
}

impl StripePaymentGate {
    pub fn new(secret_key: String, currency: impl Into<String>) -> Self {
        Self {
            secret_key,
            currency: currency.into().to_lowercase(),
            client: Client::new(),
        }
    }

    fn map_status(&self, intent: &StripePaymentIntent) -> PaymentStatus {
        match intent.status.as_str() {
            "succeeded" if !intent.currency.eq_ignore_ascii_case(&self.currency) => {
                log::warn!(
                    "Payment captured in '{}', expected '{}'",
                    intent.currency,
                    self.currency
                );
                PaymentStatus::Failed
            }
            "succeeded" => PaymentStatus::Succeeded {
                amount_cents: intent.amount_received,
            },
            "processing" | "requires_capture" | "requires_action" | "requires_confirmation" => {
                PaymentStatus::Pending
            }
            _ => PaymentStatus::Failed,
        }
    }
}

#[async_trait]
impl PaymentGate for StripePaymentGate {
    async fn verify(&self, payment_id: &str) -> Result<PaymentStatus, PortraitError> {
        if !payment_id.starts_with("pi_") || !payment_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(PortraitError::Validation("Invalid payment reference".to_string()));
        }

        let response = self
            .client
            .get(format!("https://api.stripe.com/v1/payment_intents/{}", payment_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                log::error!("Stripe request failed: {}", e);
                PortraitError::Payment("Payment could not be verified".to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            log::error!("Stripe error ({}): {}", status, error_text);
            return Err(PortraitError::Payment("Payment could not be verified".to_string()));
        }

        let intent: StripePaymentIntent = response.json().await.map_err(|e| {
            log::error!("Failed to parse Stripe response: {}", e);
            PortraitError::Payment("Payment could not be verified".to_string())
        })?;

        Ok(self.map_status(&intent))
    }
}

/// Used when no processor is configured: every payment is refused.
pub struct DisabledPaymentGate;

#[async_trait]
impl PaymentGate for DisabledPaymentGate {
    async fn verify(&self, _payment_id: &str) -> Result<PaymentStatus, PortraitError> {
        Err(PortraitError::Payment(
            "Payments are not available right now".to_string(),
        ))
    }
}

/// Remembers which payments have already unlocked a download.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Marks the payment as spent; `false` if it already was.
    async fn claim(&self, payment_id: &str) -> bool;

    /// Returns a claimed payment, used when generation fails after payment.
    async fn release(&self, payment_id: &str);
}

#[derive(Default)]
pub struct InMemoryPaymentLedger {
    claimed: Mutex<HashSet<String>>,
}

impl InMemoryPaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryPaymentLedger {
    async fn claim(&self, payment_id: &str) -> bool {
        self.claimed.lock().await.insert(payment_id.to_string())
    }

    async fn release(&self, payment_id: &str) {
        self.claimed.lock().await.remove(payment_id);
    }
}

/// A verified payment that has been claimed for exactly one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub payment_id: String,
    pub amount_cents: u64,
}

/// Verifies the payment, then claims it so it cannot unlock a second download.
pub async fn redeem_payment(
    gate: &dyn PaymentGate,
    ledger: &dyn PaymentLedger,
    payment_id: Option<&str>,
    price_cents: u64,
) -> Result<PaymentReceipt, PortraitError> {
    let amount_cents = require_payment(gate, payment_id, price_cents).await?;
    let payment_id = payment_id.map(str::trim).unwrap_or_default().to_string();

    if !ledger.claim(&payment_id).await {
        log::warn!("Payment {} was presented again after being redeemed", payment_id);
        return Err(PortraitError::Payment(
            "This payment has already been used".to_string(),
        ));
    }

    Ok(PaymentReceipt {
        payment_id,
        amount_cents,
    })
}

/// Requires a succeeded payment of at least `price_cents`.
pub async fn require_payment(
    gate: &dyn PaymentGate,
    payment_id: Option<&str>,
    price_cents: u64,
) -> Result<u64, PortraitError> {
    let payment_id = payment_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PortraitError::Payment("Payment is required for full resolution".to_string()))?;

    match gate.verify(payment_id).await? {
        PaymentStatus::Succeeded { amount_cents } if amount_cents >= price_cents => Ok(amount_cents),
        PaymentStatus::Succeeded { amount_cents } => {
            log::warn!(
                "Payment {} captured {} cents, below price {}",
                payment_id,
                amount_cents,
                price_cents
            );
            Err(PortraitError::Payment("Payment amount is insufficient".to_string()))
        }
        PaymentStatus::Pending => Err(PortraitError::Payment("Payment is still processing".to_string())),
        PaymentStatus::Failed => Err(PortraitError::Payment("Payment did not succeed".to_string())),
    }
}
