use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A line item forwarded to the processor when a payment session is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeLine {
    pub name: String,
    pub price_cents: i64,
    pub quantity: i32,
    pub currency: String,
}

/// Handle returned by the processor for a created-but-unconfirmed payment.
///
/// The payer is sent to `redirect_url` to approve the charge; `payer_token`
/// is the token embedded in that URL and is what the cancel callback
/// carries back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: String,
    pub payer_token: String,
    pub redirect_url: String,
    pub created_at: DateTime<Utc>,
}

/// Result of executing (capturing) an approved payment session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedPayment {
    pub session_id: String,
    pub payer_email: String,
    pub payee_email: String,
    pub amount_cents: i64,
    pub currency: String,
}

/// One recipient line of a payout batch, addressed by payout identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutLine {
    pub receiver: String,
    pub amount_cents: i64,
    pub currency: String,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub batch_id: String,
    /// Lines the processor accepted. Rejected lines are simply absent.
    pub accepted: Vec<PayoutLine>,
}

/// Two-phase payment processor seam: create a session, execute it once the
/// payer approved, and fan captured funds out to partners.
///
/// A timeout from the processor is an `Err`, never a success; callers must
/// not invent partial capture states.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment session for the given total and return the
    /// redirect handle the buyer must approve.
    async fn create_session(
        &self,
        amount_cents: i64,
        currency: &str,
        lines: &[ChargeLine],
        description: &str,
    ) -> Result<PaymentSession, Box<dyn std::error::Error + Send + Sync>>;

    /// Execute a previously approved session. `payer_confirmation` is the
    /// payer id the processor handed to the return URL.
    async fn execute(
        &self,
        session_id: &str,
        payer_confirmation: &str,
        amount_cents: i64,
    ) -> Result<CapturedPayment, Box<dyn std::error::Error + Send + Sync>>;

    /// Submit one payout batch. The receipt lists only accepted lines.
    async fn create_payout(
        &self,
        batch_id: &str,
        lines: &[PayoutLine],
    ) -> Result<PayoutReceipt, Box<dyn std::error::Error + Send + Sync>>;
}
