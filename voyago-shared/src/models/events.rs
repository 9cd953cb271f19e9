use uuid::Uuid;

/// Emitted when a pending booking is captured by the settlement flow.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCapturedEvent {
    pub booking_id: Uuid,
    pub buyer_id: Uuid,
    pub payment_session_id: String,
    pub total_cents: i64,
    pub currency: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SettlementEvent {
    pub booking_id: Uuid,
    pub payment_session_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub event_type: String,
    pub timestamp: i64,
}

/// One accepted line of a partner payout batch.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PayoutLineEvent {
    pub payment_session_id: String,
    pub receiver: String,
    pub amount_cents: i64,
    pub currency: String,
    pub timestamp: i64,
}
