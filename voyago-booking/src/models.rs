use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use voyago_shared::pii::Masked;

/// The three kinds of inventory a cart may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Tour,
    Room,
    Flight,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Tour => "tour",
            ItemType::Room => "room",
            ItemType::Flight => "flight",
        }
    }
}

/// Owning inventory reference. Exactly one id per item, enforced by the
/// variant rather than three nullable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ItemRef {
    Tour(Uuid),
    Room(Uuid),
    Flight(Uuid),
}

impl ItemRef {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemRef::Tour(_) => ItemType::Tour,
            ItemRef::Room(_) => ItemType::Room,
            ItemRef::Flight(_) => ItemType::Flight,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ItemRef::Tour(id) | ItemRef::Room(id) | ItemRef::Flight(id) => *id,
        }
    }
}

/// Contact record for one traveler on a booking item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContact {
    pub email: Masked<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Masked<String>,
}

/// One line of a booking. Immutable once created; owned by exactly one
/// booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingItem {
    pub id: Uuid,
    pub item: ItemRef,
    /// Price at booking time, in minor units. Never recomputed.
    pub price_cents: i64,
    pub quantity: i32,
    pub coupon_code: Option<String>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub customers: Vec<CustomerContact>,
    pub created_at: DateTime<Utc>,
}

impl BookingItem {
    pub fn subtotal_cents(&self) -> i64 {
        self.price_cents * self.quantity as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub items: Vec<BookingItem>,
    pub buyer: Uuid,
    pub total_cents: i64,
    /// False while the payment session is pending; flipped exactly once by
    /// settlement.
    pub captured: bool,
    /// True while the inventory hold is live. Released by capture or by
    /// cancellation, never re-acquired.
    pub hold_active: bool,
    pub payment_session_id: String,
    pub payer_token: String,
    pub redirect_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a coupon code applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum CouponTarget {
    Tour(Uuid),
    Hotel(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponCode {
    pub id: Uuid,
    pub code: String,
    pub target: CouponTarget,
    pub percent: i32,
    pub quantity: i32,
    /// Remaining redemptions; never below zero. Decremented only through
    /// the guarded conditional update in the repository.
    pub available: i32,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    /// False is terminal.
    pub active: bool,
    pub creator: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerKind {
    Sale,
    Payout,
    Refund,
}

/// Append-only money movement record. One Sale per captured booking, one
/// Payout per partner actually paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub sender_email: Masked<String>,
    pub receiver_email: Masked<String>,
    pub kind: LedgerKind,
    pub amount_cents: i64,
    pub payment_session_id: String,
    pub created_at: DateTime<Utc>,
}

/// One entry of a submitted cart, as received from the client. Dates come
/// in as `DD/MM/YYYY` strings and are canonicalized during orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub id: Uuid,
    pub quantity: i32,
    /// Price in minor units, as quoted to the buyer.
    pub price: i64,
    pub customers: Vec<CustomerContact>,
    pub checkin: Option<String>,
    pub checkout: Option<String>,
    pub departure_day: Option<String>,
    pub coupon_code: Option<String>,
}

/// Per-field / per-item error map returned to the client on rejection.
pub type ErrorMap = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// Malformed cart input. Fails fast, no side effects.
    #[error("cart validation failed")]
    Validation(ErrorMap),

    /// One or more items unavailable; the whole cart is rejected.
    #[error("cart contains unavailable items")]
    Availability(ErrorMap),

    /// A partial commit happened and compensation was attempted.
    #[error("cannot create booking")]
    InventoryMutation(String),

    #[error("payment gateway error: {0}")]
    PaymentGateway(String),

    /// Non-fatal: the sale stays captured.
    #[error("payout failed: {0}")]
    PayoutFailure(String),

    /// Session already captured or unknown; treated as a success no-op.
    #[error("payment session already finalized or unknown")]
    DuplicateCapture,

    #[error("forbidden")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] voyago_core::StoreError),
}

/// Parse a `DD/MM/YYYY` day as sent by the booking clients.
pub fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%d/%m/%Y").map_err(|_| format!("invalid date: {raw}"))
}
