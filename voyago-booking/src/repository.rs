use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;
use voyago_core::StoreResult;

use crate::models::{Booking, BookingItem, CouponCode, CouponTarget, LedgerEntry};

/// Persistence seam for bookings and their items.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Persist one booking item ahead of its booking row.
    ///
    /// Room items must be serialized per room: implementations take a
    /// per-room exclusive section, re-run the overlap check inside it and
    /// only then insert, returning `StoreError::Conflict` when another
    /// hold won the race. Items not yet attached to a booking count as
    /// holds for that recheck.
    async fn insert_item(&self, item: &BookingItem) -> StoreResult<()>;

    /// Compensation path; deleting an absent item is a no-op.
    async fn delete_item(&self, id: Uuid) -> StoreResult<()>;

    /// Persist the booking and attach its already-inserted items.
    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()>;

    async fn booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// The capture path's idempotency guard: only a booking that is still
    /// pending is returned.
    async fn find_pending_by_session(&self, session_id: &str) -> StoreResult<Option<Booking>>;

    /// Guarded flip pending → captured (also releases the inventory hold).
    /// Returns false when the booking was already captured.
    async fn mark_captured(&self, id: Uuid) -> StoreResult<bool>;

    /// Release the inventory hold for the booking carrying this payer
    /// token. Returns the booking iff this call performed the release;
    /// `None` means unknown token or hold already gone, making repeat
    /// cancellation a strict no-op.
    async fn release_hold(&self, payer_token: &str) -> StoreResult<Option<Booking>>;

    /// True when any booking item holding this flight belongs to a booking
    /// that is captured or still holding inventory.
    async fn flight_is_held(&self, flight_id: Uuid) -> StoreResult<bool>;

    /// True when an active hold on this room overlaps `[start, end]`.
    /// Intervals touch-count: `start <= other_end && end >= other_start`.
    async fn room_hold_overlaps(
        &self,
        room_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<bool>;

    async fn list(&self, page: u32, page_size: u32) -> StoreResult<(Vec<Booking>, u64)>;

    async fn list_by_buyer(
        &self,
        buyer: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<Booking>, u64)>;

    /// Bookings containing at least one item whose inventory is owned by
    /// the given partner (tour owner or room's hotel owner).
    async fn list_by_partner(
        &self,
        partner: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<Booking>, u64)>;
}

/// Coupon persistence. The redeem guard lives here so that the check and
/// the decrement are one atomic conditional update.
#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn insert(&self, coupon: &CouponCode) -> StoreResult<()>;

    async fn find(&self, code: &str) -> StoreResult<Option<CouponCode>>;

    /// Atomic guarded decrement: succeeds only when a matching code is
    /// active, date-valid for `today`, targets the given item and still
    /// has `available > 0`. Returns the redeemed record, or `None` on any
    /// failure (not found, expired, exhausted, wrong target).
    async fn redeem(
        &self,
        code: &str,
        target: CouponTarget,
        today: NaiveDate,
    ) -> StoreResult<Option<CouponCode>>;

    /// Terminal close; closing a closed code is a no-op. Returns the
    /// record when the code exists.
    async fn close(&self, code: &str) -> StoreResult<Option<CouponCode>>;

    async fn list(&self, page: u32, page_size: u32) -> StoreResult<(Vec<CouponCode>, u64)>;

    async fn list_by_creator(
        &self,
        creator: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<CouponCode>, u64)>;
}

/// Append-only payment ledger.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> StoreResult<()>;

    async fn entries_for_session(&self, session_id: &str) -> StoreResult<Vec<LedgerEntry>>;
}
