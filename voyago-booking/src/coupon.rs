use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use voyago_core::StoreResult;

use crate::models::{CouponCode, CouponTarget};
use crate::repository::CouponRepository;

/// Discount-code redemption over the repository's atomic guarded
/// decrement. The guard and the decrement are one conditional update;
/// two concurrent redemptions of a coupon with one unit left cannot both
/// succeed.
pub struct CouponLedger {
    coupons: Arc<dyn CouponRepository>,
}

impl CouponLedger {
    pub fn new(coupons: Arc<dyn CouponRepository>) -> Self {
        Self { coupons }
    }

    /// `None` means "coupon not applied": not found, expired, exhausted
    /// or aimed at different inventory. Callers never treat that as a
    /// fatal cart error.
    pub async fn redeem(&self, code: &str, target: CouponTarget) -> StoreResult<Option<CouponCode>> {
        let today = Utc::now().date_naive();
        self.coupons.redeem(code, target, today).await
    }

    /// Redeem a code against a batch of cart items; returns the records
    /// that were actually burned, one per successful item.
    pub async fn redeem_for_items(
        &self,
        code: &str,
        targets: &[CouponTarget],
    ) -> StoreResult<Vec<CouponCode>> {
        let mut redeemed = Vec::new();
        for target in targets {
            if let Some(coupon) = self.redeem(code, *target).await? {
                redeemed.push(coupon);
            }
        }
        Ok(redeemed)
    }

    /// Close a code for good. Closing a closed code is a no-op.
    pub async fn close(&self, code: &str) -> StoreResult<Option<CouponCode>> {
        self.coupons.close(code).await
    }

    pub async fn find(&self, code: &str) -> StoreResult<Option<CouponCode>> {
        self.coupons.find(code).await
    }
}

/// Convenience constructor for a live, date-valid coupon.
pub fn coupon(code: &str, target: CouponTarget, quantity: i32, creator: Uuid) -> CouponCode {
    let today = Utc::now().date_naive();
    CouponCode {
        id: Uuid::new_v4(),
        code: code.to_uppercase(),
        target,
        percent: 10,
        quantity,
        available: quantity,
        valid_from: today - chrono::Duration::days(1),
        valid_until: today + chrono::Duration::days(30),
        active: true,
        creator,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[tokio::test]
    async fn redeems_down_to_zero_and_not_below() {
        let store = Arc::new(InMemoryStore::new());
        let tour = Uuid::new_v4();
        store.add_coupon(coupon("SUMMER10", CouponTarget::Tour(tour), 2, Uuid::new_v4()));

        let ledger = CouponLedger::new(store.clone());
        assert!(ledger.redeem("summer10", CouponTarget::Tour(tour)).await.unwrap().is_some());
        assert!(ledger.redeem("SUMMER10", CouponTarget::Tour(tour)).await.unwrap().is_some());
        assert!(ledger.redeem("SUMMER10", CouponTarget::Tour(tour)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wrong_target_or_expired_is_not_applied() {
        let store = Arc::new(InMemoryStore::new());
        let tour = Uuid::new_v4();
        let other_tour = Uuid::new_v4();
        store.add_coupon(coupon("SUMMER10", CouponTarget::Tour(tour), 5, Uuid::new_v4()));

        let mut expired = coupon("OLD5", CouponTarget::Tour(tour), 5, Uuid::new_v4());
        let today = Utc::now().date_naive();
        expired.valid_from = today - chrono::Duration::days(30);
        expired.valid_until = today - chrono::Duration::days(10);
        store.add_coupon(expired);

        let ledger = CouponLedger::new(store.clone());
        assert!(ledger
            .redeem("SUMMER10", CouponTarget::Tour(other_tour))
            .await
            .unwrap()
            .is_none());
        assert!(ledger
            .redeem("SUMMER10", CouponTarget::Hotel(tour))
            .await
            .unwrap()
            .is_none());
        assert!(ledger.redeem("OLD5", CouponTarget::Tour(tour)).await.unwrap().is_none());
        assert!(ledger.redeem("MISSING", CouponTarget::Tour(tour)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_redemption_of_last_unit_admits_exactly_one() {
        let store = Arc::new(InMemoryStore::new());
        let tour = Uuid::new_v4();
        store.add_coupon(coupon("LAST1", CouponTarget::Tour(tour), 1, Uuid::new_v4()));

        let ledger = Arc::new(CouponLedger::new(store.clone()));
        let first = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.redeem("LAST1", CouponTarget::Tour(tour)).await })
        };
        let second = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.redeem("LAST1", CouponTarget::Tour(tour)).await })
        };

        let results = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
        let successes = results.iter().filter(|r| r.is_some()).count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn close_is_terminal_and_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let tour = Uuid::new_v4();
        store.add_coupon(coupon("DONE", CouponTarget::Tour(tour), 5, Uuid::new_v4()));

        let ledger = CouponLedger::new(store.clone());
        let closed = ledger.close("DONE").await.unwrap().unwrap();
        assert!(!closed.active);

        // Closing again changes nothing and still reports the record.
        let again = ledger.close("DONE").await.unwrap().unwrap();
        assert!(!again.active);

        assert!(ledger.redeem("DONE", CouponTarget::Tour(tour)).await.unwrap().is_none());
    }
}
