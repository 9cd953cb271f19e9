use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use voyago_catalog::InventoryGateway;
use voyago_core::payment::{
    CapturedPayment, ChargeLine, PaymentGateway, PaymentSession, PayoutLine, PayoutReceipt,
};
use voyago_core::profile::ProfileRepository;

use crate::availability::AvailabilityChecker;
use crate::models::{
    parse_day, Booking, BookingError, BookingItem, CartItem, CouponTarget, ErrorMap, ItemRef,
    ItemType,
};
use crate::repository::{BookingRepository, CouponRepository};

/// Result of a submitted cart: the handle the buyer is redirected to.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub booking_id: Uuid,
    pub redirect_url: String,
}

/// Recorded undo for one completed orchestration step. Run in reverse
/// order on failure; every compensation is idempotent so a crashed run can
/// be replayed.
enum Compensation {
    DeleteItem(Uuid),
    RestoreTourCapacity { tour_id: Uuid, quantity: i32 },
}

/// Drives a validated cart into a pending booking with a live payment
/// session.
pub struct BookingOrchestrator {
    inventory: Arc<dyn InventoryGateway>,
    bookings: Arc<dyn BookingRepository>,
    coupons: Arc<dyn CouponRepository>,
    profiles: Arc<dyn ProfileRepository>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl BookingOrchestrator {
    pub fn new(
        inventory: Arc<dyn InventoryGateway>,
        bookings: Arc<dyn BookingRepository>,
        coupons: Arc<dyn CouponRepository>,
        profiles: Arc<dyn ProfileRepository>,
        gateway: Arc<dyn PaymentGateway>,
        currency: String,
    ) -> Self {
        Self { inventory, bookings, coupons, profiles, gateway, currency }
    }

    pub async fn submit_cart(
        &self,
        buyer_id: Uuid,
        cart: Vec<CartItem>,
    ) -> Result<SubmitOutcome, BookingError> {
        // 1. Resolve the buyer; an unknown profile cannot book.
        let buyer = self
            .profiles
            .profile(buyer_id)
            .await?
            .ok_or(BookingError::Forbidden)?;

        // 2. Fail fast on malformed input, before any side effect.
        validate_cart(&cart).map_err(BookingError::Validation)?;

        // 3. Check the whole cart; all-or-nothing at cart level.
        let checker = AvailabilityChecker::new(self.inventory.clone(), self.bookings.clone());
        if let Err(errors) = checker.check_cart(&cart).await? {
            return Err(BookingError::Availability(errors));
        }

        // 4. Persist items and commit guarded reservations, recording a
        //    compensation per completed step.
        let mut compensations: Vec<Compensation> = Vec::new();
        let mut items: Vec<BookingItem> = Vec::new();
        let mut lines: Vec<ChargeLine> = Vec::new();

        if let Err(err) = self
            .persist_items(&cart, &mut items, &mut lines, &mut compensations)
            .await
        {
            self.run_compensations(&compensations).await;
            return Err(err);
        }

        // 5. Cart total from immutable item subtotals.
        let total_cents: i64 = items.iter().map(BookingItem::subtotal_cents).sum();

        // 6. Open the payment session. A create failure leaves no booking.
        let description = format!("Booking payment for {}", buyer.full_name());
        let session = match self
            .gateway
            .create_session(total_cents, &self.currency, &lines, &description)
            .await
        {
            Ok(session) => session,
            Err(err) => {
                tracing::error!("payment session creation failed: {err}");
                self.run_compensations(&compensations).await;
                return Err(BookingError::PaymentGateway(
                    "Please try again later.".to_string(),
                ));
            }
        };

        // 7. Persist the pending booking with its hold live.
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            items,
            buyer: buyer_id,
            total_cents,
            captured: false,
            hold_active: true,
            payment_session_id: session.id.clone(),
            payer_token: session.payer_token.clone(),
            redirect_url: session.redirect_url.clone(),
            created_at: now,
            updated_at: now,
        };
        if let Err(err) = self.bookings.insert_booking(&booking).await {
            tracing::error!(booking_id = %booking.id, "failed to persist booking: {err}");
            self.run_compensations(&compensations).await;
            return Err(BookingError::InventoryMutation(
                "cannot create booking".to_string(),
            ));
        }

        tracing::info!(
            booking_id = %booking.id,
            session = %session.id,
            total_cents,
            "booking pending, buyer redirected to payment"
        );

        Ok(SubmitOutcome {
            booking_id: booking.id,
            redirect_url: session.redirect_url,
        })
    }

    async fn persist_items(
        &self,
        cart: &[CartItem],
        items: &mut Vec<BookingItem>,
        lines: &mut Vec<ChargeLine>,
        compensations: &mut Vec<Compensation>,
    ) -> Result<(), BookingError> {
        let today = Utc::now().date_naive();

        for entry in cart {
            // Inventory name drives the processor line item; availability
            // already proved existence.
            let (item_ref, name) = match entry.item_type {
                ItemType::Tour => {
                    let tour = self
                        .inventory
                        .tour(entry.id)
                        .await?
                        .ok_or(BookingError::InventoryMutation("tour vanished".to_string()))?;
                    (ItemRef::Tour(entry.id), tour.name)
                }
                ItemType::Room => {
                    let room = self
                        .inventory
                        .room(entry.id)
                        .await?
                        .ok_or(BookingError::InventoryMutation("room vanished".to_string()))?;
                    (ItemRef::Room(entry.id), room.name)
                }
                ItemType::Flight => {
                    let flight = self
                        .inventory
                        .flight(entry.id)
                        .await?
                        .ok_or(BookingError::InventoryMutation("flight vanished".to_string()))?;
                    (ItemRef::Flight(entry.id), flight.name)
                }
            };

            // Canonical dates; validation guaranteed the formats.
            let (date_start, date_end) = match entry.item_type {
                ItemType::Tour => (
                    entry.departure_day.as_deref().and_then(|d| parse_day(d).ok()),
                    None,
                ),
                ItemType::Room => (
                    entry.checkin.as_deref().and_then(|d| parse_day(d).ok()),
                    entry.checkout.as_deref().and_then(|d| parse_day(d).ok()),
                ),
                ItemType::Flight => (None, None),
            };

            // Coupon resolution: a failed redeem means "not applied",
            // never a failed cart.
            let coupon_code = match (&entry.coupon_code, entry.item_type) {
                (Some(code), ItemType::Tour) => self
                    .coupons
                    .redeem(code, CouponTarget::Tour(entry.id), today)
                    .await?
                    .map(|c| c.code),
                (Some(code), ItemType::Room) => {
                    let room = self.inventory.room(entry.id).await?;
                    match room {
                        Some(room) => self
                            .coupons
                            .redeem(code, CouponTarget::Hotel(room.hotel_id), today)
                            .await?
                            .map(|c| c.code),
                        None => None,
                    }
                }
                _ => None,
            };

            // Tours commit capacity now, through the guarded decrement.
            if let ItemRef::Tour(tour_id) = item_ref {
                if !self
                    .inventory
                    .reserve_tour_capacity(tour_id, entry.quantity)
                    .await?
                {
                    let mut errors = ErrorMap::new();
                    errors.insert("tour".to_string(), "tour not available".to_string());
                    return Err(BookingError::Availability(errors));
                }
                compensations.push(Compensation::RestoreTourCapacity {
                    tour_id,
                    quantity: entry.quantity,
                });
            }

            let item = BookingItem {
                id: Uuid::new_v4(),
                item: item_ref,
                price_cents: entry.price,
                quantity: entry.quantity,
                coupon_code,
                date_start,
                date_end,
                customers: entry.customers.clone(),
                created_at: Utc::now(),
            };

            match self.bookings.insert_item(&item).await {
                Ok(()) => compensations.push(Compensation::DeleteItem(item.id)),
                Err(voyago_core::StoreError::Conflict(_)) => {
                    // Lost the per-room race between check and commit.
                    let mut errors = ErrorMap::new();
                    errors.insert(
                        entry.item_type.as_str().to_string(),
                        format!("{} not available", entry.item_type.as_str()),
                    );
                    return Err(BookingError::Availability(errors));
                }
                Err(err) => return Err(err.into()),
            }

            lines.push(ChargeLine {
                name,
                price_cents: entry.price,
                quantity: entry.quantity,
                currency: self.currency.clone(),
            });
            items.push(item);
        }

        Ok(())
    }

    /// Best effort, reverse order. A failing compensation is logged and
    /// skipped, never retried here.
    async fn run_compensations(&self, compensations: &[Compensation]) {
        for compensation in compensations.iter().rev() {
            match compensation {
                Compensation::DeleteItem(id) => {
                    if let Err(err) = self.bookings.delete_item(*id).await {
                        tracing::warn!(item_id = %id, "compensation failed to delete item: {err}");
                    }
                }
                Compensation::RestoreTourCapacity { tour_id, quantity } => {
                    if let Err(err) = self
                        .inventory
                        .restore_tour_capacity(*tour_id, *quantity)
                        .await
                    {
                        tracing::warn!(tour_id = %tour_id, "compensation failed to restore capacity: {err}");
                    }
                }
            }
        }
    }
}

/// Structural validation only; no I/O, no side effects.
pub fn validate_cart(cart: &[CartItem]) -> Result<(), ErrorMap> {
    let mut errors = ErrorMap::new();

    if cart.is_empty() {
        errors.insert(
            "booking_list".to_string(),
            "Booking list must not be empty".to_string(),
        );
        return Err(errors);
    }

    for entry in cart {
        if entry.quantity < 1 {
            errors.insert("quantity".to_string(), "Quantity must be at least 1".to_string());
        }
        if entry.price < 0 {
            errors.insert("price".to_string(), "Price must not be negative".to_string());
        }
        if entry.customers.is_empty() {
            errors.insert("customers".to_string(), "Customers field is required".to_string());
        }

        match entry.item_type {
            ItemType::Room => {
                match (&entry.checkin, &entry.checkout) {
                    (Some(checkin), Some(checkout)) => {
                        let start = parse_day(checkin);
                        let end = parse_day(checkout);
                        if start.is_err() {
                            errors.insert(
                                "checkin".to_string(),
                                "Checkin must be DD/MM/YYYY".to_string(),
                            );
                        }
                        if end.is_err() {
                            errors.insert(
                                "checkout".to_string(),
                                "Checkout must be DD/MM/YYYY".to_string(),
                            );
                        }
                        if let (Ok(start), Ok(end)) = (start, end) {
                            if end < start {
                                errors.insert(
                                    "checkout".to_string(),
                                    "Checkout must not precede checkin".to_string(),
                                );
                            }
                        }
                    }
                    _ => {
                        errors.insert(
                            "checkin".to_string(),
                            "Checkin and checkout are required for rooms".to_string(),
                        );
                    }
                }
            }
            ItemType::Tour => {
                if let Some(day) = &entry.departure_day {
                    if parse_day(day).is_err() {
                        errors.insert(
                            "departure_day".to_string(),
                            "Departure day must be DD/MM/YYYY".to_string(),
                        );
                    }
                }
            }
            ItemType::Flight => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Stand-in processor used by tests and the no-database dev mode.
pub struct MockPaymentGateway {
    sessions: Mutex<HashMap<String, i64>>,
    pub fail_create: AtomicBool,
    pub fail_execute: AtomicBool,
    pub fail_payouts: AtomicBool,
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            fail_create: AtomicBool::new(false),
            fail_execute: AtomicBool::new(false),
            fail_payouts: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_session(
        &self,
        amount_cents: i64,
        _currency: &str,
        _lines: &[ChargeLine],
        _description: &str,
    ) -> Result<PaymentSession, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err("simulated processor outage".into());
        }
        let id = format!("PAY-{}", Uuid::new_v4().simple());
        let payer_token = format!("EC-{}", Uuid::new_v4().simple());
        self.sessions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id.clone(), amount_cents);
        Ok(PaymentSession {
            redirect_url: format!("https://checkout.sandbox.example/approve?token={payer_token}"),
            id,
            payer_token,
            created_at: Utc::now(),
        })
    }

    async fn execute(
        &self,
        session_id: &str,
        _payer_confirmation: &str,
        amount_cents: i64,
    ) -> Result<CapturedPayment, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_execute.load(Ordering::SeqCst) {
            return Err("simulated execute failure".into());
        }
        let known = self
            .sessions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(session_id)
            .copied();
        let amount = known.unwrap_or(amount_cents);
        Ok(CapturedPayment {
            session_id: session_id.to_string(),
            payer_email: "buyer@sandbox.example".to_string(),
            payee_email: "merchant@voyago.example".to_string(),
            amount_cents: amount,
            currency: "USD".to_string(),
        })
    }

    async fn create_payout(
        &self,
        batch_id: &str,
        lines: &[PayoutLine],
    ) -> Result<PayoutReceipt, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_payouts.load(Ordering::SeqCst) {
            return Err("simulated payout failure".into());
        }
        Ok(PayoutReceipt {
            batch_id: batch_id.to_string(),
            accepted: lines.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::models::CustomerContact;
    use voyago_shared::pii::Masked;

    fn contact() -> CustomerContact {
        CustomerContact {
            email: Masked("guest@example.com".to_string()),
            first_name: "Ada".to_string(),
            last_name: "Tran".to_string(),
            phone_number: Masked("+8490000000".to_string()),
        }
    }

    fn orchestrator(
        store: &Arc<InMemoryStore>,
        gateway: &Arc<MockPaymentGateway>,
    ) -> BookingOrchestrator {
        BookingOrchestrator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            gateway.clone(),
            "USD".to_string(),
        )
    }

    fn tour_cart(tour: Uuid, quantity: i32) -> Vec<CartItem> {
        vec![CartItem {
            item_type: ItemType::Tour,
            id: tour,
            quantity,
            price: 50_00,
            customers: vec![contact()],
            checkin: None,
            checkout: None,
            departure_day: Some("01/09/2026".to_string()),
            coupon_code: None,
        }]
    }

    #[tokio::test]
    async fn booking_last_capacity_blocks_the_next_cart() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let buyer = store.add_member("buyer@example.com");
        let owner = store.add_partner("partner@example.com", "pp@example.com");
        let tour = store.add_tour(owner, "Mekong delta", 50_00, 2);

        let orchestrator = orchestrator(&store, &gateway);

        let outcome = orchestrator.submit_cart(buyer, tour_cart(tour, 2)).await.unwrap();
        assert!(outcome.redirect_url.contains("token=EC-"));
        assert_eq!(store.tour_available(tour), 0);

        // Identical second cart must now fail availability.
        let err = orchestrator.submit_cart(buyer, tour_cart(tour, 2)).await.unwrap_err();
        match err {
            BookingError::Availability(map) => {
                assert_eq!(map.get("tour").unwrap(), "tour not available")
            }
            other => panic!("expected availability error, got {other:?}"),
        }
        assert_eq!(store.tour_available(tour), 0);
    }

    #[tokio::test]
    async fn session_create_failure_rolls_back_items_and_capacity() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        gateway.fail_create.store(true, Ordering::SeqCst);
        let buyer = store.add_member("buyer@example.com");
        let owner = store.add_partner("partner@example.com", "pp@example.com");
        let tour = store.add_tour(owner, "Mekong delta", 50_00, 2);

        let orchestrator = orchestrator(&store, &gateway);
        let err = orchestrator.submit_cart(buyer, tour_cart(tour, 2)).await.unwrap_err();
        assert!(matches!(err, BookingError::PaymentGateway(_)));

        // Compensation restored the guarded decrement, so the same cart
        // succeeds once the processor is back.
        assert_eq!(store.tour_available(tour), 2);
        gateway.fail_create.store(false, Ordering::SeqCst);
        orchestrator.submit_cart(buyer, tour_cart(tour, 2)).await.unwrap();
        assert_eq!(store.tour_available(tour), 0);
    }

    #[tokio::test]
    async fn malformed_cart_fails_fast_without_side_effects() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let buyer = store.add_member("buyer@example.com");
        let owner = store.add_partner("partner@example.com", "pp@example.com");
        let tour = store.add_tour(owner, "Mekong delta", 50_00, 5);

        let mut cart = tour_cart(tour, 1);
        cart[0].customers.clear();
        cart[0].departure_day = Some("2026-09-01".to_string());

        let orchestrator = orchestrator(&store, &gateway);
        let err = orchestrator.submit_cart(buyer, cart).await.unwrap_err();
        match err {
            BookingError::Validation(map) => {
                assert!(map.contains_key("customers"));
                assert!(map.contains_key("departure_day"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(store.tour_available(tour), 5);
    }

    #[tokio::test]
    async fn unknown_buyer_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let owner = store.add_partner("partner@example.com", "pp@example.com");
        let tour = store.add_tour(owner, "Mekong delta", 50_00, 5);

        let orchestrator = orchestrator(&store, &gateway);
        let err = orchestrator
            .submit_cart(Uuid::new_v4(), tour_cart(tour, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Forbidden));
    }

    #[tokio::test]
    async fn concurrent_overlapping_room_carts_admit_exactly_one() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let buyer_a = store.add_member("a@example.com");
        let buyer_b = store.add_member("b@example.com");
        let owner = store.add_partner("partner@example.com", "pp@example.com");
        let hotel = store.add_hotel(owner, "Riverside");
        let room = store.add_room(hotel, "Deluxe 101", 80_00);

        let room_cart = |checkin: &str, checkout: &str| {
            vec![CartItem {
                item_type: ItemType::Room,
                id: room,
                quantity: 1,
                price: 80_00,
                customers: vec![contact()],
                checkin: Some(checkin.to_string()),
                checkout: Some(checkout.to_string()),
                departure_day: None,
                coupon_code: None,
            }]
        };

        let orchestrator = Arc::new(orchestrator(&store, &gateway));

        // 10-15 Jun and 14-18 Jun overlap; the insert-side recheck under
        // the per-room lock must reject whichever cart lands second.
        let first_cart = room_cart("10/06/2026", "15/06/2026");
        let second_cart = room_cart("14/06/2026", "18/06/2026");
        let first = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.submit_cart(buyer_a, first_cart).await })
        };
        let second = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.submit_cart(buyer_b, second_cart).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for result in results {
            if let Err(err) = result {
                assert!(matches!(err, BookingError::Availability(_)));
            }
        }
    }

    #[tokio::test]
    async fn concurrent_last_seat_admits_exactly_one() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let buyer_a = store.add_member("a@example.com");
        let buyer_b = store.add_member("b@example.com");
        let owner = store.add_partner("partner@example.com", "pp@example.com");
        let tour = store.add_tour(owner, "Mekong delta", 50_00, 1);

        let orchestrator = Arc::new(orchestrator(&store, &gateway));

        let first = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.submit_cart(buyer_a, tour_cart(tour, 1)).await })
        };
        let second = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.submit_cart(buyer_b, tour_cart(tour, 1)).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert_eq!(store.tour_available(tour), 0);
    }
}
