use std::sync::Arc;

use voyago_catalog::InventoryGateway;
use voyago_core::StoreResult;

use crate::models::ItemRef;
use crate::repository::BookingRepository;

/// Reverses the inventory hold of a booking the payer abandoned.
///
/// Terminal and idempotent: the hold release is the guard, so repeating a
/// cancellation (or cancelling after capture already released the hold)
/// touches nothing.
pub struct CancellationHandler {
    bookings: Arc<dyn BookingRepository>,
    inventory: Arc<dyn InventoryGateway>,
}

impl CancellationHandler {
    pub fn new(bookings: Arc<dyn BookingRepository>, inventory: Arc<dyn InventoryGateway>) -> Self {
        Self { bookings, inventory }
    }

    pub async fn cancel(&self, payer_token: &str) -> StoreResult<()> {
        // Only the call that actually flips the hold gets the booking back;
        // everything after it is a no-op.
        let Some(booking) = self.bookings.release_hold(payer_token).await? else {
            tracing::debug!(token = payer_token, "cancellation with no live hold, ignoring");
            return Ok(());
        };

        tracing::info!(booking_id = %booking.id, "inventory hold released");

        // Tours hold counted capacity, so it is restored explicitly. Rooms
        // and flights free implicitly: the availability checks stop seeing
        // this booking once the hold flag is down.
        for item in &booking.items {
            if let ItemRef::Tour(tour_id) = item.item {
                if let Err(err) = self
                    .inventory
                    .restore_tour_capacity(tour_id, item.quantity)
                    .await
                {
                    tracing::warn!(tour_id = %tour_id, "failed to restore capacity on cancel: {err}");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::models::{CartItem, CustomerContact, ItemType};
    use crate::orchestrator::{BookingOrchestrator, MockPaymentGateway};
    use crate::settlement::SettlementSplitter;
    use crate::notify::LogSink;
    use voyago_shared::pii::Masked;

    fn contact() -> CustomerContact {
        CustomerContact {
            email: Masked("guest@example.com".to_string()),
            first_name: "Ada".to_string(),
            last_name: "Tran".to_string(),
            phone_number: Masked("+8490000000".to_string()),
        }
    }

    async fn seeded_booking(
        store: &Arc<InMemoryStore>,
        gateway: &Arc<MockPaymentGateway>,
        tour: uuid::Uuid,
        quantity: i32,
    ) -> (String, String) {
        let buyer = store.add_member("buyer@example.com");
        let orchestrator = BookingOrchestrator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            gateway.clone(),
            "USD".to_string(),
        );
        let cart = vec![CartItem {
            item_type: ItemType::Tour,
            id: tour,
            quantity,
            price: 50_00,
            customers: vec![contact()],
            checkin: None,
            checkout: None,
            departure_day: Some("01/09/2026".to_string()),
            coupon_code: None,
        }];
        let outcome = orchestrator.submit_cart(buyer, cart).await.unwrap();
        let booking = store.booking(outcome.booking_id).await.unwrap().unwrap();
        (booking.payment_session_id, booking.payer_token)
    }

    #[tokio::test]
    async fn cancel_restores_reserved_capacity_exactly_once() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let owner = store.add_partner("partner@example.com", "pp@example.com");
        let tour = store.add_tour(owner, "Mekong delta", 50_00, 5);
        let (_, token) = seeded_booking(&store, &gateway, tour, 3).await;
        assert_eq!(store.tour_available(tour), 2);

        let handler = CancellationHandler::new(store.clone(), store.clone());
        handler.cancel(&token).await.unwrap();
        assert_eq!(store.tour_available(tour), 5);

        // Second cancellation is a strict no-op.
        handler.cancel(&token).await.unwrap();
        assert_eq!(store.tour_available(tour), 5);
    }

    #[tokio::test]
    async fn cancel_with_unknown_token_is_a_no_op() {
        let store = Arc::new(InMemoryStore::new());
        let handler = CancellationHandler::new(store.clone(), store.clone());
        handler.cancel("EC-nothere").await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_room_hold_frees_the_dates() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let owner = store.add_partner("partner@example.com", "pp@example.com");
        let hotel = store.add_hotel(owner, "Riverside");
        let room = store.add_room(hotel, "Deluxe 101", 80_00);

        let buyer = store.add_member("buyer@example.com");
        let orchestrator = BookingOrchestrator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            gateway.clone(),
            "USD".to_string(),
        );
        let cart = vec![CartItem {
            item_type: ItemType::Room,
            id: room,
            quantity: 1,
            price: 80_00,
            customers: vec![contact()],
            checkin: Some("10/06/2026".to_string()),
            checkout: Some("15/06/2026".to_string()),
            departure_day: None,
            coupon_code: None,
        }];
        let outcome = orchestrator.submit_cart(buyer, cart.clone()).await.unwrap();
        let booking = store.booking(outcome.booking_id).await.unwrap().unwrap();

        // Same dates are blocked while the hold is live.
        let err = orchestrator.submit_cart(buyer, cart.clone()).await.unwrap_err();
        assert!(matches!(err, crate::models::BookingError::Availability(_)));

        CancellationHandler::new(store.clone(), store.clone())
            .cancel(&booking.payer_token)
            .await
            .unwrap();

        // Released: the identical stay can be booked again.
        orchestrator.submit_cart(buyer, cart).await.unwrap();
    }

    #[tokio::test]
    async fn cancel_after_capture_does_not_release_paid_inventory() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let owner = store.add_partner("partner@example.com", "pp@example.com");
        let tour = store.add_tour(owner, "Mekong delta", 50_00, 5);
        let (session, token) = seeded_booking(&store, &gateway, tour, 3).await;

        SettlementSplitter::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            gateway.clone(),
            Arc::new(LogSink),
            1_000,
            "USD".to_string(),
        )
        .capture(&session, "PAYER-1")
        .await
        .unwrap();

        // Capture released the hold; hitting the cancel URL afterwards
        // must not hand the sold seats back.
        CancellationHandler::new(store.clone(), store.clone())
            .cancel(&token)
            .await
            .unwrap();
        assert_eq!(store.tour_available(tour), 2);
    }
}
