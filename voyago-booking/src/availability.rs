use std::sync::Arc;

use voyago_catalog::InventoryGateway;
use voyago_core::StoreResult;

use crate::models::{parse_day, CartItem, ErrorMap, ItemType};
use crate::repository::BookingRepository;

/// Validates a cart of heterogeneous items against live inventory and
/// existing holds. Checks only; reservations are committed later by the
/// orchestrator through guarded updates.
pub struct AvailabilityChecker {
    inventory: Arc<dyn InventoryGateway>,
    bookings: Arc<dyn BookingRepository>,
}

impl AvailabilityChecker {
    pub fn new(inventory: Arc<dyn InventoryGateway>, bookings: Arc<dyn BookingRepository>) -> Self {
        Self { inventory, bookings }
    }

    /// Check every item; the whole cart is rejected when any fails.
    /// Failures are keyed by item type, matching the client contract.
    pub async fn check_cart(&self, cart: &[CartItem]) -> StoreResult<Result<(), ErrorMap>> {
        let mut errors = ErrorMap::new();

        for item in cart {
            if !self.check_item(item).await? {
                errors.insert(
                    item.item_type.as_str().to_string(),
                    format!("{} not available", item.item_type.as_str()),
                );
            }
        }

        if errors.is_empty() {
            Ok(Ok(()))
        } else {
            Ok(Err(errors))
        }
    }

    pub async fn check_item(&self, item: &CartItem) -> StoreResult<bool> {
        match item.item_type {
            ItemType::Tour => {
                let tour = self.inventory.tour(item.id).await?;
                Ok(matches!(tour, Some(t) if t.available >= item.quantity))
            }
            ItemType::Flight => {
                if self.inventory.flight(item.id).await?.is_none() {
                    return Ok(false);
                }
                // Single-use: any captured or holding booking consumes it.
                Ok(!self.bookings.flight_is_held(item.id).await?)
            }
            ItemType::Room => {
                if self.inventory.room(item.id).await?.is_none() {
                    return Ok(false);
                }
                let (checkin, checkout) = match (&item.checkin, &item.checkout) {
                    (Some(ci), Some(co)) => match (parse_day(ci), parse_day(co)) {
                        (Ok(ci), Ok(co)) => (ci, co),
                        _ => return Ok(false),
                    },
                    _ => return Ok(false),
                };
                Ok(!self
                    .bookings
                    .room_hold_overlaps(item.id, checkin, checkout)
                    .await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::models::CustomerContact;
    use uuid::Uuid;
    use voyago_shared::pii::Masked;

    fn contact() -> CustomerContact {
        CustomerContact {
            email: Masked("guest@example.com".to_string()),
            first_name: "Ada".to_string(),
            last_name: "Tran".to_string(),
            phone_number: Masked("+8490000000".to_string()),
        }
    }

    fn tour_item(id: Uuid, quantity: i32) -> CartItem {
        CartItem {
            item_type: ItemType::Tour,
            id,
            quantity,
            price: 50_00,
            customers: vec![contact()],
            checkin: None,
            checkout: None,
            departure_day: Some("01/09/2026".to_string()),
            coupon_code: None,
        }
    }

    fn room_item(id: Uuid, checkin: &str, checkout: &str) -> CartItem {
        CartItem {
            item_type: ItemType::Room,
            id,
            quantity: 1,
            price: 80_00,
            customers: vec![contact()],
            checkin: Some(checkin.to_string()),
            checkout: Some(checkout.to_string()),
            departure_day: None,
            coupon_code: None,
        }
    }

    #[tokio::test]
    async fn tour_requires_remaining_capacity() {
        let store = Arc::new(InMemoryStore::new());
        let owner = store.add_partner("partner@example.com", "pp-partner@example.com");
        let tour = store.add_tour(owner, "Mekong delta", 50_00, 2);

        let checker = AvailabilityChecker::new(store.clone(), store.clone());
        assert!(checker.check_item(&tour_item(tour, 2)).await.unwrap());
        assert!(!checker.check_item(&tour_item(tour, 3)).await.unwrap());
        assert!(!checker.check_item(&tour_item(Uuid::new_v4(), 1)).await.unwrap());
    }

    #[tokio::test]
    async fn whole_cart_rejected_when_one_item_fails() {
        let store = Arc::new(InMemoryStore::new());
        let owner = store.add_partner("partner@example.com", "pp-partner@example.com");
        let tour = store.add_tour(owner, "Mekong delta", 50_00, 5);

        let checker = AvailabilityChecker::new(store.clone(), store.clone());
        let cart = vec![tour_item(tour, 1), room_item(Uuid::new_v4(), "10/06/2026", "12/06/2026")];

        let errors = checker.check_cart(&cart).await.unwrap().unwrap_err();
        assert_eq!(errors.get("room").unwrap(), "room not available");
        assert!(!errors.contains_key("tour"));
    }

    #[tokio::test]
    async fn room_overlap_rejects_including_boundary_touch() {
        let store = Arc::new(InMemoryStore::new());
        let owner = store.add_partner("partner@example.com", "pp-partner@example.com");
        let hotel = store.add_hotel(owner, "Riverside");
        let room = store.add_room(hotel, "Deluxe 101", 80_00);

        // Existing hold 10-15 Jun.
        store.hold_room_for_test(room, "10/06/2026", "15/06/2026");

        let checker = AvailabilityChecker::new(store.clone(), store.clone());

        // 14-18 Jun overlaps at 14-15.
        assert!(!checker
            .check_item(&room_item(room, "14/06/2026", "18/06/2026"))
            .await
            .unwrap());
        // Checkout day equal to the existing checkin day still counts.
        assert!(!checker
            .check_item(&room_item(room, "05/06/2026", "10/06/2026"))
            .await
            .unwrap());
        // Disjoint stay is fine.
        assert!(checker
            .check_item(&room_item(room, "16/06/2026", "20/06/2026"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn flight_is_single_use() {
        let store = Arc::new(InMemoryStore::new());
        let flight = store.add_flight("SGN-HAN 0900", 120_00);

        let checker = AvailabilityChecker::new(store.clone(), store.clone());
        let cart_item = CartItem {
            item_type: ItemType::Flight,
            id: flight,
            quantity: 1,
            price: 120_00,
            customers: vec![contact()],
            checkin: None,
            checkout: None,
            departure_day: None,
            coupon_code: None,
        };

        assert!(checker.check_item(&cart_item).await.unwrap());
        store.hold_flight_for_test(flight);
        assert!(!checker.check_item(&cart_item).await.unwrap());
    }
}
