//! In-memory backend implementing every persistence seam of the engine.
//!
//! Used by the dev server (no database configured) and by the test suites.
//! One mutex guards the whole state, so every guarded update (tour
//! capacity, coupon redemption, room hold recheck) is naturally atomic;
//! the SQL implementations provide the same contract with conditional
//! updates and advisory locks.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use voyago_catalog::{Flight, Hotel, InventoryGateway, Room, Tour};
use voyago_core::profile::{Profile, ProfileRepository};
use voyago_core::policy::{Action, PolicyRule, PolicyStore, Possession, Resource};
use voyago_core::{StoreError, StoreResult};
use voyago_shared::pii::Masked;

use crate::models::{
    Booking, BookingItem, CouponCode, CouponTarget, CustomerContact, ItemRef, LedgerEntry,
};
use crate::repository::{BookingRepository, CouponRepository, LedgerRepository};

#[derive(Default)]
struct State {
    tours: HashMap<Uuid, Tour>,
    hotels: HashMap<Uuid, Hotel>,
    rooms: HashMap<Uuid, Room>,
    flights: HashMap<Uuid, Flight>,
    /// Every persisted item, attached or not.
    items: HashMap<Uuid, BookingItem>,
    /// item id → owning booking id, set when the booking row lands.
    attached: HashMap<Uuid, Uuid>,
    bookings: HashMap<Uuid, Booking>,
    coupons: HashMap<String, CouponCode>,
    ledger: Vec<LedgerEntry>,
    profiles: HashMap<Uuid, Profile>,
    policies: Vec<PolicyRule>,
}

pub struct InMemoryStore {
    state: Mutex<State>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn add_member(&self, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().profiles.insert(
            id,
            Profile {
                id,
                email: Masked(email.to_string()),
                first_name: "Member".to_string(),
                last_name: "User".to_string(),
                payout_email: None,
            },
        );
        id
    }

    pub fn add_partner(&self, email: &str, payout_email: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().profiles.insert(
            id,
            Profile {
                id,
                email: Masked(email.to_string()),
                first_name: "Partner".to_string(),
                last_name: "User".to_string(),
                payout_email: Some(Masked(payout_email.to_string())),
            },
        );
        id
    }

    pub fn add_tour(&self, owner: Uuid, name: &str, price_cents: i64, available: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().tours.insert(
            id,
            Tour { id, name: name.to_string(), owner, price_cents, capacity: available, available },
        );
        id
    }

    pub fn add_hotel(&self, owner: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().hotels.insert(id, Hotel { id, name: name.to_string(), owner });
        id
    }

    pub fn add_room(&self, hotel_id: Uuid, name: &str, price_cents: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.lock()
            .rooms
            .insert(id, Room { id, hotel_id, name: name.to_string(), price_cents, beds: 2 });
        id
    }

    pub fn add_flight(&self, name: &str, price_cents: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().flights.insert(id, Flight { id, name: name.to_string(), price_cents });
        id
    }

    pub fn add_coupon(&self, coupon: CouponCode) {
        self.lock().coupons.insert(coupon.code.clone(), coupon);
    }

    pub fn grant(&self, role: &str, resource: Resource, action: Action, possession: Possession) {
        self.lock().policies.push(PolicyRule {
            role: role.to_string(),
            resource,
            action,
            possession,
        });
    }

    pub fn tour_available(&self, id: Uuid) -> i32 {
        self.lock().tours.get(&id).map(|t| t.available).unwrap_or(0)
    }

    pub fn ledger_len(&self) -> usize {
        self.lock().ledger.len()
    }

    // ------------------------------------------------------------------
    // Test fixtures: synthetic held bookings
    // ------------------------------------------------------------------

    fn synthetic_hold(&self, item: ItemRef, start: Option<NaiveDate>, end: Option<NaiveDate>) {
        let now = Utc::now();
        let booking_item = BookingItem {
            id: Uuid::new_v4(),
            item,
            price_cents: 0,
            quantity: 1,
            coupon_code: None,
            date_start: start,
            date_end: end,
            customers: vec![CustomerContact {
                email: Masked("holder@example.com".to_string()),
                first_name: "Hold".to_string(),
                last_name: "Er".to_string(),
                phone_number: Masked("+000".to_string()),
            }],
            created_at: now,
        };
        let booking = Booking {
            id: Uuid::new_v4(),
            items: vec![booking_item.clone()],
            buyer: Uuid::new_v4(),
            total_cents: 0,
            captured: false,
            hold_active: true,
            payment_session_id: format!("seed-{}", Uuid::new_v4().simple()),
            payer_token: format!("seed-tok-{}", Uuid::new_v4().simple()),
            redirect_url: String::new(),
            created_at: now,
            updated_at: now,
        };
        let mut state = self.lock();
        state.items.insert(booking_item.id, booking_item.clone());
        state.attached.insert(booking_item.id, booking.id);
        state.bookings.insert(booking.id, booking);
    }

    pub fn hold_room_for_test(&self, room_id: Uuid, checkin: &str, checkout: &str) {
        let start = crate::models::parse_day(checkin).ok();
        let end = crate::models::parse_day(checkout).ok();
        self.synthetic_hold(ItemRef::Room(room_id), start, end);
    }

    pub fn hold_flight_for_test(&self, flight_id: Uuid) {
        self.synthetic_hold(ItemRef::Flight(flight_id), None, None);
    }
}

fn overlaps(
    a_start: Option<NaiveDate>,
    a_end: Option<NaiveDate>,
    b_start: NaiveDate,
    b_end: NaiveDate,
) -> bool {
    match (a_start, a_end) {
        // Inclusive on both ends: a checkout day blocks an equal checkin day.
        (Some(s), Some(e)) => b_start <= e && b_end >= s,
        _ => false,
    }
}

fn paginate<T: Clone>(rows: Vec<T>, page: u32, page_size: u32) -> (Vec<T>, u64) {
    let total = rows.len() as u64;
    let skip = (page_size as usize) * (page.max(1) as usize - 1);
    let page_rows = rows.into_iter().skip(skip).take(page_size as usize).collect();
    (page_rows, total)
}

impl State {
    /// Item is a live hold: its booking is captured or still holding, or
    /// it has no booking row yet (mid-orchestration).
    fn item_holds(&self, item_id: Uuid) -> bool {
        match self.attached.get(&item_id) {
            Some(booking_id) => self
                .bookings
                .get(booking_id)
                .map(|b| b.hold_active || b.captured)
                .unwrap_or(false),
            None => true,
        }
    }

    fn partner_owns_item(&self, partner: Uuid, item: &BookingItem) -> bool {
        match item.item {
            ItemRef::Tour(id) => self.tours.get(&id).map(|t| t.owner == partner).unwrap_or(false),
            ItemRef::Room(id) => self
                .rooms
                .get(&id)
                .and_then(|r| self.hotels.get(&r.hotel_id))
                .map(|h| h.owner == partner)
                .unwrap_or(false),
            ItemRef::Flight(_) => false,
        }
    }
}

#[async_trait]
impl InventoryGateway for InMemoryStore {
    async fn tour(&self, id: Uuid) -> StoreResult<Option<Tour>> {
        Ok(self.lock().tours.get(&id).cloned())
    }

    async fn room(&self, id: Uuid) -> StoreResult<Option<Room>> {
        Ok(self.lock().rooms.get(&id).cloned())
    }

    async fn hotel(&self, id: Uuid) -> StoreResult<Option<Hotel>> {
        Ok(self.lock().hotels.get(&id).cloned())
    }

    async fn flight(&self, id: Uuid) -> StoreResult<Option<Flight>> {
        Ok(self.lock().flights.get(&id).cloned())
    }

    async fn reserve_tour_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<bool> {
        let mut state = self.lock();
        match state.tours.get_mut(&id) {
            Some(tour) if tour.available >= quantity => {
                tour.available -= quantity;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("tour {id}"))),
        }
    }

    async fn restore_tour_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<()> {
        let mut state = self.lock();
        match state.tours.get_mut(&id) {
            Some(tour) => {
                tour.available += quantity;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("tour {id}"))),
        }
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn insert_item(&self, item: &BookingItem) -> StoreResult<()> {
        let mut state = self.lock();

        // Per-room serialization: the state lock is held across the
        // recheck and the insert, so two overlapping carts cannot both
        // pass.
        if let ItemRef::Room(room_id) = item.item {
            let (start, end) = match (item.date_start, item.date_end) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    return Err(StoreError::Serialization(
                        "room item missing stay dates".to_string(),
                    ))
                }
            };
            let taken = state.items.values().any(|other| {
                other.item == ItemRef::Room(room_id)
                    && state.item_holds(other.id)
                    && overlaps(other.date_start, other.date_end, start, end)
            });
            if taken {
                return Err(StoreError::Conflict(format!("room {room_id} already held")));
            }
        }

        state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete_item(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.lock();
        state.items.remove(&id);
        state.attached.remove(&id);
        Ok(())
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut state = self.lock();
        for item in &booking.items {
            state.items.entry(item.id).or_insert_with(|| item.clone());
            state.attached.insert(item.id, booking.id);
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.lock().bookings.get(&id).cloned())
    }

    async fn find_pending_by_session(&self, session_id: &str) -> StoreResult<Option<Booking>> {
        Ok(self
            .lock()
            .bookings
            .values()
            .find(|b| b.payment_session_id == session_id && !b.captured)
            .cloned())
    }

    async fn mark_captured(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.lock();
        match state.bookings.get_mut(&id) {
            Some(b) if !b.captured => {
                b.captured = true;
                b.hold_active = false;
                b.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("booking {id}"))),
        }
    }

    async fn release_hold(&self, payer_token: &str) -> StoreResult<Option<Booking>> {
        let mut state = self.lock();
        let released = state
            .bookings
            .values_mut()
            .find(|b| b.payer_token == payer_token && b.hold_active)
            .map(|b| {
                b.hold_active = false;
                b.updated_at = Utc::now();
                b.clone()
            });
        Ok(released)
    }

    async fn flight_is_held(&self, flight_id: Uuid) -> StoreResult<bool> {
        let state = self.lock();
        Ok(state
            .items
            .values()
            .any(|item| item.item == ItemRef::Flight(flight_id) && state.item_holds(item.id)))
    }

    async fn room_hold_overlaps(
        &self,
        room_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<bool> {
        let state = self.lock();
        Ok(state.items.values().any(|item| {
            item.item == ItemRef::Room(room_id)
                && state.item_holds(item.id)
                && overlaps(item.date_start, item.date_end, start, end)
        }))
    }

    async fn list(&self, page: u32, page_size: u32) -> StoreResult<(Vec<Booking>, u64)> {
        let mut rows: Vec<Booking> = self.lock().bookings.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, page, page_size))
    }

    async fn list_by_buyer(
        &self,
        buyer: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<Booking>, u64)> {
        let mut rows: Vec<Booking> = self
            .lock()
            .bookings
            .values()
            .filter(|b| b.buyer == buyer)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, page, page_size))
    }

    async fn list_by_partner(
        &self,
        partner: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<Booking>, u64)> {
        let state = self.lock();
        let mut rows: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.items.iter().any(|item| state.partner_owns_item(partner, item)))
            .cloned()
            .collect();
        drop(state);
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(paginate(rows, page, page_size))
    }
}

#[async_trait]
impl CouponRepository for InMemoryStore {
    async fn insert(&self, coupon: &CouponCode) -> StoreResult<()> {
        let mut state = self.lock();
        if state.coupons.contains_key(&coupon.code) {
            return Err(StoreError::Conflict(format!("coupon {} exists", coupon.code)));
        }
        state.coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(())
    }

    async fn find(&self, code: &str) -> StoreResult<Option<CouponCode>> {
        Ok(self.lock().coupons.get(&code.to_uppercase()).cloned())
    }

    async fn redeem(
        &self,
        code: &str,
        target: CouponTarget,
        today: NaiveDate,
    ) -> StoreResult<Option<CouponCode>> {
        let mut state = self.lock();
        // Guard and decrement under one lock: two concurrent redemptions of
        // a single remaining unit cannot both pass.
        let redeemed = state.coupons.get_mut(&code.to_uppercase()).and_then(|coupon| {
            let valid = coupon.active
                && coupon.target == target
                && coupon.valid_from <= today
                && today <= coupon.valid_until
                && coupon.available > 0;
            if valid {
                coupon.available -= 1;
                Some(coupon.clone())
            } else {
                None
            }
        });
        Ok(redeemed)
    }

    async fn close(&self, code: &str) -> StoreResult<Option<CouponCode>> {
        let mut state = self.lock();
        Ok(state.coupons.get_mut(&code.to_uppercase()).map(|coupon| {
            coupon.active = false;
            coupon.clone()
        }))
    }

    async fn list(&self, page: u32, page_size: u32) -> StoreResult<(Vec<CouponCode>, u64)> {
        let mut rows: Vec<CouponCode> = self.lock().coupons.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, page, page_size))
    }

    async fn list_by_creator(
        &self,
        creator: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<CouponCode>, u64)> {
        let mut rows: Vec<CouponCode> = self
            .lock()
            .coupons
            .values()
            .filter(|c| c.creator == creator)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, page, page_size))
    }
}

#[async_trait]
impl LedgerRepository for InMemoryStore {
    async fn append(&self, entry: &LedgerEntry) -> StoreResult<()> {
        self.lock().ledger.push(entry.clone());
        Ok(())
    }

    async fn entries_for_session(&self, session_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self
            .lock()
            .ledger
            .iter()
            .filter(|e| e.payment_session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryStore {
    async fn profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.lock().profiles.get(&id).cloned())
    }

    async fn profile_by_payout_email(&self, payout_email: &str) -> StoreResult<Option<Profile>> {
        Ok(self
            .lock()
            .profiles
            .values()
            .find(|p| p.payout_email.as_ref().map(|e| e.inner().as_str()) == Some(payout_email))
            .cloned())
    }
}

#[async_trait]
impl PolicyStore for InMemoryStore {
    async fn allows(
        &self,
        role: &str,
        resource: Resource,
        action: Action,
        possession: Possession,
    ) -> StoreResult<bool> {
        Ok(self.lock().policies.iter().any(|rule| {
            rule.role == role
                && rule.resource == resource
                && rule.action == action
                && rule.possession == possession
        }))
    }
}
