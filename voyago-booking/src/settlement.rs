use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use voyago_catalog::InventoryGateway;
use voyago_core::notify::NotificationSink;
use voyago_core::payment::{PaymentGateway, PayoutLine};
use voyago_core::profile::ProfileRepository;
use voyago_shared::models::events::{BookingCapturedEvent, PayoutLineEvent, SettlementEvent};
use voyago_shared::pii::Masked;

use crate::models::{Booking, BookingError, BookingItem, ItemRef, LedgerEntry, LedgerKind};
use crate::notify;
use crate::repository::{BookingRepository, LedgerRepository};

/// Outcome of a capture: what was charged and what went out to partners.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub booking_id: Uuid,
    pub total_cents: i64,
    pub currency: String,
    pub payouts: Vec<PartnerPayout>,
}

#[derive(Debug, Clone)]
pub struct PartnerPayout {
    pub receiver: String,
    pub amount_cents: i64,
    /// False when the processor rejected the line or the whole batch
    /// failed; no ledger entry is written for such lines.
    pub accepted: bool,
}

/// Per-partner share of a captured booking, before commission.
struct PartnerShare {
    partner: Uuid,
    subtotal_cents: i64,
}

/// Captures an approved payment session and splits the funds across the
/// partners owning the booked inventory, minus the platform commission.
///
/// The sale is final once the processor executes; payout failures are
/// logged and reconciled out of band, never unwound.
pub struct SettlementSplitter {
    bookings: Arc<dyn BookingRepository>,
    inventory: Arc<dyn InventoryGateway>,
    profiles: Arc<dyn ProfileRepository>,
    ledger: Arc<dyn LedgerRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationSink>,
    commission_bps: u32,
    currency: String,
}

impl SettlementSplitter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        inventory: Arc<dyn InventoryGateway>,
        profiles: Arc<dyn ProfileRepository>,
        ledger: Arc<dyn LedgerRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSink>,
        commission_bps: u32,
        currency: String,
    ) -> Self {
        Self {
            bookings,
            inventory,
            profiles,
            ledger,
            gateway,
            notifier,
            commission_bps,
            currency,
        }
    }

    pub async fn capture(
        &self,
        session_id: &str,
        payer_confirmation: &str,
    ) -> Result<Receipt, BookingError> {
        // 1. Idempotency guard: only a still-pending booking proceeds.
        //    A repeated confirmation finds nothing and changes nothing.
        let booking = self
            .bookings
            .find_pending_by_session(session_id)
            .await?
            .ok_or(BookingError::DuplicateCapture)?;

        // 2. Execute the payment for the stored total. On failure the
        //    booking stays pending; the payer may retry.
        let captured = self
            .gateway
            .execute(session_id, payer_confirmation, booking.total_cents)
            .await
            .map_err(|err| {
                tracing::error!(session = session_id, "payment execute failed: {err}");
                BookingError::PaymentGateway(err.to_string())
            })?;

        // 3. Flip pending → captured exactly once.
        if !self.bookings.mark_captured(booking.id).await? {
            return Err(BookingError::DuplicateCapture);
        }

        // 4. One Sale entry for the full captured amount.
        self.ledger
            .append(&LedgerEntry {
                id: Uuid::new_v4(),
                sender_email: Masked(captured.payer_email.clone()),
                receiver_email: Masked(captured.payee_email.clone()),
                kind: LedgerKind::Sale,
                amount_cents: captured.amount_cents,
                payment_session_id: session_id.to_string(),
                created_at: Utc::now(),
            })
            .await?;

        if let Some(buyer) = self.profiles.profile(booking.buyer).await? {
            self.notifier
                .dispatch(notify::buyer_receipt(&buyer, &booking, &self.currency))
                .await;
        }

        let event = BookingCapturedEvent {
            booking_id: booking.id,
            buyer_id: booking.buyer,
            payment_session_id: session_id.to_string(),
            total_cents: captured.amount_cents,
            currency: self.currency.clone(),
            timestamp: Utc::now().timestamp(),
        };
        tracing::info!(target: "voyago::settlement", event = ?event, "booking captured");
        tracing::info!(
            target: "voyago::settlement",
            event = ?SettlementEvent {
                booking_id: booking.id,
                payment_session_id: session_id.to_string(),
                amount_cents: captured.amount_cents,
                currency: self.currency.clone(),
                event_type: "PAYMENT".to_string(),
                timestamp: Utc::now().timestamp(),
            },
            "settlement recorded"
        );

        // 5. Split and pay out. Never fails the capture.
        let payouts = self.settle_partners(&booking, &captured.payee_email).await?;

        Ok(Receipt {
            booking_id: booking.id,
            total_cents: captured.amount_cents,
            currency: self.currency.clone(),
            payouts,
        })
    }

    async fn settle_partners(
        &self,
        booking: &Booking,
        platform_email: &str,
    ) -> Result<Vec<PartnerPayout>, BookingError> {
        // Group item subtotals by owning partner. Flights are platform
        // inventory and stay on the commission side.
        let mut shares: BTreeMap<String, PartnerShare> = BTreeMap::new();
        for item in &booking.items {
            let Some((payout_email, partner)) = self.partner_for(item).await? else {
                continue;
            };
            shares
                .entry(payout_email)
                .and_modify(|share| share.subtotal_cents += item.subtotal_cents())
                .or_insert(PartnerShare {
                    partner,
                    subtotal_cents: item.subtotal_cents(),
                });
        }

        if shares.is_empty() {
            return Ok(Vec::new());
        }

        let commission_pct = self.commission_bps / 100;
        let lines: Vec<PayoutLine> = shares
            .iter()
            .map(|(receiver, share)| PayoutLine {
                receiver: receiver.clone(),
                amount_cents: payout_amount_cents(share.subtotal_cents, self.commission_bps),
                currency: self.currency.clone(),
                note: format!("New booking. This amount has been deducted {commission_pct}%."),
            })
            .collect();

        let batch_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();

        let receipt = match self.gateway.create_payout(&batch_id, &lines).await {
            Ok(receipt) => receipt,
            Err(err) => {
                // Asymmetric finality: the sale stays captured; the gap is
                // visible in the ledger for out-of-band reconciliation.
                tracing::warn!(
                    booking_id = %booking.id,
                    batch = %batch_id,
                    "payout batch failed, booking remains captured: {err}"
                );
                return Ok(lines
                    .into_iter()
                    .map(|line| PartnerPayout {
                        receiver: line.receiver,
                        amount_cents: line.amount_cents,
                        accepted: false,
                    })
                    .collect());
            }
        };

        let mut payouts = Vec::with_capacity(lines.len());
        for line in lines {
            let accepted = receipt.accepted.iter().any(|a| a.receiver == line.receiver);
            if accepted {
                self.ledger
                    .append(&LedgerEntry {
                        id: Uuid::new_v4(),
                        sender_email: Masked(platform_email.to_string()),
                        receiver_email: Masked(line.receiver.clone()),
                        kind: LedgerKind::Payout,
                        amount_cents: line.amount_cents,
                        payment_session_id: booking.payment_session_id.clone(),
                        created_at: Utc::now(),
                    })
                    .await?;

                tracing::info!(
                    target: "voyago::settlement",
                    event = ?PayoutLineEvent {
                        payment_session_id: booking.payment_session_id.clone(),
                        receiver: line.receiver.clone(),
                        amount_cents: line.amount_cents,
                        currency: self.currency.clone(),
                        timestamp: Utc::now().timestamp(),
                    },
                    "payout accepted"
                );

                if let Some(share) = shares.get(&line.receiver) {
                    if let Some(partner) = self.profiles.profile(share.partner).await? {
                        self.notifier
                            .dispatch(notify::partner_notice(
                                &partner,
                                line.amount_cents,
                                self.commission_bps,
                                &self.currency,
                            ))
                            .await;
                    }
                }
            } else {
                tracing::warn!(
                    booking_id = %booking.id,
                    receiver = %line.receiver,
                    "payout line rejected by processor"
                );
            }
            payouts.push(PartnerPayout {
                receiver: line.receiver,
                amount_cents: line.amount_cents,
                accepted,
            });
        }

        Ok(payouts)
    }

    /// Resolve the payout identity owning an item's inventory.
    async fn partner_for(
        &self,
        item: &BookingItem,
    ) -> Result<Option<(String, Uuid)>, BookingError> {
        let owner = match item.item {
            ItemRef::Tour(id) => self.inventory.tour(id).await?.map(|t| t.owner),
            ItemRef::Room(id) => match self.inventory.room(id).await? {
                Some(room) => self.inventory.hotel(room.hotel_id).await?.map(|h| h.owner),
                None => None,
            },
            ItemRef::Flight(_) => None,
        };
        let Some(owner) = owner else { return Ok(None) };

        match self.profiles.profile(owner).await? {
            Some(profile) => match profile.payout_email {
                Some(payout_email) => Ok(Some((payout_email.into_inner(), owner))),
                None => {
                    tracing::warn!(partner = %owner, "partner has no payout identity, skipping");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

/// Partner payout for a subtotal after the platform cut, rounded half up
/// to the nearest cent.
pub fn payout_amount_cents(subtotal_cents: i64, commission_bps: u32) -> i64 {
    (subtotal_cents * (10_000 - commission_bps as i64) + 5_000) / 10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::models::{CartItem, CustomerContact, ItemType, LedgerKind};
    use crate::notify::LogSink;
    use crate::orchestrator::{BookingOrchestrator, MockPaymentGateway};
    use std::sync::atomic::Ordering;

    fn contact() -> CustomerContact {
        CustomerContact {
            email: Masked("guest@example.com".to_string()),
            first_name: "Ada".to_string(),
            last_name: "Tran".to_string(),
            phone_number: Masked("+8490000000".to_string()),
        }
    }

    fn splitter(store: &Arc<InMemoryStore>, gateway: &Arc<MockPaymentGateway>) -> SettlementSplitter {
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
    }

    /// Two partners, a $60 tour and a $40 room, 10% commission.
    async fn seeded_pending_booking(
        store: &Arc<InMemoryStore>,
        gateway: &Arc<MockPaymentGateway>,
    ) -> (Uuid, String, String) {
        let buyer = store.add_member("buyer@example.com");
        let tour_owner = store.add_partner("tours@example.com", "pp-tours@example.com");
        let hotel_owner = store.add_partner("hotel@example.com", "pp-hotel@example.com");
        let tour = store.add_tour(tour_owner, "City walking tour", 60_00, 10);
        let hotel = store.add_hotel(hotel_owner, "Riverside");
        let room = store.add_room(hotel, "Deluxe 101", 40_00);

        let orchestrator = BookingOrchestrator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            gateway.clone(),
            "USD".to_string(),
        );
        let cart = vec![
            CartItem {
                item_type: ItemType::Tour,
                id: tour,
                quantity: 1,
                price: 60_00,
                customers: vec![contact()],
                checkin: None,
                checkout: None,
                departure_day: Some("01/09/2026".to_string()),
                coupon_code: None,
            },
            CartItem {
                item_type: ItemType::Room,
                id: room,
                quantity: 1,
                price: 40_00,
                customers: vec![contact()],
                checkin: Some("10/06/2026".to_string()),
                checkout: Some("15/06/2026".to_string()),
                departure_day: None,
                coupon_code: None,
            },
        ];
        let outcome = orchestrator.submit_cart(buyer, cart).await.unwrap();
        let booking = store.booking(outcome.booking_id).await.unwrap().unwrap();
        (booking.id, booking.payment_session_id, booking.payer_token)
    }

    #[tokio::test]
    async fn split_sixty_forty_with_ten_percent_commission() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let (booking_id, session, _) = seeded_pending_booking(&store, &gateway).await;

        let receipt = splitter(&store, &gateway).capture(&session, "PAYER-1").await.unwrap();

        assert_eq!(receipt.booking_id, booking_id);
        assert_eq!(receipt.total_cents, 100_00);
        let amounts: Vec<i64> = receipt.payouts.iter().map(|p| p.amount_cents).collect();
        assert_eq!(amounts, vec![54_00, 36_00]);
        assert!(receipt.payouts.iter().all(|p| p.accepted));

        let entries = store.entries_for_session(&session).await.unwrap();
        let sale: i64 = entries
            .iter()
            .filter(|e| e.kind == LedgerKind::Sale)
            .map(|e| e.amount_cents)
            .sum();
        let payouts: i64 = entries
            .iter()
            .filter(|e| e.kind == LedgerKind::Payout)
            .map(|e| e.amount_cents)
            .sum();
        assert_eq!(sale, 100_00);
        assert_eq!(payouts, 90_00);

        let commission = sale - payouts;
        assert!((commission - 10_00).unsigned_abs() <= receipt.payouts.len() as u64);
    }

    #[tokio::test]
    async fn duplicate_confirmation_is_a_no_op() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let (_, session, _) = seeded_pending_booking(&store, &gateway).await;

        let splitter = splitter(&store, &gateway);
        splitter.capture(&session, "PAYER-1").await.unwrap();
        let before = store.ledger_len();

        let err = splitter.capture(&session, "PAYER-1").await.unwrap_err();
        assert!(matches!(err, BookingError::DuplicateCapture));
        assert_eq!(store.ledger_len(), before);
    }

    #[tokio::test]
    async fn execute_failure_leaves_booking_pending() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let (_, session, _) = seeded_pending_booking(&store, &gateway).await;
        gateway.fail_execute.store(true, Ordering::SeqCst);

        let splitter = splitter(&store, &gateway);
        let err = splitter.capture(&session, "PAYER-1").await.unwrap_err();
        assert!(matches!(err, BookingError::PaymentGateway(_)));
        assert_eq!(store.ledger_len(), 0);

        // Retry succeeds once the processor recovers.
        gateway.fail_execute.store(false, Ordering::SeqCst);
        splitter.capture(&session, "PAYER-1").await.unwrap();
    }

    #[tokio::test]
    async fn payout_failure_keeps_sale_final() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let (_, session, _) = seeded_pending_booking(&store, &gateway).await;
        gateway.fail_payouts.store(true, Ordering::SeqCst);

        let receipt = splitter(&store, &gateway).capture(&session, "PAYER-1").await.unwrap();
        assert!(receipt.payouts.iter().all(|p| !p.accepted));

        let entries = store.entries_for_session(&session).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LedgerKind::Sale);

        // The booking is final: a second confirmation is a no-op.
        let err = splitter(&store, &gateway).capture(&session, "PAYER-1").await.unwrap_err();
        assert!(matches!(err, BookingError::DuplicateCapture));
    }

    #[test]
    fn payout_rounding_stays_within_a_cent() {
        assert_eq!(payout_amount_cents(100_00, 1_000), 90_00);
        assert_eq!(payout_amount_cents(99_99, 1_000), 89_99);
        assert_eq!(payout_amount_cents(1, 1_000), 1);
        for subtotal in [1, 7, 33_33, 99_99, 123_45] {
            let payout = payout_amount_cents(subtotal, 1_000);
            let commission = subtotal - payout;
            let exact = subtotal as f64 * 0.10;
            assert!((commission as f64 - exact).abs() <= 1.0);
        }
    }
}
