use async_trait::async_trait;

use voyago_core::notify::{Notification, NotificationSink};
use voyago_core::profile::Profile;

use crate::models::Booking;

/// Receipt payload for the buyer after a successful capture.
pub fn buyer_receipt(buyer: &Profile, booking: &Booking, currency: &str) -> Notification {
    let mut body = format!(
        "Hi {}, you are paid successfully!\n\nBooking #: {}\nTotal: {} {:.2}\n\nItems:\n",
        buyer.full_name(),
        booking.id,
        currency,
        booking.total_cents as f64 / 100.0,
    );
    for item in &booking.items {
        body.push_str(&format!(
            "  - {} x{} at {} {:.2}\n",
            item.item.item_type().as_str(),
            item.quantity,
            currency,
            item.price_cents as f64 / 100.0,
        ));
    }
    Notification {
        to: buyer.email.clone(),
        subject: "Payment Notification".to_string(),
        body,
    }
}

/// Payout notice for a partner whose payout line was accepted.
pub fn partner_notice(
    partner: &Profile,
    payout_cents: i64,
    commission_bps: u32,
    currency: &str,
) -> Notification {
    let body = format!(
        "Hi {}, you have a new booking!\n\nDeduction: {}%\nTotal: {} {:.2}\n",
        partner.full_name(),
        commission_bps / 100,
        currency,
        payout_cents as f64 / 100.0,
    );
    Notification {
        to: partner.email.clone(),
        subject: "Payment Notification".to_string(),
        body,
    }
}

/// Sink that records dispatches in the log stream. Stands in for the
/// external templating/delivery service in dev mode and tests.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn dispatch(&self, notification: Notification) {
        tracing::info!(to = %notification.to, subject = %notification.subject, "notification dispatched");
    }
}
