use std::sync::Arc;

use voyago_booking::repository::{BookingRepository, CouponRepository, LedgerRepository};
use voyago_booking::{
    BookingOrchestrator, CancellationHandler, CouponLedger, SettlementSplitter,
};
use voyago_catalog::InventoryGateway;
use voyago_core::notify::NotificationSink;
use voyago_core::payment::PaymentGateway;
use voyago_core::policy::PolicyStore;
use voyago_core::profile::ProfileRepository;
use voyago_store::app_config::BusinessRules;
use voyago_store::RedisClient;

use crate::middleware::resiliency::Resiliency;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct RedirectUrls {
    pub booking_success: String,
    pub booking_failed: String,
}

#[derive(Clone)]
pub struct AppState {
    pub inventory: Arc<dyn InventoryGateway>,
    pub bookings: Arc<dyn BookingRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub policies: Arc<dyn PolicyStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn NotificationSink>,
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub rules: BusinessRules,
    pub urls: RedirectUrls,
    pub resiliency: Arc<Resiliency>,
}

impl AppState {
    pub fn orchestrator(&self) -> BookingOrchestrator {
        BookingOrchestrator::new(
            self.inventory.clone(),
            self.bookings.clone(),
            self.coupons.clone(),
            self.profiles.clone(),
            self.gateway.clone(),
            self.rules.currency.clone(),
        )
    }

    pub fn splitter(&self) -> SettlementSplitter {
        SettlementSplitter::new(
            self.bookings.clone(),
            self.inventory.clone(),
            self.profiles.clone(),
            self.ledger.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.rules.commission_bps,
            self.rules.currency.clone(),
        )
    }

    pub fn canceller(&self) -> CancellationHandler {
        CancellationHandler::new(self.bookings.clone(), self.inventory.clone())
    }

    pub fn coupon_ledger(&self) -> CouponLedger {
        CouponLedger::new(self.coupons.clone())
    }
}
