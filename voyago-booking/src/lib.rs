pub mod availability;
pub mod cancellation;
pub mod coupon;
pub mod memory;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod repository;
pub mod settlement;

pub use availability::AvailabilityChecker;
pub use cancellation::CancellationHandler;
pub use coupon::CouponLedger;
pub use models::{Booking, BookingError, BookingItem, CartItem, CouponCode, LedgerEntry};
pub use orchestrator::{BookingOrchestrator, MockPaymentGateway, SubmitOutcome};
pub use settlement::{Receipt, SettlementSplitter};
