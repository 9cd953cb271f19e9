pub mod app_config;
pub mod booking_repo;
pub mod coupon_repo;
pub mod database;
pub mod gateway;
pub mod inventory_repo;
pub mod ledger_repo;
pub mod policy_repo;
pub mod profile_repo;
pub mod redis_repo;

pub use app_config::Config;
pub use booking_repo::PgBookingRepository;
pub use coupon_repo::PgCouponRepository;
pub use database::DbClient;
pub use gateway::RestPaymentGateway;
pub use inventory_repo::PgInventoryGateway;
pub use ledger_repo::PgLedgerRepository;
pub use policy_repo::{seed_policies, PgPolicyStore};
pub use profile_repo::PgProfileRepository;
pub use redis_repo::RedisClient;
