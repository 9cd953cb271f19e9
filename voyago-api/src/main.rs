use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voyago_api::middleware::resiliency::Resiliency;
use voyago_api::state::{AppState, AuthConfig, RedirectUrls};
use voyago_api::app;
use voyago_booking::memory::InMemoryStore;
use voyago_booking::notify::LogSink;
use voyago_booking::repository::{BookingRepository, CouponRepository, LedgerRepository};
use voyago_booking::MockPaymentGateway;
use voyago_catalog::InventoryGateway;
use voyago_core::payment::PaymentGateway;
use voyago_core::policy::PolicyStore;
use voyago_core::profile::ProfileRepository;
use voyago_store::policy_repo::SEED_RULES;
use voyago_store::{
    seed_policies, Config, DbClient, PgBookingRepository, PgCouponRepository, PgInventoryGateway,
    PgLedgerRepository, PgPolicyStore, PgProfileRepository, RedisClient, RestPaymentGateway,
};

struct Backend {
    inventory: Arc<dyn InventoryGateway>,
    bookings: Arc<dyn BookingRepository>,
    coupons: Arc<dyn CouponRepository>,
    ledger: Arc<dyn LedgerRepository>,
    profiles: Arc<dyn ProfileRepository>,
    policies: Arc<dyn PolicyStore>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voyago_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting Voyago API on port {}", config.server.port);

    let backend = if config.database.url.is_empty() {
        tracing::warn!("no database configured, using the volatile in-memory backend");
        let store = Arc::new(InMemoryStore::new());
        for (role, resource, action, possession) in SEED_RULES {
            store.grant(role, *resource, *action, *possession);
        }
        Backend {
            inventory: store.clone(),
            bookings: store.clone(),
            coupons: store.clone(),
            ledger: store.clone(),
            profiles: store.clone(),
            policies: store,
        }
    } else {
        let db = DbClient::new(&config.database.url)
            .await
            .expect("Failed to connect to Postgres");
        db.migrate().await.expect("Failed to run migrations");
        seed_policies(&db.pool).await.expect("Failed to seed policies");
        Backend {
            inventory: Arc::new(PgInventoryGateway::new(db.pool.clone())),
            bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
            coupons: Arc::new(PgCouponRepository::new(db.pool.clone())),
            ledger: Arc::new(PgLedgerRepository::new(db.pool.clone())),
            profiles: Arc::new(PgProfileRepository::new(db.pool.clone())),
            policies: Arc::new(PgPolicyStore::new(db.pool.clone())),
        }
    };

    let gateway: Arc<dyn PaymentGateway> = if config.payment.base_url.is_empty() {
        tracing::warn!("no payment processor configured, using the mock gateway");
        Arc::new(MockPaymentGateway::new())
    } else {
        Arc::new(RestPaymentGateway::new(
            config.payment.base_url.clone(),
            config.payment.client_id.clone(),
            config.payment.secret.clone(),
            config.payment.return_url.clone(),
            config.payment.cancel_url.clone(),
        ))
    };

    let redis = if config.redis.url.is_empty() {
        None
    } else {
        let client = RedisClient::new(&config.redis.url)
            .await
            .expect("Failed to connect to Redis");
        client.ping().await.expect("Redis did not answer PING");
        Some(Arc::new(client))
    };

    let app_state = AppState {
        inventory: backend.inventory,
        bookings: backend.bookings,
        coupons: backend.coupons,
        ledger: backend.ledger,
        profiles: backend.profiles,
        policies: backend.policies,
        gateway,
        notifier: Arc::new(LogSink),
        redis,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        rules: config.business_rules.clone(),
        urls: RedirectUrls {
            booking_success: config.urls.booking_success.clone(),
            booking_failed: config.urls.booking_failed.clone(),
        },
        resiliency: Arc::new(Resiliency::default()),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .unwrap();
}
