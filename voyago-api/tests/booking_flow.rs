use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use voyago_api::app;
use voyago_api::middleware::auth::issue_token;
use voyago_api::middleware::resiliency::Resiliency;
use voyago_api::state::{AppState, AuthConfig, RedirectUrls};
use voyago_booking::coupon::coupon;
use voyago_booking::memory::InMemoryStore;
use voyago_booking::models::{CouponTarget, LedgerKind};
use voyago_booking::notify::LogSink;
use voyago_booking::repository::{BookingRepository, LedgerRepository};
use voyago_booking::MockPaymentGateway;
use voyago_core::policy::{Action, Possession, Resource};
use voyago_store::app_config::BusinessRules;

const SECRET: &str = "test-secret";
const SUCCESS_URL: &str = "http://front.example/thank-you";
const FAILED_URL: &str = "http://front.example/failed";

fn test_state(store: &Arc<InMemoryStore>, gateway: &Arc<MockPaymentGateway>) -> AppState {
    AppState {
        inventory: store.clone(),
        bookings: store.clone(),
        coupons: store.clone(),
        ledger: store.clone(),
        profiles: store.clone(),
        policies: store.clone(),
        gateway: gateway.clone(),
        notifier: Arc::new(LogSink),
        redis: None,
        auth: AuthConfig { secret: SECRET.to_string(), expiration: 3600 },
        rules: BusinessRules {
            commission_bps: 1_000,
            currency: "USD".to_string(),
            rate_limit_per_minute: 100,
        },
        urls: RedirectUrls {
            booking_success: SUCCESS_URL.to_string(),
            booking_failed: FAILED_URL.to_string(),
        },
        resiliency: Arc::new(Resiliency::default()),
    }
}

fn grant_defaults(store: &InMemoryStore) {
    store.grant("member", Resource::Booking, Action::Create, Possession::Own);
    store.grant("member", Resource::Booking, Action::ReadAll, Possession::Own);
    store.grant("member", Resource::CouponCode, Action::Update, Possession::Any);
    store.grant("partner", Resource::CouponCode, Action::Update, Possession::Own);
    store.grant("admin", Resource::Booking, Action::Read, Possession::Any);
}

fn bearer(sub: Uuid, role: &str) -> String {
    let token = issue_token(SECRET, sub, "caller@example.com", role, 3600).unwrap();
    format!("Bearer {token}")
}

fn tour_cart_body(tour: Uuid, quantity: i32) -> String {
    json!({
        "booking_list": [{
            "type": "tour",
            "id": tour,
            "quantity": quantity,
            "price": 5000,
            "customers": [{
                "email": "guest@example.com",
                "first_name": "Ada",
                "last_name": "Tran",
                "phone_number": "+8490000000",
            }],
            "departure_day": "01/09/2026",
        }],
    })
    .to_string()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn cart_to_captured_booking_round_trip() {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(MockPaymentGateway::new());
    grant_defaults(&store);
    let buyer = store.add_member("buyer@example.com");
    let owner = store.add_partner("partner@example.com", "pp-partner@example.com");
    let tour = store.add_tour(owner, "Mekong delta", 50_00, 2);

    let app = app(test_state(&store, &gateway));

    // Submit the cart.
    let response = app
        .clone()
        .oneshot(
            Request::post("/booking")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer(buyer, "member"))
                .body(Body::from(tour_cart_body(tour, 2)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], json!(true));
    let redirect = body["data"]["url_redirect"].as_str().unwrap();
    assert!(redirect.contains("token="));
    assert_eq!(store.tour_available(tour), 0);

    // The processor sends the payer back: capture.
    let (bookings, _) = store.list(1, 12).await.unwrap();
    let booking = &bookings[0];
    let success_uri = format!(
        "/booking/success?paymentId={}&PayerID=PAYER-1",
        booking.payment_session_id
    );
    let response = app
        .clone()
        .oneshot(Request::get(success_uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"], SUCCESS_URL);

    // One SALE for the full amount, one PAYOUT for the single partner.
    let entries = store.entries_for_session(&booking.payment_session_id).await.unwrap();
    assert_eq!(entries.len(), 2);
    let sale = entries.iter().find(|e| e.kind == LedgerKind::Sale).unwrap();
    assert_eq!(sale.amount_cents, 100_00);
    let payout = entries.iter().find(|e| e.kind == LedgerKind::Payout).unwrap();
    assert_eq!(payout.amount_cents, 90_00);

    // Repeating the confirmation is a success no-op.
    let response = app
        .clone()
        .oneshot(Request::get(success_uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"], SUCCESS_URL);
    let entries = store.entries_for_session(&booking.payment_session_id).await.unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn cancel_callback_releases_the_hold() {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(MockPaymentGateway::new());
    grant_defaults(&store);
    let buyer = store.add_member("buyer@example.com");
    let owner = store.add_partner("partner@example.com", "pp-partner@example.com");
    let tour = store.add_tour(owner, "Mekong delta", 50_00, 2);

    let app = app(test_state(&store, &gateway));

    let response = app
        .clone()
        .oneshot(
            Request::post("/booking")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer(buyer, "member"))
                .body(Body::from(tour_cart_body(tour, 2)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.tour_available(tour), 0);

    let (bookings, _) = store.list(1, 12).await.unwrap();
    let cancel_uri = format!("/booking/cancel?token={}", bookings[0].payer_token);

    let response = app
        .clone()
        .oneshot(Request::get(cancel_uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"], FAILED_URL);
    assert_eq!(store.tour_available(tour), 2);

    // A second cancellation changes nothing.
    let response = app
        .clone()
        .oneshot(Request::get(cancel_uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(store.tour_available(tour), 2);
}

#[tokio::test]
async fn unavailable_cart_returns_the_item_error_map() {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(MockPaymentGateway::new());
    grant_defaults(&store);
    let buyer = store.add_member("buyer@example.com");
    let owner = store.add_partner("partner@example.com", "pp-partner@example.com");
    let tour = store.add_tour(owner, "Mekong delta", 50_00, 2);

    let app = app(test_state(&store, &gateway));

    let response = app
        .oneshot(
            Request::post("/booking")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer(buyer, "member"))
                .body(Body::from(tour_cart_body(tour, 99)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["errors"]["tour"], json!("tour not available"));
}

#[tokio::test]
async fn booking_requires_token_and_grant() {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(MockPaymentGateway::new());
    grant_defaults(&store);
    let buyer = store.add_member("buyer@example.com");
    let owner = store.add_partner("partner@example.com", "pp-partner@example.com");
    let tour = store.add_tour(owner, "Mekong delta", 50_00, 2);

    let app = app(test_state(&store, &gateway));

    // No token at all.
    let response = app
        .clone()
        .oneshot(
            Request::post("/booking")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(tour_cart_body(tour, 1)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Valid token, but the role has no booking:create grant.
    let response = app
        .clone()
        .oneshot(
            Request::post("/booking")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer(buyer, "guest"))
                .body(Body::from(tour_cart_body(tour, 1)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn coupon_apply_and_close_endpoints() {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(MockPaymentGateway::new());
    grant_defaults(&store);
    let member = store.add_member("buyer@example.com");
    let partner = store.add_partner("partner@example.com", "pp-partner@example.com");
    let tour = store.add_tour(partner, "Mekong delta", 50_00, 5);
    store.add_coupon(coupon("SUMMER10", CouponTarget::Tour(tour), 1, partner));

    let app = app(test_state(&store, &gateway));

    // Apply: one unit available, so only the first of two items wins.
    let body = json!({
        "items": [
            { "type": "tour", "id": tour },
            { "type": "tour", "id": tour },
        ],
    })
    .to_string();
    let response = app
        .clone()
        .oneshot(
            Request::post("/coupon-codes/SUMMER10")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer(member, "member"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["items_result"].as_array().unwrap().len(), 1);

    // Close is terminal and idempotent.
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::patch("/coupon-codes/SUMMER10")
                    .header(header::AUTHORIZATION, bearer(partner, "partner"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["coupon_code"]["active"], json!(false));
    }
}
