use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use voyago_booking::models::{BookingError, CartItem};
use voyago_core::policy::{Action, Possession, Resource};

use crate::error::AppError;
use crate::middleware::auth::{auth_middleware, authorize, Claims};
use crate::state::AppState;

const PAGE_SIZE: u32 = 12;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/booking", post(create_booking).get(list_bookings))
        .route("/booking/member", get(list_member_bookings))
        .route("/booking/partner", get(list_partner_bookings))
        .layer(axum::middleware::from_fn_with_state(state, auth_middleware));

    // Browser-redirect callbacks from the payment processor carry no auth.
    let callbacks = Router::new()
        .route("/booking/success", get(booking_success))
        .route("/booking/cancel", get(booking_cancel));

    protected.merge(callbacks)
}

#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    booking_list: Vec<CartItem>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SuccessQuery {
    #[serde(rename = "paymentId")]
    payment_id: String,
    #[serde(rename = "PayerID")]
    payer_id: String,
}

#[derive(Debug, Deserialize)]
struct CancelQuery {
    token: String,
}

fn paged(key: &str, rows: Value, page: u32, returned: usize, total: u64) -> Json<Value> {
    let total_page = (total + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64;
    Json(json!({
        "success": true,
        "data": { key: rows },
        "meta": {
            "page": page,
            "page_size": returned,
            "total_page": total_page,
            "total_size": total,
        },
    }))
}

/// POST /booking
async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &claims, Resource::Booking, Action::Create, Possession::Own).await?;

    let outcome = state.orchestrator().submit_cart(claims.sub, req.booking_list).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "url_redirect": outcome.redirect_url },
    })))
}

/// GET /booking/success?paymentId=&PayerID=
///
/// Processor return URL. Only ever answers with a redirect; repeated
/// confirmations of the same session are success no-ops.
async fn booking_success(
    State(state): State<AppState>,
    Query(query): Query<SuccessQuery>,
) -> Redirect {
    match state.splitter().capture(&query.payment_id, &query.payer_id).await {
        Ok(receipt) => {
            tracing::info!(booking_id = %receipt.booking_id, "capture complete");
            Redirect::to(&state.urls.booking_success)
        }
        Err(BookingError::DuplicateCapture) => Redirect::to(&state.urls.booking_success),
        Err(err) => {
            tracing::error!("capture failed: {err}");
            Redirect::to(&state.urls.booking_failed)
        }
    }
}

/// GET /booking/cancel?token=
async fn booking_cancel(
    State(state): State<AppState>,
    Query(query): Query<CancelQuery>,
) -> Redirect {
    if let Err(err) = state.canceller().cancel(&query.token).await {
        tracing::error!("cancellation failed: {err}");
    }
    Redirect::to(&state.urls.booking_failed)
}

/// GET /booking
async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &claims, Resource::Booking, Action::Read, Possession::Any).await?;

    let page = query.page.unwrap_or(1).max(1);
    let (bookings, total) = state.bookings.list(page, PAGE_SIZE).await?;
    let returned = bookings.len();
    Ok(paged("bookings", json!(bookings), page, returned, total))
}

/// GET /booking/member
async fn list_member_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &claims, Resource::Booking, Action::ReadAll, Possession::Own).await?;

    let page = query.page.unwrap_or(1).max(1);
    let (bookings, total) = state.bookings.list_by_buyer(claims.sub, page, PAGE_SIZE).await?;
    let returned = bookings.len();
    Ok(paged("bookings", json!(bookings), page, returned, total))
}

/// GET /booking/partner
async fn list_partner_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &claims, Resource::Booking, Action::ReadAll, Possession::Own).await?;

    let page = query.page.unwrap_or(1).max(1);
    let (bookings, total) = state.bookings.list_by_partner(claims.sub, page, PAGE_SIZE).await?;
    let returned = bookings.len();
    Ok(paged("bookings", json!(bookings), page, returned, total))
}
