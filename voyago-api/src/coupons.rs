use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use voyago_booking::models::{parse_day, CouponCode, CouponTarget, ErrorMap};
use voyago_core::policy::{Action, Possession, Resource};

use crate::error::AppError;
use crate::middleware::auth::{auth_middleware, authorize, Claims};
use crate::state::AppState;

const PAGE_SIZE: u32 = 12;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/coupon-codes", get(list_coupons).post(create_coupon))
        .route("/coupon-codes/partner", get(list_own_coupons))
        .route("/coupon-codes/{code}", post(apply_coupon).patch(close_coupon))
        .layer(axum::middleware::from_fn_with_state(state, auth_middleware))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApplyItem {
    #[serde(rename = "type")]
    scope: String,
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct ApplyCouponRequest {
    items: Vec<ApplyItem>,
}

#[derive(Debug, Deserialize)]
struct CreateCouponRequest {
    code: String,
    #[serde(rename = "type")]
    scope: String,
    tour: Option<Uuid>,
    hotel: Option<Uuid>,
    percent: Option<i32>,
    quantity: Option<i32>,
    date_start: String,
    date_end: String,
}

/// POST /coupon-codes/{code}
///
/// Atomically redeems the code against each submitted item; the response
/// lists only the redemptions that actually went through.
async fn apply_coupon(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ApplyCouponRequest>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &claims, Resource::CouponCode, Action::Update, Possession::Any).await?;

    let mut targets = Vec::with_capacity(req.items.len());
    for item in &req.items {
        match item.scope.as_str() {
            "tour" => targets.push(CouponTarget::Tour(item.id)),
            "hotel" => targets.push(CouponTarget::Hotel(item.id)),
            other => {
                let mut errors = ErrorMap::new();
                errors.insert(
                    "type".to_string(),
                    format!("Type of coupon code must be hotel or tour, got {other}"),
                );
                return Err(AppError::Validation(errors));
            }
        }
    }

    let redeemed = state.coupon_ledger().redeem_for_items(&code, &targets).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "items_result": redeemed },
    })))
}

/// PATCH /coupon-codes/{code}: terminal close, idempotent.
async fn close_coupon(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &claims, Resource::CouponCode, Action::Update, Possession::Own).await?;

    let coupon = state
        .coupon_ledger()
        .close(&code)
        .await?
        .ok_or_else(|| AppError::NotFound("Coupon code not found".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "data": { "coupon_code": coupon },
    })))
}

/// POST /coupon-codes
async fn create_coupon(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCouponRequest>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &claims, Resource::CouponCode, Action::Create, Possession::Own).await?;

    let mut errors = ErrorMap::new();

    if req.code.trim().is_empty() {
        errors.insert("code".to_string(), "Code field is required".to_string());
    }

    let valid_from = parse_day(&req.date_start);
    if valid_from.is_err() {
        errors.insert("date_start".to_string(), "Date start must be DD/MM/YYYY".to_string());
    }
    let valid_until = parse_day(&req.date_end);
    if valid_until.is_err() {
        errors.insert("date_end".to_string(), "Date end must be DD/MM/YYYY".to_string());
    }

    match req.percent {
        Some(p) if p > 0 => {}
        Some(_) => {
            errors.insert("percent".to_string(), "Percent must be greater than 0".to_string());
        }
        None => {
            errors.insert("percent".to_string(), "Percent field is required".to_string());
        }
    }

    match req.quantity {
        Some(q) if q > 0 => {}
        Some(_) => {
            errors.insert("quantity".to_string(), "Quantity must be greater than 0".to_string());
        }
        None => {
            errors.insert("quantity".to_string(), "Quantity field is required".to_string());
        }
    }

    let target = match req.scope.as_str() {
        "tour" => match req.tour {
            Some(id) => Some(CouponTarget::Tour(id)),
            None => {
                errors.insert("tour".to_string(), "Tour field is required".to_string());
                None
            }
        },
        "hotel" => match req.hotel {
            Some(id) => Some(CouponTarget::Hotel(id)),
            None => {
                errors.insert("hotel".to_string(), "Hotel field is required".to_string());
                None
            }
        },
        _ => {
            errors.insert(
                "type".to_string(),
                "Type of coupon code must be hotel or tour".to_string(),
            );
            None
        }
    };

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    let (target, valid_from, valid_until) =
        (target.unwrap(), valid_from.unwrap(), valid_until.unwrap());

    // The referenced inventory must exist.
    let target_exists = match target {
        CouponTarget::Tour(id) => state.inventory.tour(id).await?.is_some(),
        CouponTarget::Hotel(id) => state.inventory.hotel(id).await?.is_some(),
    };
    if !target_exists {
        return Err(AppError::NotFound(format!("{} is not exist.", req.scope)));
    }

    if state.coupons.find(&req.code).await?.is_some() {
        let mut errors = ErrorMap::new();
        errors.insert("error".to_string(), "This coupon code is exist.".to_string());
        return Err(AppError::Validation(errors));
    }

    let quantity = req.quantity.unwrap_or(0);
    let coupon = CouponCode {
        id: Uuid::new_v4(),
        code: req.code.to_uppercase(),
        target,
        percent: req.percent.unwrap_or(0),
        quantity,
        available: quantity,
        valid_from,
        valid_until,
        active: true,
        creator: claims.sub,
        created_at: Utc::now(),
    };
    state.coupons.insert(&coupon).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "coupon": coupon },
    })))
}

/// GET /coupon-codes
async fn list_coupons(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &claims, Resource::CouponCode, Action::Read, Possession::Any).await?;

    let page = query.page.unwrap_or(1).max(1);
    let (coupons, total) = state.coupons.list(page, PAGE_SIZE).await?;
    let returned = coupons.len();
    Ok(paged(json!(coupons), page, returned, total))
}

/// GET /coupon-codes/partner
async fn list_own_coupons(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &claims, Resource::CouponCode, Action::Read, Possession::Own).await?;

    let page = query.page.unwrap_or(1).max(1);
    let (coupons, total) = state.coupons.list_by_creator(claims.sub, page, PAGE_SIZE).await?;
    let returned = coupons.len();
    Ok(paged(json!(coupons), page, returned, total))
}

fn paged(rows: Value, page: u32, returned: usize, total: u64) -> Json<Value> {
    let total_page = (total + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64;
    Json(json!({
        "success": true,
        "data": { "coupon_codes": rows },
        "meta": {
            "page": page,
            "page_size": returned,
            "total_page": total_page,
            "total_size": total,
        },
    }))
}
