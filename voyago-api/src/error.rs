use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use voyago_booking::models::{BookingError, ErrorMap};

#[derive(Debug)]
pub enum AppError {
    Authentication(String),
    Authorization(String),
    /// Per-field / per-item error map, HTTP 400.
    Validation(ErrorMap),
    NotFound(String),
    Conflict(String),
    /// Upstream processor trouble; the message is shown to the client.
    Gateway(String),
    /// Everything else; message goes to the log, not to the client.
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, errors) = match self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": msg }))
            }
            AppError::Authorization(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::Validation(map) => (StatusCode::BAD_REQUEST, json!(map)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Gateway(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
            AppError::Internal(msg) => {
                tracing::error!("internal server error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "errors": errors,
        }));

        (status, body).into_response()
    }
}

impl From<voyago_core::StoreError> for AppError {
    fn from(err: voyago_core::StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(map) | BookingError::Availability(map) => {
                AppError::Validation(map)
            }
            BookingError::Forbidden => {
                AppError::Authorization("You don't have permission".to_string())
            }
            BookingError::PaymentGateway(msg) => AppError::Gateway(msg),
            BookingError::InventoryMutation(msg) => AppError::Gateway(msg),
            BookingError::DuplicateCapture => {
                AppError::Conflict("payment already finalized".to_string())
            }
            BookingError::PayoutFailure(msg) => AppError::Internal(msg),
            BookingError::Store(err) => AppError::Internal(err.to_string()),
        }
    }
}
