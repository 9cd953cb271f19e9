use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use voyago_core::policy::{Action, Possession, Resource};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Profile id of the caller.
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

/// Bearer-token middleware: validates the JWT and injects the claims into
/// request extensions for the handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Authentication("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Authentication("Expected a Bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Authentication(e.to_string()))?;

    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}

/// Policy gate consulted by every guarded handler before it acts.
pub async fn authorize(
    state: &AppState,
    claims: &Claims,
    resource: Resource,
    action: Action,
    possession: Possession,
) -> Result<(), AppError> {
    let allowed = state
        .policies
        .allows(&claims.role, resource, action, possession)
        .await?;
    if allowed {
        Ok(())
    } else {
        Err(AppError::Authorization("You don't have permission".to_string()))
    }
}

/// Issue a token for a profile. Login itself lives outside this service;
/// this is used by operational tooling and the test suites.
pub fn issue_token(
    secret: &str,
    sub: Uuid,
    email: &str,
    role: &str,
    expiration_seconds: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = chrono::Utc::now().timestamp() as usize + expiration_seconds as usize;
    let claims = Claims { sub, email: email.to_string(), role: role.to_string(), exp };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}
