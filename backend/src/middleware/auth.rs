use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::{
    error::AppError, models::user::User, services::access::is_token_valid, state::AppState,
    utils::token::hash_token,
};

/// Resolves `Authorization: Bearer <token>` to a user and stores it in the
/// request extensions for handlers to extract.
pub async fn auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or_else(unauthorized)?;
    let user = authenticate(&state, token).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub async fn authenticate(state: &AppState, token: &str) -> Result<User, AppError> {
    let record = state
        .store
        .find_auth_token(&hash_token(token))
        .await?
        .ok_or_else(unauthorized)?;
    if !is_token_valid(record.expires_at, Utc::now()) {
        return Err(unauthorized());
    }

    state
        .store
        .find_user(record.user_id)
        .await?
        .ok_or_else(unauthorized)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    parse_bearer_token(value)
}

fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

fn unauthorized() -> AppError {
    AppError::Unauthorized("Invalid or missing bearer token".to_string())
}
