use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    error::AppError,
    models::{
        password_reset::{PasswordReset, RequestPasswordResetPayload, ResetPasswordPayload},
        token::AuthToken,
        user::{AuthResponse, LoginRequest, PushAddressRequest, SignupRequest, User, UserResponse},
    },
    services::access::is_token_valid,
    state::AppState,
    types::{AuthTokenId, PasswordResetId, UserId},
    utils::{
        password::{hash_password, verify_against_dummy, verify_password},
        token::{generate_token, hash_token, LONG_TOKEN_BYTES, SHORT_TOKEN_BYTES},
    },
    validation::validate_payload,
};

pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;
    validate_payload(&payload)?;

    let password_hash = hash_password(&payload.password)?;
    let user = User::new(payload.username, payload.email, password_hash);
    state.store.create_user(&user).await?;
    tracing::info!(user_id = %user.id, "user signed up");

    let token = issue_auth_token(&state, user.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserResponse::new(&user, Vec::new()),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    validate_payload(&payload)?;

    let Some(user) = state.store.find_user_by_email(&payload.email).await? else {
        verify_against_dummy(&payload.password);
        return Err(invalid_credentials());
    };
    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(invalid_credentials());
    }

    let token = issue_auth_token(&state, user.id).await?;
    let family_ids = state.store.family_ids_for_user(user.id).await?;
    Ok(Json(AuthResponse {
        token,
        user: UserResponse::new(&user, family_ids),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<UserResponse>, AppError> {
    let family_ids = state.store.family_ids_for_user(user.id).await?;
    Ok(Json(UserResponse::new(&user, family_ids)))
}

pub async fn update_push_address(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    payload: Result<Json<PushAddressRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let Json(payload) = payload?;
    validate_payload(&payload)?;

    let push_address = payload
        .push_address
        .map(|address| address.trim().to_string())
        .filter(|address| !address.is_empty());
    state
        .store
        .set_push_address(user.id, push_address.clone())
        .await?;
    user.push_address = push_address;

    let family_ids = state.store.family_ids_for_user(user.id).await?;
    Ok(Json(UserResponse::new(&user, family_ids)))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    payload: Result<Json<RequestPasswordResetPayload>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(payload) = payload?;
    validate_payload(&payload)?;

    let user = state
        .store
        .find_user_by_email(&payload.email)
        .await?
        .ok_or_else(|| AppError::NotFound("No account for that email".to_string()))?;

    let token = generate_token(LONG_TOKEN_BYTES);
    let now = Utc::now();
    let reset = PasswordReset {
        id: PasswordResetId::new(),
        user_id: user.id,
        token_hash: hash_token(&token),
        created_at: now,
        expires_at: Some(now + state.config.password_reset_ttl()),
    };
    state.store.insert_password_reset(&reset).await?;

    let reset_url = format!(
        "{}/reset-password?token={}",
        state.config.public_base_url, token
    );
    if let Err(err) = state
        .mailer
        .send_password_reset(&user.email, &reset_url)
        .await
    {
        // A link nobody received must not stay redeemable.
        if let Err(cleanup) = state.store.delete_password_reset(reset.id).await {
            tracing::error!(error = %cleanup, "failed to discard undelivered reset token");
        }
        return Err(err.into());
    }
    tracing::info!(user_id = %user.id, "password reset requested");

    Ok(Json(json!({
        "message": "A password reset link has been sent to your email"
    })))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    payload: Result<Json<ResetPasswordPayload>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(payload) = payload?;
    validate_payload(&payload)?;

    let reset = state
        .store
        .find_password_reset(&hash_token(&payload.token))
        .await?
        .ok_or_else(reset_not_found)?;
    if !is_token_valid(reset.expires_at, Utc::now()) {
        state.store.delete_password_reset(reset.id).await?;
        return Err(AppError::BadRequest("Reset token has expired".to_string()));
    }

    let password_hash = hash_password(&payload.new_password)?;
    if !state
        .store
        .consume_password_reset(reset.id, &password_hash)
        .await?
    {
        return Err(reset_not_found());
    }
    tracing::info!(user_id = %reset.user_id, "password reset completed");

    Ok(Json(json!({ "message": "Password has been reset" })))
}

async fn issue_auth_token(state: &AppState, user_id: UserId) -> Result<String, AppError> {
    let token = generate_token(SHORT_TOKEN_BYTES);
    let now = Utc::now();
    state
        .store
        .insert_auth_token(&AuthToken {
            id: AuthTokenId::new(),
            user_id,
            token_hash: hash_token(&token),
            created_at: now,
            expires_at: Some(now + state.config.auth_token_ttl()),
        })
        .await?;
    Ok(token)
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid email or password".to_string())
}

fn reset_not_found() -> AppError {
    AppError::NotFound("Reset token not found".to_string())
}
