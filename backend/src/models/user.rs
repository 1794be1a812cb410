//! Models that represent users and authentication payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::types::{FamilyId, UserId};
use crate::validation::rules;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Database representation of a user account.
pub struct User {
    /// Unique identifier for the user.
    pub id: UserId,
    /// Display name shown to other family members.
    pub username: String,
    /// Lower-cased email address used for login and password reset.
    pub email: String,
    /// Argon2 hash of the user's password.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Device push address, absent until a client registers one.
    pub push_address: Option<String>,
    /// Creation timestamp for auditing.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp for auditing.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Constructs a new user with a freshly generated identifier.
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            username,
            email: email.to_lowercase(),
            password_hash,
            push_address: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
/// Payload for creating a new account.
pub struct SignupRequest {
    #[validate(custom(function = "rules::validate_username"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
/// Credentials submitted by a user attempting to authenticate.
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
/// Registers (or clears, when `null`) the caller's push address.
pub struct PushAddressRequest {
    #[validate(length(min = 1, max = 4096))]
    pub push_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Public-facing representation of a user returned by the API.
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub family_ids: Vec<FamilyId>,
    pub has_push_address: bool,
}

impl UserResponse {
    pub fn new(user: &User, family_ids: Vec<FamilyId>) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            family_ids,
            has_push_address: user.push_address.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Bearer token issued on signup or login.
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Minimal member view embedded in family responses.
pub struct MemberResponse {
    pub id: UserId,
    pub username: String,
}

impl From<&User> for MemberResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}
