//! Models for password reset functionality.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::types::{PasswordResetId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
/// Database representation of a password reset token.
pub struct PasswordReset {
    /// Unique identifier for the password reset record.
    pub id: PasswordResetId,
    /// User ID associated with this reset token.
    pub user_id: UserId,
    /// SHA-256 hash of the reset token.
    pub token_hash: String,
    /// Creation timestamp for auditing.
    pub created_at: DateTime<Utc>,
    /// Timestamp when this token expires.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
/// Payload for requesting a password reset.
pub struct RequestPasswordResetPayload {
    /// Email address of the user requesting password reset.
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
/// Payload for resetting password with a token.
pub struct ResetPasswordPayload {
    /// Password reset token from the email.
    #[validate(length(min = 16, message = "Invalid reset token"))]
    pub token: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub new_password: String,
}
