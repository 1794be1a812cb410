//! Opaque tokens: bearer auth tokens and single-use family join tokens.
//!
//! Only the SHA-256 hash of a token value is persisted; the clear value is
//! handed to the client once and never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{AuthTokenId, FamilyId, JoinTokenId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct AuthToken {
    pub id: AuthTokenId,
    pub user_id: UserId,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct JoinToken {
    pub id: JoinTokenId,
    pub family_id: FamilyId,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Rows removed by an expired-token sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpiredTokenCounts {
    pub auth_tokens: u64,
    pub join_tokens: u64,
    pub password_resets: u64,
}
