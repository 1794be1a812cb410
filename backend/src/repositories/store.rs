//! Persistence boundary for every entity the service owns.
//!
//! The engine and handlers only ever talk to `dyn CheckInStore`, so the
//! Postgres and in-memory implementations are interchangeable. Writes that
//! guard an invariant (one session per family, single-use tokens) are
//! conditional at this layer and report whether they took effect.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{
    check_in::CheckInSession,
    family::Family,
    password_reset::PasswordReset,
    token::{AuthToken, ExpiredTokenCounts, JoinToken},
    user::User,
};
use crate::types::{FamilyId, JoinTokenId, PasswordResetId, SessionId, UserId};

/// Result of an atomic join-token redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// Token consumed and the user added to the family.
    Joined(FamilyId),
    /// User was already a member; nothing changed.
    AlreadyMember,
    /// Token no longer exists (already redeemed or swept).
    TokenGone,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckInStore: Send + Sync {
    /// Insert a user. Duplicate username or email yields `Conflict`.
    async fn create_user(&self, user: &User) -> Result<(), AppError>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Users for the given ids; unknown ids are skipped.
    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>, AppError>;

    async fn set_push_address(
        &self,
        id: UserId,
        push_address: Option<String>,
    ) -> Result<(), AppError>;

    async fn family_ids_for_user(&self, id: UserId) -> Result<Vec<FamilyId>, AppError>;

    async fn create_family(&self, family: &Family) -> Result<(), AppError>;

    async fn find_family(&self, id: FamilyId) -> Result<Option<Family>, AppError>;

    /// Returns `false` when the user was not a member.
    async fn remove_member(&self, family_id: FamilyId, user_id: UserId) -> Result<bool, AppError>;

    async fn find_session(&self, family_id: FamilyId) -> Result<Option<CheckInSession>, AppError>;

    /// Insert a new session. A family that already has one yields `Conflict`.
    async fn insert_session(&self, session: &CheckInSession) -> Result<(), AppError>;

    /// Overwrite a session only if it still exists with the same host.
    async fn update_session(&self, session: &CheckInSession) -> Result<bool, AppError>;

    /// Delete a session only if it is still the family's current one.
    async fn delete_session(
        &self,
        family_id: FamilyId,
        session_id: SessionId,
    ) -> Result<bool, AppError>;

    async fn insert_join_token(&self, token: &JoinToken) -> Result<(), AppError>;

    async fn find_join_token(&self, token_hash: &str) -> Result<Option<JoinToken>, AppError>;

    async fn delete_join_token(&self, id: JoinTokenId) -> Result<(), AppError>;

    /// Delete the token and add the user to its family in one step.
    async fn redeem_join_token(
        &self,
        id: JoinTokenId,
        user_id: UserId,
    ) -> Result<RedeemOutcome, AppError>;

    async fn insert_auth_token(&self, token: &AuthToken) -> Result<(), AppError>;

    async fn find_auth_token(&self, token_hash: &str) -> Result<Option<AuthToken>, AppError>;

    async fn insert_password_reset(&self, reset: &PasswordReset) -> Result<(), AppError>;

    async fn find_password_reset(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordReset>, AppError>;

    async fn delete_password_reset(&self, id: PasswordResetId) -> Result<(), AppError>;

    /// Delete the reset and store the new password hash in one step.
    /// Returns `false` when the reset was already consumed.
    async fn consume_password_reset(
        &self,
        id: PasswordResetId,
        password_hash: &str,
    ) -> Result<bool, AppError>;

    async fn delete_expired_tokens(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ExpiredTokenCounts, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_store_is_send_and_sync() {
        fn check_send_sync<T: Send + Sync>() {}
        check_send_sync::<MockCheckInStore>();
    }
}
