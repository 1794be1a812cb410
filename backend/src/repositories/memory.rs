//! In-process store used by the test suite and the `memory://` database URL.
//!
//! All tables sit behind one lock so multi-entity writes (redemption,
//! password reset consumption) are atomic the same way a transaction is.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::models::{
    check_in::CheckInSession,
    family::Family,
    password_reset::PasswordReset,
    token::{AuthToken, ExpiredTokenCounts, JoinToken},
    user::User,
};
use crate::repositories::store::{CheckInStore, RedeemOutcome};
use crate::types::{FamilyId, JoinTokenId, PasswordResetId, SessionId, UserId};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    families: HashMap<FamilyId, Family>,
    sessions: HashMap<FamilyId, CheckInSession>,
    join_tokens: HashMap<JoinTokenId, JoinToken>,
    auth_tokens: HashMap<String, AuthToken>,
    password_resets: HashMap<PasswordResetId, PasswordReset>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expires_at, Some(at) if at <= now)
}

#[async_trait]
impl CheckInStore for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let taken = tables
            .users
            .values()
            .any(|existing| existing.username == user.username || existing.email == user.email);
        if taken {
            return Err(AppError::Conflict(
                "Username or email already registered".to_string(),
            ));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let email = email.to_lowercase();
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_users(&self, ids: &[UserId]) -> Result<Vec<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.users.get(id).cloned())
            .collect())
    }

    async fn set_push_address(
        &self,
        id: UserId,
        push_address: Option<String>,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        user.push_address = push_address;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn family_ids_for_user(&self, id: UserId) -> Result<Vec<FamilyId>, AppError> {
        let tables = self.tables.read().await;
        let mut ids: Vec<FamilyId> = tables
            .families
            .values()
            .filter(|family| family.contains(id))
            .map(|family| family.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn create_family(&self, family: &Family) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.families.contains_key(&family.id) {
            return Err(AppError::Conflict("Family already exists".to_string()));
        }
        tables.families.insert(family.id, family.clone());
        Ok(())
    }

    async fn find_family(&self, id: FamilyId) -> Result<Option<Family>, AppError> {
        Ok(self.tables.read().await.families.get(&id).cloned())
    }

    async fn remove_member(&self, family_id: FamilyId, user_id: UserId) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let Some(family) = tables.families.get_mut(&family_id) else {
            return Ok(false);
        };
        let before = family.members.len();
        family.members.retain(|member| *member != user_id);
        Ok(family.members.len() != before)
    }

    async fn find_session(&self, family_id: FamilyId) -> Result<Option<CheckInSession>, AppError> {
        Ok(self.tables.read().await.sessions.get(&family_id).cloned())
    }

    async fn insert_session(&self, session: &CheckInSession) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.sessions.contains_key(&session.family_id) {
            return Err(AppError::Conflict(
                "A check-in session is already active".to_string(),
            ));
        }
        tables.sessions.insert(session.family_id, session.clone());
        Ok(())
    }

    async fn update_session(&self, session: &CheckInSession) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(&session.family_id) {
            Some(current) if current.id == session.id && current.host_id == session.host_id => {
                *current = session.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_session(
        &self,
        family_id: FamilyId,
        session_id: SessionId,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get(&family_id) {
            Some(current) if current.id == session_id => {
                tables.sessions.remove(&family_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_join_token(&self, token: &JoinToken) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables
            .join_tokens
            .values()
            .any(|existing| existing.token_hash == token.token_hash)
        {
            return Err(AppError::Conflict("Join token already exists".to_string()));
        }
        tables.join_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_join_token(&self, token_hash: &str) -> Result<Option<JoinToken>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .join_tokens
            .values()
            .find(|token| token.token_hash == token_hash)
            .cloned())
    }

    async fn delete_join_token(&self, id: JoinTokenId) -> Result<(), AppError> {
        self.tables.write().await.join_tokens.remove(&id);
        Ok(())
    }

    async fn redeem_join_token(
        &self,
        id: JoinTokenId,
        user_id: UserId,
    ) -> Result<RedeemOutcome, AppError> {
        let mut tables = self.tables.write().await;
        let Some(family_id) = tables.join_tokens.get(&id).map(|token| token.family_id) else {
            return Ok(RedeemOutcome::TokenGone);
        };
        let Some(family) = tables.families.get_mut(&family_id) else {
            tables.join_tokens.remove(&id);
            return Ok(RedeemOutcome::TokenGone);
        };
        if family.contains(user_id) {
            return Ok(RedeemOutcome::AlreadyMember);
        }
        family.members.push(user_id);
        tables.join_tokens.remove(&id);
        Ok(RedeemOutcome::Joined(family_id))
    }

    async fn insert_auth_token(&self, token: &AuthToken) -> Result<(), AppError> {
        self.tables
            .write()
            .await
            .auth_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_auth_token(&self, token_hash: &str) -> Result<Option<AuthToken>, AppError> {
        Ok(self.tables.read().await.auth_tokens.get(token_hash).cloned())
    }

    async fn insert_password_reset(&self, reset: &PasswordReset) -> Result<(), AppError> {
        self.tables
            .write()
            .await
            .password_resets
            .insert(reset.id, reset.clone());
        Ok(())
    }

    async fn find_password_reset(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordReset>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .password_resets
            .values()
            .find(|reset| reset.token_hash == token_hash)
            .cloned())
    }

    async fn delete_password_reset(&self, id: PasswordResetId) -> Result<(), AppError> {
        self.tables.write().await.password_resets.remove(&id);
        Ok(())
    }

    async fn consume_password_reset(
        &self,
        id: PasswordResetId,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let Some(reset) = tables.password_resets.remove(&id) else {
            return Ok(false);
        };
        if let Some(user) = tables.users.get_mut(&reset.user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(true)
    }

    async fn delete_expired_tokens(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ExpiredTokenCounts, AppError> {
        let mut tables = self.tables.write().await;
        let mut counts = ExpiredTokenCounts::default();

        let before = tables.auth_tokens.len();
        tables
            .auth_tokens
            .retain(|_, token| !is_expired(token.expires_at, now));
        counts.auth_tokens = (before - tables.auth_tokens.len()) as u64;

        let before = tables.join_tokens.len();
        tables
            .join_tokens
            .retain(|_, token| !is_expired(token.expires_at, now));
        counts.join_tokens = (before - tables.join_tokens.len()) as u64;

        let before = tables.password_resets.len();
        tables
            .password_resets
            .retain(|_, reset| !is_expired(reset.expires_at, now));
        counts.password_resets = (before - tables.password_resets.len()) as u64;

        Ok(counts)
    }
}
