//! Families, join links and membership changes.

use std::sync::Arc;

use chrono::Utc;

use crate::error::AppError;
use crate::models::{
    family::{Family, FamilyResponse, JoinLinkResponse, JoinPreviewResponse},
    token::JoinToken,
    user::{MemberResponse, User},
};
use crate::repositories::{CheckInStore, RedeemOutcome};
use crate::services::{
    access::{is_token_valid, require_member},
    check_in::load_family,
    locks::FamilyLocks,
    notifications::{CheckInEvent, NotificationDispatcher},
};
use crate::types::{FamilyId, JoinTokenId};
use crate::utils::token::{generate_token, hash_token, SHORT_TOKEN_BYTES};

pub struct FamilyService {
    store: Arc<dyn CheckInStore>,
    dispatcher: NotificationDispatcher,
    locks: Arc<FamilyLocks>,
    public_base_url: String,
    join_token_ttl: chrono::Duration,
}

impl FamilyService {
    pub fn new(
        store: Arc<dyn CheckInStore>,
        dispatcher: NotificationDispatcher,
        locks: Arc<FamilyLocks>,
        public_base_url: impl Into<String>,
        join_token_ttl: chrono::Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            locks,
            public_base_url: public_base_url.into(),
            join_token_ttl,
        }
    }

    #[tracing::instrument(skip(self, creator), fields(creator_id = %creator.id))]
    pub async fn create_family(&self, creator: &User, name: String) -> Result<Family, AppError> {
        let family = Family::new(name.trim().to_string(), creator.id);
        self.store.create_family(&family).await?;
        tracing::info!(family_id = %family.id, "family created");
        Ok(family)
    }

    pub async fn get_family(
        &self,
        family_id: FamilyId,
        requester: &User,
    ) -> Result<FamilyResponse, AppError> {
        let family = load_family(self.store.as_ref(), family_id).await?;
        require_member(requester.id, &family)?;
        self.view(family).await
    }

    /// Builds the member-facing view of a family.
    pub async fn view(&self, family: Family) -> Result<FamilyResponse, AppError> {
        let users = self.store.find_users(&family.members).await?;
        let current_session = self.store.find_session(family.id).await?;
        Ok(FamilyResponse {
            id: family.id,
            name: family.name,
            members: users.iter().map(MemberResponse::from).collect(),
            current_session,
        })
    }

    #[tracing::instrument(skip(self, requester), fields(requester_id = %requester.id))]
    pub async fn issue_join_link(
        &self,
        family_id: FamilyId,
        requester: &User,
    ) -> Result<JoinLinkResponse, AppError> {
        let family = load_family(self.store.as_ref(), family_id).await?;
        require_member(requester.id, &family)?;

        let token = generate_token(SHORT_TOKEN_BYTES);
        let now = Utc::now();
        let expires_at = now + self.join_token_ttl;
        self.store
            .insert_join_token(&JoinToken {
                id: JoinTokenId::new(),
                family_id,
                token_hash: hash_token(&token),
                created_at: now,
                expires_at: Some(expires_at),
            })
            .await?;

        Ok(JoinLinkResponse {
            url: format!("{}/family/join/{}", self.public_base_url, token),
            token,
            expires_at,
        })
    }

    /// Resolves a join link to its family without consuming it.
    pub async fn preview_join(&self, token: &str) -> Result<JoinPreviewResponse, AppError> {
        let join_token = self.live_join_token(token).await?;
        let family = load_family(self.store.as_ref(), join_token.family_id).await?;
        Ok(JoinPreviewResponse {
            family_id: family.id,
            family_name: family.name,
        })
    }

    #[tracing::instrument(skip(self, token, user), fields(user_id = %user.id))]
    pub async fn redeem(&self, token: &str, user: &User) -> Result<FamilyResponse, AppError> {
        let join_token = self.live_join_token(token).await?;

        let guard = self.locks.acquire(join_token.family_id).await;
        let family = load_family(self.store.as_ref(), join_token.family_id).await?;
        if family.contains(user.id) {
            return Err(already_member());
        }
        let family_id = match self.store.redeem_join_token(join_token.id, user.id).await? {
            RedeemOutcome::Joined(family_id) => family_id,
            RedeemOutcome::AlreadyMember => return Err(already_member()),
            RedeemOutcome::TokenGone => return Err(join_link_not_found()),
        };
        let family = load_family(self.store.as_ref(), family_id).await?;
        drop(guard);

        tracing::info!(family_id = %family.id, "member joined family");
        match self.store.find_users(&family.members).await {
            Ok(recipients) => {
                let event = CheckInEvent::AddedToFamily {
                    member_name: user.username.clone(),
                    family_name: family.name.clone(),
                };
                self.dispatcher.notify(&event, &recipients, user.id).await;
            }
            Err(err) => {
                tracing::warn!(family_id = %family.id, error = %err, "could not load recipients");
            }
        }

        self.view(family).await
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn leave(&self, family_id: FamilyId, user: &User) -> Result<(), AppError> {
        let _guard = self.locks.acquire(family_id).await;
        let family = load_family(self.store.as_ref(), family_id).await?;
        require_member(user.id, &family)?;

        if let Some(session) = self.store.find_session(family_id).await? {
            if session.host_id == user.id {
                return Err(AppError::Conflict(
                    "End your active check-in before leaving the family".to_string(),
                ));
            }
        }

        self.store.remove_member(family_id, user.id).await?;
        tracing::info!("member left family");
        Ok(())
    }

    /// Looks up an unexpired join token. Expired tokens are removed on sight
    /// and reported the same as unknown ones.
    async fn live_join_token(&self, token: &str) -> Result<JoinToken, AppError> {
        let join_token = self
            .store
            .find_join_token(&hash_token(token))
            .await?
            .ok_or_else(join_link_not_found)?;

        if !is_token_valid(join_token.expires_at, Utc::now()) {
            self.store.delete_join_token(join_token.id).await?;
            return Err(join_link_not_found());
        }
        Ok(join_token)
    }
}

fn join_link_not_found() -> AppError {
    AppError::NotFound("Join link not found".to_string())
}

fn already_member() -> AppError {
    AppError::Conflict("You are already a member of this family".to_string())
}
