//! The check-in session lifecycle: start, update and end.
//!
//! Each operation holds the family's lock from the first read to the last
//! write, so the session slot can never be claimed twice. All fallible work
//! (distance lookup, validation) happens before the write; notifications go
//! out only after the write has committed.

use std::sync::Arc;

use chrono::Utc;

use crate::error::AppError;
use crate::models::{
    check_in::{CheckInSession, EndReason, SessionSnapshot, DEFAULT_HISTORY_LIMIT},
    family::Family,
    user::User,
};
use crate::repositories::CheckInStore;
use crate::services::{
    access::require_member,
    distance::DistanceService,
    locks::FamilyLocks,
    notifications::{CheckInEvent, NotificationDispatcher, SessionContext},
    stall::{ProgressDecision, StallPolicy},
};
use crate::types::{FamilyId, UserId};
use crate::validation::validate_payload;

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Accepted(CheckInSession),
    Ended(EndReason),
}

pub struct CheckInEngine {
    store: Arc<dyn CheckInStore>,
    distance: DistanceService,
    dispatcher: NotificationDispatcher,
    policy: StallPolicy,
    locks: Arc<FamilyLocks>,
    history_limit: usize,
}

impl CheckInEngine {
    pub fn new(
        store: Arc<dyn CheckInStore>,
        distance: DistanceService,
        dispatcher: NotificationDispatcher,
        policy: StallPolicy,
        locks: Arc<FamilyLocks>,
    ) -> Self {
        Self {
            store,
            distance,
            dispatcher,
            policy,
            locks,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Caps how many location samples a session keeps.
    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit.max(1);
        self
    }

    #[tracing::instrument(skip(self, host, snapshot), fields(host_id = %host.id))]
    pub async fn start(
        &self,
        family_id: FamilyId,
        host: &User,
        snapshot: SessionSnapshot,
    ) -> Result<CheckInSession, AppError> {
        validate_payload(&snapshot)?;

        let guard = self.locks.acquire(family_id).await;
        let family = load_family(self.store.as_ref(), family_id).await?;
        require_member(host.id, &family)?;
        if self.store.find_session(family_id).await?.is_some() {
            return Err(AppError::Conflict(
                "A check-in session is already active".to_string(),
            ));
        }

        let distance = self
            .distance
            .measure(snapshot.location, snapshot.destination)
            .await;
        let session =
            CheckInSession::start(family_id, host.id, &snapshot, distance.meters, Utc::now());
        self.store.insert_session(&session).await?;
        drop(guard);

        tracing::info!(
            session_id = %session.id,
            distance = session.distance,
            source = ?distance.source,
            "check-in session started"
        );
        let context = SessionContext::new(&host.username, &family.name, &session);
        self.announce(&family, CheckInEvent::Started(context), host.id)
            .await;
        Ok(session)
    }

    #[tracing::instrument(skip(self, actor, snapshot), fields(actor_id = %actor.id))]
    pub async fn update(
        &self,
        family_id: FamilyId,
        actor: &User,
        snapshot: SessionSnapshot,
    ) -> Result<UpdateOutcome, AppError> {
        validate_payload(&snapshot)?;

        let guard = self.locks.acquire(family_id).await;
        let family = load_family(self.store.as_ref(), family_id).await?;
        require_member(actor.id, &family)?;
        let mut session = self.hosted_session(family_id, actor.id).await?;

        let distance = self
            .distance
            .measure(snapshot.location, snapshot.destination)
            .await;
        // Arrival is judged against the radius fixed at start.
        let decision = self.policy.evaluate(
            snapshot.distance,
            distance.meters,
            session.radius,
            session.stall_count,
        );

        match decision {
            ProgressDecision::Arrived => {
                if !self.store.delete_session(family_id, session.id).await? {
                    return Err(no_active_session());
                }
                drop(guard);

                tracing::info!(session_id = %session.id, "host reached destination");
                session.distance = distance.meters;
                let context = SessionContext::new(&actor.username, &family.name, &session);
                self.announce(
                    &family,
                    CheckInEvent::Ended(context, EndReason::ReachedDestination),
                    actor.id,
                )
                .await;
                Ok(UpdateOutcome::Ended(EndReason::ReachedDestination))
            }
            ProgressDecision::Travelling {
                stall_count,
                notify,
            } => {
                session.apply_update(
                    &snapshot,
                    distance.meters,
                    stall_count,
                    Utc::now(),
                    self.history_limit,
                );
                if !self.store.update_session(&session).await? {
                    return Err(no_active_session());
                }
                drop(guard);

                if notify {
                    tracing::info!(
                        session_id = %session.id,
                        stall_count,
                        "no progress toward destination"
                    );
                    let context = SessionContext::new(&actor.username, &family.name, &session);
                    self.announce(&family, CheckInEvent::Stalled(context), actor.id)
                        .await;
                }
                Ok(UpdateOutcome::Accepted(session))
            }
        }
    }

    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn end(&self, family_id: FamilyId, actor: &User) -> Result<EndReason, AppError> {
        let guard = self.locks.acquire(family_id).await;
        let family = load_family(self.store.as_ref(), family_id).await?;
        require_member(actor.id, &family)?;
        let session = self.hosted_session(family_id, actor.id).await?;

        if !self.store.delete_session(family_id, session.id).await? {
            return Err(no_active_session());
        }
        drop(guard);

        tracing::info!(session_id = %session.id, "check-in session ended by host");
        let context = SessionContext::new(&actor.username, &family.name, &session);
        self.announce(
            &family,
            CheckInEvent::Ended(context, EndReason::UserEnded),
            actor.id,
        )
        .await;
        Ok(EndReason::UserEnded)
    }

    async fn hosted_session(
        &self,
        family_id: FamilyId,
        actor_id: UserId,
    ) -> Result<CheckInSession, AppError> {
        let session = self
            .store
            .find_session(family_id)
            .await?
            .ok_or_else(no_active_session)?;
        if session.host_id != actor_id {
            return Err(AppError::Forbidden(
                "Only the host can change this check-in session".to_string(),
            ));
        }
        Ok(session)
    }

    /// Notifies the family. The state change has already committed, so a
    /// failure to load recipients is logged rather than returned.
    async fn announce(&self, family: &Family, event: CheckInEvent, exclude: UserId) {
        match self.store.find_users(&family.members).await {
            Ok(recipients) => {
                self.dispatcher.notify(&event, &recipients, exclude).await;
            }
            Err(err) => {
                tracing::warn!(family_id = %family.id, error = %err, "could not load recipients");
            }
        }
    }
}

pub(crate) async fn load_family(
    store: &dyn CheckInStore,
    family_id: FamilyId,
) -> Result<Family, AppError> {
    store
        .find_family(family_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Family not found".to_string()))
}

fn no_active_session() -> AppError {
    AppError::BadRequest("No active check-in session".to_string())
}
