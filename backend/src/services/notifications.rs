//! Check-in events and their fan-out to family members.
//!
//! Rendering is a pure function of the event. Delivery never fails as a
//! whole: each recipient is attempted independently and the outcome is
//! reported back for logging only.

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{json, Map, Value};

use crate::models::{
    check_in::{CheckInSession, EndReason},
    user::User,
};
use crate::services::push::{PushMessage, PushTransport};
use crate::types::UserId;

pub const CHANNEL_STARTED: &str = "cistarted";
pub const CHANNEL_NO_PROGRESS: &str = "cinoprogress";
pub const CHANNEL_ENDED_AT_DESTINATION: &str = "ciended_dest";
pub const CHANNEL_ENDED: &str = "ciended";
pub const CHANNEL_FAMILY_JOINED: &str = "familyjoined";

/// Session details shown to the rest of the family.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub host_name: String,
    pub family_name: String,
    pub distance: f64,
    pub place_name: Option<String>,
    pub battery_level: f64,
}

impl SessionContext {
    pub fn new(host_name: &str, family_name: &str, session: &CheckInSession) -> Self {
        Self {
            host_name: host_name.to_string(),
            family_name: family_name.to_string(),
            distance: session.distance,
            place_name: session.place_name.clone(),
            battery_level: session.battery_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckInEvent {
    Started(SessionContext),
    Stalled(SessionContext),
    Ended(SessionContext, EndReason),
    AddedToFamily {
        member_name: String,
        family_name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub channel: &'static str,
    pub payload: Option<Value>,
}

impl CheckInEvent {
    fn tag(&self) -> &'static str {
        match self {
            CheckInEvent::Started(_) => "started",
            CheckInEvent::Stalled(_) => "no_progress",
            CheckInEvent::Ended(..) => "ended",
            CheckInEvent::AddedToFamily { .. } => "added_to_family",
        }
    }

    pub fn render(&self) -> NotificationContent {
        match self {
            CheckInEvent::Started(ctx) => NotificationContent {
                title: format!("{}'s Check In", ctx.host_name),
                body: format!(
                    "{} started a Check In in {}",
                    ctx.host_name, ctx.family_name
                ),
                channel: CHANNEL_STARTED,
                payload: Some(self.live_activity(ctx, None)),
            },
            CheckInEvent::Stalled(ctx) => NotificationContent {
                title: format!("{}'s Check In", ctx.host_name),
                body: format!(
                    "{} has not made any progress toward their destination.",
                    ctx.host_name
                ),
                channel: CHANNEL_NO_PROGRESS,
                payload: Some(self.live_activity(ctx, None)),
            },
            CheckInEvent::Ended(ctx, reason) => {
                let (body, channel) = match reason {
                    EndReason::ReachedDestination => (
                        format!(
                            "{} has reached their destination. The Check In has ended.",
                            ctx.host_name
                        ),
                        CHANNEL_ENDED_AT_DESTINATION,
                    ),
                    EndReason::UserEnded => (
                        format!("{} has ended their Check In.", ctx.host_name),
                        CHANNEL_ENDED,
                    ),
                };
                NotificationContent {
                    title: format!("{}'s Check In", ctx.host_name),
                    body,
                    channel,
                    payload: Some(self.live_activity(ctx, Some(*reason))),
                }
            }
            CheckInEvent::AddedToFamily {
                member_name,
                family_name,
            } => NotificationContent {
                title: "New member".to_string(),
                body: format!("{} just joined {}!", member_name, family_name),
                channel: CHANNEL_FAMILY_JOINED,
                payload: None,
            },
        }
    }

    fn live_activity(&self, ctx: &SessionContext, reason: Option<EndReason>) -> Value {
        let mut payload = Map::new();
        payload.insert("event".into(), json!(self.tag()));
        payload.insert("hostName".into(), json!(ctx.host_name));
        payload.insert("familyName".into(), json!(ctx.family_name));
        // Once the session is over the remaining distance is meaningless.
        if reason.is_none() {
            payload.insert("distance".into(), json!(ctx.distance));
            payload.insert("batteryLevel".into(), json!(ctx.battery_level));
        }
        if let Some(place) = &ctx.place_name {
            payload.insert("placeName".into(), json!(place));
        }
        if let Some(reason) = reason {
            payload.insert("reason".into(), json!(reason.as_str()));
        }
        Value::Object(payload)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Delivery {
    Delivered,
    Skipped,
    Failed,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn PushTransport>,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self { transport }
    }

    /// Sends `event` to every recipient except `exclude`. Never fails.
    #[tracing::instrument(skip_all, fields(event = event.tag(), recipients = recipients.len()))]
    pub async fn notify(
        &self,
        event: &CheckInEvent,
        recipients: &[User],
        exclude: UserId,
    ) -> DispatchReport {
        let content = event.render();

        let attempts = recipients
            .iter()
            .filter(|user| user.id != exclude)
            .map(|user| self.deliver(user, &content));
        let outcomes = join_all(attempts).await;

        let mut report = DispatchReport::default();
        for outcome in outcomes {
            match outcome {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Skipped => report.skipped += 1,
                Delivery::Failed => report.failed += 1,
            }
        }
        tracing::debug!(
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "notification fan-out finished"
        );
        report
    }

    async fn deliver(&self, user: &User, content: &NotificationContent) -> Delivery {
        let Some(address) = user.push_address.as_deref() else {
            tracing::debug!(user_id = %user.id, "recipient has no push address, skipping");
            return Delivery::Skipped;
        };

        let message = PushMessage {
            address: address.to_string(),
            title: content.title.clone(),
            body: content.body.clone(),
            channel: content.channel.to_string(),
            payload: content.payload.clone(),
        };

        match self.transport.send(&message).await {
            Ok(()) => Delivery::Delivered,
            Err(err) => {
                tracing::warn!(
                    user_id = %user.id,
                    channel = content.channel,
                    error = %err,
                    "push delivery failed"
                );
                Delivery::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::push::{MockPushTransport, PushError};
    use reqwest::StatusCode;

    fn ctx() -> SessionContext {
        SessionContext {
            host_name: "sam".into(),
            family_name: "Home".into(),
            distance: 1500.0,
            place_name: Some("School".into()),
            battery_level: 0.42,
        }
    }

    fn user(name: &str, address: Option<&str>) -> User {
        let mut user = User::new(name.into(), format!("{}@example.com", name), "hash".into());
        user.push_address = address.map(str::to_string);
        user
    }

    #[test]
    fn started_event_renders_title_body_and_payload() {
        let content = CheckInEvent::Started(ctx()).render();
        assert_eq!(content.title, "sam's Check In");
        assert_eq!(content.body, "sam started a Check In in Home");
        assert_eq!(content.channel, CHANNEL_STARTED);
        let payload = content.payload.expect("payload");
        assert_eq!(payload["event"], "started");
        assert_eq!(payload["distance"], 1500.0);
        assert_eq!(payload["placeName"], "School");
        assert_eq!(payload["batteryLevel"], 0.42);
        assert!(payload.get("reason").is_none());
    }

    #[test]
    fn ended_channels_depend_on_reason() {
        let arrived = CheckInEvent::Ended(ctx(), EndReason::ReachedDestination).render();
        assert_eq!(arrived.channel, CHANNEL_ENDED_AT_DESTINATION);
        assert!(arrived.body.contains("reached their destination"));
        let payload = arrived.payload.expect("payload");
        assert_eq!(payload["reason"], "reached_destination");
        assert!(payload.get("distance").is_none());

        let cancelled = CheckInEvent::Ended(ctx(), EndReason::UserEnded).render();
        assert_eq!(cancelled.channel, CHANNEL_ENDED);
        assert_eq!(cancelled.body, "sam has ended their Check In.");
    }

    #[test]
    fn stalled_and_joined_render() {
        let stalled = CheckInEvent::Stalled(ctx()).render();
        assert_eq!(stalled.channel, CHANNEL_NO_PROGRESS);
        assert_eq!(stalled.payload.unwrap()["event"], "no_progress");

        let joined = CheckInEvent::AddedToFamily {
            member_name: "kim".into(),
            family_name: "Home".into(),
        }
        .render();
        assert_eq!(joined.title, "New member");
        assert_eq!(joined.body, "kim just joined Home!");
        assert_eq!(joined.channel, CHANNEL_FAMILY_JOINED);
        assert!(joined.payload.is_none());
    }

    #[tokio::test]
    async fn excluded_actor_and_missing_addresses_are_not_sent() {
        let host = user("sam", Some("host-device"));
        let with_address = user("kim", Some("kim-device"));
        let without_address = user("lee", None);

        let mut transport = MockPushTransport::new();
        transport
            .expect_send()
            .withf(|message| message.address == "kim-device")
            .times(1)
            .returning(|_| Ok(()));
        let dispatcher = NotificationDispatcher::new(Arc::new(transport));

        let report = dispatcher
            .notify(
                &CheckInEvent::Started(ctx()),
                &[host.clone(), with_address, without_address],
                host.id,
            )
            .await;
        assert_eq!(
            report,
            DispatchReport {
                delivered: 1,
                skipped: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn one_failure_does_not_block_other_recipients() {
        let host = user("sam", None);
        let first = user("kim", Some("bad-device"));
        let second = user("lee", Some("good-device"));

        let mut transport = MockPushTransport::new();
        transport.expect_send().times(2).returning(|message| {
            if message.address == "bad-device" {
                Err(PushError::Rejected {
                    status: StatusCode::NOT_FOUND,
                    body: "unregistered".into(),
                })
            } else {
                Ok(())
            }
        });
        let dispatcher = NotificationDispatcher::new(Arc::new(transport));

        let report = dispatcher
            .notify(&CheckInEvent::Stalled(ctx()), &[host.clone(), first, second], host.id)
            .await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
    }
}
