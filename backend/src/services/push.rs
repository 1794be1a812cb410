//! Outbound push delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push endpoint rejected the message with {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// A rendered notification addressed to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub address: String,
    pub title: String,
    pub body: String,
    pub channel: String,
    pub payload: Option<Value>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError>;
}

/// FCM HTTP v1 style transport authenticated with a static bearer token.
pub struct FcmTransport {
    client: Client,
    endpoint: String,
    access_token: String,
}

impl FcmTransport {
    pub fn new(
        endpoint: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("checkin-backend/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to initialize HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            access_token: access_token.into(),
        })
    }
}

/// Request body for one message. Data values must be strings on the wire,
/// so the live-activity payload travels as serialized JSON.
fn fcm_body(message: &PushMessage) -> Value {
    let mut data = serde_json::Map::new();
    data.insert("channel".to_string(), Value::String(message.channel.clone()));
    if let Some(payload) = &message.payload {
        data.insert("liveActivity".to_string(), Value::String(payload.to_string()));
    }

    json!({
        "message": {
            "token": message.address,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "android": {
                "notification": { "channel_id": message.channel },
            },
            "data": data,
        }
    })
}

#[async_trait]
impl PushTransport for FcmTransport {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&fcm_body(message))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(PushError::Rejected {
            status,
            body: body.chars().take(200).collect(),
        })
    }
}

/// Used when no push endpoint is configured: messages are only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl PushTransport for LogTransport {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        tracing::info!(
            channel = %message.channel,
            title = %message.title,
            "push transport not configured; notification logged only"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: Option<Value>) -> PushMessage {
        PushMessage {
            address: "device-token".into(),
            title: "Sam's Check In".into(),
            body: "Sam started a Check In in Home".into(),
            channel: "cistarted".into(),
            payload,
        }
    }

    #[test]
    fn fcm_body_addresses_device_and_channel() {
        let body = fcm_body(&message(None));
        assert_eq!(body["message"]["token"], "device-token");
        assert_eq!(body["message"]["notification"]["title"], "Sam's Check In");
        assert_eq!(body["message"]["android"]["notification"]["channel_id"], "cistarted");
        assert!(body["message"]["data"].get("liveActivity").is_none());
    }

    #[test]
    fn fcm_body_serializes_payload_as_string() {
        let body = fcm_body(&message(Some(json!({"event": "started"}))));
        let raw = body["message"]["data"]["liveActivity"]
            .as_str()
            .expect("string payload");
        let decoded: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(decoded["event"], "started");
    }

    #[tokio::test]
    async fn log_transport_always_succeeds() {
        assert!(LogTransport.send(&message(None)).await.is_ok());
    }
}
