#![allow(dead_code)]
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use checkin_backend::{
    config::Config,
    models::check_in::Coordinate,
    repositories::MemoryStore,
    routes::build_router,
    services::{
        distance::{DistanceError, RouteProvider},
        push::{PushError, PushMessage, PushTransport},
        PasswordResetMailer,
    },
    state::AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Records every message instead of delivering it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<PushMessage>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingTransport {
    /// Channels delivered to `address`, in order.
    pub fn channels_for(&self, address: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|message| message.address == address)
            .map(|message| message.channel.clone())
            .collect()
    }

    pub fn messages(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().push(address.to_string());
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        if self.failing.lock().unwrap().contains(&message.address) {
            return Err(PushError::Rejected {
                status: reqwest::StatusCode::NOT_FOUND,
                body: "unregistered".into(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Answers route requests from a queue, then repeats a default distance.
pub struct ScriptedRoutes {
    queue: Mutex<VecDeque<Option<f64>>>,
    default_meters: Mutex<f64>,
}

impl ScriptedRoutes {
    pub fn new(default_meters: f64) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default_meters: Mutex::new(default_meters),
        }
    }

    pub fn next(&self, meters: f64) {
        self.queue.lock().unwrap().push_back(Some(meters));
    }

    pub fn fail_next(&self) {
        self.queue.lock().unwrap().push_back(None);
    }

    pub fn set_default(&self, meters: f64) {
        *self.default_meters.lock().unwrap() = meters;
    }
}

#[async_trait]
impl RouteProvider for ScriptedRoutes {
    async fn route(&self, _: Coordinate, _: Coordinate) -> Result<f64, DistanceError> {
        let scripted = self.queue.lock().unwrap().pop_front();
        match scripted {
            Some(Some(meters)) => Ok(meters),
            Some(None) => Err(DistanceError::MalformedResponse("scripted failure".into())),
            None => Ok(*self.default_meters.lock().unwrap()),
        }
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
}

impl RecordingMailer {
    /// Links are still recorded, but every send reports an SMTP failure.
    pub fn fail_sends(&self) {
        *self.failing.lock().unwrap() = true;
    }

    /// Token embedded in the most recent reset link sent to `email`.
    pub fn last_token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .and_then(|(_, url)| url.split("token=").nth(1).map(str::to_string))
    }
}

#[async_trait]
impl PasswordResetMailer for RecordingMailer {
    async fn send_password_reset(&self, to_email: &str, reset_url: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to_email.to_string(), reset_url.to_string()));
        if *self.failing.lock().unwrap() {
            anyhow::bail!("smtp relay refused the message");
        }
        Ok(())
    }
}

pub struct TestUser {
    pub id: String,
    pub token: String,
    pub email: String,
    pub push_address: String,
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub pushes: Arc<RecordingTransport>,
    pub routes: Arc<ScriptedRoutes>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn test_config() -> Config {
    let mut config = Config::from_lookup(|_| None).expect("default config");
    config.public_base_url = "https://checkin.test".to_string();
    config.directions_timeout_ms = 500;
    config
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let pushes = Arc::new(RecordingTransport::default());
        let routes = Arc::new(ScriptedRoutes::new(5_000.0));
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(
            store.clone(),
            config,
            Some(routes.clone() as Arc<dyn RouteProvider>),
            pushes.clone(),
            mailer.clone(),
        );
        Self {
            router: build_router(state),
            store,
            pushes,
            routes,
            mailer,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };
        (status, value)
    }

    /// Signs up `name` and registers the push address `<name>-device`.
    pub async fn user(&self, name: &str) -> TestUser {
        let email = format!("{}@example.com", name);
        let (status, body) = self
            .request(
                Method::POST,
                "/users/signup",
                None,
                Some(json!({"username": name, "email": email, "password": "pw-123456"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
        let token = body["token"].as_str().unwrap().to_string();
        let id = body["user"]["id"].as_str().unwrap().to_string();

        let push_address = format!("{}-device", name);
        let (status, _) = self
            .request(
                Method::PUT,
                "/users/me/push-address",
                Some(&token),
                Some(json!({"push_address": push_address})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        TestUser {
            id,
            token,
            email,
            push_address,
        }
    }

    pub async fn create_family(&self, owner: &TestUser, name: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/family",
                Some(&owner.token),
                Some(json!({"name": name})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create family failed: {}", body);
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn invite(&self, member: &TestUser, family_id: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                &format!("/family/{}/invite", family_id),
                Some(&member.token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "invite failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn join(&self, user: &TestUser, join_token: &str) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            &format!("/family/join/{}", join_token),
            Some(&user.token),
            None,
        )
        .await
    }

    /// Family named "Home" owned by `host` with every `members` entry joined.
    /// Join notifications are cleared before returning.
    pub async fn family_with(&self, host: &TestUser, members: &[&TestUser]) -> String {
        let family_id = self.create_family(host, "Home").await;
        for member in members {
            let token = self.invite(host, &family_id).await;
            let (status, body) = self.join(member, &token).await;
            assert_eq!(status, StatusCode::OK, "join failed: {}", body);
        }
        self.pushes.clear();
        family_id
    }

    pub async fn start(&self, host: &TestUser, family_id: &str, distance: f64) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            &format!("/family/{}/session", family_id),
            Some(&host.token),
            Some(snapshot(distance)),
        )
        .await
    }

    pub async fn update(&self, user: &TestUser, family_id: &str, distance: f64) -> (StatusCode, Value) {
        self.request(
            Method::PUT,
            &format!("/family/{}/session", family_id),
            Some(&user.token),
            Some(snapshot(distance)),
        )
        .await
    }

    pub async fn end(&self, user: &TestUser, family_id: &str) -> (StatusCode, Value) {
        self.request(
            Method::DELETE,
            &format!("/family/{}/session", family_id),
            Some(&user.token),
            None,
        )
        .await
    }
}

/// Session snapshot JSON. `distance` is the client's last-known distance.
pub fn snapshot(distance: f64) -> Value {
    json!({
        "location": {"lat": 40.7128, "long": -74.0060},
        "destination": {"lat": 40.7306, "long": -73.9352},
        "batteryLevel": 0.8,
        "radius": 50.0,
        "distance": distance,
        "placeName": "School"
    })
}
