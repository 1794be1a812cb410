use std::sync::Arc;

use crate::{
    config::Config,
    repositories::CheckInStore,
    services::{
        CheckInEngine, DistanceService, FamilyLocks, FamilyService, FcmTransport, LogTransport,
        MapboxDirections, NotificationDispatcher, PasswordResetMailer, PushTransport,
        RouteProvider, SmtpMailer, StallPolicy,
    },
};

/// Everything a handler needs, wired once by the process entry point.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CheckInStore>,
    pub engine: Arc<CheckInEngine>,
    pub families: Arc<FamilyService>,
    pub mailer: Arc<dyn PasswordResetMailer>,
    pub config: Config,
}

impl AppState {
    /// Wires the services around explicit collaborators. Without a route
    /// provider every distance is great-circle.
    pub fn new(
        store: Arc<dyn CheckInStore>,
        config: Config,
        route_provider: Option<Arc<dyn RouteProvider>>,
        transport: Arc<dyn PushTransport>,
        mailer: Arc<dyn PasswordResetMailer>,
    ) -> Self {
        let distance = match route_provider {
            Some(provider) => DistanceService::new(provider, config.directions_timeout()),
            None => DistanceService::great_circle_only(),
        };
        let dispatcher = NotificationDispatcher::new(transport);
        let locks = Arc::new(FamilyLocks::new());
        let policy = StallPolicy {
            regression_meters: config.stall_regression_meters,
            notify_after: config.stall_notify_after,
        };

        let engine = CheckInEngine::new(
            store.clone(),
            distance,
            dispatcher.clone(),
            policy,
            locks.clone(),
        )
        .with_history_limit(config.session_history_limit);
        let families = FamilyService::new(
            store.clone(),
            dispatcher,
            locks,
            config.public_base_url.clone(),
            config.join_token_ttl(),
        );

        Self {
            store,
            engine: Arc::new(engine),
            families: Arc::new(families),
            mailer,
            config,
        }
    }

    /// Builds the production collaborators described by `config`.
    pub fn from_config(store: Arc<dyn CheckInStore>, config: Config) -> anyhow::Result<Self> {
        let route_provider: Option<Arc<dyn RouteProvider>> = match &config.directions_access_token
        {
            Some(token) => Some(Arc::new(MapboxDirections::new(
                config.directions_base_url.clone(),
                config.directions_profile.clone(),
                token.clone(),
                config.directions_timeout(),
            )?)),
            None => {
                tracing::warn!("DIRECTIONS_ACCESS_TOKEN not set; using great-circle distances");
                None
            }
        };

        let transport: Arc<dyn PushTransport> =
            match (&config.push_endpoint, &config.push_access_token) {
                (Some(endpoint), Some(token)) => Arc::new(FcmTransport::new(
                    endpoint.clone(),
                    token.clone(),
                    config.push_timeout(),
                )?),
                _ => {
                    tracing::warn!("PUSH_ENDPOINT not configured; notifications are only logged");
                    Arc::new(LogTransport)
                }
            };

        let mailer: Arc<dyn PasswordResetMailer> = Arc::new(SmtpMailer::new(&config.smtp)?);

        Ok(Self::new(store, config, route_provider, transport, mailer))
    }
}
