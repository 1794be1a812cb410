//! Travel distance between a traveller and their destination.
//!
//! A routed road distance is preferred. Any provider failure, including a
//! timeout or a nonsensical value, degrades to the great-circle distance so
//! callers always get a finite number back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::models::check_in::Coordinate;
use crate::utils::geo::great_circle_distance;

#[derive(Debug, thiserror::Error)]
pub enum DistanceError {
    #[error("directions request timed out after {0:?}")]
    Timeout(Duration),

    #[error("directions request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed directions response: {0}")]
    MalformedResponse(String),

    #[error("no route between the requested points")]
    NoRoute,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Road distance in meters from `origin` to `destination`.
    async fn route(&self, origin: Coordinate, destination: Coordinate)
        -> Result<f64, DistanceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceSource {
    Routed,
    GreatCircle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    pub meters: f64,
    pub source: DistanceSource,
}

/// Directions API client speaking the Mapbox `directions/v5` dialect.
pub struct MapboxDirections {
    client: Client,
    base_url: String,
    profile: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    code: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    distance: f64,
}

impl MapboxDirections {
    pub fn new(
        base_url: impl Into<String>,
        profile: impl Into<String>,
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
            base_url: base_url.into().trim_end_matches('/').to_string(),
            profile: profile.into(),
            access_token: access_token.into(),
        })
    }

    /// Request URL without the access token. Coordinates go in `long,lat` order.
    fn route_url(&self, origin: Coordinate, destination: Coordinate) -> String {
        format!(
            "{}/directions/v5/{}/{},{};{},{}",
            self.base_url,
            self.profile,
            origin.long,
            origin.lat,
            destination.long,
            destination.lat
        )
    }
}

fn parse_directions(body: &str) -> Result<f64, DistanceError> {
    let parsed: DirectionsResponse = serde_json::from_str(body)
        .map_err(|e| DistanceError::MalformedResponse(e.to_string()))?;

    match parsed.code.as_deref() {
        Some("Ok") | None => {}
        Some("NoRoute") | Some("NoSegment") => return Err(DistanceError::NoRoute),
        Some(other) => {
            return Err(DistanceError::MalformedResponse(format!(
                "unexpected code {}",
                other
            )))
        }
    }

    parsed
        .routes
        .first()
        .map(|route| route.distance)
        .ok_or(DistanceError::NoRoute)
}

#[async_trait]
impl RouteProvider for MapboxDirections {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<f64, DistanceError> {
        let body = self
            .client
            .get(self.route_url(origin, destination))
            .query(&[
                ("overview", "false"),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_directions(&body)
    }
}

/// Routed distance with a mandatory great-circle fallback.
#[derive(Clone)]
pub struct DistanceService {
    provider: Option<Arc<dyn RouteProvider>>,
    timeout: Duration,
}

impl DistanceService {
    pub fn new(provider: Arc<dyn RouteProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
        }
    }

    /// No directions provider configured; every lookup is great-circle.
    pub fn great_circle_only() -> Self {
        Self {
            provider: None,
            timeout: Duration::ZERO,
        }
    }

    pub async fn measure(&self, origin: Coordinate, destination: Coordinate) -> Distance {
        let Some(provider) = &self.provider else {
            return fallback(origin, destination);
        };

        let outcome = match tokio::time::timeout(self.timeout, provider.route(origin, destination))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(DistanceError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(meters) if meters.is_finite() && meters >= 0.0 => Distance {
                meters,
                source: DistanceSource::Routed,
            },
            Ok(meters) => {
                tracing::warn!(
                    meters,
                    "distance provider degraded, using great-circle fallback: invalid distance"
                );
                fallback(origin, destination)
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "distance provider degraded, using great-circle fallback"
                );
                fallback(origin, destination)
            }
        }
    }
}

fn fallback(origin: Coordinate, destination: Coordinate) -> Distance {
    Distance {
        meters: great_circle_distance(origin, destination),
        source: DistanceSource::GreatCircle,
    }
}
