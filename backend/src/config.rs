use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const MEMORY_DATABASE_URL: &str = "memory://";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub public_base_url: String,
    pub auth_token_expiration_days: u64,
    pub join_token_expiration_hours: u64,
    pub password_reset_expiration_minutes: u64,
    pub directions_access_token: Option<String>,
    pub directions_base_url: String,
    pub directions_profile: String,
    pub directions_timeout_ms: u64,
    pub push_endpoint: Option<String>,
    pub push_access_token: Option<String>,
    pub push_timeout_ms: u64,
    pub stall_regression_meters: f64,
    pub stall_notify_after: u32,
    pub session_history_limit: usize,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub skip_send: bool,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup so parsing can be
    /// exercised without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let optional = |key: &str| -> Option<String> {
            lookup(key).filter(|value| !value.trim().is_empty())
        };

        let stall_regression_meters: f64 =
            parse_or(&lookup, "STALL_REGRESSION_METERS", 100.0)?;
        if !stall_regression_meters.is_finite() || stall_regression_meters <= 0.0 {
            return Err(anyhow!(
                "Invalid STALL_REGRESSION_METERS value: {}",
                stall_regression_meters
            ));
        }

        let session_history_limit: usize = parse_or(
            &lookup,
            "SESSION_HISTORY_LIMIT",
            crate::models::check_in::DEFAULT_HISTORY_LIMIT,
        )?;
        if session_history_limit == 0 {
            return Err(anyhow!("SESSION_HISTORY_LIMIT must be at least 1"));
        }

        Ok(Config {
            database_url: text("DATABASE_URL", MEMORY_DATABASE_URL),
            bind_addr: text("BIND_ADDR", "0.0.0.0:8080"),
            public_base_url: text("PUBLIC_BASE_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            auth_token_expiration_days: parse_or(&lookup, "AUTH_TOKEN_EXPIRATION_DAYS", 365)?,
            join_token_expiration_hours: parse_or(&lookup, "JOIN_TOKEN_EXPIRATION_HOURS", 24)?,
            password_reset_expiration_minutes: parse_or(
                &lookup,
                "PASSWORD_RESET_EXPIRATION_MINUTES",
                60,
            )?,
            directions_access_token: optional("DIRECTIONS_ACCESS_TOKEN"),
            directions_base_url: text("DIRECTIONS_BASE_URL", "https://api.mapbox.com")
                .trim_end_matches('/')
                .to_string(),
            directions_profile: text("DIRECTIONS_PROFILE", "mapbox/driving"),
            directions_timeout_ms: parse_or(&lookup, "DIRECTIONS_TIMEOUT_MS", 5000)?,
            push_endpoint: optional("PUSH_ENDPOINT"),
            push_access_token: optional("PUSH_ACCESS_TOKEN"),
            push_timeout_ms: parse_or(&lookup, "PUSH_TIMEOUT_MS", 5000)?,
            stall_regression_meters,
            stall_notify_after: parse_or(&lookup, "STALL_NOTIFY_AFTER", 5)?,
            session_history_limit,
            smtp: SmtpConfig {
                host: optional("SMTP_HOST"),
                port: parse_or(&lookup, "SMTP_PORT", 587)?,
                username: optional("SMTP_USERNAME"),
                password: optional("SMTP_PASSWORD"),
                from_address: text("SMTP_FROM_ADDRESS", "noreply@checkin.local"),
                skip_send: text("SMTP_SKIP_SEND", "false").eq_ignore_ascii_case("true"),
            },
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE_URL
    }

    pub fn directions_timeout(&self) -> Duration {
        Duration::from_millis(self.directions_timeout_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn join_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.join_token_expiration_hours as i64)
    }

    pub fn auth_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.auth_token_expiration_days as i64)
    }

    pub fn password_reset_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.password_reset_expiration_minutes as i64)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).filter(|value| !value.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value: {}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = config_from(&[]).expect("defaults");
        assert!(config.uses_memory_store());
        assert_eq!(config.join_token_expiration_hours, 24);
        assert_eq!(config.auth_token_expiration_days, 365);
        assert_eq!(config.password_reset_expiration_minutes, 60);
        assert_eq!(config.stall_regression_meters, 100.0);
        assert_eq!(config.stall_notify_after, 5);
        assert_eq!(config.session_history_limit, 500);
        assert!(config.directions_access_token.is_none());
        assert!(config.push_endpoint.is_none());
        assert_eq!(config.smtp.port, 587);
    }

    #[test]
    fn trailing_slash_is_trimmed_from_public_base_url() {
        let config = config_from(&[("PUBLIC_BASE_URL", "https://check.example.com/")])
            .expect("config");
        assert_eq!(config.public_base_url, "https://check.example.com");
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = config_from(&[("STALL_NOTIFY_AFTER", "many")]).unwrap_err();
        assert!(err.to_string().contains("STALL_NOTIFY_AFTER"));
    }

    #[test]
    fn non_positive_regression_threshold_is_rejected() {
        assert!(config_from(&[("STALL_REGRESSION_METERS", "0")]).is_err());
        assert!(config_from(&[("STALL_REGRESSION_METERS", "-20")]).is_err());
    }

    #[test]
    fn zero_history_limit_is_rejected() {
        assert!(config_from(&[("SESSION_HISTORY_LIMIT", "0")]).is_err());
        let config = config_from(&[("SESSION_HISTORY_LIMIT", "20")]).expect("config");
        assert_eq!(config.session_history_limit, 20);
    }

    #[test]
    fn blank_optional_values_are_treated_as_absent() {
        let config = config_from(&[("DIRECTIONS_ACCESS_TOKEN", "  ")]).expect("config");
        assert!(config.directions_access_token.is_none());
    }
}
