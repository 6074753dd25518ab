//! Application configuration.
//!
//! Loaded from YAML by the CLI (see `cli::runtime::load_config`) and then
//! patched from the environment so deployments can keep secrets out of files.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::servicenow::OAuthClient;

pub const INSTANCE_URL_ENV: &str = "SERVICENOW_INSTANCE_URL";
pub const CLIENT_ID_ENV: &str = "SERVICENOW_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "SERVICENOW_CLIENT_SECRET";
pub const SESSION_SECRET_ENV: &str = "SNOWDASH_SESSION_SECRET";
pub const SESSION_TTL_ENV: &str = "SNOWDASH_SESSION_TTL_HOURS";
pub const SIGNIN_RATE_ENV: &str = "SNOWDASH_SIGNIN_PER_MIN";
pub const EMAIL_RATE_ENV: &str = "SNOWDASH_EMAIL_PER_MIN";

const REDACTED: &str = "<redacted>";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ServiceNow instance URL is not configured (set {INSTANCE_URL_ENV})")]
    MissingInstanceUrl,
    #[error("invalid ServiceNow instance URL `{url}`: {reason}")]
    InvalidInstanceUrl { url: String, reason: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub servicenow: ServiceNowSettings,
    pub session: SessionSettings,
    pub rate_limits: RateLimitSettings,
    pub dashboard: DashboardSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceNowSettings {
    pub instance_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ServiceNowSettings {
    fn default() -> Self {
        Self {
            instance_url: String::new(),
            client_id: None,
            client_secret: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub secret: Option<String>,
    pub ttl_hours: u64,
    /// Adds `Secure` to the session cookie; turn on behind TLS.
    pub secure_cookie: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            secret: None,
            ttl_hours: 8,
            secure_cookie: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub signin_per_min: u32,
    pub email_per_min: u32,
    pub idle_prune_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            signin_per_min: 10,
            email_per_min: 20,
            idle_prune_secs: 600,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    /// Local dashboard document used by the `dashboard` command.
    pub store_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = lookup(INSTANCE_URL_ENV) {
            self.servicenow.instance_url = url;
        }
        if let Some(id) = lookup(CLIENT_ID_ENV) {
            self.servicenow.client_id = Some(id);
        }
        if let Some(secret) = lookup(CLIENT_SECRET_ENV) {
            self.servicenow.client_secret = Some(secret);
        }
        if let Some(secret) = lookup(SESSION_SECRET_ENV) {
            self.session.secret = Some(secret);
        }
        if let Some(hours) = lookup(SESSION_TTL_ENV).and_then(|raw| raw.parse().ok()) {
            self.session.ttl_hours = hours;
        }
        if let Some(limit) = lookup(SIGNIN_RATE_ENV).and_then(|raw| raw.parse().ok()) {
            self.rate_limits.signin_per_min = limit;
        }
        if let Some(limit) = lookup(EMAIL_RATE_ENV).and_then(|raw| raw.parse().ok()) {
            self.rate_limits.email_per_min = limit;
        }
    }

    /// Instance URL without a trailing slash, checked for an http(s) scheme.
    pub fn instance_url(&self) -> Result<String, ConfigError> {
        let raw = self.servicenow.instance_url.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingInstanceUrl);
        }
        let parsed = Url::parse(raw).map_err(|err| ConfigError::InvalidInstanceUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidInstanceUrl {
                url: raw.to_string(),
                reason: "scheme must be http or https".into(),
            });
        }
        Ok(raw.trim_end_matches('/').to_string())
    }

    pub fn oauth_client(&self) -> Option<OAuthClient> {
        match (&self.servicenow.client_id, &self.servicenow.client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some(OAuthClient {
                    client_id: id.clone(),
                    client_secret: secret.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.servicenow.timeout_secs.max(1))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session.ttl_hours.clamp(1, 24 * 30) as i64)
    }

    pub fn dashboard_store_path(&self) -> PathBuf {
        if let Some(path) = &self.dashboard.store_path {
            return path.clone();
        }
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".snowdash"));
        path.push("snowdash");
        path.push("dashboards.json");
        path
    }

    /// Copy safe to print: secrets replaced with a marker.
    pub fn redacted(&self) -> AppConfig {
        let mut copy = self.clone();
        if copy.servicenow.client_secret.is_some() {
            copy.servicenow.client_secret = Some(REDACTED.to_string());
        }
        if copy.session.secret.is_some() {
            copy.session.secret = Some(REDACTED.to_string());
        }
        copy
    }
}
