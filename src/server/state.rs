use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::FromRef;
use tracing::warn;

use super::rate_limit::{RateLimitConfig, RateLimiter};
use crate::auth::{SessionManager, SessionSigner};
use crate::config::{AppConfig, ConfigError};
use crate::servicenow::{NowApi, OAuthClient};

/// Shared handles every route reads from.
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn NowApi>,
    pub sessions: Arc<SessionManager>,
    pub oauth: Option<OAuthClient>,
    pub instance_url: String,
    pub secure_cookie: bool,
    pub rate_limiter: Arc<RateLimiter>,
    pub health: Arc<ServeHealth>,
}

impl AppState {
    pub fn from_config(config: &AppConfig, api: Arc<dyn NowApi>) -> Result<Self, ConfigError> {
        let instance_url = config.instance_url()?;
        let signer = match config.session.secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => SessionSigner::new(secret),
            _ => {
                warn!("no session secret configured; sessions end when the process exits");
                SessionSigner::ephemeral()
            }
        };
        Ok(Self {
            api,
            sessions: Arc::new(SessionManager::new(signer, config.session_ttl())),
            oauth: config.oauth_client(),
            instance_url,
            secure_cookie: config.session.secure_cookie,
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::from(
                &config.rate_limits,
            ))),
            health: Arc::new(ServeHealth::new()),
        })
    }

    pub fn mark_live(&self) {
        self.health.mark_live();
    }

    pub fn mark_ready(&self) {
        self.health.mark_ready();
    }

    pub fn mark_unready(&self, error: impl Into<String>) {
        self.health.mark_unready(error);
    }
}

impl FromRef<AppState> for Arc<SessionManager> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

#[derive(Default)]
pub struct ServeHealth {
    live: AtomicBool,
    ready: AtomicBool,
    last_ready_check: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ServeHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_live(&self) {
        self.live.store(true, Ordering::SeqCst);
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        self.update_last_check();
        *self.error_slot() = None;
    }

    pub fn mark_unready(&self, error: impl Into<String>) {
        self.ready.store(false, Ordering::SeqCst);
        self.update_last_check();
        *self.error_slot() = Some(error.into());
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            ready: self.ready.load(Ordering::SeqCst),
            live: self.live.load(Ordering::SeqCst),
            last_ready_check: match self.last_ready_check.load(Ordering::SeqCst) {
                0 => None,
                value => Some(value),
            },
            last_error: self.error_slot().clone(),
        }
    }

    // A poisoned lock still holds a usable message.
    fn error_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update_last_check(&self) {
        if let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) {
            self.last_ready_check
                .store(duration.as_secs(), Ordering::SeqCst);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub ready: bool,
    pub live: bool,
    pub last_ready_check: Option<u64>,
    pub last_error: Option<String>,
}
