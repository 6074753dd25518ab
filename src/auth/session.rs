use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::servicenow::{Credential, Record};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("malformed session token")]
    Malformed,
    #[error("session signature mismatch")]
    BadSignature,
    #[error("session expired")]
    Expired,
    #[error("session not found")]
    Unknown,
}

/// The signed part of a session token. The credential never leaves the server.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sid: String,
    pub sub: String,
    pub exp: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub sys_id: String,
    pub user_name: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl SessionUser {
    pub fn from_record(record: &Record, fallback_username: &str) -> Self {
        let user_name = match record.display("user_name") {
            name if name.is_empty() => fallback_username.to_string(),
            name => name,
        };
        Self {
            sys_id: record.sys_id(),
            user_name,
            email: record.display("email"),
            first_name: record.display("first_name"),
            last_name: record.display("last_name"),
        }
    }

    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        match full.trim() {
            "" => self.user_name.clone(),
            name => name.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ActiveSession {
    pub id: String,
    pub user: SessionUser,
    pub credential: Credential,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ActiveSession {
    pub fn auth_mode(&self) -> &'static str {
        if self.credential.is_oauth() {
            "oauth"
        } else {
            "basic"
        }
    }
}

/// HMAC-SHA256 signer for `payload.signature` tokens.
#[derive(Clone)]
pub struct SessionSigner {
    key: Vec<u8>,
}

impl SessionSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    /// Per-process secret for when none is configured. Sessions will not
    /// survive a restart.
    pub fn ephemeral() -> Self {
        let secret = format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        Self::new(secret)
    }

    pub fn sign(&self, claims: &TokenClaims) -> Result<String, SessionError> {
        let json = serde_json::to_vec(claims).map_err(|_| SessionError::Malformed)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = hex::encode(self.mac(payload.as_bytes())?);
        Ok(format!("{payload}.{signature}"))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, SessionError> {
        let (payload, signature) = token.split_once('.').ok_or(SessionError::Malformed)?;
        let provided = hex::decode(signature).map_err(|_| SessionError::Malformed)?;
        let expected = self.mac(payload.as_bytes())?;
        if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            return Err(SessionError::BadSignature);
        }
        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SessionError::Malformed)?;
        let claims: TokenClaims =
            serde_json::from_slice(&json).map_err(|_| SessionError::Malformed)?;
        if claims.exp <= now.timestamp() {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self, message: &[u8]) -> Result<Vec<u8>, SessionError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| SessionError::Malformed)?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Server-side session table keyed by session id.
pub struct SessionManager {
    signer: SessionSigner,
    ttl: Duration,
    sessions: Arc<RwLock<HashMap<String, ActiveSession>>>,
}

impl SessionManager {
    pub fn new(signer: SessionSigner, ttl: Duration) -> Self {
        Self {
            signer,
            ttl,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn create(
        &self,
        user: SessionUser,
        credential: Credential,
    ) -> Result<(ActiveSession, String), SessionError> {
        let now = Utc::now();
        let session = ActiveSession {
            id: Uuid::new_v4().to_string(),
            user,
            credential,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        let token = self.signer.sign(&TokenClaims {
            sid: session.id.clone(),
            sub: session.user.user_name.clone(),
            exp: session.expires_at.timestamp(),
        })?;
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        info!(user = %session.user.user_name, mode = session.auth_mode(), "session created");
        Ok((session, token))
    }

    pub async fn resolve(&self, token: &str) -> Result<ActiveSession, SessionError> {
        let now = Utc::now();
        let claims = self.signer.verify(token, now)?;
        let sessions = self.sessions.read().await;
        let session = sessions.get(&claims.sid).ok_or(SessionError::Unknown)?;
        if session.expires_at <= now {
            return Err(SessionError::Expired);
        }
        Ok(session.clone())
    }

    pub async fn revoke(&self, token: &str) -> bool {
        let Ok(claims) = self.signer.verify(token, Utc::now()) else {
            return false;
        };
        self.sessions.write().await.remove(&claims.sid).is_some()
    }

    pub async fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "pruned expired sessions");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: i64) -> TokenClaims {
        TokenClaims {
            sid: "sid-1".into(),
            sub: "abel.tuter".into(),
            exp,
        }
    }

    #[test]
    fn signed_token_verifies() {
        let signer = SessionSigner::new("secret");
        let now = Utc::now();
        let token = signer.sign(&claims(now.timestamp() + 60)).unwrap();
        assert_eq!(signer.verify(&token, now).unwrap().sub, "abel.tuter");
    }

    #[test]
    fn tampered_and_foreign_tokens_are_rejected() {
        let signer = SessionSigner::new("secret");
        let now = Utc::now();
        let token = signer.sign(&claims(now.timestamp() + 60)).unwrap();

        let (_, signature) = token.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&TokenClaims {
                sub: "admin".into(),
                ..claims(now.timestamp() + 60)
            })
            .unwrap(),
        );
        let forged = format!("{forged_payload}.{signature}");
        assert_eq!(signer.verify(&forged, now), Err(SessionError::BadSignature));

        let other = SessionSigner::new("other");
        assert_eq!(other.verify(&token, now), Err(SessionError::BadSignature));
        assert_eq!(signer.verify("garbage", now), Err(SessionError::Malformed));
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = SessionSigner::new("secret");
        let now = Utc::now();
        let token = signer.sign(&claims(now.timestamp() - 1)).unwrap();
        assert_eq!(signer.verify(&token, now), Err(SessionError::Expired));
    }

    #[tokio::test]
    async fn manager_round_trip_and_revoke() {
        let manager = SessionManager::new(SessionSigner::ephemeral(), Duration::hours(1));
        let user = SessionUser {
            sys_id: "u1".into(),
            user_name: "abel.tuter".into(),
            ..Default::default()
        };
        let (session, token) = manager
            .create(user, Credential::basic("abel.tuter", "pw"))
            .await
            .unwrap();
        let resolved = manager.resolve(&token).await.unwrap();
        assert_eq!(resolved.id, session.id);
        assert_eq!(resolved.auth_mode(), "basic");

        assert!(manager.revoke(&token).await);
        assert_eq!(
            manager.resolve(&token).await.unwrap_err(),
            SessionError::Unknown
        );
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let user = SessionUser {
            user_name: "svc.discovery".into(),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "svc.discovery");
    }
}
