use serde::Deserialize;
use thiserror::Error;
use tracing::{instrument, warn};

use super::session::SessionUser;
use crate::servicenow::{Credential, NowApi, OAuthClient};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignInMode {
    Basic,
    Oauth,
}

#[derive(Clone, Deserialize)]
pub struct SignInRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub mode: Option<SignInMode>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignInError {
    #[error("Username and password are required")]
    MissingCredentials,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("OAuth sign-in is not configured")]
    OAuthUnavailable,
}

/// Verifies the caller against the instance and returns the identity plus
/// the credential to keep in the session.
///
/// With no explicit mode, OAuth is used whenever a client id and secret are
/// configured.
#[instrument(name = "snowdash.auth.sign_in", skip_all, fields(username = %request.username))]
pub async fn sign_in(
    api: &dyn NowApi,
    oauth: Option<&OAuthClient>,
    request: &SignInRequest,
) -> Result<(SessionUser, Credential), SignInError> {
    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return Err(SignInError::MissingCredentials);
    }

    let mode = request.mode.unwrap_or(if oauth.is_some() {
        SignInMode::Oauth
    } else {
        SignInMode::Basic
    });

    match mode {
        SignInMode::Basic => {
            let credential = Credential::basic(username, &request.password);
            match api.find_user(&credential, username).await {
                Ok(Some(record)) => Ok((SessionUser::from_record(&record, username), credential)),
                Ok(None) => {
                    warn!("sign-in user not found in sys_user");
                    Err(SignInError::InvalidCredentials)
                }
                Err(err) => {
                    warn!(%err, "basic sign-in rejected");
                    Err(SignInError::InvalidCredentials)
                }
            }
        }
        SignInMode::Oauth => {
            let client = oauth.ok_or(SignInError::OAuthUnavailable)?;
            let token = api
                .oauth_password_grant(client, username, &request.password)
                .await
                .map_err(|err| {
                    warn!(%err, "oauth password grant failed");
                    SignInError::InvalidCredentials
                })?;
            let credential = Credential::Bearer(token.access_token);
            // Profile lookup is best effort once the grant succeeded.
            let user = match api.find_user(&credential, username).await {
                Ok(Some(record)) => SessionUser::from_record(&record, username),
                Ok(None) => fallback_user(username),
                Err(err) => {
                    warn!(%err, "profile lookup after oauth grant failed");
                    fallback_user(username)
                }
            };
            Ok((user, credential))
        }
    }
}

fn fallback_user(username: &str) -> SessionUser {
    SessionUser {
        user_name: username.to_string(),
        ..Default::default()
    }
}
