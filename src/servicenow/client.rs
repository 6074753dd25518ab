use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::record::{
    parse_total_count, Credential, EmailMessage, OAuthClient, OAuthToken, Record, TablePage,
    TableQuery,
};

#[derive(Debug, Error)]
pub enum NowError {
    #[error("ServiceNow returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("ServiceNow request failed: {0}")]
    Transport(String),
    #[error("invalid ServiceNow identifier `{0}`")]
    InvalidIdentifier(String),
    #[error("unexpected ServiceNow response: {0}")]
    Decode(String),
}

impl NowError {
    pub fn status(&self) -> Option<u16> {
        match self {
            NowError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The message worth showing to a user: the upstream text when there is one.
    pub fn upstream_message(&self) -> String {
        match self {
            NowError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for NowError {
    fn from(err: reqwest::Error) -> Self {
        NowError::Transport(err.to_string())
    }
}

/// Operations the dashboard needs from a ServiceNow instance.
///
/// Every call carries the caller's credential; the client itself holds no
/// user identity.
#[async_trait]
pub trait NowApi: Send + Sync {
    async fn list_with_count(
        &self,
        cred: &Credential,
        table: &str,
        query: &TableQuery,
    ) -> Result<TablePage, NowError>;

    async fn list(
        &self,
        cred: &Credential,
        table: &str,
        query: &TableQuery,
    ) -> Result<Vec<Record>, NowError> {
        Ok(self.list_with_count(cred, table, query).await?.records)
    }

    async fn create(&self, cred: &Credential, table: &str, body: &Value)
        -> Result<Record, NowError>;

    async fn update(
        &self,
        cred: &Credential,
        table: &str,
        sys_id: &str,
        body: &Value,
    ) -> Result<Record, NowError>;

    async fn replace(
        &self,
        cred: &Credential,
        table: &str,
        sys_id: &str,
        body: &Value,
    ) -> Result<Record, NowError>;

    async fn delete(&self, cred: &Credential, table: &str, sys_id: &str) -> Result<(), NowError>;

    /// Queues an outbound email; returns the email record id when reported.
    async fn send_email(
        &self,
        cred: &Credential,
        message: &EmailMessage,
    ) -> Result<Option<String>, NowError>;

    async fn oauth_password_grant(
        &self,
        client: &OAuthClient,
        username: &str,
        password: &str,
    ) -> Result<OAuthToken, NowError>;

    async fn find_user(
        &self,
        cred: &Credential,
        username: &str,
    ) -> Result<Option<Record>, NowError> {
        let query = TableQuery::new()
            .query(format!("user_name={username}"))
            .fields("sys_id,user_name,email,first_name,last_name")
            .limit(1);
        Ok(self
            .list(cred, "sys_user", &query)
            .await?
            .into_iter()
            .next())
    }
}

pub struct ServiceNowClient {
    http: Client,
    instance_url: String,
}

impl ServiceNowClient {
    pub fn new(instance_url: &str, timeout: Duration) -> Result<Self, NowError> {
        let instance_url = instance_url.trim().trim_end_matches('/').to_string();
        if instance_url.is_empty() {
            return Err(NowError::Transport(
                "ServiceNow instance URL is not configured".into(),
            ));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| NowError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, instance_url })
    }

    fn table_url(&self, table: &str, sys_id: Option<&str>) -> Result<String, NowError> {
        ensure_identifier(table)?;
        let mut url = format!("{}/api/now/table/{}", self.instance_url, table);
        if let Some(sys_id) = sys_id {
            ensure_identifier(sys_id)?;
            url.push('/');
            url.push_str(sys_id);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: &str, cred: &Credential) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(header::AUTHORIZATION, cred.header_value())
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
    }

    async fn write_record(
        &self,
        method: Method,
        cred: &Credential,
        url: String,
        body: &Value,
    ) -> Result<Record, NowError> {
        let response = self.request(method, &url, cred).json(body).send().await?;
        let response = ensure_success(response).await?;
        let envelope: ResultEnvelope = response
            .json()
            .await
            .map_err(|err| NowError::Decode(err.to_string()))?;
        Record::from_value(envelope.result)
            .ok_or_else(|| NowError::Decode("result is not an object".into()))
    }
}

#[derive(Deserialize)]
struct ResultEnvelope {
    #[serde(default)]
    result: Value,
}

#[async_trait]
impl NowApi for ServiceNowClient {
    async fn list_with_count(
        &self,
        cred: &Credential,
        table: &str,
        query: &TableQuery,
    ) -> Result<TablePage, NowError> {
        let url = self.table_url(table, None)?;
        debug!(table, "listing ServiceNow records");
        let response = self
            .request(Method::GET, &url, cred)
            .query(&query.to_params())
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let total_count = parse_total_count(
            response
                .headers()
                .get("x-total-count")
                .and_then(|value| value.to_str().ok()),
        );
        let envelope: ResultEnvelope = response
            .json()
            .await
            .map_err(|err| NowError::Decode(err.to_string()))?;
        let records = match envelope.result {
            Value::Array(items) => items.into_iter().filter_map(Record::from_value).collect(),
            Value::Null => Vec::new(),
            other => return Err(NowError::Decode(format!("expected array, got {other}"))),
        };
        Ok(TablePage {
            records,
            total_count,
        })
    }

    async fn create(
        &self,
        cred: &Credential,
        table: &str,
        body: &Value,
    ) -> Result<Record, NowError> {
        let url = self.table_url(table, None)?;
        self.write_record(Method::POST, cred, url, body).await
    }

    async fn update(
        &self,
        cred: &Credential,
        table: &str,
        sys_id: &str,
        body: &Value,
    ) -> Result<Record, NowError> {
        let url = self.table_url(table, Some(sys_id))?;
        self.write_record(Method::PATCH, cred, url, body).await
    }

    async fn replace(
        &self,
        cred: &Credential,
        table: &str,
        sys_id: &str,
        body: &Value,
    ) -> Result<Record, NowError> {
        let url = self.table_url(table, Some(sys_id))?;
        self.write_record(Method::PUT, cred, url, body).await
    }

    async fn delete(&self, cred: &Credential, table: &str, sys_id: &str) -> Result<(), NowError> {
        let url = self.table_url(table, Some(sys_id))?;
        let response = self.request(Method::DELETE, &url, cred).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn send_email(
        &self,
        cred: &Credential,
        message: &EmailMessage,
    ) -> Result<Option<String>, NowError> {
        let url = format!("{}/api/now/email", self.instance_url);
        let response = self
            .request(Method::POST, &url, cred)
            .json(message)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(body
            .pointer("/result/sys_id")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn oauth_password_grant(
        &self,
        client: &OAuthClient,
        username: &str,
        password: &str,
    ) -> Result<OAuthToken, NowError> {
        let url = format!("{}/oauth_token.do", self.instance_url);
        let form = [
            ("grant_type", "password"),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("username", username),
            ("password", password),
        ];
        let response = self
            .http
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        response
            .json::<OAuthToken>()
            .await
            .map_err(|err| NowError::Decode(err.to_string()))
    }
}

async fn ensure_success(response: Response) -> Result<Response, NowError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = upstream_error_message(&text)
        .unwrap_or_else(|| fallback_message(status.as_u16(), status.canonical_reason(), &text));
    warn!(status = status.as_u16(), %message, "ServiceNow request rejected");
    Err(NowError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Pulls `error.message` (or `error.detail`, or `error_description` from the
/// OAuth endpoint) out of an error body.
pub(crate) fn upstream_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let candidates = [
        parsed.pointer("/error/message"),
        parsed.pointer("/error/detail"),
        parsed.get("error_description"),
        parsed.get("error").filter(|value| value.is_string()),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string);
    found
}

fn fallback_message(status: u16, reason: Option<&str>, body: &str) -> String {
    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    match reason {
        Some(reason) => format!("{status} {reason}"),
        None => status.to_string(),
    }
}

/// Table names and sys_ids go into URLs and encoded queries verbatim, so only
/// `[A-Za-z0-9_]` is accepted.
pub fn ensure_identifier(candidate: &str) -> Result<(), NowError> {
    let valid = !candidate.is_empty()
        && candidate
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(NowError::InvalidIdentifier(candidate.to_string()))
    }
}
