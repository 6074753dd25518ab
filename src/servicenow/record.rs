use std::fmt;

use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::field::FieldValue;

/// A single row returned by the Table API.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn field(&self, key: &str) -> FieldValue {
        self.0
            .get(key)
            .map(FieldValue::from_json)
            .unwrap_or_default()
    }

    pub fn display(&self, key: &str) -> String {
        self.field(key).display()
    }

    pub fn raw(&self, key: &str) -> String {
        self.field(key).raw()
    }

    pub fn sys_id(&self) -> String {
        self.raw("sys_id")
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

}

impl From<Map<String, Value>> for Record {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// `sysparm_*` parameters for a table read. The encoded query is forwarded
/// exactly as the caller supplied it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub query: Option<String>,
    pub fields: Option<String>,
    pub order_desc: Option<String>,
    pub display_value: Option<DisplayValue>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayValue {
    True,
    All,
}

impl DisplayValue {
    fn as_param(self) -> &'static str {
        match self {
            DisplayValue::True => "true",
            DisplayValue::All => "all",
        }
    }
}

impl TableQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = if query.trim().is_empty() {
            None
        } else {
            Some(query)
        };
        self
    }

    pub fn fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    pub fn order_desc(mut self, field: impl Into<String>) -> Self {
        self.order_desc = Some(field.into());
        self
    }

    pub fn display_value(mut self, mode: DisplayValue) -> Self {
        self.display_value = Some(mode);
        self
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(limit) = self.limit {
            params.push(("sysparm_limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("sysparm_offset", offset.to_string()));
        }
        let encoded = match (self.query.as_deref(), self.order_desc.as_deref()) {
            (Some(query), Some(order)) => Some(format!("{query}^ORDERBYDESC{order}")),
            (Some(query), None) => Some(query.to_string()),
            (None, Some(order)) => Some(format!("ORDERBYDESC{order}")),
            (None, None) => None,
        };
        if let Some(encoded) = encoded {
            params.push(("sysparm_query", encoded));
        }
        if let Some(fields) = self.fields.as_deref() {
            params.push(("sysparm_fields", fields.to_string()));
        }
        if let Some(mode) = self.display_value {
            params.push(("sysparm_display_value", mode.as_param().to_string()));
        }
        params
    }
}

/// Records plus the `X-Total-Count` header, when the instance sent one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TablePage {
    pub records: Vec<Record>,
    pub total_count: Option<u64>,
}

impl TablePage {
    pub fn count_or_len(&self) -> u64 {
        self.total_count.unwrap_or(self.records.len() as u64)
    }
}

pub fn parse_total_count(header: Option<&str>) -> Option<u64> {
    header.and_then(|raw| raw.trim().parse::<u64>().ok())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_record_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// How a request authenticates against the instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "token", rename_all = "snake_case")]
pub enum Credential {
    Bearer(String),
    Basic(String),
}

impl Credential {
    pub fn basic(username: &str, password: &str) -> Self {
        Credential::Basic(Base64.encode(format!("{username}:{password}")))
    }

    pub fn header_value(&self) -> String {
        match self {
            Credential::Bearer(token) => format!("Bearer {token}"),
            Credential::Basic(encoded) => format!("Basic {encoded}"),
        }
    }

    pub fn is_oauth(&self) -> bool {
        matches!(self, Credential::Bearer(_))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Credential::Bearer(<redacted>)"),
            Credential::Basic(_) => f.write_str("Credential::Basic(<redacted>)"),
        }
    }
}
