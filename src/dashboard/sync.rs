//! Dashboard documents stored as a ServiceNow user preference.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::document::{merge, DashboardDocument};
use crate::servicenow::{Credential, NowApi, NowError, TableQuery};

pub const PREFERENCE_NAME: &str = "custom_dashboard_config";
pub const PREFERENCE_TABLE: &str = "sys_user_preference";

/// What the instance currently holds for the signed-in user.
#[derive(Clone, Debug, Default)]
pub struct StoredPreference {
    pub preference_id: Option<String>,
    /// `None` when the preference is absent or its value does not parse.
    pub document: Option<DashboardDocument>,
}

/// Result of a save: the merged document and the preference it landed in.
#[derive(Clone, Debug)]
pub struct SavedPreference {
    pub preference_id: Option<String>,
    pub document: DashboardDocument,
}

fn preference_query(user_sys_id: &str) -> TableQuery {
    let mut query = format!("name={PREFERENCE_NAME}");
    if !user_sys_id.is_empty() {
        query.push_str(&format!("^user={user_sys_id}"));
    }
    TableQuery::new()
        .query(query)
        .fields("sys_id,name,value,user")
        .limit(1)
}

#[instrument(name = "snowdash.dashboard.load_preference", skip(api, cred))]
pub async fn load_preference(
    api: &dyn NowApi,
    cred: &Credential,
    user_sys_id: &str,
) -> Result<StoredPreference, NowError> {
    let records = api
        .list(cred, PREFERENCE_TABLE, &preference_query(user_sys_id))
        .await?;
    let Some(record) = records.into_iter().next() else {
        return Ok(StoredPreference::default());
    };
    let preference_id = Some(record.sys_id()).filter(|id| !id.is_empty());
    let raw = record.raw("value");
    if raw.trim().is_empty() {
        return Ok(StoredPreference {
            preference_id,
            document: None,
        });
    }
    let document = serde_json::from_str::<Value>(&raw)
        .map_err(|err| err.to_string())
        .and_then(|value| DashboardDocument::from_value(value).map_err(|err| err.to_string()));
    match document {
        Ok(document) => Ok(StoredPreference {
            preference_id,
            document: Some(document),
        }),
        Err(reason) => {
            warn!(%reason, "stored dashboard preference is unreadable");
            Ok(StoredPreference {
                preference_id,
                document: None,
            })
        }
    }
}

/// Merges `incoming` with whatever the preference holds, then writes the
/// result back. Uses PUT on a known or discovered preference, POST otherwise.
#[instrument(
    name = "snowdash.dashboard.save_preference",
    skip(api, cred, incoming),
    fields(revision = incoming.revision)
)]
pub async fn save_preference(
    api: &dyn NowApi,
    cred: &Credential,
    user_sys_id: &str,
    preference_id: Option<&str>,
    incoming: DashboardDocument,
    now: DateTime<Utc>,
) -> Result<SavedPreference, NowError> {
    let stored = load_preference(api, cred, user_sys_id).await?;
    let document = match &stored.document {
        Some(remote) => merge(&incoming, remote, now),
        None => incoming,
    };
    let value = serde_json::to_string(&document)
        .map_err(|err| NowError::Decode(err.to_string()))?;

    let target = preference_id
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .or(stored.preference_id);

    let record = match target {
        Some(id) => {
            debug!(preference_id = %id, "updating dashboard preference");
            api.replace(cred, PREFERENCE_TABLE, &id, &json!({ "value": value }))
                .await?
        }
        None => {
            debug!("creating dashboard preference");
            let mut body = json!({
                "name": PREFERENCE_NAME,
                "value": value,
                "type": "string",
            });
            if !user_sys_id.is_empty() {
                body["user"] = json!(user_sys_id);
            }
            api.create(cred, PREFERENCE_TABLE, &body).await?
        }
    };

    Ok(SavedPreference {
        preference_id: Some(record.sys_id()).filter(|id| !id.is_empty()),
        document,
    })
}

#[instrument(name = "snowdash.dashboard.delete_preference", skip(api, cred))]
pub async fn delete_preference(
    api: &dyn NowApi,
    cred: &Credential,
    preference_id: &str,
) -> Result<(), NowError> {
    api.delete(cred, PREFERENCE_TABLE, preference_id).await
}
