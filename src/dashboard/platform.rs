//! Platform Analytics dashboards (`par_dashboard`) living on the instance.

use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::servicenow::{Credential, DisplayValue, NowApi, NowError, Record, TableQuery};

pub const PLATFORM_TABLE: &str = "par_dashboard";
pub const UNTITLED: &str = "Untitled Dashboard";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlatformDashboard {
    pub sys_id: String,
    pub name: String,
    pub description: String,
    pub active: bool,
    pub created_on: String,
    pub updated_on: String,
    pub owner: String,
    pub category: String,
    pub source: &'static str,
}

impl PlatformDashboard {
    pub fn from_record(record: &Record) -> Self {
        let name = ["name", "title", "label"]
            .iter()
            .map(|key| record.display(key))
            .find(|text| !text.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());
        let description = ["description", "short_description"]
            .iter()
            .map(|key| record.display(key))
            .find(|text| !text.is_empty())
            .unwrap_or_default();
        let active = record.display("active") != "false";
        Self {
            sys_id: record.sys_id(),
            name,
            description,
            active,
            created_on: record.display("sys_created_on"),
            updated_on: record.display("sys_updated_on"),
            owner: record.display("owner"),
            category: record.display("category"),
            source: PLATFORM_TABLE,
        }
    }
}

#[instrument(name = "snowdash.platform.list", skip(api, cred))]
pub async fn list_platform_dashboards(
    api: &dyn NowApi,
    cred: &Credential,
) -> Result<Vec<PlatformDashboard>, NowError> {
    let query = TableQuery::new()
        .limit(200)
        .query("ORDERBYname")
        .display_value(DisplayValue::True);
    let records = api.list(cred, PLATFORM_TABLE, &query).await?;
    info!(count = records.len(), "platform dashboards fetched");
    Ok(records.iter().map(PlatformDashboard::from_record).collect())
}

/// `name` must already be non-blank.
#[instrument(name = "snowdash.platform.create", skip(api, cred, description))]
pub async fn create_platform_dashboard(
    api: &dyn NowApi,
    cred: &Credential,
    name: &str,
    description: Option<&str>,
) -> Result<PlatformDashboard, NowError> {
    let body = json!({
        "name": name.trim(),
        "description": description.map(str::trim).unwrap_or_default(),
        "active": true,
    });
    let record = api.create(cred, PLATFORM_TABLE, &body).await?;
    info!(sys_id = %record.sys_id(), "platform dashboard created");
    Ok(PlatformDashboard::from_record(&record))
}

#[instrument(name = "snowdash.platform.delete", skip(api, cred))]
pub async fn delete_platform_dashboard(
    api: &dyn NowApi,
    cred: &Credential,
    sys_id: &str,
) -> Result<(), NowError> {
    api.delete(cred, PLATFORM_TABLE, sys_id).await?;
    info!("platform dashboard deleted");
    Ok(())
}
