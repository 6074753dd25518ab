//! IT operations overview: MID servers plus a summary assembled from several
//! optional tables. Instances without Discovery or Event Management still get
//! a summary, with zeros where a table is missing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::servicenow::{Credential, DisplayValue, NowApi, NowError, Record, TablePage, TableQuery};
use crate::workflow::parse_now_date;

pub const MID_SERVER_TABLE: &str = "ecc_agent";
pub const MID_SERVER_FIELDS: &str = "sys_id,name,status,host_name,ip,version,last_refreshed,validated";
const RECENT_LIMIT: usize = 5;

/// Encoded query for healthy MID servers, narrowed by host/IP prefix and name.
pub fn mid_server_query(host_ip: Option<&str>, name: Option<&str>) -> String {
    let mut query = String::from("statusOKAY^ORstatusUP");
    if let Some(host) = host_ip.map(str::trim).filter(|value| !value.is_empty()) {
        query.push_str(&format!("^host_nameSTARTSWITH{host}^ORipSTARTSWITH{host}"));
    }
    if let Some(name) = name.map(str::trim).filter(|value| !value.is_empty()) {
        query.push_str(&format!("^nameLIKE{name}"));
    }
    query
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MidServers {
    pub mid_servers: Vec<Record>,
    pub total: u64,
}

#[instrument(name = "snowdash.itom.mid_servers", skip(api, cred))]
pub async fn mid_servers(
    api: &dyn NowApi,
    cred: &Credential,
    host_ip: Option<&str>,
    name: Option<&str>,
) -> Result<MidServers, NowError> {
    let query = mid_server_query(host_ip, name);
    let count_query = TableQuery::new().query(query.clone()).fields("sys_id").limit(1);
    let total = match api.list_with_count(cred, MID_SERVER_TABLE, &count_query).await {
        Ok(page) => page.total_count,
        Err(err) => {
            warn!(error = %err, "MID server count unavailable");
            None
        }
    };
    let list_query = TableQuery::new()
        .query(query)
        .fields(MID_SERVER_FIELDS)
        .limit(50)
        .display_value(DisplayValue::All);
    let servers = api.list(cred, MID_SERVER_TABLE, &list_query).await?;
    Ok(MidServers {
        total: total.unwrap_or(servers.len() as u64),
        mid_servers: servers,
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItomMetrics {
    pub discovery_runs: u64,
    pub cis_discovered: u64,
    pub open_events: u64,
    pub services_mapped: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: String,
    pub time: String,
    pub status: &'static str,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItomSummary {
    pub metrics: ItomMetrics,
    pub recent_operations: Vec<Operation>,
    pub instance_url: String,
}

/// "12 min ago", "3 hr ago", "2 day(s) ago".
pub fn time_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - at).num_milliseconds().max(0);
    let minutes = elapsed / 60_000;
    let hours = elapsed / 3_600_000;
    if minutes < 60 {
        format!("{minutes} min ago")
    } else if hours < 24 {
        format!("{hours} hr ago")
    } else {
        format!("{} day(s) ago", elapsed / 86_400_000)
    }
}

fn created_at(record: &Record, now: DateTime<Utc>) -> DateTime<Utc> {
    parse_now_date(&record.raw("sys_created_on")).unwrap_or(now)
}

fn recent_first() -> TableQuery {
    TableQuery::new().order_desc("sys_created_on")
}

fn count_only() -> TableQuery {
    TableQuery::new().fields("sys_id").limit(1)
}

fn best_effort<T>(what: &'static str, result: Result<T, NowError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(source = what, error = %err, "ITOM sub-query failed");
            None
        }
    }
}

async fn services_mapped(api: &dyn NowApi, cred: &Credential) -> Option<u64> {
    match api.list_with_count(cred, "cmdb_ci_service", &count_only()).await {
        Ok(page) => page.total_count,
        Err(err) => {
            warn!(error = %err, "cmdb_ci_service unavailable, trying sa_service");
            best_effort(
                "sa_service",
                api.list_with_count(cred, "sa_service", &count_only()).await,
            )
            .and_then(|page| page.total_count)
        }
    }
}

#[instrument(name = "snowdash.itom.summary", skip(api, cred, instance_url))]
pub async fn summary(
    api: &dyn NowApi,
    cred: &Credential,
    instance_url: &str,
    now: DateTime<Utc>,
) -> ItomSummary {
    let discovery_query = recent_first()
        .fields("sys_id,sys_created_on,status")
        .limit(100)
        .display_value(DisplayValue::All);
    let events_query = recent_first()
        .query("state=1^ORstate=2")
        .fields("sys_id,description,state,sys_created_on")
        .limit(10)
        .display_value(DisplayValue::All);
    let cis_query = count_only();

    let (discovery, cis, events, services) = tokio::join!(
        api.list(cred, "discovery_status", &discovery_query),
        api.list_with_count(cred, "cmdb_ci", &cis_query),
        api.list_with_count(cred, "em_event", &events_query),
        services_mapped(api, cred),
    );

    let mut metrics = ItomMetrics::default();
    let mut operations = Vec::new();

    if let Some(runs) = best_effort("discovery_status", discovery) {
        metrics.discovery_runs = runs.len() as u64;
        for run in runs.iter().take(3) {
            let created_at = created_at(run, now);
            operations.push(Operation {
                id: format!("discovery-{}", run.sys_id()),
                kind: "Discovery",
                description: format!("Discovery run – {}", run.display("status")),
                time: time_ago(created_at, now),
                status: "Success",
                created_at,
            });
        }
    }
    if let Some(page) = best_effort("cmdb_ci", cis) {
        metrics.cis_discovered = page.count_or_len();
    }
    if let Some(TablePage {
        records,
        total_count,
    }) = best_effort("em_event", events)
    {
        metrics.open_events = total_count.unwrap_or(records.len() as u64);
        for event in records.iter().take(2) {
            let created_at = created_at(event, now);
            let description = event.display("description");
            operations.push(Operation {
                id: format!("event-{}", event.sys_id()),
                kind: "Event",
                description: if description.is_empty() {
                    "Event".to_string()
                } else {
                    description
                },
                time: time_ago(created_at, now),
                status: "Open",
                created_at,
            });
        }
    }
    if let Some(count) = services {
        metrics.services_mapped = count;
    }

    operations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    operations.truncate(RECENT_LIMIT);

    ItomSummary {
        metrics,
        recent_operations: operations,
        instance_url: instance_url.to_string(),
    }
}
