use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::due::{action_due_info, ActionDueInfo};
use super::phase::Phase;
use crate::servicenow::Record;

pub const STATUS_FIELD: &str = "u_discovery_status";
pub const LAST_EMAIL_FIELD: &str = "u_last_email_date";
pub const HOST_IP_FIELD: &str = "u_host_ip";
pub const NETWORK_TYPE_FIELD: &str = "u_network_type";
pub const NOTES_FIELD: &str = "u_notes";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    #[default]
    N,
    F,
}

impl NetworkType {
    pub fn from_field(raw: &str) -> Self {
        if raw == "F" {
            NetworkType::F
        } else {
            NetworkType::N
        }
    }
}

/// Per-item workflow progress, rebuilt from the RITM's custom fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub phase: Phase,
    pub start_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email1_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email2_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email3_date: Option<DateTime<Utc>>,
    #[serde(rename = "hostIP", skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_type: Option<NetworkType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl WorkflowState {
    pub fn new(phase: Phase, start_date: DateTime<Utc>) -> Self {
        Self {
            phase,
            start_date,
            email1_date: None,
            email2_date: None,
            email3_date: None,
            host_ip: None,
            network_type: None,
            notes: None,
        }
    }

    /// Only one send date is stored upstream; it belongs to whichever email
    /// phase the item is currently in.
    pub fn from_record(record: &Record, now: DateTime<Utc>) -> Self {
        let start_date = parse_now_date(&record.raw("sys_created_on")).unwrap_or(now);
        let phase = Phase::from_status(&record.raw(STATUS_FIELD));
        let mut state = WorkflowState::new(phase, start_date);
        if phase == Phase::New {
            return state;
        }

        let last_email = parse_now_date(&record.raw(LAST_EMAIL_FIELD));
        match phase {
            Phase::Email1 => state.email1_date = last_email,
            Phase::Email2 => state.email2_date = last_email,
            Phase::Email3 => state.email3_date = last_email,
            _ => {}
        }
        state.host_ip = non_blank(record.raw(HOST_IP_FIELD));
        state.network_type = Some(NetworkType::from_field(&record.raw(NETWORK_TYPE_FIELD)));
        state.notes = non_blank(record.raw(NOTES_FIELD));
        state
    }

    /// Canned progress used to preview the board without touching real items.
    /// `index` is the item's position among discovery items.
    pub fn demo(index: usize, record: &Record, now: DateTime<Utc>) -> Self {
        let ten_days_ago = now - Duration::days(10);
        match index {
            0 => WorkflowState::new(Phase::ResponseReceived, ten_days_ago),
            1 => {
                let mut state = WorkflowState::new(Phase::Email1, ten_days_ago);
                state.email1_date = Some(ten_days_ago);
                state
            }
            2 => {
                let eight_days_ago = now - Duration::days(8);
                let mut state = WorkflowState::new(Phase::Email2, eight_days_ago);
                state.email1_date = Some(eight_days_ago - Duration::days(7));
                state.email2_date = Some(eight_days_ago);
                state
            }
            _ => WorkflowState::new(
                Phase::New,
                parse_now_date(&record.raw("sys_created_on")).unwrap_or(now),
            ),
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Accepts the instance's `YYYY-MM-DD HH:MM:SS` (UTC), RFC 3339, or a bare date.
pub fn parse_now_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}

pub fn format_now_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn is_discovery_item(record: &Record) -> bool {
    let catalog_item = record.display("cat_item").to_lowercase();
    catalog_item.contains("initiate discovery") || catalog_item.contains("discovery process")
}

pub fn is_pending(record: &Record) -> bool {
    state_text(record).contains("pending")
}

pub(crate) fn state_text(record: &Record) -> String {
    record.display("state").trim().to_lowercase()
}

pub fn is_overdue(record: &Record, state: &WorkflowState, now: DateTime<Utc>) -> bool {
    is_discovery_item(record) && action_due_info(state, now).days_overdue > 0
}

/// Both readings of "escalated" side by side. They are computed from
/// different inputs and can disagree for the same item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationView {
    /// Discovery item whose next reminder is past due.
    pub overdue_by_schedule: bool,
    /// Discovery item whose RITM state reads "Pending".
    pub escalated_by_status: bool,
    pub disagrees: bool,
}

impl EscalationView {
    pub fn evaluate(record: &Record, due: &ActionDueInfo) -> Self {
        let discovery = is_discovery_item(record);
        let overdue_by_schedule = discovery && due.days_overdue > 0;
        let escalated_by_status = discovery && is_pending(record);
        Self {
            overdue_by_schedule,
            escalated_by_status,
            disagrees: overdue_by_schedule != escalated_by_status,
        }
    }
}
