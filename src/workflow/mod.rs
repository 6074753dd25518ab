//! Discovery Onboarding: reminder phases, due dates, templates and the board
//! summary built over request items.

mod board;
mod due;
mod email;
mod phase;
mod state;

use serde_json::{Map, Value};

pub use board::{Board, BoardFilter, BoardRow, BoardStats, StatusFilter};
pub use due::{action_due_info, action_due_info_with, ActionDueInfo, Schedule, SCHEDULE};
pub use email::{EmailNumber, Reminder, WorkflowError, RITM_TABLE};
pub use phase::Phase;
pub use state::{
    format_now_date, is_discovery_item, is_overdue, is_pending, parse_now_date, EscalationView,
    NetworkType, WorkflowState, HOST_IP_FIELD, LAST_EMAIL_FIELD, NETWORK_TYPE_FIELD, NOTES_FIELD,
    STATUS_FIELD,
};

/// Fields a workflow PATCH may touch on a RITM.
pub const PATCHABLE_FIELDS: [&str; 5] = [
    STATUS_FIELD,
    LAST_EMAIL_FIELD,
    HOST_IP_FIELD,
    NETWORK_TYPE_FIELD,
    NOTES_FIELD,
];

pub const RITM_FIELDS: &str = "sys_id,number,short_description,state,priority,created_on,updated_on,requested_for,requested_by,description";

/// Client-side refresh cadence for the RITM views, in seconds.
pub const POLL_INTERVAL_SECS: u64 = 45;

/// Keeps only allow-listed keys. Present keys are forwarded even when null.
pub fn allowed_patch(body: &Value) -> Option<Map<String, Value>> {
    let object = body.as_object()?;
    let updates: Map<String, Value> = PATCHABLE_FIELDS
        .iter()
        .filter_map(|key| object.get(*key).map(|value| (key.to_string(), value.clone())))
        .collect();
    if updates.is_empty() {
        None
    } else {
        Some(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_keeps_only_allowed_fields() {
        let updates = allowed_patch(&json!({
            "u_discovery_status": "email_1_sent",
            "short_description": "hijack",
            "state": 3,
        }))
        .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates["u_discovery_status"], "email_1_sent");
    }

    #[test]
    fn patch_without_allowed_fields_is_rejected() {
        assert!(allowed_patch(&json!({"priority": 1})).is_none());
        assert!(allowed_patch(&json!([1, 2])).is_none());
        let nulls = allowed_patch(&json!({"u_notes": null})).unwrap();
        assert!(nulls["u_notes"].is_null());
    }
}
