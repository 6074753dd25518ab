use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::phase::Phase;
use super::state::WorkflowState;

/// Days between reminder steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub email1_to_email2: i64,
    pub email2_to_email3: i64,
    pub email3_to_escalation: i64,
}

pub const SCHEDULE: Schedule = Schedule {
    email1_to_email2: 7,
    email2_to_email3: 7,
    email3_to_escalation: 3,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDueInfo {
    pub due_date: Option<DateTime<Utc>>,
    pub days_overdue: i64,
    pub next_action: String,
}

impl ActionDueInfo {
    fn new(due_date: Option<DateTime<Utc>>, days_overdue: i64, next_action: &str) -> Self {
        Self {
            due_date,
            days_overdue,
            next_action: next_action.to_string(),
        }
    }

    fn empty() -> Self {
        Self::new(None, 0, "")
    }
}

pub fn action_due_info(state: &WorkflowState, now: DateTime<Utc>) -> ActionDueInfo {
    action_due_info_with(&SCHEDULE, state, now)
}

pub fn action_due_info_with(
    schedule: &Schedule,
    state: &WorkflowState,
    now: DateTime<Utc>,
) -> ActionDueInfo {
    let (sent, offset, next) = match state.phase {
        // Overdue for `new` items is judged from the RITM status instead.
        Phase::New => return ActionDueInfo::new(Some(state.start_date), 0, "Send Email 1"),
        Phase::Email1 => (state.email1_date, schedule.email1_to_email2, "Send Email 2"),
        Phase::Email2 => (state.email2_date, schedule.email2_to_email3, "Send Email 3"),
        Phase::Email3 => (state.email3_date, schedule.email3_to_escalation, "Escalate"),
        Phase::ResponseReceived => {
            return ActionDueInfo::new(None, 0, "Schedule TEM / Complete")
        }
        Phase::Escalation | Phase::Completed => return ActionDueInfo::empty(),
    };

    match sent {
        Some(sent) => {
            let due = sent + Duration::days(offset);
            ActionDueInfo::new(Some(due), whole_days_overdue(due, now), next)
        }
        None => ActionDueInfo::new(None, 0, next),
    }
}

fn whole_days_overdue(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed_ms = (now - due).num_milliseconds();
    elapsed_ms.div_euclid(Duration::days(1).num_milliseconds()).max(0)
}
