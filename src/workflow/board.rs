use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::due::{action_due_info, ActionDueInfo};
use super::email::RITM_TABLE;
use super::phase::Phase;
use super::state::{is_discovery_item, is_pending, state_text, EscalationView, WorkflowState};
use crate::servicenow::{record_link, Record};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Discovery,
    /// Discovery items whose RITM state reads "Pending".
    Escalation,
    Phase(Phase),
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(StatusFilter::All),
            "discovery" => Ok(StatusFilter::Discovery),
            "escalation" => Ok(StatusFilter::Escalation),
            other => other.parse::<Phase>().map(StatusFilter::Phase),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BoardFilter {
    pub search: String,
    pub status: StatusFilter,
}

impl BoardFilter {
    fn matches_search(&self, row: &BoardRow) -> bool {
        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [&row.number, &row.catalog_item, &row.requester]
            .iter()
            .any(|text| text.to_lowercase().contains(&needle))
    }

    fn matches_status(&self, row: &BoardRow, record: &Record) -> bool {
        match self.status {
            StatusFilter::All => true,
            StatusFilter::Discovery => row.discovery,
            StatusFilter::Escalation => row.discovery && is_pending(record),
            StatusFilter::Phase(phase) => row.workflow.phase == phase,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRow {
    pub sys_id: String,
    pub number: String,
    pub catalog_item: String,
    pub requester: String,
    pub state: String,
    pub discovery: bool,
    pub phase_label: &'static str,
    pub workflow: WorkflowState,
    pub due: ActionDueInfo,
    pub escalation: EscalationView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardStats {
    /// Discovery items only.
    pub total: usize,
    pub open: usize,
    pub pending: usize,
    pub in_progress: usize,
    /// Discovery items with a "Pending" RITM state.
    pub escalated: usize,
    pub completed: usize,
    /// Discovery items past their reminder due date.
    pub schedule_overdue: usize,
    pub escalation_mismatches: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub rows: Vec<BoardRow>,
    pub stats: BoardStats,
    pub demo: bool,
    pub generated_at: DateTime<Utc>,
}

impl Board {
    /// Stats cover every record; rows are narrowed by `filter`.
    pub fn build(
        records: &[Record],
        filter: &BoardFilter,
        now: DateTime<Utc>,
        demo: bool,
        instance_url: Option<&str>,
    ) -> Board {
        let mut stats = BoardStats::default();
        let mut rows = Vec::new();
        let mut discovery_index = 0usize;

        for record in records {
            let discovery = is_discovery_item(record);
            let workflow = if demo && discovery {
                let state = WorkflowState::demo(discovery_index, record, now);
                discovery_index += 1;
                state
            } else {
                WorkflowState::from_record(record, now)
            };
            let due = action_due_info(&workflow, now);
            let escalation = EscalationView::evaluate(record, &due);

            let state = state_text(record);
            stats.open += usize::from(state.contains("open"));
            stats.pending += usize::from(state.contains("pending"));
            stats.in_progress += usize::from(state.contains("progress"));
            if discovery {
                stats.total += 1;
                stats.escalated += usize::from(escalation.escalated_by_status);
                stats.completed += usize::from(workflow.phase == Phase::Completed);
                stats.schedule_overdue += usize::from(escalation.overdue_by_schedule);
                stats.escalation_mismatches += usize::from(escalation.disagrees);
            }

            let sys_id = record.sys_id();
            let row = BoardRow {
                link: instance_url.map(|url| record_link(url, RITM_TABLE, &sys_id)),
                sys_id,
                number: record.display("number"),
                catalog_item: record.display("cat_item"),
                requester: record.display("requested_for"),
                state: record.display("state"),
                discovery,
                phase_label: workflow.phase.label(),
                workflow,
                due,
                escalation,
            };
            if filter.matches_search(&row) && filter.matches_status(&row, record) {
                rows.push(row);
            }
        }

        Board {
            rows,
            stats,
            demo,
            generated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap()
    }

    fn records() -> Vec<Record> {
        [
            json!({
                "sys_id": "a", "number": "RITM001", "cat_item": "Initiate Discovery",
                "requested_for": {"display_value": "Abel Tuter", "value": "u1"},
                "state": "Pending", "u_discovery_status": "email_2_sent",
                "u_last_email_date": "2024-03-10 12:00:00"
            }),
            json!({
                "sys_id": "b", "number": "RITM002", "cat_item": "Discovery Process",
                "requested_for": "Beth Anglin", "state": "Work in Progress",
                "u_discovery_status": "completed"
            }),
            json!({
                "sys_id": "c", "number": "RITM003", "cat_item": "Laptop",
                "requested_for": "Abel Tuter", "state": "Open"
            }),
        ]
        .into_iter()
        .filter_map(Record::from_value)
        .collect()
    }

    #[test]
    fn stats_count_both_escalation_readings() {
        let board = Board::build(&records(), &BoardFilter::default(), now(), false, None);
        let stats = &board.stats;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.escalated, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.schedule_overdue, 1);
        assert_eq!(stats.escalation_mismatches, 0);
        assert_eq!(board.rows.len(), 3);
        assert_eq!(board.rows[0].due.days_overdue, 3);
    }

    #[test]
    fn filters_narrow_rows_only() {
        let filter = BoardFilter {
            search: "abel".into(),
            status: StatusFilter::Discovery,
        };
        let board = Board::build(&records(), &filter, now(), false, Some("https://x.service-now.com"));
        assert_eq!(board.rows.len(), 1);
        assert_eq!(board.rows[0].number, "RITM001");
        assert_eq!(
            board.rows[0].link.as_deref(),
            Some("https://x.service-now.com/nav_to.do?uri=sc_req_item.do?sys_id=a")
        );
        assert_eq!(board.stats.total, 2);

        let completed = BoardFilter {
            status: "completed".parse().unwrap(),
            ..Default::default()
        };
        let board = Board::build(&records(), &completed, now(), false, None);
        assert_eq!(board.rows.len(), 1);
        assert_eq!(board.rows[0].sys_id, "b");
    }

    #[test]
    fn demo_mode_rewrites_discovery_items_only() {
        let board = Board::build(&records(), &BoardFilter::default(), now(), true, None);
        assert_eq!(board.rows[0].workflow.phase, Phase::ResponseReceived);
        assert_eq!(board.rows[1].workflow.phase, Phase::Email1);
        assert_eq!(board.rows[2].workflow.phase, Phase::New);
        assert!(board.demo);
    }

    #[test]
    fn unknown_status_filter_is_an_error() {
        assert!("bogus".parse::<StatusFilter>().is_err());
        assert_eq!("".parse::<StatusFilter>(), Ok(StatusFilter::All));
    }
}
