use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a request item sits in the Discovery Onboarding sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    New,
    #[serde(rename = "email_1")]
    Email1,
    #[serde(rename = "email_2")]
    Email2,
    #[serde(rename = "email_3")]
    Email3,
    Escalation,
    ResponseReceived,
    Completed,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::New,
        Phase::Email1,
        Phase::Email2,
        Phase::Email3,
        Phase::Escalation,
        Phase::ResponseReceived,
        Phase::Completed,
    ];

    /// Maps the `u_discovery_status` text stored on the RITM. Unknown or
    /// blank values mean the sequence has not started.
    pub fn from_status(status: &str) -> Phase {
        match status.trim().to_ascii_lowercase().as_str() {
            "email_1_sent" => Phase::Email1,
            "email_2_sent" => Phase::Email2,
            "email_3_sent" => Phase::Email3,
            "escalated" => Phase::Escalation,
            "response_received" => Phase::ResponseReceived,
            "completed" => Phase::Completed,
            _ => Phase::New,
        }
    }

    /// The status value written back to ServiceNow, if the phase has one.
    pub fn status_value(self) -> Option<&'static str> {
        match self {
            Phase::New => None,
            Phase::Email1 => Some("email_1_sent"),
            Phase::Email2 => Some("email_2_sent"),
            Phase::Email3 => Some("email_3_sent"),
            Phase::Escalation => Some("escalated"),
            Phase::ResponseReceived => Some("response_received"),
            Phase::Completed => Some("completed"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::New => "new",
            Phase::Email1 => "email_1",
            Phase::Email2 => "email_2",
            Phase::Email3 => "email_3",
            Phase::Escalation => "escalation",
            Phase::ResponseReceived => "response_received",
            Phase::Completed => "completed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::New => "New",
            Phase::Email1 => "Email 1 Sent",
            Phase::Email2 => "Email 2 Sent",
            Phase::Email3 => "Email 3 Sent",
            Phase::Escalation => "Escalated",
            Phase::ResponseReceived => "Response received",
            Phase::Completed => "Completed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == normalized)
            .ok_or_else(|| format!("unknown phase `{value}`"))
    }
}
