use serde_json::Value;
use thiserror::Error;

use crate::servicenow::EmailMessage;

pub const RITM_TABLE: &str = "sc_req_item";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Invalid emailNum. Must be 1, 2, or 3.")]
    InvalidEmailNumber,
    #[error("Requester has no email. Add an email to the requested_for user in ServiceNow.")]
    MissingRequesterEmail,
}

/// Which of the three reminder emails to send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmailNumber {
    First,
    Second,
    Third,
}

impl EmailNumber {
    /// Only the JSON integers 1, 2 and 3 are accepted.
    pub fn from_json(value: Option<&Value>) -> Result<Self, WorkflowError> {
        match value.and_then(Value::as_i64) {
            Some(1) => Ok(EmailNumber::First),
            Some(2) => Ok(EmailNumber::Second),
            Some(3) => Ok(EmailNumber::Third),
            _ => Err(WorkflowError::InvalidEmailNumber),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            EmailNumber::First => 1,
            EmailNumber::Second => 2,
            EmailNumber::Third => 3,
        }
    }

    pub fn status_after_send(self) -> &'static str {
        match self {
            EmailNumber::First => "email_1_sent",
            EmailNumber::Second => "email_2_sent",
            EmailNumber::Third => "email_3_sent",
        }
    }

    pub fn subject(self, number: &str) -> String {
        let prefix = match self {
            EmailNumber::First => "[Action Required]",
            EmailNumber::Second => "[Reminder]",
            EmailNumber::Third => "[Final Notice]",
        };
        format!("{prefix} Discovery Onboarding - {number}")
    }

    pub fn body(self, requester: &str, number: &str, description: &str) -> String {
        match self {
            EmailNumber::First => format!(
                "Dear {requester},\n\nWe are reaching out regarding your request {number}: \"{description}\".\n\nTo proceed with Discovery onboarding, we need to schedule a Technical Engagement Meeting (TEM).\n\nPlease respond with your availability and technical contact.\n\nBest regards,\nDiscovery Team"
            ),
            EmailNumber::Second => format!(
                "Dear {requester},\n\nThis is a follow-up regarding {number}. We haven't received a response about Discovery onboarding.\n\nPlease respond with your availability for a TEM meeting.\n\nBest regards,\nDiscovery Team"
            ),
            EmailNumber::Third => format!(
                "Dear {requester},\n\nFINAL NOTICE for {number}. If we don't receive a response within 3 days, this request will be escalated.\n\nPlease respond immediately.\n\nBest regards,\nDiscovery Team"
            ),
        }
    }
}

/// Inputs for one reminder, resolved from the RITM and its requester.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reminder {
    pub ritm_sys_id: String,
    pub ritm_number: String,
    pub description: String,
    pub requester_name: String,
    pub requester_email: String,
}

impl Reminder {
    pub const DEFAULT_NUMBER: &'static str = "RITM";
    pub const DEFAULT_DESCRIPTION: &'static str = "Discovery request";
    pub const DEFAULT_REQUESTER: &'static str = "Customer";

    pub fn new(
        ritm_sys_id: &str,
        ritm_number: &str,
        description: &str,
        requester_name: &str,
        requester_email: &str,
    ) -> Result<Self, WorkflowError> {
        let requester_email = requester_email.trim();
        if requester_email.is_empty() {
            return Err(WorkflowError::MissingRequesterEmail);
        }
        Ok(Self {
            ritm_sys_id: ritm_sys_id.to_string(),
            ritm_number: or_default(ritm_number, Self::DEFAULT_NUMBER),
            description: or_default(description, Self::DEFAULT_DESCRIPTION),
            requester_name: or_default(requester_name, Self::DEFAULT_REQUESTER),
            requester_email: requester_email.to_string(),
        })
    }

    pub fn message(&self, number: EmailNumber) -> EmailMessage {
        EmailMessage {
            to: vec![self.requester_email.clone()],
            subject: number.subject(&self.ritm_number),
            text: number.body(&self.requester_name, &self.ritm_number, &self.description),
            html: None,
            table_name: Some(RITM_TABLE.to_string()),
            table_record_id: Some(self.ritm_sys_id.clone()),
        }
    }
}

fn or_default(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
