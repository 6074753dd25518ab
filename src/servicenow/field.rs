//! Normalization for ServiceNow field payloads.
//!
//! The Table API returns a field either as a bare scalar or, when
//! `sysparm_display_value=all` is requested or the field is a reference, as an
//! object carrying `display_value`, `value` and sometimes `link`. Everything
//! downstream reads fields through [`FieldValue`] instead of poking at raw JSON.

use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FieldValue {
    #[default]
    Empty,
    Text(String),
    Reference {
        display_value: Option<String>,
        value: Option<String>,
        link: Option<String>,
        name: Option<String>,
    },
}

impl FieldValue {
    pub fn from_json(raw: &Value) -> Self {
        match raw {
            Value::Null => FieldValue::Empty,
            Value::String(text) => FieldValue::Text(text.clone()),
            Value::Bool(flag) => FieldValue::Text(flag.to_string()),
            Value::Number(number) => FieldValue::Text(number.to_string()),
            Value::Object(map) => FieldValue::Reference {
                display_value: map.get("display_value").and_then(scalar_text),
                value: map.get("value").and_then(scalar_text),
                link: map.get("link").and_then(scalar_text),
                name: map.get("name").and_then(scalar_text),
            },
            Value::Array(_) => FieldValue::Text(raw.to_string()),
        }
    }

    /// Human readable text: display value, then value, then name.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Empty => String::new(),
            FieldValue::Text(text) => text.clone(),
            FieldValue::Reference {
                display_value,
                value,
                name,
                ..
            } => first_non_empty([display_value, value, name]).unwrap_or_default(),
        }
    }

    /// Stored value: value first, display value as fallback.
    pub fn raw(&self) -> String {
        match self {
            FieldValue::Empty => String::new(),
            FieldValue::Text(text) => text.clone(),
            FieldValue::Reference {
                display_value,
                value,
                ..
            } => first_non_empty([value, display_value]).unwrap_or_default(),
        }
    }

    /// The referenced record's sys_id when the field is a reference.
    pub fn reference_id(&self) -> Option<String> {
        match self {
            FieldValue::Empty => None,
            FieldValue::Text(text) => non_empty(text),
            FieldValue::Reference { value, link, .. } => {
                if let Some(id) = value.as_deref().and_then(non_empty) {
                    return Some(id);
                }
                link.as_deref().and_then(id_from_link)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw().trim().is_empty() && self.display().trim().is_empty()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn first_non_empty<const N: usize>(candidates: [&Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| non_empty(candidate))
}

// Reference links end in `/api/now/table/<table>/<sys_id>`.
fn id_from_link(link: &str) -> Option<String> {
    link.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(non_empty)
}
