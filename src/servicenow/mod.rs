//! ServiceNow REST access: the [`NowApi`] seam, its reqwest implementation
//! and the record/field types every other module reads through.

mod client;
mod field;
mod record;

pub use client::{ensure_identifier, NowApi, NowError, ServiceNowClient};
pub use field::FieldValue;
pub use record::{
    Credential, DisplayValue, EmailMessage, OAuthClient, OAuthToken, Record, TablePage,
    TableQuery,
};

/// Link to a record form in the instance UI.
pub fn record_link(instance_url: &str, table: &str, sys_id: &str) -> String {
    format!(
        "{}/nav_to.do?uri={}.do?sys_id={}",
        instance_url.trim_end_matches('/'),
        table,
        sys_id
    )
}
