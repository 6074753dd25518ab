//! snowdash library
//!
//! ServiceNow dashboard backend: session auth, the Discovery Onboarding
//! reminder workflow, dashboard persistence and widget data.

pub mod auth;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod itom;
pub mod server;
pub mod servicenow;
pub mod widgets;
pub mod workflow;

pub use config::AppConfig;
pub use server::{build_router, AppState};
pub use servicenow::{NowApi, ServiceNowClient};
