//! Dashboards and widgets: the versioned document, its local file copy, the
//! copy kept in a ServiceNow user preference and the instance's own
//! Platform Analytics dashboards.

mod document;
mod model;
mod platform;
mod store;
mod sync;

pub use document::{merge, DashboardDocument, DashboardError};
pub use model::{
    Aggregation, ChartType, DashboardConfig, DashboardKind, DashboardLayout, DashboardPatch,
    DashboardSettings, DataSource, NewDashboard, Widget, WidgetDraft, WidgetKind, WidgetLayout,
    WidgetSize, DEFAULT_DASHBOARD_ID, DEFAULT_DASHBOARD_NAME,
};
pub use platform::{
    create_platform_dashboard, delete_platform_dashboard, list_platform_dashboards,
    PlatformDashboard, PLATFORM_TABLE,
};
pub use store::FileStore;
pub use sync::{
    delete_preference, load_preference, save_preference, SavedPreference, StoredPreference,
    PREFERENCE_NAME, PREFERENCE_TABLE,
};
