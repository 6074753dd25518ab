use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DASHBOARD_ID: &str = "default-ritms";
pub const DEFAULT_DASHBOARD_NAME: &str = "Team Dashboard";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardKind {
    #[default]
    Ritms,
    Incidents,
    Users,
    Custom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardLayout {
    Grid,
    List,
    Table,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<DashboardLayout>,
    /// Seconds between data refreshes in the browser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: DashboardKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub settings: DashboardSettings,
    #[serde(default)]
    pub widgets: Vec<Widget>,
}

impl DashboardConfig {
    pub fn default_dashboard(now: DateTime<Utc>) -> Self {
        Self {
            id: DEFAULT_DASHBOARD_ID.to_string(),
            name: DEFAULT_DASHBOARD_NAME.to_string(),
            description: None,
            kind: DashboardKind::Ritms,
            created_at: now,
            updated_at: now,
            settings: DashboardSettings {
                limit: Some(50),
                filters: BTreeMap::new(),
                layout: Some(DashboardLayout::Grid),
                refresh_interval: None,
            },
            widgets: Vec::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_DASHBOARD_ID
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDashboard {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: DashboardKind,
    #[serde(default)]
    pub settings: DashboardSettings,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<DashboardKind>,
    pub settings: Option<DashboardSettings>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetKind {
    #[default]
    Chart,
    Table,
    Metric,
    List,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Pie,
    Donut,
    Bar,
    Line,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetLayout {
    Card,
    Table,
    List,
    Compact,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetSize {
    Small,
    Medium,
    Large,
    Full,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Count,
    Sum,
    Avg,
}

/// Tables a widget may read from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSource {
    #[default]
    #[serde(rename = "sc_req_item")]
    RequestItem,
    #[serde(rename = "incident")]
    Incident,
    #[serde(rename = "change_request")]
    ChangeRequest,
    #[serde(rename = "sys_user")]
    User,
    #[serde(rename = "problem")]
    Problem,
    #[serde(rename = "task")]
    Task,
}

impl DataSource {
    pub const ALL: [DataSource; 6] = [
        DataSource::RequestItem,
        DataSource::Incident,
        DataSource::ChangeRequest,
        DataSource::User,
        DataSource::Problem,
        DataSource::Task,
    ];

    pub fn table(self) -> &'static str {
        match self {
            DataSource::RequestItem => "sc_req_item",
            DataSource::Incident => "incident",
            DataSource::ChangeRequest => "change_request",
            DataSource::User => "sys_user",
            DataSource::Problem => "problem",
            DataSource::Task => "task",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DataSource::RequestItem => "Request Items (RITMs)",
            DataSource::Incident => "Incidents",
            DataSource::ChangeRequest => "Change Requests",
            DataSource::User => "Users",
            DataSource::Problem => "Problems",
            DataSource::Task => "Tasks",
        }
    }

    /// Fields offered for grouping.
    pub fn group_fields(self) -> &'static [&'static str] {
        match self {
            DataSource::RequestItem => &["state", "priority", "assigned_to", "category", "request"],
            DataSource::Incident => &["state", "priority", "assigned_to", "category", "severity"],
            DataSource::ChangeRequest => &["state", "priority", "assigned_to", "type", "risk"],
            DataSource::User => &["department", "location", "active", "title"],
            DataSource::Problem => &["state", "priority", "assigned_to", "category"],
            DataSource::Task => &["state", "priority", "assigned_to", "task_type"],
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        DataSource::ALL
            .into_iter()
            .find(|source| source.table() == table)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: WidgetKind,
    pub title: String,
    pub data_source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<WidgetSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<WidgetLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

// Widgets saved before timestamps existed read as the epoch.
fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Partial widget used both for creation (missing values take defaults) and
/// for updates (missing values are left alone).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDraft {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<WidgetKind>,
    pub title: Option<String>,
    pub data_source: Option<DataSource>,
    pub size: Option<WidgetSize>,
    pub layout: Option<WidgetLayout>,
    pub chart_type: Option<ChartType>,
    pub group_by: Option<String>,
    pub columns: Option<Vec<String>>,
    pub aggregation: Option<Aggregation>,
    pub field: Option<String>,
    pub filter: Option<String>,
    pub limit: Option<u32>,
}

impl WidgetDraft {
    pub const DEFAULT_TITLE: &'static str = "Untitled Widget";
    pub const DEFAULT_GROUP_BY: &'static str = "state";
    pub const DEFAULT_LIMIT: u32 = 100;

    pub fn into_widget(self, id: String, now: DateTime<Utc>) -> Widget {
        let title = self
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_TITLE.to_string());
        Widget {
            id: self.id.unwrap_or(id),
            kind: self.kind.unwrap_or_default(),
            title,
            data_source: self.data_source.unwrap_or_default(),
            size: self.size,
            layout: self.layout,
            chart_type: Some(self.chart_type.unwrap_or(ChartType::Pie)),
            group_by: Some(
                self.group_by
                    .unwrap_or_else(|| Self::DEFAULT_GROUP_BY.to_string()),
            ),
            columns: self.columns,
            aggregation: self.aggregation,
            field: self.field,
            filter: self.filter,
            limit: Some(self.limit.unwrap_or(Self::DEFAULT_LIMIT)),
            updated_at: now,
        }
    }

    pub fn apply_to(self, widget: &mut Widget, now: DateTime<Utc>) {
        if let Some(kind) = self.kind {
            widget.kind = kind;
        }
        if let Some(title) = self.title {
            widget.title = title;
        }
        if let Some(source) = self.data_source {
            widget.data_source = source;
        }
        replace_if_set(&mut widget.size, self.size);
        replace_if_set(&mut widget.layout, self.layout);
        replace_if_set(&mut widget.chart_type, self.chart_type);
        replace_if_set(&mut widget.group_by, self.group_by);
        replace_if_set(&mut widget.columns, self.columns);
        replace_if_set(&mut widget.aggregation, self.aggregation);
        replace_if_set(&mut widget.field, self.field);
        replace_if_set(&mut widget.filter, self.filter);
        replace_if_set(&mut widget.limit, self.limit);
        widget.updated_at = now;
    }
}

fn replace_if_set<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn draft_defaults_match_the_builder() {
        let now = Utc::now();
        let widget = WidgetDraft::default().into_widget("w1".into(), now);
        assert_eq!(widget.kind, WidgetKind::Chart);
        assert_eq!(widget.title, "Untitled Widget");
        assert_eq!(widget.chart_type, Some(ChartType::Pie));
        assert_eq!(widget.group_by.as_deref(), Some("state"));
        assert_eq!(widget.limit, Some(100));
        assert_eq!(widget.data_source, DataSource::RequestItem);
    }

    #[test]
    fn widget_wire_format_is_camel_case() {
        let widget: Widget = serde_json::from_value(json!({
            "id": "w1",
            "type": "metric",
            "title": "Open incidents",
            "dataSource": "incident",
            "aggregation": "avg",
            "field": "reassignment_count",
            "updatedAt": "2024-03-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(widget.data_source.table(), "incident");
        let back = serde_json::to_value(&widget).unwrap();
        assert_eq!(back["dataSource"], "incident");
        assert!(back.get("chartType").is_none());
    }

    #[test]
    fn widget_without_timestamp_reads_as_epoch() {
        let widget: Widget = serde_json::from_value(json!({
            "id": "w0",
            "type": "list",
            "title": "Old list",
            "dataSource": "sc_req_item"
        }))
        .unwrap();
        assert_eq!(widget.updated_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn data_sources_resolve_by_table() {
        assert_eq!(DataSource::from_table("sys_user"), Some(DataSource::User));
        assert_eq!(DataSource::from_table("cmdb_ci"), None);
        assert_eq!(DataSource::User.label(), "Users");
        assert!(DataSource::Task.group_fields().contains(&"task_type"));
    }

    #[test]
    fn default_dashboard_shape() {
        let dashboard = DashboardConfig::default_dashboard(Utc::now());
        assert!(dashboard.is_default());
        assert_eq!(dashboard.name, "Team Dashboard");
        assert_eq!(dashboard.settings.limit, Some(50));
        assert_eq!(dashboard.settings.layout, Some(DashboardLayout::Grid));
    }
}
