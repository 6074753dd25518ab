use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::model::{
    DashboardConfig, DashboardPatch, NewDashboard, Widget, WidgetDraft, DEFAULT_DASHBOARD_ID,
};

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Dashboard not found: {0}")]
    NotFound(String),
    #[error("Widget not found: {0}")]
    WidgetNotFound(String),
    #[error("Cannot delete the default dashboard")]
    DefaultUndeletable,
    #[error("Dashboard name is required")]
    BlankName,
    #[error("dashboard store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("dashboard document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Every dashboard and widget a user has configured, as one versioned unit.
///
/// Mutations bump `revision` and `saved_at`. Copies held in different places
/// (local file, instance preference) are reconciled with [`merge`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardDocument {
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
    pub active_dashboard_id: String,
    pub dashboards: Vec<DashboardConfig>,
    #[serde(default)]
    pub sn_favorites: Vec<String>,
    /// Deleted dashboard ids and when they were deleted, so a stale copy
    /// cannot bring them back.
    #[serde(default)]
    pub tombstones: BTreeMap<String, DateTime<Utc>>,
}

impl DashboardDocument {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            revision: 0,
            saved_at: now,
            active_dashboard_id: DEFAULT_DASHBOARD_ID.to_string(),
            dashboards: vec![DashboardConfig::default_dashboard(now)],
            sn_favorites: Vec::new(),
            tombstones: BTreeMap::new(),
        }
    }

    /// Reads a stored preference value. Accepts the versioned document or the
    /// older `{dashboards, widgets, snFavorites, savedAt}` snapshot, where
    /// `widgets` maps dashboard ids to widget lists.
    pub fn from_value(value: Value) -> Result<Self, DashboardError> {
        if value.get("revision").is_some() {
            let mut document: DashboardDocument = serde_json::from_value(value)?;
            document.ensure_default();
            return Ok(document);
        }
        let legacy: LegacySnapshot = serde_json::from_value(value)?;
        Ok(legacy.into_document())
    }

    pub fn dashboard(&self, id: &str) -> Option<&DashboardConfig> {
        self.dashboards.iter().find(|dashboard| dashboard.id == id)
    }

    pub fn active(&self) -> Option<&DashboardConfig> {
        self.dashboard(&self.active_dashboard_id)
    }

    pub fn create_dashboard(
        &mut self,
        draft: NewDashboard,
        now: DateTime<Utc>,
    ) -> Result<&DashboardConfig, DashboardError> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(DashboardError::BlankName);
        }
        let mut id = format!("dashboard-{}", now.timestamp_millis());
        if self.dashboard(&id).is_some() || self.tombstones.contains_key(&id) {
            id = format!("dashboard-{}", Uuid::new_v4().simple());
        }
        self.dashboards.push(DashboardConfig {
            id,
            name: name.to_string(),
            description: draft.description.filter(|text| !text.trim().is_empty()),
            kind: draft.kind,
            created_at: now,
            updated_at: now,
            settings: draft.settings,
            widgets: Vec::new(),
        });
        self.touch(now);
        let index = self.dashboards.len() - 1;
        Ok(&self.dashboards[index])
    }

    pub fn update_dashboard(
        &mut self,
        id: &str,
        patch: DashboardPatch,
        now: DateTime<Utc>,
    ) -> Result<(), DashboardError> {
        if matches!(&patch.name, Some(name) if name.trim().is_empty()) {
            return Err(DashboardError::BlankName);
        }
        let dashboard = self.dashboard_mut(id)?;
        if let Some(name) = patch.name {
            dashboard.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            dashboard.description = Some(description).filter(|text| !text.trim().is_empty());
        }
        if let Some(kind) = patch.kind {
            dashboard.kind = kind;
        }
        if let Some(settings) = patch.settings {
            dashboard.settings = settings;
        }
        dashboard.updated_at = now;
        self.touch(now);
        Ok(())
    }

    pub fn delete_dashboard(&mut self, id: &str, now: DateTime<Utc>) -> Result<(), DashboardError> {
        if id == DEFAULT_DASHBOARD_ID {
            return Err(DashboardError::DefaultUndeletable);
        }
        let before = self.dashboards.len();
        self.dashboards.retain(|dashboard| dashboard.id != id);
        if self.dashboards.len() == before {
            return Err(DashboardError::NotFound(id.to_string()));
        }
        self.tombstones.insert(id.to_string(), now);
        if self.active_dashboard_id == id {
            self.active_dashboard_id = DEFAULT_DASHBOARD_ID.to_string();
        }
        self.touch(now);
        Ok(())
    }

    pub fn set_active(&mut self, id: &str, now: DateTime<Utc>) -> Result<(), DashboardError> {
        if self.dashboard(id).is_none() {
            return Err(DashboardError::NotFound(id.to_string()));
        }
        self.active_dashboard_id = id.to_string();
        self.touch(now);
        Ok(())
    }

    pub fn add_widget(
        &mut self,
        dashboard_id: &str,
        draft: WidgetDraft,
        now: DateTime<Utc>,
    ) -> Result<Widget, DashboardError> {
        let dashboard = self.dashboard_mut(dashboard_id)?;
        let widget = draft.into_widget(Uuid::new_v4().to_string(), now);
        dashboard.widgets.push(widget.clone());
        dashboard.updated_at = now;
        self.touch(now);
        Ok(widget)
    }

    pub fn update_widget(
        &mut self,
        dashboard_id: &str,
        widget_id: &str,
        draft: WidgetDraft,
        now: DateTime<Utc>,
    ) -> Result<(), DashboardError> {
        let dashboard = self.dashboard_mut(dashboard_id)?;
        let widget = dashboard
            .widgets
            .iter_mut()
            .find(|widget| widget.id == widget_id)
            .ok_or_else(|| DashboardError::WidgetNotFound(widget_id.to_string()))?;
        draft.apply_to(widget, now);
        dashboard.updated_at = now;
        self.touch(now);
        Ok(())
    }

    pub fn remove_widget(
        &mut self,
        dashboard_id: &str,
        widget_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DashboardError> {
        let dashboard = self.dashboard_mut(dashboard_id)?;
        let before = dashboard.widgets.len();
        dashboard.widgets.retain(|widget| widget.id != widget_id);
        if dashboard.widgets.len() == before {
            return Err(DashboardError::WidgetNotFound(widget_id.to_string()));
        }
        dashboard.updated_at = now;
        self.touch(now);
        Ok(())
    }

    pub fn widgets_for(&self, dashboard_id: &str) -> &[Widget] {
        self.dashboard(dashboard_id)
            .map(|dashboard| dashboard.widgets.as_slice())
            .unwrap_or(&[])
    }

    fn dashboard_mut(&mut self, id: &str) -> Result<&mut DashboardConfig, DashboardError> {
        self.dashboards
            .iter_mut()
            .find(|dashboard| dashboard.id == id)
            .ok_or_else(|| DashboardError::NotFound(id.to_string()))
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.revision += 1;
        self.saved_at = now;
    }

    fn ensure_default(&mut self) {
        if self.dashboard(DEFAULT_DASHBOARD_ID).is_none() {
            self.dashboards
                .insert(0, DashboardConfig::default_dashboard(self.saved_at));
        }
        self.tombstones.remove(DEFAULT_DASHBOARD_ID);
        if self.dashboard(&self.active_dashboard_id).is_none() {
            self.active_dashboard_id = DEFAULT_DASHBOARD_ID.to_string();
        }
    }
}

/// Reconciles two copies of the document.
///
/// Per dashboard the copy with the later `updated_at` wins; on a tie the
/// document with the higher revision wins, then `local`. A dashboard is
/// dropped when either side deleted it at or after its winning `updated_at`.
/// The active dashboard and favorites come from whichever document was saved
/// last.
pub fn merge(
    local: &DashboardDocument,
    remote: &DashboardDocument,
    now: DateTime<Utc>,
) -> DashboardDocument {
    let mut tombstones = local.tombstones.clone();
    for (id, deleted_at) in &remote.tombstones {
        let entry = tombstones.entry(id.clone()).or_insert(*deleted_at);
        if *deleted_at > *entry {
            *entry = *deleted_at;
        }
    }

    let remote_by_id: HashMap<&str, &DashboardConfig> = remote
        .dashboards
        .iter()
        .map(|dashboard| (dashboard.id.as_str(), dashboard))
        .collect();
    let remote_preferred_on_tie = remote.revision > local.revision;

    let mut dashboards = Vec::new();
    for mine in &local.dashboards {
        let winner = match remote_by_id.get(mine.id.as_str()) {
            Some(theirs) if theirs.updated_at > mine.updated_at => *theirs,
            Some(theirs) if theirs.updated_at == mine.updated_at && remote_preferred_on_tie => {
                *theirs
            }
            _ => mine,
        };
        dashboards.push(winner.clone());
    }
    for theirs in &remote.dashboards {
        if local.dashboard(&theirs.id).is_none() {
            dashboards.push(theirs.clone());
        }
    }
    dashboards.retain(|dashboard| {
        dashboard.is_default()
            || tombstones
                .get(&dashboard.id)
                .map_or(true, |deleted_at| *deleted_at < dashboard.updated_at)
    });

    let (newer, older) = if remote.saved_at > local.saved_at {
        (remote, local)
    } else {
        (local, remote)
    };

    let mut merged = DashboardDocument {
        revision: local.revision.max(remote.revision) + 1,
        saved_at: now,
        active_dashboard_id: newer.active_dashboard_id.clone(),
        dashboards,
        sn_favorites: newer.sn_favorites.clone(),
        tombstones,
    };
    if merged.dashboard(&merged.active_dashboard_id).is_none() {
        merged.active_dashboard_id = older.active_dashboard_id.clone();
    }
    merged.ensure_default();
    merged
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySnapshot {
    #[serde(default)]
    dashboards: Vec<Value>,
    #[serde(default)]
    widgets: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    sn_favorites: Vec<String>,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    active_dashboard_id: Option<String>,
}

impl LegacySnapshot {
    fn into_document(self) -> DashboardDocument {
        let saved_at = self.saved_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let mut widgets = self.widgets;
        let dashboards = self
            .dashboards
            .into_iter()
            .filter_map(|raw| serde_json::from_value::<DashboardConfig>(raw).ok())
            .map(|mut dashboard| {
                if let Some(items) = widgets.remove(&dashboard.id) {
                    dashboard.widgets.extend(
                        items
                            .into_iter()
                            .filter_map(|raw| serde_json::from_value::<Widget>(raw).ok()),
                    );
                }
                dashboard
            })
            .collect();
        let mut document = DashboardDocument {
            revision: 0,
            saved_at,
            active_dashboard_id: self
                .active_dashboard_id
                .unwrap_or_else(|| DEFAULT_DASHBOARD_ID.to_string()),
            dashboards,
            sn_favorites: self.sn_favorites,
            tombstones: BTreeMap::new(),
        };
        document.ensure_default();
        document
    }
}
