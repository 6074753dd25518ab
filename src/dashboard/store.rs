use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::debug;

use super::document::{DashboardDocument, DashboardError};

/// Local copy of the dashboard document, kept as a single JSON file.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as a fresh document holding only the default
    /// dashboard.
    pub async fn load(&self) -> Result<DashboardDocument, DashboardError> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                let value: serde_json::Value = serde_json::from_slice(&bytes)?;
                DashboardDocument::from_value(value)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no dashboard file yet");
                Ok(DashboardDocument::new(Utc::now()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save(&self, document: &DashboardDocument) -> Result<(), DashboardError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(
            path = %self.path.display(),
            revision = document.revision,
            "dashboard document saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::model::{NewDashboard, DEFAULT_DASHBOARD_ID};

    #[tokio::test]
    async fn missing_file_loads_default_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("dashboards.json"));
        let doc = store.load().await.unwrap();
        assert_eq!(doc.active_dashboard_id, DEFAULT_DASHBOARD_ID);
        assert_eq!(doc.dashboards.len(), 1);
    }

    #[tokio::test]
    async fn save_then_load_keeps_revision() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("dashboards.json"));
        let mut doc = store.load().await.unwrap();
        doc.create_dashboard(
            NewDashboard {
                name: "Changes".into(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        store.save(&doc).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, doc);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboards.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = FileStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, DashboardError::Parse(_)));
    }
}
