use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::warn;

use crate::error::StackError;

/// Persisted stack preferences: the advanced-enabled flag and which model
/// sets the user selected. One JSON file per preferences namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackPrefs {
    pub advanced_enabled: bool,
    pub selected_models: BTreeSet<String>,
}

pub struct PrefsStore {
    path: PathBuf,
}

impl PrefsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing or unreadable files read as defaults; preferences are never
    /// fatal to startup.
    pub fn load(&self) -> StackPrefs {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("corrupt prefs file {:?}: {}", self.path, e);
                StackPrefs::default()
            }),
            Err(_) => StackPrefs::default(),
        }
    }

    pub fn save(&self, prefs: &StackPrefs) -> Result<(), StackError> {
        let bytes = serde_json::to_vec_pretty(prefs).map_err(|e| StackError::Prefs(e.to_string()))?;
        std::fs::write(&self.path, bytes).map_err(|e| StackError::Prefs(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = PrefsStore::new(dir.path().join("prefs.json"));

        let mut prefs = StackPrefs::default();
        prefs.advanced_enabled = true;
        prefs.selected_models.insert("detector_v2".to_string());
        store.save(&prefs).expect("save failed");

        assert_eq!(store.load(), prefs);
    }

    #[test]
    fn missing_file_reads_as_defaults() {
        let store = PrefsStore::new("/nonexistent/prefs.json");
        assert_eq!(store.load(), StackPrefs::default());
    }
}
