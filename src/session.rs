use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::metrics::PerformanceSnapshot;

/// One bounded run of the pipeline, tracked for aggregate metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_actions: u64,
    pub successful_actions: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
}

impl SessionRecord {
    fn open_now() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            total_actions: 0,
            successful_actions: 0,
            success_rate: 0.0,
            average_latency_ms: 0.0,
        }
    }

    fn apply(&mut self, snapshot: &PerformanceSnapshot) {
        self.total_actions = snapshot.total_actions;
        self.successful_actions = snapshot.successful_actions;
        self.success_rate = snapshot.success_rate;
        self.average_latency_ms = snapshot.average_latency_ms;
    }
}

pub trait SessionStore: Send + Sync {
    fn open(&self) -> Result<Uuid, PipelineError>;
    fn update(&self, snapshot: &PerformanceSnapshot) -> Result<(), PipelineError>;
    fn close(&self) -> Result<(), PipelineError>;
}

/// Writes one JSON file per session under the configured directory.
pub struct JsonSessionStore {
    dir: PathBuf,
    current: Mutex<Option<SessionRecord>>,
}

impl JsonSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: Mutex::new(None),
        }
    }

    fn persist(&self, record: &SessionRecord) -> Result<(), PipelineError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| PipelineError::Session(e.to_string()))?;
        let path = self.dir.join(format!("{}.json", record.id));
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| PipelineError::Session(e.to_string()))?;
        std::fs::write(&path, bytes).map_err(|e| PipelineError::Session(e.to_string()))?;
        debug!("session {} persisted to {:?}", record.id, path);
        Ok(())
    }
}

impl SessionStore for JsonSessionStore {
    fn open(&self) -> Result<Uuid, PipelineError> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let record = SessionRecord::open_now();
        let id = record.id;
        self.persist(&record)?;
        *current = Some(record);
        info!("session {id} opened");
        Ok(id)
    }

    fn update(&self, snapshot: &PerformanceSnapshot) -> Result<(), PipelineError> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let record = current
            .as_mut()
            .ok_or_else(|| PipelineError::Session("no open session".to_string()))?;
        record.apply(snapshot);
        let record = record.clone();
        drop(current);
        self.persist(&record)
    }

    fn close(&self) -> Result<(), PipelineError> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut record) = current.take() else {
            // Closing an unopened store is harmless.
            return Ok(());
        };
        record.ended_at = Some(Utc::now());
        drop(current);
        info!("session {} closed", record.id);
        self.persist(&record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PerformanceSnapshot {
        PerformanceSnapshot {
            total_actions: 10,
            successful_actions: 8,
            failed_actions: 2,
            success_rate: 80.0,
            average_latency_ms: 42.0,
            min_latency_ms: 10,
            max_latency_ms: 90,
            actions_per_second: 5.0,
            frames_per_second: 10.0,
            last_frame_ms: 3,
            last_inference_ms: 12,
            last_execution_ms: 20,
        }
    }

    #[test]
    fn open_update_close_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = JsonSessionStore::new(dir.path());

        let id = store.open().expect("open failed");
        store.update(&snapshot()).expect("update failed");
        store.close().expect("close failed");

        let path = dir.path().join(format!("{id}.json"));
        let bytes = std::fs::read(path).expect("session file missing");
        let record: SessionRecord = serde_json::from_slice(&bytes).expect("bad session json");
        assert_eq!(record.total_actions, 10);
        assert!((record.success_rate - 80.0).abs() < f64::EPSILON);
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn update_without_open_session_errors() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = JsonSessionStore::new(dir.path());
        assert!(store.update(&snapshot()).is_err());
    }

    #[test]
    fn close_without_open_session_is_harmless() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = JsonSessionStore::new(dir.path());
        assert!(store.close().is_ok());
    }
}
