//! Visitor record persistence
//!
//! The record is read once at start-up and written back whenever a counter
//! changes. Losing a write is never fatal: failures are logged and the
//! in-memory record stays authoritative.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("visitor store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("visitor record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted per-visitor bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub visitor_id: String,
    pub visit_count: u32,
    pub total_conversations: u32,
    #[serde(default)]
    pub quiz_completed: bool,
    pub first_visit: DateTime<Utc>,
    pub last_visit: DateTime<Utc>,
}

impl VisitRecord {
    /// Fresh record with a random visitor id
    pub fn new_visitor() -> Self {
        let now = Utc::now();
        Self {
            visitor_id: format!("visitor_{}", uuid::Uuid::new_v4().simple()),
            visit_count: 0,
            total_conversations: 0,
            quiz_completed: false,
            first_visit: now,
            last_visit: now,
        }
    }

    /// Count this page load as a visit
    pub fn register_visit(&mut self) {
        self.visit_count += 1;
        self.last_visit = Utc::now();
    }
}

/// Load/save seam for the visitor record
pub trait VisitorStore: Send {
    /// `Ok(None)` when nothing was stored yet
    fn load(&mut self) -> Result<Option<VisitRecord>, StoreError>;

    fn save(&mut self, record: &VisitRecord) -> Result<(), StoreError>;
}

/// In-memory store; clones share the same slot
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<VisitRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded with a record (returning visitor)
    pub fn with_record(record: VisitRecord) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(record))),
        }
    }

    pub fn snapshot(&self) -> Option<VisitRecord> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl VisitorStore for MemoryStore {
    fn load(&mut self) -> Result<Option<VisitRecord>, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&mut self, record: &VisitRecord) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(record.clone());
        Ok(())
    }
}

/// One JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VisitorStore for JsonFileStore {
    fn load(&mut self) -> Result<Option<VisitRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&mut self, record: &VisitRecord) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trips_between_clones() {
        let store = MemoryStore::new();
        let mut writer = store.clone();
        let record = VisitRecord::new_visitor();
        writer.save(&record).unwrap();
        assert_eq!(store.snapshot(), Some(record));
    }

    #[test]
    fn test_json_file_store_missing_file_is_empty() {
        let path = std::env::temp_dir().join(format!("avatar-sync-missing-{}.json", uuid::Uuid::new_v4()));
        let mut store = JsonFileStore::new(&path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_json_file_store_persists() {
        let path = std::env::temp_dir().join(format!("avatar-sync-{}.json", uuid::Uuid::new_v4()));
        let mut store = JsonFileStore::new(&path);
        let mut record = VisitRecord::new_visitor();
        record.total_conversations = 7;
        record.quiz_completed = true;
        store.save(&record).unwrap();

        let loaded = JsonFileStore::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.total_conversations, 7);
        assert!(loaded.quiz_completed);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_visitor_ids_are_unique() {
        assert_ne!(VisitRecord::new_visitor().visitor_id, VisitRecord::new_visitor().visitor_id);
    }
}
