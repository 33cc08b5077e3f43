// In-memory storage для тестов и сессий без диска

use crate::storage::models::*;
use crate::storage::{KeyStorage, MAX_RECORD_HISTORY};
use crate::utils::error::Result;
use std::collections::HashMap;

/// In-memory хранилище
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: HashMap<String, Vec<StoredKeyRecord>>,
    values: HashMap<String, StoredValue>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Все сохранённые версии записи (от старой к новой)
    pub fn history(&self, name: &str) -> Vec<StoredKeyRecord> {
        self.records.get(name).cloned().unwrap_or_default()
    }
}

impl KeyStorage for MemoryStorage {
    fn append_record(&mut self, record: StoredKeyRecord) -> Result<()> {
        let history = self.records.entry(record.name.clone()).or_default();
        history.push(record);

        if history.len() > MAX_RECORD_HISTORY {
            let excess = history.len() - MAX_RECORD_HISTORY;
            history.drain(..excess);
        }
        Ok(())
    }

    fn latest_record(&self, name: &str) -> Result<Option<StoredKeyRecord>> {
        Ok(self
            .records
            .get(name)
            .and_then(|history| history.iter().max_by_key(|r| r.version))
            .cloned())
    }

    fn save_value(&mut self, value: StoredValue) -> Result<()> {
        self.values.insert(value.name.clone(), value);
        Ok(())
    }

    fn load_value(&self, name: &str) -> Result<Option<StoredValue>> {
        Ok(self.values.get(name).cloned())
    }

    fn clear_all(&mut self) -> Result<()> {
        self.records.clear();
        self.values.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: u32) -> StoredKeyRecord {
        StoredKeyRecord {
            name: name.to_string(),
            kind: KeyKind::Symmetric,
            encoded: format!("key-v{}", version),
            version,
            created_at: 12345,
        }
    }

    #[test]
    fn test_memory_storage_latest_record() {
        let mut storage = MemoryStorage::new();

        storage.append_record(record("symmetric_key", 1)).unwrap();
        storage.append_record(record("symmetric_key", 2)).unwrap();

        let loaded = storage.latest_record("symmetric_key").unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.encoded, "key-v2");

        // Старая версия не перезаписана
        assert_eq!(storage.history("symmetric_key").len(), 2);
        assert!(storage.latest_record("missing").unwrap().is_none());
    }

    #[test]
    fn test_memory_storage_history_is_bounded() {
        let mut storage = MemoryStorage::new();
        for version in 1..=10 {
            storage.append_record(record("symmetric_key", version)).unwrap();
        }

        let history = storage.history("symmetric_key");
        assert_eq!(history.len(), MAX_RECORD_HISTORY);
        assert_eq!(history.last().unwrap().version, 10);
    }

    #[test]
    fn test_memory_storage_values() {
        let mut storage = MemoryStorage::new();
        storage
            .save_value(StoredValue {
                name: "access_token".to_string(),
                value: "token".to_string(),
                created_at: 1,
            })
            .unwrap();

        assert_eq!(storage.load_value("access_token").unwrap().unwrap().value, "token");

        storage.clear_all().unwrap();
        assert!(storage.load_value("access_token").unwrap().is_none());
    }
}
