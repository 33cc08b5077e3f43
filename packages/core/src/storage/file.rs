// Файловое хранилище: один JSON документ на клиента.
//
// Запись идёт во временный файл рядом и затем переименовывается поверх
// основного, так что на диске всегда либо старый, либо новый документ.

use crate::storage::models::*;
use crate::storage::{KeyStorage, MAX_RECORD_HISTORY};
use crate::utils::error::{Result, WhopeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Содержимое файла хранилища
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KeyStoreDocument {
    #[serde(default)]
    records: Vec<StoredKeyRecord>,
    #[serde(default)]
    values: BTreeMap<String, StoredValue>,
}

/// Хранилище в JSON файле
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    document: KeyStoreDocument,
}

impl FileStorage {
    /// Открыть хранилище. Отсутствующий файл - пустое хранилище.
    ///
    /// # Errors
    ///
    /// [`WhopeError::Format`], если файл существует, но не разбирается.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let document = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                WhopeError::Format(format!("key store {} is corrupted: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => KeyStoreDocument::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            target: "whope::storage",
            path = %path.display(),
            records = document.records.len(),
            "Opened key store"
        );

        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_string_pretty(&self.document)?;
        let tmp_path = self.path.with_extension("json.tmp");

        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyStorage for FileStorage {
    fn append_record(&mut self, record: StoredKeyRecord) -> Result<()> {
        let name = record.name.clone();
        self.document.records.push(record);

        // Оставляем только последние MAX_RECORD_HISTORY версий этого имени
        let count = self.document.records.iter().filter(|r| r.name == name).count();
        if count > MAX_RECORD_HISTORY {
            let mut excess = count - MAX_RECORD_HISTORY;
            self.document.records.retain(|r| {
                if excess > 0 && r.name == name {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }

        self.persist()
    }

    fn latest_record(&self, name: &str) -> Result<Option<StoredKeyRecord>> {
        Ok(self
            .document
            .records
            .iter()
            .filter(|r| r.name == name)
            .max_by_key(|r| r.version)
            .cloned())
    }

    fn save_value(&mut self, value: StoredValue) -> Result<()> {
        self.document.values.insert(value.name.clone(), value);
        self.persist()
    }

    fn load_value(&self, name: &str) -> Result<Option<StoredValue>> {
        Ok(self.document.values.get(name).cloned())
    }

    fn clear_all(&mut self) -> Result<()> {
        self.document = KeyStoreDocument::default();
        self.persist()
    }
}
