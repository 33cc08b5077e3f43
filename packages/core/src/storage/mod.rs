// Модуль хранилища ключей
//
// KeyStorage - бэкенд (память или JSON файл), KeyStore - кодирование ключей
// поверх него. Хранилище локальное и однопользовательское.

pub mod file;
pub mod key_store;
pub mod memory;
pub mod models;

use crate::utils::error::Result;
use models::{StoredKeyRecord, StoredValue};

pub use file::FileStorage;
pub use key_store::{KeyStore, StoredKey};
pub use memory::MemoryStorage;
pub use models::KeyKind;

/// Сколько последних версий одной записи держать
pub const MAX_RECORD_HISTORY: usize = 4;

/// Бэкенд для хранения сериализованных ключей и значений сессии
pub trait KeyStorage: Send {
    /// Добавить запись. Существующие записи не изменяются.
    fn append_record(&mut self, record: StoredKeyRecord) -> Result<()>;

    /// Последняя версия записи с этим именем
    fn latest_record(&self, name: &str) -> Result<Option<StoredKeyRecord>>;

    fn save_value(&mut self, value: StoredValue) -> Result<()>;

    fn load_value(&self, name: &str) -> Result<Option<StoredValue>>;

    fn clear_all(&mut self) -> Result<()>;
}
