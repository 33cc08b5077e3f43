// KeyStore: кодирование ключей в печатный вид и обратно поверх KeyStorage
//
// Симметричный ключ хранится как base64(raw), публичный ключ сервера как
// base64(SPKI DER). Каждое сохранение добавляет новую версию записи.

use crate::crypto::keys::{ServerPublicKey, SymmetricKey};
use crate::storage::models::{KeyKind, StoredKeyRecord, StoredValue};
use crate::storage::KeyStorage;
use crate::utils::error::{Result, WhopeError};
use crate::utils::time::current_timestamp;

/// Ключ, готовый к сохранению или только что загруженный
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredKey {
    Public(ServerPublicKey),
    Symmetric(SymmetricKey),
}

impl StoredKey {
    pub fn kind(&self) -> KeyKind {
        match self {
            StoredKey::Public(_) => KeyKind::Public,
            StoredKey::Symmetric(_) => KeyKind::Symmetric,
        }
    }
}

/// Локальное хранилище ключей и значений сессии
pub struct KeyStore<S: KeyStorage> {
    storage: S,
}

impl<S: KeyStorage> KeyStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn backend(&self) -> &S {
        &self.storage
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    /// Сохранить ключ под логическим именем.
    ///
    /// Предыдущие версии не перезаписываются, новая запись получает
    /// версию на единицу больше последней.
    pub fn store(&mut self, name: &str, kind: KeyKind, key: &StoredKey) -> Result<()> {
        if key.kind() != kind {
            return Err(WhopeError::Validation(format!(
                "cannot store {} key as {}",
                key.kind(),
                kind
            )));
        }

        let encoded = match key {
            StoredKey::Symmetric(k) => k.to_base64().to_string(),
            StoredKey::Public(k) => k.to_spki_base64()?,
        };

        let version = self
            .storage
            .latest_record(name)?
            .map(|r| r.version + 1)
            .unwrap_or(1);

        self.storage.append_record(StoredKeyRecord {
            name: name.to_string(),
            kind,
            encoded,
            version,
            created_at: current_timestamp(),
        })?;

        tracing::debug!(
            target: "whope::storage",
            name,
            kind = %kind,
            version,
            "Stored key"
        );

        Ok(())
    }

    /// Загрузить последнюю версию ключа.
    ///
    /// # Errors
    ///
    /// * [`WhopeError::NotFound`] - записи нет
    /// * [`WhopeError::Format`] - запись не декодируется или другого типа
    pub fn retrieve(&self, name: &str, kind: KeyKind) -> Result<StoredKey> {
        let record = self
            .storage
            .latest_record(name)?
            .ok_or_else(|| WhopeError::NotFound(format!("no stored key '{}'", name)))?;

        if record.kind != kind {
            return Err(WhopeError::Format(format!(
                "stored key '{}' is {}, expected {}",
                name, record.kind, kind
            )));
        }

        let key = match kind {
            KeyKind::Symmetric => SymmetricKey::from_base64(&record.encoded)
                .map(StoredKey::Symmetric),
            KeyKind::Public => ServerPublicKey::from_spki_base64(&record.encoded)
                .map(StoredKey::Public),
        }
        .map_err(|e| WhopeError::Format(format!("stored key '{}' is unreadable: {}", name, e)))?;

        Ok(key)
    }

    pub fn store_symmetric(&mut self, name: &str, key: &SymmetricKey) -> Result<()> {
        self.store(name, KeyKind::Symmetric, &StoredKey::Symmetric(key.clone()))
    }

    pub fn store_public(&mut self, name: &str, key: &ServerPublicKey) -> Result<()> {
        self.store(name, KeyKind::Public, &StoredKey::Public(key.clone()))
    }

    pub fn retrieve_symmetric(&self, name: &str) -> Result<SymmetricKey> {
        match self.retrieve(name, KeyKind::Symmetric)? {
            StoredKey::Symmetric(key) => Ok(key),
            StoredKey::Public(_) => Err(WhopeError::Format(format!(
                "stored key '{}' is not symmetric",
                name
            ))),
        }
    }

    pub fn retrieve_public(&self, name: &str) -> Result<ServerPublicKey> {
        match self.retrieve(name, KeyKind::Public)? {
            StoredKey::Public(key) => Ok(key),
            StoredKey::Symmetric(_) => Err(WhopeError::Format(format!(
                "stored key '{}' is not public",
                name
            ))),
        }
    }

    pub fn store_value(&mut self, name: &str, value: &str) -> Result<()> {
        self.storage.save_value(StoredValue {
            name: name.to_string(),
            value: value.to_string(),
            created_at: current_timestamp(),
        })
    }

    pub fn retrieve_value(&self, name: &str) -> Result<String> {
        self.storage
            .load_value(name)?
            .map(|v| v.value)
            .ok_or_else(|| WhopeError::NotFound(format!("no stored value '{}'", name)))
    }

    pub fn clear(&mut self) -> Result<()> {
        self.storage.clear_all()
    }
}
