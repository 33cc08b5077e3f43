// Модели данных для хранилища

use serde::{Deserialize, Serialize};
use std::fmt;

/// Логические имена записей локального хранилища
pub mod names {
    pub const SERVER_PUBLIC_KEY: &str = "server_public_key";
    pub const SYMMETRIC_KEY: &str = "symmetric_key";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const ENCRYPTED_USERNAME: &str = "encrypted_username";
}

/// Тип ключа в записи
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Public,    // SPKI DER публичного ключа сервера
    Symmetric, // raw AES-256 ключ
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Public => write!(f, "public"),
            KeyKind::Symmetric => write!(f, "symmetric"),
        }
    }
}

/// Ключ в хранилище (СЕРИАЛИЗОВАННЫЙ, base64)
///
/// Записи не редактируются: ротация добавляет новую запись с большей версией.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKeyRecord {
    pub name: String,
    pub kind: KeyKind,
    pub encoded: String, // base64 канонического экспорта ключа
    pub version: u32,
    pub created_at: i64,
}

impl fmt::Debug for StoredKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredKeyRecord")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("version", &self.version)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Значение сессии (токен, зашифрованный username)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    pub name: String,
    pub value: String,
    pub created_at: i64,
}
