// Типы ошибок

use crate::error::CryptoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WhopeError {
    #[error("Cryptography error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unexpected {message} in phase {phase}")]
    UnexpectedMessage { phase: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Session closed")]
    Closed,
}

impl WhopeError {
    /// Промах локального кеша ключей: вызывающий должен заново
    /// деривировать ключ / пройти обмен, а не падать.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, WhopeError::NotFound(_) | WhopeError::Format(_))
    }

    /// Сообщение было подделано или зашифровано чужим ключом
    pub fn is_authentication(&self) -> bool {
        matches!(self, WhopeError::Crypto(e) if e.is_authentication())
    }
}

impl From<serde_json::Error> for WhopeError {
    fn from(error: serde_json::Error) -> Self {
        WhopeError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for WhopeError {
    fn from(error: std::io::Error) -> Self {
        WhopeError::Storage(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WhopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_miss_classification() {
        assert!(WhopeError::NotFound("symmetric_key".into()).is_cache_miss());
        assert!(WhopeError::Format("bad base64".into()).is_cache_miss());
        assert!(!WhopeError::Closed.is_cache_miss());
        assert!(!WhopeError::Crypto(CryptoError::Authentication("x".into())).is_cache_miss());
    }

    #[test]
    fn test_authentication_classification() {
        let err: WhopeError = CryptoError::Authentication("tag mismatch".into()).into();
        assert!(err.is_authentication());
        assert!(!WhopeError::Timeout("login".into()).is_authentication());
    }
}
