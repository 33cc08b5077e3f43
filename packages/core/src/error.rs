use thiserror::Error;

/// Ошибки криптографического ядра.
///
/// Ни один вариант не несёт в себе ключевой материал или открытый текст.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    Derivation(String),
    #[error("Key wrap failed: {0}")]
    Wrap(String),
    #[error("Key unwrap failed: {0}")]
    Unwrap(String),
    #[error("AEAD encryption failed: {0}")]
    Encryption(String),
    #[error("Authenticated decryption failed: {0}")]
    Authentication(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl CryptoError {
    /// Ошибка проверки тега (подмена, чужой ключ, битый транспорт)
    pub fn is_authentication(&self) -> bool {
        matches!(self, CryptoError::Authentication(_))
    }
}

impl From<aes_gcm::Error> for CryptoError {
    fn from(_: aes_gcm::Error) -> Self {
        // aes_gcm::Error намеренно непрозрачна
        CryptoError::Authentication("tag mismatch".to_string())
    }
}
