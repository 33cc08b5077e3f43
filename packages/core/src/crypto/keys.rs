// Ключевой материал клиента
// Симметричный ключ сессии, публичный ключ сервера и учётные данные

use crate::error::CryptoError;
use crate::utils::logging::fingerprint;
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Длина ключа AES-256 (в байтах)
pub const KEY_LENGTH: usize = 32;

/// Симметричный ключ AES-256-GCM.
///
/// Обнуляется при drop. `Debug` печатает только отпечаток.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LENGTH]);

impl SymmetricKey {
    /// Создать из raw байтов
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Импорт raw ключа произвольного происхождения (длина проверяется)
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LENGTH {
            return Err(CryptoError::InvalidKey(format!(
                "symmetric key must be {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            )));
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Случайный ключ из OsRng (серверная сторона ротации, тесты)
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Raw экспорт
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(general_purpose::STANDARD.encode(self.0))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| CryptoError::InvalidKey(format!("bad base64: {}", e)))?,
        );
        Self::from_slice(&bytes)
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey({})", self.fingerprint())
    }
}

/// Публичный RSA ключ сервера (импортируется из SPKI DER).
#[derive(Clone, PartialEq, Eq)]
pub struct ServerPublicKey {
    inner: RsaPublicKey,
}

impl ServerPublicKey {
    pub fn from_rsa(inner: RsaPublicKey) -> Self {
        Self { inner }
    }

    /// Импорт из SPKI DER. Ключи не-RSA алгоритмов отклоняются.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        let inner = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| CryptoError::InvalidKey(format!("not an RSA SPKI key: {}", e)))?;
        Ok(Self { inner })
    }

    /// Импорт из base64 SPKI, как его публикует сервер в `public_key`
    pub fn from_spki_base64(encoded: &str) -> Result<Self, CryptoError> {
        let der = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("bad base64: {}", e)))?;
        Self::from_spki_der(&der)
    }

    pub fn to_spki_der(&self) -> Result<Vec<u8>, CryptoError> {
        let document = self
            .inner
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidKey(format!("SPKI export failed: {}", e)))?;
        Ok(document.as_bytes().to_vec())
    }

    pub fn to_spki_base64(&self) -> Result<String, CryptoError> {
        Ok(general_purpose::STANDARD.encode(self.to_spki_der()?))
    }

    /// Размер модуля в битах
    pub fn bits(&self) -> usize {
        self.inner.size() * 8
    }

    pub fn as_rsa(&self) -> &RsaPublicKey {
        &self.inner
    }

    pub fn fingerprint(&self) -> String {
        match self.to_spki_der() {
            Ok(der) => fingerprint(&der),
            Err(_) => "unknown".to_string(),
        }
    }
}

impl fmt::Debug for ServerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerPublicKey")
            .field("bits", &self.bits())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Учётные данные пользователя. Живут только в памяти, обнуляются при drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    username: String,
    password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
