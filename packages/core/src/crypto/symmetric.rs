//! Симметричное шифрование полезной нагрузки: AES-256-GCM со 128-битным nonce.
//!
//! Формат sealed payload (до base64):
//!
//! ```text
//! ┌──────────────┬──────────────────────┬──────────────┐
//! │ nonce (16 B) │ ciphertext (N bytes) │  tag (16 B)  │
//! └──────────────┴──────────────────────┴──────────────┘
//! ```
//!
//! Nonce генерируется заново из OsRng на каждый вызов `encrypt`. При 128
//! битах случайного nonce вероятность повтора под одним ключом пренебрежимо
//! мала. Повтор nonce под тем же ключом ломает GCM полностью.
//!
//! `decrypt` отказывает целиком: либо весь открытый текст, либо
//! [`CryptoError::Authentication`].

use crate::crypto::keys::SymmetricKey;
use crate::error::CryptoError;
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// AES-256-GCM с 16-байтным nonce (как у WebCrypto-клиента сервера)
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Длина nonce в байтах (128 бит)
pub const NONCE_LENGTH: usize = 16;

/// Длина GCM authentication tag в байтах (128 бит)
pub const TAG_LENGTH: usize = 16;

/// Зашифрованная строка для передачи: base64(nonce ‖ ciphertext ‖ tag)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedPayload(String);

/// Разобранный sealed payload
#[derive(Debug, Clone)]
pub struct SealedParts {
    pub nonce: [u8; NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LENGTH],
}

impl SealedPayload {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Собрать payload из частей
    pub fn from_parts(parts: &SealedParts) -> Self {
        let mut combined =
            Vec::with_capacity(NONCE_LENGTH + parts.ciphertext.len() + TAG_LENGTH);
        combined.extend_from_slice(&parts.nonce);
        combined.extend_from_slice(&parts.ciphertext);
        combined.extend_from_slice(&parts.tag);
        Self(general_purpose::STANDARD.encode(combined))
    }

    /// Разобрать payload на nonce / ciphertext / tag
    pub fn split(&self) -> Result<SealedParts, CryptoError> {
        let combined = general_purpose::STANDARD
            .decode(self.0.trim())
            .map_err(|e| CryptoError::Authentication(format!("payload is not base64: {}", e)))?;

        if combined.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::Authentication(format!(
                "payload too short: {} bytes",
                combined.len()
            )));
        }

        let (nonce, rest) = combined.split_at(NONCE_LENGTH);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LENGTH);

        let mut parts = SealedParts {
            nonce: [0u8; NONCE_LENGTH],
            ciphertext: ciphertext.to_vec(),
            tag: [0u8; TAG_LENGTH],
        };
        parts.nonce.copy_from_slice(nonce);
        parts.tag.copy_from_slice(tag);
        Ok(parts)
    }
}

impl fmt::Debug for SealedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedPayload({} chars)", self.0.len())
    }
}

impl From<String> for SealedPayload {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

/// Зашифровать строку (UTF-8) ключом сессии
pub fn encrypt(key: &SymmetricKey, plaintext: &str) -> Result<SealedPayload, CryptoError> {
    seal_bytes(key, plaintext.as_bytes())
}

/// Расшифровать payload и вернуть строку
pub fn decrypt(key: &SymmetricKey, payload: &SealedPayload) -> Result<String, CryptoError> {
    let plaintext = open_bytes(key, payload)?;
    String::from_utf8(plaintext.to_vec())
        .map_err(|_| CryptoError::Authentication("plaintext is not valid UTF-8".to_string()))
}

/// Зашифровать произвольные байты
pub fn seal_bytes(key: &SymmetricKey, data: &[u8]) -> Result<SealedPayload, CryptoError> {
    let cipher = Aes256Gcm16::new(key.as_bytes().into());

    // Генерируем случайный nonce
    let mut nonce = [0u8; NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    // aead возвращает ciphertext ‖ tag
    let sealed = cipher
        .encrypt(Nonce::<U16>::from_slice(&nonce), data)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LENGTH);
    let mut parts = SealedParts {
        nonce,
        ciphertext: ciphertext.to_vec(),
        tag: [0u8; TAG_LENGTH],
    };
    parts.tag.copy_from_slice(tag);

    Ok(SealedPayload::from_parts(&parts))
}

/// Расшифровать байты. Ошибка тега - всегда [`CryptoError::Authentication`].
pub fn open_bytes(
    key: &SymmetricKey,
    payload: &SealedPayload,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let parts = payload.split()?;
    let cipher = Aes256Gcm16::new(key.as_bytes().into());

    let mut ciphertext_and_tag = Vec::with_capacity(parts.ciphertext.len() + TAG_LENGTH);
    ciphertext_and_tag.extend_from_slice(&parts.ciphertext);
    ciphertext_and_tag.extend_from_slice(&parts.tag);

    let plaintext = cipher
        .decrypt(Nonce::<U16>::from_slice(&parts.nonce), ciphertext_and_tag.as_slice())
        .map_err(CryptoError::from)?;

    Ok(Zeroizing::new(plaintext))
}
