//! Гибридная схема: RSA-OAEP (SHA-256) используется только для доставки
//! симметричного ключа на сервер. Всё остальное шифруется AES-GCM.
//!
//! Обёртывается ровно один блок: raw ключ (32 байта) всегда помещается в
//! один блок OAEP для модуля от 2048 бит, поэтому разбиение на части не
//! поддерживается.

use crate::config::Config;
use crate::crypto::keys::{ServerPublicKey, SymmetricKey, KEY_LENGTH};
use crate::error::CryptoError;
use base64::{engine::general_purpose, Engine as _};
use rsa::{Oaep, RsaPrivateKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

/// Накладные расходы OAEP-SHA256: 2 * hLen + 2
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

/// Симметричный ключ, зашифрованный публичным ключом сервера (base64).
///
/// Одноразовый: новый handshake - новая обёртка (OAEP рандомизирован).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedKey(String);

impl WrappedKey {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey({} chars)", self.0.len())
    }
}

/// Обернуть симметричный ключ публичным ключом сервера
pub fn wrap_key(public_key: &ServerPublicKey, key: &SymmetricKey) -> Result<WrappedKey, CryptoError> {
    wrap_key_with_min_bits(public_key, key, Config::global().min_rsa_bits)
}

/// То же, с явным минимальным размером RSA модуля
pub fn wrap_key_with_min_bits(
    public_key: &ServerPublicKey,
    key: &SymmetricKey,
    min_bits: usize,
) -> Result<WrappedKey, CryptoError> {
    let modulus_bytes = public_key.bits() / 8;

    if public_key.bits() < min_bits {
        return Err(CryptoError::Wrap(format!(
            "server key is {} bits, at least {} required for encryption",
            public_key.bits(),
            min_bits
        )));
    }

    if modulus_bytes < KEY_LENGTH + OAEP_SHA256_OVERHEAD {
        return Err(CryptoError::Wrap(
            "server key too small for one OAEP block".to_string(),
        ));
    }

    let ciphertext = public_key
        .as_rsa()
        .encrypt(&mut rand::rngs::OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::Wrap(e.to_string()))?;

    tracing::debug!(
        target: "whope::crypto",
        server_key = %public_key.fingerprint(),
        session_key = %key.fingerprint(),
        "Wrapped session key"
    );

    Ok(WrappedKey(general_purpose::STANDARD.encode(ciphertext)))
}

/// Развернуть ключ приватным ключом (серверная сторона; клиент не вызывает)
pub fn unwrap_key(private_key: &RsaPrivateKey, wrapped: &WrappedKey) -> Result<SymmetricKey, CryptoError> {
    let ciphertext = general_purpose::STANDARD
        .decode(wrapped.as_str().trim())
        .map_err(|e| CryptoError::Unwrap(format!("wrapped key is not base64: {}", e)))?;

    let raw = Zeroizing::new(
        private_key
            .decrypt(Oaep::new::<Sha256>(), &ciphertext)
            .map_err(|e| CryptoError::Unwrap(e.to_string()))?,
    );

    SymmetricKey::from_slice(&raw)
}
