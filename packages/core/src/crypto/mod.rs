//! Криптографический модуль
//!
//! # Архитектура
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SessionProtocol (protocol)                  │
//! └─────────────────────────────────────────────────────────────┘
//!          │                     │                     │
//!          ▼                     ▼                     ▼
//! ┌─────────────────┐  ┌───────────────────┐  ┌────────────────────┐
//! │   kdf           │  │   hybrid          │  │   symmetric        │
//! │  PBKDF2-SHA256  │  │  RSA-OAEP-SHA256  │  │  AES-256-GCM       │
//! │  пароль → ключ  │  │  ключ → сервер    │  │  nonce 128 бит     │
//! └─────────────────┘  └───────────────────┘  └────────────────────┘
//!          │                     │                     │
//!          └─────────────────────┼─────────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  keys: SymmetricKey, ServerPublicKey, Credential            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Все функции чистые: без общего изменяемого состояния, их можно
//! вызывать параллельно для независимых сообщений.

/// Ключевой материал
pub mod keys;

/// Деривация ключа из пароля
pub mod kdf;

/// Доставка симметричного ключа под RSA-OAEP
pub mod hybrid;

/// AES-GCM шифрование сообщений
pub mod symmetric;

// ============================================================================
// Re-exports для удобства
// ============================================================================

pub use hybrid::{unwrap_key, wrap_key, wrap_key_with_min_bits, WrappedKey};
pub use kdf::derive_symmetric_key;
pub use keys::{Credential, ServerPublicKey, SymmetricKey};
pub use symmetric::{decrypt, encrypt, SealedPayload};
