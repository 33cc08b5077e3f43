// Whope Core
// Клиентская E2E-шифрованная сессия: деривация ключа, гибридный обмен,
// AES-GCM сообщения и ротация ключа посреди сессии

#![warn(clippy::all)]

// Модули
#[cfg(feature = "desktop")]
pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod state;
pub mod storage;
pub mod utils;

// Re-exports для удобства
#[cfg(feature = "desktop")]
pub use api::{ChatHandle, WhopeClient};
pub use config::Config;
pub use crypto::{Credential, SealedPayload, ServerPublicKey, SymmetricKey, WrappedKey};
pub use error::CryptoError;
pub use protocol::session::{Channel, Phase, SessionAction, SessionProtocol};
pub use storage::{FileStorage, KeyStore, MemoryStorage};
pub use utils::error::{Result, WhopeError};
