// Типы сообщений протокола
// Имена полей - контракт с сервером, менять нельзя

use crate::crypto::hybrid::WrappedKey;
use crate::crypto::symmetric::SealedPayload;
use serde::{Deserialize, Serialize};

/// Пара токенов, выдаваемая сервером после проверки учётных данных.
///
/// Клиент хранит токены как есть и не расшифровывает их.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &format_args!("{} chars", self.access.len()))
            .field("refresh", &self.refresh.is_some())
            .finish()
    }
}

/// Сообщения сервера (сервер -> клиент).
///
/// Сервер не присылает тег типа, поэтому вариант определяется по набору
/// полей. Порядок вариантов важен: serde пробует их сверху вниз.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// `{"public_key": <base64 SPKI>}`
    PublicKey { public_key: String },

    /// `{"tokens": {"access", "refresh"}}`
    Tokens { tokens: TokenPair },

    /// `{"new_symmetric_key": <sealed под текущим ключом>}`
    NewSymmetricKey { new_symmetric_key: SealedPayload },

    /// `{"username": <sealed>, "message": <sealed>}`
    Chat {
        username: SealedPayload,
        message: SealedPayload,
    },
}

impl ServerMessage {
    /// Короткое имя для логов и ошибок
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::PublicKey { .. } => "public_key",
            ServerMessage::Tokens { .. } => "tokens",
            ServerMessage::NewSymmetricKey { .. } => "new_symmetric_key",
            ServerMessage::Chat { .. } => "chat_message",
        }
    }
}

/// Действия канала чата (клиент -> сервер)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChatAction {
    InitializeConnection {
        encrypted_symmetric_key: WrappedKey,
        encrypted_token: String,
    },
    SendMessage {
        username: SealedPayload,
        message: SealedPayload,
    },
}

/// Учётные данные для login/register, зашифрованные ключом сессии
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsData {
    pub username: SealedPayload,
    pub password: SealedPayload,
    pub symmetric_key: WrappedKey,
    /// Только при регистрации: "True" / "False"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_worker: Option<String>,
}

/// Сообщения клиента (клиент -> сервер)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Credentials(CredentialsData),
    Chat(ChatAction),
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Credentials(data) if data.is_worker.is_some() => "register",
            ClientMessage::Credentials(_) => "login",
            ClientMessage::Chat(ChatAction::InitializeConnection { .. }) => "initialize_connection",
            ClientMessage::Chat(ChatAction::SendMessage { .. }) => "send_message",
        }
    }
}
