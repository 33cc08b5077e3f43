//! Протокол сессии: конечный автомат без I/O.
//!
//! Автомат получает разобранные сообщения сервера и намерения приложения и
//! возвращает действия (`SessionAction`). Сеть, таймеры и сокеты живут в
//! [`crate::protocol::driver`]. Время передаётся явно, поэтому окно grace
//! проверяется в тестах без ожидания.
//!
//! ```text
//! Unauthenticated ──open(Login|Register)──► AwaitingServerKey
//!        │                                       │ public_key
//!        │                                       ▼
//!        │                                KeyExchangeSent
//!        │                                       │ tokens
//!        │                                       ▼
//!        └──────────open(Chat)──────────── Authenticated
//!                       │
//!                       ▼
//!             Active { rotating } ◄─── new_symmetric_key
//!                       │
//!                     close() ──► Closed
//! ```

use crate::config::Config;
use crate::crypto::hybrid::wrap_key_with_min_bits;
use crate::crypto::kdf::derive_with_iterations;
use crate::crypto::keys::{Credential, ServerPublicKey, SymmetricKey, KEY_LENGTH};
use crate::crypto::symmetric::{self, SealedPayload};
use crate::error::CryptoError;
use crate::protocol::messages::{ChatAction, ClientMessage, CredentialsData, ServerMessage, TokenPair};
use crate::protocol::validation;
use crate::protocol::wire::decode_server_message;
use crate::state::messages::{ChatEntry, MessageLog};
use crate::state::session::{KeySlot, SessionState};
use crate::storage::models::names;
use crate::storage::{KeyStorage, KeyStore};
use crate::utils::error::{Result, WhopeError};
use crate::utils::time::current_timestamp;
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Фаза сессии
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unauthenticated,
    AwaitingServerKey,
    KeyExchangeSent,
    Authenticated,
    Active { rotating: bool },
    Closed,
}

impl Phase {
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Active { .. })
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Unauthenticated => write!(f, "unauthenticated"),
            Phase::AwaitingServerKey => write!(f, "awaiting_server_key"),
            Phase::KeyExchangeSent => write!(f, "key_exchange_sent"),
            Phase::Authenticated => write!(f, "authenticated"),
            Phase::Active { rotating: false } => write!(f, "active"),
            Phase::Active { rotating: true } => write!(f, "active(rotating)"),
            Phase::Closed => write!(f, "closed"),
        }
    }
}

/// Логический канал сервера. Каждый канал - отдельная конечная точка.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Register { is_worker: bool },
    Login,
    Chat,
}

impl Channel {
    /// Имя фазы в URL (`<server_url>/<name>/`)
    pub fn endpoint_name(&self) -> &'static str {
        match self {
            Channel::Register { .. } => "register",
            Channel::Login => "login",
            Channel::Chat => "chat",
        }
    }
}

/// Что автомат просит сделать вызывающего
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Отправить сообщение серверу
    Send(ClientMessage),
    /// Токены получены и сохранены
    Authenticated,
    /// Новое расшифрованное сообщение (уже добавлено в лог)
    MessageReceived(ChatEntry),
    /// Сервер сменил ключ сессии
    KeyRotated { epoch: u32, fingerprint: String },
    /// Входящее событие не прошло аутентификацию и отброшено
    Dropped { reason: String },
    /// Несколько ошибок аутентификации подряд: подмена или рассинхронизация
    TamperingSuspected { failures: u32 },
}

/// Клиентская сессия
pub struct SessionProtocol<S: KeyStorage> {
    id: Uuid,
    phase: Phase,
    channel: Option<Channel>,
    credential: Option<Credential>,
    username: Option<String>,
    keys: Option<SessionState>,
    store: KeyStore<S>,
    log: MessageLog,
    auth_failures: u32,
    grace: Duration,
    max_auth_failures: u32,
    pbkdf2_iterations: u32,
    min_rsa_bits: usize,
}

impl<S: KeyStorage> SessionProtocol<S> {
    /// Новая сессия с глобальной конфигурацией
    pub fn new(store: KeyStore<S>) -> Self {
        Self::with_config(store, Config::global())
    }

    pub fn with_config(store: KeyStore<S>, config: &Config) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: Phase::Unauthenticated,
            channel: None,
            credential: None,
            username: None,
            keys: None,
            store,
            log: MessageLog::new(),
            auth_failures: 0,
            grace: config.rotation_grace(),
            max_auth_failures: config.max_auth_failures.max(1),
            pbkdf2_iterations: config.pbkdf2_iterations,
            min_rsa_bits: config.min_rsa_bits,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn channel(&self) -> Option<Channel> {
        self.channel
    }

    /// Лог сообщений текущей сессии
    pub fn messages(&self) -> &[ChatEntry] {
        self.log.entries()
    }

    /// Ключи сессии (после handshake)
    pub fn keys(&self) -> Option<&SessionState> {
        self.keys.as_ref()
    }

    pub fn store(&self) -> &KeyStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut KeyStore<S> {
        &mut self.store
    }

    pub fn into_store(self) -> KeyStore<S> {
        self.store
    }

    /// Открыть канал.
    ///
    /// Для `Login` и `Register` нужны учётные данные: автомат переходит в
    /// `AwaitingServerKey` и ничего не отправляет. Для `Chat` учётные данные
    /// необязательны, ключи и токен берутся из хранилища.
    pub fn open(
        &mut self,
        channel: Channel,
        credential: Option<Credential>,
    ) -> Result<Vec<SessionAction>> {
        match channel {
            Channel::Login | Channel::Register { .. } => {
                self.expect_phase(&[Phase::Unauthenticated], channel.endpoint_name())?;

                let credential = credential.ok_or_else(|| {
                    WhopeError::Validation("Credentials are required to authenticate".to_string())
                })?;
                validation::validate_username(credential.username())?;
                validation::validate_password(credential.password())?;

                self.credential = Some(credential);
                self.channel = Some(channel);
                self.transition(Phase::AwaitingServerKey);
                Ok(vec![])
            }
            Channel::Chat => {
                self.expect_phase(&[Phase::Unauthenticated, Phase::Authenticated], "chat")?;
                self.open_chat(credential)
            }
        }
    }

    /// Разобрать текст от сервера и обработать
    pub fn handle_text(&mut self, text: &str, now: Instant) -> Result<Vec<SessionAction>> {
        let message = decode_server_message(text)?;
        self.handle_at(message, now)
    }

    pub fn handle(&mut self, message: ServerMessage) -> Result<Vec<SessionAction>> {
        self.handle_at(message, Instant::now())
    }

    /// Обработать сообщение сервера в момент `now`
    pub fn handle_at(&mut self, message: ServerMessage, now: Instant) -> Result<Vec<SessionAction>> {
        if self.phase == Phase::Closed {
            return Err(WhopeError::Closed);
        }

        // Посреди чата сервер может повторить public_key или tokens:
        // такие события отбрасываются, чат продолжается
        if self.phase.is_active()
            && matches!(
                message,
                ServerMessage::PublicKey { .. } | ServerMessage::Tokens { .. }
            )
        {
            return Ok(self.ignore(message.kind()));
        }

        validation::validate_server_message(&message)?;

        match (self.phase, message) {
            (Phase::AwaitingServerKey, ServerMessage::PublicKey { public_key }) => {
                self.handle_server_key(&public_key)
            }
            (Phase::KeyExchangeSent, ServerMessage::Tokens { tokens }) => self.handle_tokens(tokens),
            (Phase::Active { .. }, ServerMessage::NewSymmetricKey { new_symmetric_key }) => {
                self.handle_rotation(&new_symmetric_key, now)
            }
            (Phase::Active { .. }, ServerMessage::Chat { username, message }) => {
                self.handle_chat_message(&username, &message, now)
            }
            (phase, message) => {
                tracing::warn!(
                    target: "whope::session",
                    session = %self.id,
                    phase = %phase,
                    kind = message.kind(),
                    "Unexpected server message"
                );
                Err(WhopeError::UnexpectedMessage {
                    phase: phase.to_string(),
                    message: message.kind().to_string(),
                })
            }
        }
    }

    /// Зашифровать и отправить сообщение чата
    pub fn send_message(&mut self, text: &str) -> Result<Vec<SessionAction>> {
        if !self.phase.is_active() {
            return Err(self.unexpected("send_message"));
        }
        validation::validate_message_text(text)?;

        let (keys, username) = match (self.keys.as_ref(), self.username.as_deref()) {
            (Some(keys), Some(username)) => (keys, username),
            _ => return Err(self.unexpected("send_message")),
        };

        // username и тело шифруются независимо, каждое со своим nonce
        let message = ClientMessage::Chat(ChatAction::SendMessage {
            username: keys.encrypt(username)?,
            message: keys.encrypt(text)?,
        });
        validation::validate_client_message(&message)?;

        Ok(vec![SessionAction::Send(message)])
    }

    /// Снять флаг ротации, когда окно grace закрылось
    pub fn tick(&mut self, now: Instant) -> Vec<SessionAction> {
        if let (Phase::Active { rotating: true }, Some(keys)) = (self.phase, self.keys.as_ref()) {
            if !keys.in_grace(now) {
                self.transition(Phase::Active { rotating: false });
            }
        }
        vec![]
    }

    /// Закрыть сессию. Ключи в памяти обнуляются, хранилище не трогается.
    pub fn close(&mut self) {
        self.keys = None;
        self.credential = None;
        self.username = None;
        self.auth_failures = 0;
        self.transition(Phase::Closed);
    }

    fn handle_server_key(&mut self, encoded: &str) -> Result<Vec<SessionAction>> {
        let channel = self.channel.ok_or_else(|| self.unexpected("public_key"))?;
        let server_key = ServerPublicKey::from_spki_base64(encoded)?;

        let credential = self
            .credential
            .as_ref()
            .ok_or_else(|| WhopeError::Validation("Credentials are missing".to_string()))?;

        let iterations = self.pbkdf2_iterations;
        let (key, reused) = match channel {
            Channel::Login => match self.reusable_key(credential.username()) {
                Some(key) => (key, true),
                None => (derive_with_iterations(credential.password(), iterations)?, false),
            },
            _ => (derive_with_iterations(credential.password(), iterations)?, false),
        };

        let encrypted_username = symmetric::encrypt(&key, credential.username())?;
        let message = ClientMessage::Credentials(CredentialsData {
            username: encrypted_username.clone(),
            password: symmetric::encrypt(&key, credential.password())?,
            symmetric_key: wrap_key_with_min_bits(&server_key, &key, self.min_rsa_bits)?,
            is_worker: match channel {
                Channel::Register { is_worker: true } => Some("True".to_string()),
                Channel::Register { is_worker: false } => Some("False".to_string()),
                _ => None,
            },
        });
        validation::validate_client_message(&message)?;

        self.store.store_public(names::SERVER_PUBLIC_KEY, &server_key)?;
        if !reused {
            self.store.store_symmetric(names::SYMMETRIC_KEY, &key)?;
        }
        self.store
            .store_value(names::ENCRYPTED_USERNAME, encrypted_username.as_str())?;

        tracing::info!(
            target: "whope::session",
            session = %self.id,
            channel = channel.endpoint_name(),
            server_key = %server_key.fingerprint(),
            session_key = %key.fingerprint(),
            reused,
            "Key exchange sent"
        );

        self.username = Some(credential.username().to_string());
        self.keys = Some(SessionState::new(key, self.grace));
        self.transition(Phase::KeyExchangeSent);
        Ok(vec![SessionAction::Send(message)])
    }

    /// Сохранённый ключ, если он принадлежит этому пользователю
    fn reusable_key(&self, username: &str) -> Option<SymmetricKey> {
        let lookup = || -> Result<Option<SymmetricKey>> {
            let key = self.store.retrieve_symmetric(names::SYMMETRIC_KEY)?;
            let sealed = SealedPayload::new(self.store.retrieve_value(names::ENCRYPTED_USERNAME)?);
            let stored_username = Zeroizing::new(symmetric::decrypt(&key, &sealed)?);
            Ok((stored_username.as_str() == username).then_some(key))
        };

        match lookup() {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(
                    target: "whope::session",
                    session = %self.id,
                    error = %e,
                    "No reusable session key, deriving"
                );
                None
            }
        }
    }

    fn handle_tokens(&mut self, tokens: TokenPair) -> Result<Vec<SessionAction>> {
        self.store.store_value(names::ACCESS_TOKEN, &tokens.access)?;
        if let Some(refresh) = &tokens.refresh {
            self.store.store_value(names::REFRESH_TOKEN, refresh)?;
        }

        // Пароль больше не нужен
        self.credential = None;
        self.transition(Phase::Authenticated);
        Ok(vec![SessionAction::Authenticated])
    }

    fn open_chat(&mut self, credential: Option<Credential>) -> Result<Vec<SessionAction>> {
        let server_key = self.store.retrieve_public(names::SERVER_PUBLIC_KEY)?;
        let key = self.store.retrieve_symmetric(names::SYMMETRIC_KEY)?;
        let token = self.store.retrieve_value(names::ACCESS_TOKEN)?;

        let username = match credential {
            Some(credential) => credential.username().to_string(),
            None => {
                let sealed = SealedPayload::new(self.store.retrieve_value(names::ENCRYPTED_USERNAME)?);
                symmetric::decrypt(&key, &sealed).map_err(|e| {
                    WhopeError::Format(format!("stored username does not open: {}", e))
                })?
            }
        };

        let message = ClientMessage::Chat(ChatAction::InitializeConnection {
            encrypted_symmetric_key: wrap_key_with_min_bits(&server_key, &key, self.min_rsa_bits)?,
            encrypted_token: token,
        });
        validation::validate_client_message(&message)?;

        tracing::info!(
            target: "whope::session",
            session = %self.id,
            session_key = %key.fingerprint(),
            "Chat connection initialized"
        );

        self.channel = Some(Channel::Chat);
        self.username = Some(username);
        self.keys = Some(SessionState::new(key, self.grace));
        self.auth_failures = 0;
        self.transition(Phase::Active { rotating: false });
        Ok(vec![SessionAction::Send(message)])
    }

    fn handle_rotation(&mut self, sealed: &SealedPayload, now: Instant) -> Result<Vec<SessionAction>> {
        let keys = self.keys.as_ref().ok_or_else(|| self.unexpected("new_symmetric_key"))?;

        // Новый ключ открывается только действующим ключом
        let new_key = match symmetric::open_bytes(keys.active(), sealed)
            .and_then(|raw| parse_rotated_key(&raw))
        {
            Ok(key) => key,
            Err(e) => return Ok(self.record_failure("new_symmetric_key", &e)),
        };
        let previous = keys.active().clone();

        let encrypted_username = match &self.username {
            Some(username) => Some(symmetric::encrypt(&new_key, username)?),
            None => None,
        };

        // Ключ и username под ним пишутся парой: при сбое второй записи
        // последним снова становится прежний ключ
        self.store.store_symmetric(names::SYMMETRIC_KEY, &new_key)?;
        if let Some(encrypted_username) = encrypted_username {
            if let Err(e) = self
                .store
                .store_value(names::ENCRYPTED_USERNAME, encrypted_username.as_str())
            {
                if let Err(rollback) = self.store.store_symmetric(names::SYMMETRIC_KEY, &previous) {
                    tracing::error!(
                        target: "whope::session",
                        session = %self.id,
                        error = %rollback,
                        "Failed to restore previous session key"
                    );
                }
                return Err(e);
            }
        }

        let fingerprint = new_key.fingerprint();
        let keys = self.keys.as_mut().ok_or(WhopeError::Closed)?;
        keys.rotate(new_key, now);
        let epoch = keys.epoch();

        tracing::info!(
            target: "whope::session",
            session = %self.id,
            epoch,
            session_key = %fingerprint,
            "Session key rotated"
        );

        self.auth_failures = 0;
        self.transition(Phase::Active { rotating: true });
        Ok(vec![SessionAction::KeyRotated { epoch, fingerprint }])
    }

    fn handle_chat_message(
        &mut self,
        username: &SealedPayload,
        message: &SealedPayload,
        now: Instant,
    ) -> Result<Vec<SessionAction>> {
        let keys = self.keys.as_ref().ok_or_else(|| self.unexpected("chat_message"))?;

        // Оба поля одного события открываются одним и тем же ключом
        let opened = keys
            .decrypt_at(username, now)
            .and_then(|(username, slot)| {
                keys.decrypt_with(slot, message)
                    .map(|message| (username, message, slot))
            });

        let (username, message, slot) = match opened {
            Ok(opened) => opened,
            Err(e) => return Ok(self.record_failure("chat_message", &e)),
        };

        let key_epoch = match slot {
            KeySlot::Active => keys.epoch(),
            KeySlot::Previous => keys.epoch().saturating_sub(1),
        };

        let entry = ChatEntry {
            username,
            message,
            received_at: current_timestamp(),
            key_epoch,
        };

        tracing::debug!(
            target: "whope::session",
            session = %self.id,
            key_epoch,
            "Chat message received"
        );

        self.auth_failures = 0;
        self.log.push(entry.clone());
        Ok(vec![SessionAction::MessageReceived(entry)])
    }

    /// Отбросить событие, которое не относится к текущей фазе
    fn ignore(&self, kind: &str) -> Vec<SessionAction> {
        tracing::warn!(
            target: "whope::session",
            session = %self.id,
            phase = %self.phase,
            kind,
            "Ignoring server message outside its phase"
        );

        vec![SessionAction::Dropped {
            reason: format!("{}: not expected in phase {}", kind, self.phase),
        }]
    }

    /// Отбросить событие, которое не расшифровалось. Сессия продолжается.
    fn record_failure(&mut self, kind: &str, error: &CryptoError) -> Vec<SessionAction> {
        self.auth_failures += 1;

        tracing::warn!(
            target: "whope::session",
            session = %self.id,
            kind,
            failures = self.auth_failures,
            error = %error,
            "Dropped inbound event"
        );

        let mut actions = vec![SessionAction::Dropped {
            reason: format!("{}: {}", kind, error),
        }];

        if self.auth_failures >= self.max_auth_failures {
            tracing::error!(
                target: "whope::session",
                session = %self.id,
                failures = self.auth_failures,
                "Repeated authentication failures, possible tampering"
            );
            actions.push(SessionAction::TamperingSuspected {
                failures: self.auth_failures,
            });
        }

        actions
    }

    fn expect_phase(&self, allowed: &[Phase], action: &str) -> Result<()> {
        if self.phase == Phase::Closed {
            return Err(WhopeError::Closed);
        }
        if !allowed.contains(&self.phase) {
            return Err(self.unexpected(action));
        }
        Ok(())
    }

    fn unexpected(&self, message: &str) -> WhopeError {
        WhopeError::UnexpectedMessage {
            phase: self.phase.to_string(),
            message: message.to_string(),
        }
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            tracing::debug!(
                target: "whope::session",
                session = %self.id,
                from = %self.phase,
                to = %next,
                "Phase transition"
            );
            self.phase = next;
        }
    }
}

/// Новый ключ в событии ротации: base64 сырого ключа или сами 32 байта
fn parse_rotated_key(raw: &[u8]) -> std::result::Result<SymmetricKey, CryptoError> {
    if raw.len() == KEY_LENGTH {
        return SymmetricKey::from_slice(raw);
    }

    let encoded = std::str::from_utf8(raw).map_err(|_| {
        CryptoError::InvalidKey("rotated key is neither raw bytes nor base64".to_string())
    })?;
    SymmetricKey::from_base64(encoded)
}

impl<S: KeyStorage> fmt::Debug for SessionProtocol<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionProtocol")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("channel", &self.channel)
            .field("messages", &self.log.len())
            .field("auth_failures", &self.auth_failures)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hybrid::unwrap_key;
    use crate::storage::models::{StoredKeyRecord, StoredValue};
    use crate::storage::MemoryStorage;
    use rsa::RsaPrivateKey;

    // Маленькое число итераций, чтобы тесты не тормозили
    fn test_config() -> Config {
        Config {
            pbkdf2_iterations: 10,
            ..Config::default()
        }
    }

    fn server() -> (RsaPrivateKey, String) {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let public = ServerPublicKey::from_rsa(private.to_public_key())
            .to_spki_base64()
            .unwrap();
        (private, public)
    }

    fn session() -> SessionProtocol<MemoryStorage> {
        SessionProtocol::with_config(KeyStore::new(MemoryStorage::new()), &test_config())
    }

    fn sent(actions: &[SessionAction]) -> &ClientMessage {
        match actions {
            [SessionAction::Send(message)] => message,
            other => panic!("expected one Send, got {:?}", other),
        }
    }

    #[test]
    fn test_open_sends_nothing() {
        let mut s = session();
        let actions = s
            .open(Channel::Login, Some(Credential::new("alice", "p@ss1")))
            .unwrap();

        assert!(actions.is_empty());
        assert_eq!(s.phase(), Phase::AwaitingServerKey);
    }

    #[test]
    fn test_open_without_credentials_fails() {
        let mut s = session();
        assert!(matches!(
            s.open(Channel::Login, None),
            Err(WhopeError::Validation(_))
        ));
        assert_eq!(s.phase(), Phase::Unauthenticated);
    }

    #[test]
    fn test_register_sends_worker_flag() {
        let (private, public_key) = server();
        let mut s = session();
        s.open(
            Channel::Register { is_worker: true },
            Some(Credential::new("bob", "hunter2")),
        )
        .unwrap();

        let actions = s.handle(ServerMessage::PublicKey { public_key }).unwrap();
        let ClientMessage::Credentials(data) = sent(&actions) else {
            panic!("expected credentials");
        };

        assert_eq!(data.is_worker.as_deref(), Some("True"));
        let key = unwrap_key(&private, &data.symmetric_key).unwrap();
        assert_eq!(key, derive_with_iterations("hunter2", 10).unwrap());
        assert_eq!(symmetric::decrypt(&key, &data.password).unwrap(), "hunter2");
    }

    #[test]
    fn test_unexpected_message_is_protocol_error() {
        let mut s = session();
        s.open(Channel::Login, Some(Credential::new("alice", "p@ss1")))
            .unwrap();

        let err = s
            .handle(ServerMessage::Tokens {
                tokens: TokenPair { access: "a".into(), refresh: None },
            })
            .unwrap_err();

        assert!(matches!(err, WhopeError::UnexpectedMessage { .. }));
        assert_eq!(s.phase(), Phase::AwaitingServerKey);
    }

    #[test]
    fn test_chat_requires_stored_keys() {
        let mut s = session();
        let err = s.open(Channel::Chat, None).unwrap_err();
        assert!(err.is_cache_miss());
    }

    #[test]
    fn test_send_before_active_fails() {
        let mut s = session();
        assert!(matches!(
            s.send_message("hello"),
            Err(WhopeError::UnexpectedMessage { .. })
        ));
    }

    #[test]
    fn test_closed_session_rejects_everything() {
        let mut s = session();
        s.close();

        assert_eq!(s.phase(), Phase::Closed);
        assert!(matches!(
            s.handle(ServerMessage::PublicKey { public_key: "AAAA".into() }),
            Err(WhopeError::Closed)
        ));
        assert!(matches!(
            s.open(Channel::Login, Some(Credential::new("a", "b"))),
            Err(WhopeError::Closed)
        ));
    }

    /// Бэкенд, который по флагу отказывает в записи значений
    #[derive(Default)]
    struct FailingValues {
        inner: MemoryStorage,
        fail: bool,
    }

    impl KeyStorage for FailingValues {
        fn append_record(&mut self, record: StoredKeyRecord) -> Result<()> {
            self.inner.append_record(record)
        }

        fn latest_record(&self, name: &str) -> Result<Option<StoredKeyRecord>> {
            self.inner.latest_record(name)
        }

        fn save_value(&mut self, value: StoredValue) -> Result<()> {
            if self.fail {
                return Err(WhopeError::Storage("disk full".to_string()));
            }
            self.inner.save_value(value)
        }

        fn load_value(&self, name: &str) -> Result<Option<StoredValue>> {
            self.inner.load_value(name)
        }

        fn clear_all(&mut self) -> Result<()> {
            self.inner.clear_all()
        }
    }

    /// Хранилище после входа alice: ключ сервера, k1, токен, username под k1
    fn seeded_store<S: KeyStorage>(mut store: KeyStore<S>, k1: &SymmetricKey) -> KeyStore<S> {
        let (_, public_key) = server();
        let server_key = ServerPublicKey::from_spki_base64(&public_key).unwrap();
        store.store_public(names::SERVER_PUBLIC_KEY, &server_key).unwrap();
        store.store_symmetric(names::SYMMETRIC_KEY, k1).unwrap();
        store.store_value(names::ACCESS_TOKEN, "token").unwrap();
        let sealed = symmetric::encrypt(k1, "alice").unwrap();
        store
            .store_value(names::ENCRYPTED_USERNAME, sealed.as_str())
            .unwrap();
        store
    }

    #[test]
    fn test_rotation_write_failure_keeps_store_consistent() {
        let k1 = SymmetricKey::generate();
        let store = seeded_store(KeyStore::new(FailingValues::default()), &k1);
        let mut chat = SessionProtocol::with_config(store, &test_config());
        chat.open(Channel::Chat, None).unwrap();

        chat.store_mut().backend_mut().fail = true;
        let k2 = SymmetricKey::generate();
        let rotation = ServerMessage::NewSymmetricKey {
            new_symmetric_key: symmetric::encrypt(&k1, &k2.to_base64()).unwrap(),
        };
        assert!(matches!(
            chat.handle(rotation),
            Err(WhopeError::Storage(_))
        ));

        assert_eq!(chat.keys().unwrap().active(), &k1);
        assert_eq!(
            chat.store().retrieve_symmetric(names::SYMMETRIC_KEY).unwrap(),
            k1
        );

        // Следующий чат открывается на прежнем ключе
        let mut store = chat.into_store();
        store.backend_mut().fail = false;
        let mut reopened = SessionProtocol::with_config(store, &test_config());
        reopened.open(Channel::Chat, None).unwrap();
        assert_eq!(reopened.keys().unwrap().active(), &k1);
    }

    #[test]
    fn test_rsa_floor_comes_from_session_config() {
        let (_, public_key) = server();
        let config = Config {
            min_rsa_bits: 4096,
            ..test_config()
        };
        let mut s = SessionProtocol::with_config(KeyStore::new(MemoryStorage::new()), &config);
        s.open(Channel::Login, Some(Credential::new("alice", "p@ss1")))
            .unwrap();

        let err = s.handle(ServerMessage::PublicKey { public_key }).unwrap_err();
        assert!(matches!(err, WhopeError::Crypto(CryptoError::Wrap(_))));
        assert_eq!(s.phase(), Phase::AwaitingServerKey);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Active { rotating: true }.to_string(), "active(rotating)");
        assert_eq!(Channel::Register { is_worker: false }.endpoint_name(), "register");
    }
}
