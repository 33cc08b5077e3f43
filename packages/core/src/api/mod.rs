// Публичный API клиента
// Высокоуровневые методы: регистрация, вход и чат поверх WebSocket

use crate::config::Config;
use crate::crypto::keys::Credential;
use crate::protocol::driver::{ChatCommand, ChatEvent, SessionDriver};
use crate::protocol::session::{Channel, SessionProtocol};
use crate::protocol::transport::{Transport, WebSocketTransport};
use crate::storage::{FileStorage, KeyStore};
use crate::utils::error::{Result, WhopeError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Ёмкость каналов команд и событий чата
const CHAT_CHANNEL_CAPACITY: usize = 64;

/// Главный API клиента
///
/// Каждая операция открывает отдельное соединение к своей конечной точке
/// (`<server_url>/register/`, `/login/`, `/chat/`) и своё хранилище ключей
/// из `config.keystore_path`.
#[derive(Debug, Clone)]
pub struct WhopeClient {
    config: Config,
}

impl WhopeClient {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Клиент с конфигурацией из переменных окружения
    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Драйвер сессии поверх произвольного транспорта
    pub fn session_driver<T: Transport>(&self, transport: T) -> Result<SessionDriver<T, FileStorage>> {
        let store = KeyStore::new(FileStorage::open(&self.config.keystore_path)?);
        let session = SessionProtocol::with_config(store, &self.config);
        Ok(SessionDriver::with_timeout(
            transport,
            session,
            self.config.handshake_timeout(),
        ))
    }

    async fn connect(&self, channel: Channel) -> Result<WebSocketTransport> {
        WebSocketTransport::connect(&self.config.endpoint(channel.endpoint_name())).await
    }

    /// Зарегистрировать пользователя
    pub async fn register(&self, username: &str, password: &str, is_worker: bool) -> Result<()> {
        let transport = self.connect(Channel::Register { is_worker }).await?;
        self.session_driver(transport)?
            .register(Credential::new(username, password), is_worker)
            .await
    }

    /// Войти: после успеха токены и ключи лежат в хранилище
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let transport = self.connect(Channel::Login).await?;
        self.session_driver(transport)?
            .login(Credential::new(username, password))
            .await
    }

    /// Открыть чат на сохранённых ключах
    pub async fn open_chat(&self) -> Result<ChatHandle> {
        let transport = self.connect(Channel::Chat).await?;
        self.spawn_chat(transport)
    }

    /// Запустить чат в фоновой задаче поверх данного транспорта
    pub fn spawn_chat<T: Transport + 'static>(&self, transport: T) -> Result<ChatHandle> {
        let mut driver = self.session_driver(transport)?;
        let (command_tx, command_rx) = mpsc::channel(CHAT_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHAT_CHANNEL_CAPACITY);

        let task = tokio::spawn(async move { driver.run_chat(None, command_rx, event_tx).await });

        Ok(ChatHandle {
            commands: command_tx,
            events: event_rx,
            task,
        })
    }
}

/// Управление запущенным чатом
pub struct ChatHandle {
    commands: mpsc::Sender<ChatCommand>,
    events: mpsc::Receiver<ChatEvent>,
    task: JoinHandle<Result<()>>,
}

impl ChatHandle {
    /// Отправить сообщение (шифруется активным ключом сессии)
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        self.commands
            .send(ChatCommand::Send(text.into()))
            .await
            .map_err(|_| WhopeError::Closed)
    }

    /// Следующее событие чата; `None` после закрытия
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.events.recv().await
    }

    /// Закрыть чат и дождаться завершения задачи
    pub async fn close(self) -> Result<()> {
        let _ = self.commands.send(ChatCommand::Close).await;
        self.task
            .await
            .map_err(|e| WhopeError::Network(format!("chat task failed: {}", e)))?
    }
}
