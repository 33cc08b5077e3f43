// Асинхронный драйвер сессии
//
// Владеет транспортом и автоматом, обрабатывает по одному событию за раз:
// входящее сообщение, команду приложения или тик таймера. Handshake не
// конвейеризуется: следующее сообщение уходит только в ответ на предыдущее.

use crate::config::Config;
use crate::crypto::keys::Credential;
use crate::protocol::session::{Channel, Phase, SessionAction, SessionProtocol};
use crate::protocol::transport::Transport;
use crate::protocol::wire::encode_client_message;
use crate::state::messages::ChatEntry;
use crate::storage::KeyStorage;
use crate::utils::error::{Result, WhopeError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Как часто драйвер проверяет окно grace
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Команды приложения во время чата
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Send(String),
    Close,
}

/// События чата для приложения
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Message(ChatEntry),
    KeyRotated { epoch: u32, fingerprint: String },
    Dropped { reason: String },
    TamperingSuspected { failures: u32 },
    Closed,
}

pub struct SessionDriver<T: Transport, S: KeyStorage> {
    transport: T,
    session: SessionProtocol<S>,
    handshake_timeout: Duration,
}

impl<T: Transport, S: KeyStorage> SessionDriver<T, S> {
    pub fn new(transport: T, session: SessionProtocol<S>) -> Self {
        Self::with_timeout(transport, session, Config::global().handshake_timeout())
    }

    pub fn with_timeout(transport: T, session: SessionProtocol<S>, handshake_timeout: Duration) -> Self {
        Self {
            transport,
            session,
            handshake_timeout,
        }
    }

    pub fn session(&self) -> &SessionProtocol<S> {
        &self.session
    }

    pub fn into_session(self) -> SessionProtocol<S> {
        self.session
    }

    /// Регистрация: ждёт ключ сервера, отправляет учётные данные, ждёт токены
    pub async fn register(&mut self, credential: Credential, is_worker: bool) -> Result<()> {
        self.authenticate(Channel::Register { is_worker }, credential).await
    }

    pub async fn login(&mut self, credential: Credential) -> Result<()> {
        self.authenticate(Channel::Login, credential).await
    }

    async fn authenticate(&mut self, channel: Channel, credential: Credential) -> Result<()> {
        let actions = self.session.open(channel, Some(credential))?;
        self.dispatch(actions, None).await?;

        while self.session.phase() != Phase::Authenticated {
            let text = self.recv_handshake().await?;
            let actions = self.session.handle_text(&text, Instant::now())?;
            self.dispatch(actions, None).await?;
        }

        tracing::info!(
            target: "whope::driver",
            session = %self.session.id(),
            channel = channel.endpoint_name(),
            "Authenticated"
        );

        self.transport.close().await
    }

    async fn recv_handshake(&mut self) -> Result<String> {
        let phase = self.session.phase();
        match tokio::time::timeout(self.handshake_timeout, self.transport.recv_text()).await {
            Ok(Ok(Some(text))) => Ok(text),
            Ok(Ok(None)) => Err(WhopeError::Network(format!(
                "server closed the channel in phase {}",
                phase
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(WhopeError::Timeout(format!(
                "no server response within {:?} in phase {}",
                self.handshake_timeout, phase
            ))),
        }
    }

    /// Открыть чат и обрабатывать его до закрытия.
    ///
    /// Завершается, когда сервер закрыл канал, приложение прислало
    /// `ChatCommand::Close` или закрыло свой конец `commands`.
    pub async fn run_chat(
        &mut self,
        credential: Option<Credential>,
        mut commands: mpsc::Receiver<ChatCommand>,
        events: mpsc::Sender<ChatEvent>,
    ) -> Result<()> {
        let actions = self.session.open(Channel::Chat, credential)?;
        self.dispatch(actions, Some(&events)).await?;

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        let result = loop {
            tokio::select! {
                inbound = self.transport.recv_text() => {
                    let text = match inbound {
                        Ok(Some(text)) => text,
                        Ok(None) => break Ok(()),
                        Err(e) => break Err(e),
                    };

                    match self.session.handle_text(&text, Instant::now()) {
                        Ok(actions) => {
                            if let Err(e) = self.dispatch(actions, Some(&events)).await {
                                break Err(e);
                            }
                        }
                        Err(WhopeError::Serialization(reason)) => {
                            tracing::warn!(target: "whope::driver", %reason, "Ignoring unrecognized server message");
                            let _ = events.send(ChatEvent::Dropped { reason }).await;
                        }
                        Err(e) => break Err(e),
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(ChatCommand::Send(text)) => {
                            let sent = match self.session.send_message(&text) {
                                Ok(actions) => self.dispatch(actions, Some(&events)).await,
                                Err(e) => Err(e),
                            };
                            if let Err(e) = sent {
                                // Невалидный текст не закрывает чат
                                if !matches!(e, WhopeError::Validation(_)) {
                                    break Err(e);
                                }
                                tracing::warn!(target: "whope::driver", error = %e, "Message not sent");
                            }
                        }
                        Some(ChatCommand::Close) | None => break Ok(()),
                    }
                }
                _ = ticker.tick() => {
                    let actions = self.session.tick(Instant::now());
                    if let Err(e) = self.dispatch(actions, Some(&events)).await {
                        break Err(e);
                    }
                }
            }
        };

        self.session.close();
        let _ = self.transport.close().await;
        let _ = events.send(ChatEvent::Closed).await;

        tracing::info!(
            target: "whope::driver",
            session = %self.session.id(),
            messages = self.session.messages().len(),
            ok = result.is_ok(),
            "Chat closed"
        );

        result
    }

    async fn dispatch(
        &mut self,
        actions: Vec<SessionAction>,
        events: Option<&mpsc::Sender<ChatEvent>>,
    ) -> Result<()> {
        for action in actions {
            let event = match action {
                SessionAction::Send(message) => {
                    tracing::debug!(target: "whope::driver", kind = message.kind(), "Sending");
                    let text = encode_client_message(&message)?;
                    self.transport.send_text(text).await?;
                    continue;
                }
                SessionAction::Authenticated => continue,
                SessionAction::MessageReceived(entry) => ChatEvent::Message(entry),
                SessionAction::KeyRotated { epoch, fingerprint } => {
                    ChatEvent::KeyRotated { epoch, fingerprint }
                }
                SessionAction::Dropped { reason } => ChatEvent::Dropped { reason },
                SessionAction::TamperingSuspected { failures } => {
                    ChatEvent::TamperingSuspected { failures }
                }
            };

            if let Some(events) = events {
                // Приложение перестало слушать - это не ошибка протокола
                let _ = events.send(event).await;
            }
        }
        Ok(())
    }
}
