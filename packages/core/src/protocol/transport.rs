// Транспорт: текстовый full-duplex канал до одной конечной точки сервера
//
// Одна фаза (register / login / chat) - одно соединение. Протокол поверх
// транспорта ничего не знает о WebSocket: тесты гоняют его через
// MemoryTransport.

use crate::utils::error::{Result, WhopeError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Состояние соединения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Канал сообщений до сервера
#[async_trait]
pub trait Transport: Send {
    /// Отправить одно текстовое сообщение
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Дождаться следующего текстового сообщения.
    ///
    /// `Ok(None)` - сервер закрыл канал.
    async fn recv_text(&mut self) -> Result<Option<String>>;

    async fn close(&mut self) -> Result<()>;

    fn state(&self) -> ConnectionState;
}

/// WebSocket транспорт поверх tokio-tungstenite
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    state: ConnectionState,
    url: String,
}

impl WebSocketTransport {
    /// Подключиться к серверу
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| WhopeError::Network(format!("Failed to connect to {}: {}", url, e)))?;

        tracing::debug!(target: "whope::transport", url, "WebSocket connected");

        Ok(Self {
            stream,
            state: ConnectionState::Connected,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(WhopeError::Network("Not connected".to_string()));
        }

        self.stream
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| WhopeError::Network(format!("Failed to send message: {}", e)))
    }

    async fn recv_text(&mut self) -> Result<Option<String>> {
        while let Some(msg_result) = self.stream.next().await {
            match msg_result {
                Ok(WsMessage::Text(text)) => return Ok(Some(text.to_string())),
                Ok(WsMessage::Close(_)) => {
                    tracing::debug!(target: "whope::transport", url = %self.url, "Server sent close frame");
                    break;
                }
                // tungstenite сам отвечает на ping
                Ok(_) => continue,
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    return Err(WhopeError::Network(format!("WebSocket error: {}", e)));
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }
        self.state = ConnectionState::Disconnected;
        self.stream
            .close(None)
            .await
            .map_err(|e| WhopeError::Network(format!("Failed to close: {}", e)))
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

/// Транспорт в памяти: пара связанных концов на tokio mpsc
pub struct MemoryTransport {
    outbound: Option<mpsc::Sender<String>>,
    inbound: mpsc::Receiver<String>,
}

impl MemoryTransport {
    /// Создать два связанных конца: (клиент, сервер)
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(32);
        let (b_tx, b_rx) = mpsc::channel(32);

        (
            Self { outbound: Some(a_tx), inbound: b_rx },
            Self { outbound: Some(b_tx), inbound: a_rx },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let sender = self
            .outbound
            .as_ref()
            .ok_or_else(|| WhopeError::Network("Not connected".to_string()))?;

        sender
            .send(text)
            .await
            .map_err(|_| WhopeError::Network("Peer dropped".to_string()))
    }

    async fn recv_text(&mut self) -> Result<Option<String>> {
        Ok(self.inbound.recv().await)
    }

    async fn close(&mut self) -> Result<()> {
        self.outbound = None;
        self.inbound.close();
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        if self.outbound.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_is_duplex() {
        let (mut client, mut server) = MemoryTransport::pair();

        client.send_text("ping".into()).await.unwrap();
        assert_eq!(server.recv_text().await.unwrap().as_deref(), Some("ping"));

        server.send_text("pong".into()).await.unwrap();
        assert_eq!(client.recv_text().await.unwrap().as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (mut client, mut server) = MemoryTransport::pair();

        client.close().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.send_text("late".into()).await.is_err());
        assert_eq!(server.recv_text().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let result = WebSocketTransport::connect("ws://127.0.0.1:1/ws/login/").await;
        assert!(matches!(result, Err(WhopeError::Network(_))));
    }
}
