// Wire format (JSON текст)
// Каждое сообщение WebSocket - один JSON объект в UTF-8

use crate::protocol::messages::{ClientMessage, ServerMessage};
use crate::utils::error::{Result, WhopeError};
use serde::{de::DeserializeOwned, Serialize};

/// Сериализовать ClientMessage (клиент -> сервер)
pub fn encode_client_message(message: &ClientMessage) -> Result<String> {
    serde_json::to_string(message)
        .map_err(|e| WhopeError::Serialization(format!("JSON encode error: {}", e)))
}

/// Разобрать ServerMessage (сервер -> клиент). Вариант выбирается один раз здесь.
pub fn decode_server_message(text: &str) -> Result<ServerMessage> {
    serde_json::from_str(text)
        .map_err(|e| WhopeError::Serialization(format!("unrecognized server message: {}", e)))
}

/// Сериализовать произвольные данные
pub fn encode_raw<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string(data)
        .map_err(|e| WhopeError::Serialization(format!("JSON encode error: {}", e)))
}

/// Разобрать произвольный тип (тестовые серверы читают ClientMessage этим)
pub fn decode_raw<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| WhopeError::Serialization(format!("JSON decode error: {}", e)))
}
