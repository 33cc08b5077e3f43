// Лог сообщений живой сессии
// Только в памяти: история между сессиями не хранится

use serde::Serialize;

/// Одно расшифрованное входящее сообщение
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    pub username: String,
    pub message: String,
    /// Unix timestamp (секунды) момента расшифровки
    pub received_at: i64,
    /// Номер ключа, которым сообщение было расшифровано
    pub key_epoch: u32,
}

/// Упорядоченный лог в порядке получения
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<ChatEntry>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить сообщение в конец
    pub fn push(&mut self, entry: ChatEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Получить последнее сообщение
    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Очистить все сообщения
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str, received_at: i64) -> ChatEntry {
        ChatEntry {
            username: "alice".to_string(),
            message: message.to_string(),
            received_at,
            key_epoch: 0,
        }
    }

    #[test]
    fn test_log_keeps_arrival_order() {
        let mut log = MessageLog::new();
        // Порядок получения, а не времени
        log.push(entry("second", 20));
        log.push(entry("first", 10));

        let messages: Vec<_> = log.entries().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);
        assert_eq!(log.last().map(|e| e.received_at), Some(10));
    }

    #[test]
    fn test_clear() {
        let mut log = MessageLog::new();
        log.push(entry("hi", 1));
        log.clear();
        assert!(log.is_empty());
    }
}
