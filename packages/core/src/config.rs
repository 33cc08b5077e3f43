//! Централизованная конфигурация для Whope Core
//!
//! Все константы и настройки клиента должны быть определены здесь,
//! чтобы избежать хардкода по всему проекту.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Глобальная конфигурация приложения (синглтон)
static GLOBAL_CONFIG: OnceLock<Config> = OnceLock::new();

/// Основная структура конфигурации
#[derive(Debug, Clone)]
pub struct Config {
    // ============================================
    // КРИПТОГРАФИЧЕСКИЕ ПАРАМЕТРЫ
    // ============================================

    /// PBKDF2: количество итераций для деривации симметричного ключа из пароля.
    ///
    /// Соль детерминирована (сам пароль), поэтому число итераций -
    /// единственная защита от перебора. Смена значения меняет ключи.
    pub pbkdf2_iterations: u32,

    /// Минимальный размер RSA модуля серверного ключа (в битах)
    pub min_rsa_bits: usize,

    // ============================================
    // ПАРАМЕТРЫ СЕССИИ
    // ============================================

    /// Сколько ждать ответа сервера на очередную фазу handshake
    pub handshake_timeout_ms: u64,

    /// Сколько старый ключ остаётся пригодным для расшифровки после ротации
    pub rotation_grace_ms: u64,

    /// После скольких подряд неудачных расшифровок сигнализировать о подмене
    pub max_auth_failures: u32,

    // ============================================
    // ВАЛИДАЦИЯ
    // ============================================

    /// Максимальная длина username
    pub username_max_length: usize,

    /// Максимальная длина пароля
    pub password_max_length: usize,

    /// Максимальная длина одного сообщения чата
    pub message_max_length: usize,

    // ============================================
    // СЕТЕВЫЕ ПАРАМЕТРЫ
    // ============================================

    /// Базовый URL WebSocket сервера (без имени фазы)
    pub server_url: String,

    /// Путь к файлу локального хранилища ключей
    pub keystore_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Криптография
            pbkdf2_iterations: 100_000,
            min_rsa_bits: 2048,

            // Сессия
            handshake_timeout_ms: 30_000,
            rotation_grace_ms: 30_000,
            max_auth_failures: 3,

            // Валидация
            username_max_length: 64,
            password_max_length: 256,
            message_max_length: 4096,

            // Сеть
            server_url: "ws://localhost:8000/ws".to_string(),
            keystore_path: PathBuf::from("whope-keystore.json"),
        }
    }
}

impl Config {
    /// Создать конфигурацию из переменных окружения
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Переопределяем значения из env, если они заданы
        if let Some(parsed) = env_parse("WHOPE_PBKDF2_ITERATIONS") {
            config.pbkdf2_iterations = parsed;
        }

        if let Some(parsed) = env_parse("WHOPE_HANDSHAKE_TIMEOUT_MS") {
            config.handshake_timeout_ms = parsed;
        }

        if let Some(parsed) = env_parse("WHOPE_ROTATION_GRACE_MS") {
            config.rotation_grace_ms = parsed;
        }

        if let Some(parsed) = env_parse("WHOPE_MAX_AUTH_FAILURES") {
            config.max_auth_failures = parsed;
        }

        if let Ok(val) = std::env::var("WHOPE_SERVER_URL") {
            config.server_url = val.trim_end_matches('/').to_string();
        }

        if let Ok(val) = std::env::var("WHOPE_KEYSTORE_PATH") {
            config.keystore_path = PathBuf::from(val);
        }

        config
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn rotation_grace(&self) -> Duration {
        Duration::from_millis(self.rotation_grace_ms)
    }

    /// URL конкретной фазы: `<server_url>/<phase>/`
    pub fn endpoint(&self, phase: &str) -> String {
        format!("{}/{}/", self.server_url.trim_end_matches('/'), phase)
    }

    /// Получить глобальный экземпляр конфигурации
    ///
    /// Автоматически инициализирует конфигурацию со значениями по умолчанию при первом вызове
    pub fn global() -> &'static Config {
        GLOBAL_CONFIG.get_or_init(Config::default)
    }

    /// Инициализировать глобальную конфигурацию из переменных окружения
    ///
    /// # Errors
    ///
    /// Возвращает ошибку, если конфигурация уже была инициализирована
    pub fn init_from_env() -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(Self::from_env())
            .map_err(|_| "Config already initialized")
    }

    /// Инициализировать глобальную конфигурацию с кастомным экземпляром
    ///
    /// # Errors
    ///
    /// Возвращает ошибку, если конфигурация уже была инициализирована
    pub fn init_with(config: Config) -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(config)
            .map_err(|_| "Config already initialized")
    }

    /// Проверить, инициализирована ли глобальная конфигурация
    pub fn is_initialized() -> bool {
        GLOBAL_CONFIG.get().is_some()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|val| val.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pbkdf2_iterations, 100_000);
        assert_eq!(config.min_rsa_bits, 2048);
        assert_eq!(config.max_auth_failures, 3);
    }

    #[test]
    fn test_endpoints() {
        let config = Config::default();
        assert_eq!(config.endpoint("login"), "ws://localhost:8000/ws/login/");
        assert_eq!(config.endpoint("chat"), "ws://localhost:8000/ws/chat/");

        let trailing = Config {
            server_url: "wss://chat.example/ws/".to_string(),
            ..Config::default()
        };
        assert_eq!(trailing.endpoint("register"), "wss://chat.example/ws/register/");
    }

    #[test]
    fn test_timeouts_are_bounded() {
        let config = Config::default();
        assert_eq!(config.handshake_timeout(), Duration::from_secs(30));
        assert_eq!(config.rotation_grace(), Duration::from_secs(30));
    }
}
