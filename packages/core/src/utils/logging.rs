// Логирование
//
// Библиотека только пишет события через `tracing`; подписчика ставит
// приложение. `init_logging` для бинарей и ручной отладки.

use tracing_subscriber::EnvFilter;

/// Фильтр по умолчанию, если `RUST_LOG` не задан
pub const DEFAULT_FILTER: &str = "whope_core=info";

/// Установить fmt-подписчик с `EnvFilter`.
///
/// Повторный вызов ничего не делает (подписчик уже установлен).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with_target(true)
        .try_init();
}

/// Короткий отпечаток ключа для логов: первые 8 байт SHA-256 в hex.
///
/// Сам ключевой материал в логи не попадает никогда.
pub fn fingerprint(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..8])
}
