// Валидация входящих и исходящих данных

use crate::config::Config;
use crate::crypto::symmetric::{SealedPayload, NONCE_LENGTH, TAG_LENGTH};
use crate::protocol::messages::{ChatAction, ClientMessage, ServerMessage};
use crate::utils::b64;
use crate::utils::error::{Result, WhopeError};

/// Валидация Base64 строки
pub fn validate_base64(encoded: &str) -> Result<()> {
    if !b64::is_valid(encoded) {
        return Err(WhopeError::Validation("Invalid Base64 string".to_string()));
    }
    Ok(())
}

/// Валидация имени пользователя
pub fn validate_username(username: &str) -> Result<()> {
    let cfg = Config::global();
    if username.trim().is_empty() {
        return Err(WhopeError::Validation(
            "Username cannot be empty".to_string(),
        ));
    }

    if username.chars().count() > cfg.username_max_length {
        return Err(WhopeError::Validation(format!(
            "Username must be at most {} characters",
            cfg.username_max_length
        )));
    }

    if username.chars().any(char::is_control) {
        return Err(WhopeError::Validation(
            "Username cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// Валидация пароля
pub fn validate_password(password: &str) -> Result<()> {
    let cfg = Config::global();
    if password.is_empty() {
        return Err(WhopeError::Validation(
            "Password cannot be empty".to_string(),
        ));
    }

    if password.chars().count() > cfg.password_max_length {
        return Err(WhopeError::Validation(format!(
            "Password must be at most {} characters",
            cfg.password_max_length
        )));
    }

    Ok(())
}

/// Валидация текста исходящего сообщения
pub fn validate_message_text(text: &str) -> Result<()> {
    let max = Config::global().message_max_length;
    if text.trim().is_empty() {
        return Err(WhopeError::Validation(
            "Message cannot be empty".to_string(),
        ));
    }

    if text.chars().count() > max {
        return Err(WhopeError::Validation(format!(
            "Message must be at most {} characters",
            max
        )));
    }

    Ok(())
}

/// Проверка формы sealed payload до расшифровки: base64 и минимальная длина
pub fn validate_sealed_payload(payload: &SealedPayload) -> Result<()> {
    let bytes = b64::decode(payload.as_str())?;
    if bytes.len() < NONCE_LENGTH + TAG_LENGTH {
        return Err(WhopeError::Validation(format!(
            "Sealed payload too short: {} bytes",
            bytes.len()
        )));
    }
    Ok(())
}

/// Валидация ServerMessage (сервер → клиент)
pub fn validate_server_message(msg: &ServerMessage) -> Result<()> {
    match msg {
        ServerMessage::PublicKey { public_key } => {
            if public_key.is_empty() {
                return Err(WhopeError::Validation(
                    "Server public key is empty".to_string(),
                ));
            }
            validate_base64(public_key)?;
        }
        ServerMessage::Tokens { tokens } => {
            if tokens.access.is_empty() {
                return Err(WhopeError::Validation(
                    "Access token is required".to_string(),
                ));
            }
        }
        // Chat и NewSymmetricKey проверяются при расшифровке:
        // испорченный payload - это ошибка аутентификации, а не формата
        ServerMessage::NewSymmetricKey { .. } | ServerMessage::Chat { .. } => {}
    }

    Ok(())
}

/// Валидация ClientMessage (клиент → сервер)
pub fn validate_client_message(msg: &ClientMessage) -> Result<()> {
    match msg {
        ClientMessage::Credentials(data) => {
            validate_sealed_payload(&data.username)?;
            validate_sealed_payload(&data.password)?;
            validate_base64(data.symmetric_key.as_str())?;
            if let Some(flag) = &data.is_worker {
                if flag != "True" && flag != "False" {
                    return Err(WhopeError::Validation(format!(
                        "is_worker must be \"True\" or \"False\", got {:?}",
                        flag
                    )));
                }
            }
        }
        ClientMessage::Chat(ChatAction::InitializeConnection {
            encrypted_symmetric_key,
            encrypted_token,
        }) => {
            validate_base64(encrypted_symmetric_key.as_str())?;
            if encrypted_token.is_empty() {
                return Err(WhopeError::Validation(
                    "Access token is required".to_string(),
                ));
            }
        }
        ClientMessage::Chat(ChatAction::SendMessage { username, message }) => {
            validate_sealed_payload(username)?;
            validate_sealed_payload(message)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hybrid::WrappedKey;
    use crate::protocol::messages::{CredentialsData, TokenPair};

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("Алиса").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username(&"a".repeat(65)).is_err());
        assert!(validate_username("al\nice").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("p@ss1").is_ok());
        assert!(validate_password("").is_err());
        assert!(validate_password(&"x".repeat(257)).is_err());
    }

    #[test]
    fn test_validate_message_text() {
        assert!(validate_message_text("hello").is_ok());
        assert!(validate_message_text(" ").is_err());
        assert!(validate_message_text(&"m".repeat(4097)).is_err());
    }

    #[test]
    fn test_validate_sealed_payload() {
        let ok = SealedPayload::new(b64::encode(&[7u8; 40]));
        assert!(validate_sealed_payload(&ok).is_ok());

        let short = SealedPayload::new(b64::encode(&[7u8; 20]));
        assert!(validate_sealed_payload(&short).is_err());

        assert!(validate_sealed_payload(&SealedPayload::new("***")).is_err());
    }

    #[test]
    fn test_validate_server_message() {
        let empty_key = ServerMessage::PublicKey { public_key: String::new() };
        assert!(validate_server_message(&empty_key).is_err());

        let tokens = ServerMessage::Tokens {
            tokens: TokenPair { access: "a".into(), refresh: None },
        };
        assert!(validate_server_message(&tokens).is_ok());
    }

    #[test]
    fn test_validate_worker_flag() {
        let sealed = SealedPayload::new(b64::encode(&[1u8; 40]));
        let mut data = CredentialsData {
            username: sealed.clone(),
            password: sealed,
            symmetric_key: WrappedKey::new(b64::encode(&[2u8; 256])),
            is_worker: Some("True".into()),
        };
        assert!(validate_client_message(&ClientMessage::Credentials(data.clone())).is_ok());

        data.is_worker = Some("yes".into());
        assert!(validate_client_message(&ClientMessage::Credentials(data)).is_err());
    }
}
