// Деривация симметричного ключа из пароля
// PBKDF2-HMAC-SHA256, соль = сам пароль

use crate::config::Config;
use crate::crypto::keys::{SymmetricKey, KEY_LENGTH};
use crate::error::CryptoError;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Деривировать симметричный ключ сессии из пароля
///
/// Детерминированно: один и тот же пароль даёт один и тот же ключ в любой
/// сессии, поэтому соль не нужно передавать по сети. Цена - соль не
/// секретна и одинакова для всех, кто выбрал этот пароль.
///
/// # Arguments
/// * `password` - Пользовательский пароль
///
/// # Returns
/// 256-битный ключ для AES-256-GCM
pub fn derive_symmetric_key(password: &str) -> Result<SymmetricKey, CryptoError> {
    derive_with_iterations(password, Config::global().pbkdf2_iterations)
}

/// То же, что [`derive_symmetric_key`], но с явным числом итераций
pub fn derive_with_iterations(password: &str, iterations: u32) -> Result<SymmetricKey, CryptoError> {
    if password.is_empty() {
        return Err(CryptoError::Derivation(
            "Password cannot be empty".to_string(),
        ));
    }

    if iterations == 0 {
        return Err(CryptoError::Derivation(
            "PBKDF2 iteration count must be positive".to_string(),
        ));
    }

    let salt = password.as_bytes();
    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);

    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut *key);

    Ok(SymmetricKey::from_bytes(*key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let key1 = derive_symmetric_key("test_password_123").unwrap();
        let key2 = derive_symmetric_key("test_password_123").unwrap();

        // Одинаковый пароль должен давать одинаковый ключ
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_derive_different_passwords() {
        let key1 = derive_symmetric_key("password_one").unwrap();
        let key2 = derive_symmetric_key("password_two").unwrap();

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_iterations_change_the_key() {
        let weak = derive_with_iterations("p@ss1", 100).unwrap();
        let strong = derive_with_iterations("p@ss1", 1_000).unwrap();

        assert_ne!(weak, strong);
    }

    #[test]
    fn test_salt_is_the_password() {
        let mut expected = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(b"p@ss1", b"p@ss1", 10, &mut expected);

        let key = derive_with_iterations("p@ss1", 10).unwrap();
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(matches!(
            derive_symmetric_key(""),
            Err(CryptoError::Derivation(_))
        ));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(matches!(
            derive_with_iterations("p@ss1", 0),
            Err(CryptoError::Derivation(_))
        ));
    }
}
