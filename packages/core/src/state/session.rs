// Ключи активной сессии
//
// Явный объект вместо глобального ключа: протокол передаёт его во все
// операции шифрования. После ротации активен `rotated`, а `primary`
// годится только для расшифровки в течение окна grace.

use crate::crypto::keys::SymmetricKey;
use crate::crypto::symmetric::{self, SealedPayload};
use crate::error::CryptoError;
use std::time::{Duration, Instant};

/// Каким ключом удалось расшифровать
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot {
    /// Ключ, действующий сейчас
    Active,
    /// Ключ до последней ротации (внутри окна grace)
    Previous,
}

#[derive(Debug)]
pub struct SessionState {
    primary: SymmetricKey,
    rotated: Option<SymmetricKey>,
    rotated_at: Option<Instant>,
    grace: Duration,
    epoch: u32,
}

impl SessionState {
    pub fn new(key: SymmetricKey, grace: Duration) -> Self {
        Self {
            primary: key,
            rotated: None,
            rotated_at: None,
            grace,
            epoch: 0,
        }
    }

    /// Ключ для всех исходящих сообщений
    pub fn active(&self) -> &SymmetricKey {
        self.rotated.as_ref().unwrap_or(&self.primary)
    }

    /// Номер ключа: 0 до первой ротации, +1 на каждую ротацию
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn is_rotated(&self) -> bool {
        self.rotated.is_some()
    }

    /// Окно grace ещё открыто
    pub fn in_grace(&self, now: Instant) -> bool {
        match self.rotated_at {
            Some(at) => now.saturating_duration_since(at) <= self.grace,
            None => false,
        }
    }

    /// Установить новый активный ключ.
    ///
    /// Текущий активный ключ становится предыдущим; ключ до него
    /// (если ротаций было несколько) отбрасывается и обнуляется.
    pub fn rotate(&mut self, new_key: SymmetricKey, now: Instant) {
        if let Some(current) = self.rotated.take() {
            self.primary = current;
        }
        self.rotated = Some(new_key);
        self.rotated_at = Some(now);
        self.epoch += 1;
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<SealedPayload, CryptoError> {
        symmetric::encrypt(self.active(), plaintext)
    }

    /// Расшифровать входящий payload.
    ///
    /// Сначала активным ключом. Предыдущий ключ пробуется только при ошибке
    /// аутентификации и только пока открыто окно grace. Если не подошёл ни
    /// один, возвращается ошибка активного ключа.
    pub fn decrypt_at(
        &self,
        payload: &SealedPayload,
        now: Instant,
    ) -> Result<(String, KeySlot), CryptoError> {
        match symmetric::decrypt(self.active(), payload) {
            Ok(plaintext) => Ok((plaintext, KeySlot::Active)),
            Err(err) if err.is_authentication() && self.is_rotated() && self.in_grace(now) => {
                symmetric::decrypt(&self.primary, payload)
                    .map(|plaintext| (plaintext, KeySlot::Previous))
                    .map_err(|_| err)
            }
            Err(err) => Err(err),
        }
    }

    /// Расшифровать payload конкретным слотом.
    ///
    /// Второе поле события открывается тем же слотом, что и первое.
    pub fn decrypt_with(
        &self,
        slot: KeySlot,
        payload: &SealedPayload,
    ) -> Result<String, CryptoError> {
        match slot {
            KeySlot::Active => symmetric::decrypt(self.active(), payload),
            KeySlot::Previous => symmetric::decrypt(&self.primary, payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(30);

    #[test]
    fn test_active_key_before_rotation() {
        let k1 = SymmetricKey::generate();
        let state = SessionState::new(k1.clone(), GRACE);

        assert_eq!(state.active(), &k1);
        assert_eq!(state.epoch(), 0);
        assert!(!state.in_grace(Instant::now()));
    }

    #[test]
    fn test_rotation_switches_outbound_key() {
        let k1 = SymmetricKey::generate();
        let k2 = SymmetricKey::generate();
        let mut state = SessionState::new(k1.clone(), GRACE);

        state.rotate(k2.clone(), Instant::now());
        let sealed = state.encrypt("after rotation").unwrap();

        assert!(symmetric::decrypt(&k1, &sealed).is_err());
        assert_eq!(symmetric::decrypt(&k2, &sealed).unwrap(), "after rotation");
        assert_eq!(state.epoch(), 1);
    }

    #[test]
    fn test_previous_key_only_within_grace() {
        let k1 = SymmetricKey::generate();
        let k2 = SymmetricKey::generate();
        let mut state = SessionState::new(k1.clone(), GRACE);

        let in_flight = symmetric::encrypt(&k1, "in flight").unwrap();
        let rotated_at = Instant::now();
        state.rotate(k2, rotated_at);

        let (text, slot) = state.decrypt_at(&in_flight, rotated_at + Duration::from_secs(5)).unwrap();
        assert_eq!(text, "in flight");
        assert_eq!(slot, KeySlot::Previous);

        let late = state.decrypt_at(&in_flight, rotated_at + GRACE + Duration::from_millis(1));
        assert!(matches!(late, Err(CryptoError::Authentication(_))));
    }

    #[test]
    fn test_neither_key_fails() {
        let mut state = SessionState::new(SymmetricKey::generate(), GRACE);
        let now = Instant::now();
        state.rotate(SymmetricKey::generate(), now);

        let foreign = symmetric::encrypt(&SymmetricKey::generate(), "x").unwrap();
        assert!(matches!(
            state.decrypt_at(&foreign, now),
            Err(CryptoError::Authentication(_))
        ));
    }

    #[test]
    fn test_chained_rotation_keeps_only_last_previous() {
        let k1 = SymmetricKey::generate();
        let k2 = SymmetricKey::generate();
        let k3 = SymmetricKey::generate();
        let mut state = SessionState::new(k1.clone(), GRACE);
        let now = Instant::now();

        state.rotate(k2.clone(), now);
        state.rotate(k3.clone(), now);

        assert_eq!(state.active(), &k3);
        assert_eq!(state.epoch(), 2);

        let under_k2 = symmetric::encrypt(&k2, "two").unwrap();
        let under_k1 = symmetric::encrypt(&k1, "one").unwrap();
        assert_eq!(state.decrypt_at(&under_k2, now).unwrap().1, KeySlot::Previous);
        assert!(state.decrypt_at(&under_k1, now).is_err());
    }
}
