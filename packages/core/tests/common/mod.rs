//! Shared helpers: a scripted server side for the session tests.

#![allow(dead_code)]

use rsa::RsaPrivateKey;
use whope_core::crypto::hybrid::unwrap_key;
use whope_core::crypto::symmetric::{decrypt, encrypt};
use whope_core::protocol::messages::{ChatAction, ClientMessage, CredentialsData, ServerMessage, TokenPair};
use whope_core::storage::MemoryStorage;
use whope_core::{Config, KeyStore, SessionAction, SessionProtocol, ServerPublicKey, SymmetricKey};

/// Low iteration count keeps the tests fast; the contract does not change.
pub const TEST_ITERATIONS: u32 = 10;

pub fn test_config() -> Config {
    Config {
        pbkdf2_iterations: TEST_ITERATIONS,
        ..Config::default()
    }
}

pub fn memory_session() -> SessionProtocol<MemoryStorage> {
    SessionProtocol::with_config(KeyStore::new(MemoryStorage::new()), &test_config())
}

/// The server half of the handshake: holds the RSA private key.
pub struct TestServer {
    pub private: RsaPrivateKey,
    pub public: ServerPublicKey,
}

impl TestServer {
    pub fn new() -> Self {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let public = ServerPublicKey::from_rsa(private.to_public_key());
        Self { private, public }
    }

    pub fn public_key_message(&self) -> ServerMessage {
        ServerMessage::PublicKey {
            public_key: self.public.to_spki_base64().unwrap(),
        }
    }

    pub fn tokens(access: &str) -> ServerMessage {
        ServerMessage::Tokens {
            tokens: TokenPair {
                access: access.to_string(),
                refresh: Some(format!("{}-refresh", access)),
            },
        }
    }

    /// Unwraps the key from login/register credentials and opens the fields.
    pub fn accept_credentials(&self, data: &CredentialsData) -> (SymmetricKey, String, String) {
        let key = unwrap_key(&self.private, &data.symmetric_key).unwrap();
        let username = decrypt(&key, &data.username).unwrap();
        let password = decrypt(&key, &data.password).unwrap();
        (key, username, password)
    }

    pub fn accept_chat_init(&self, message: &ClientMessage) -> (SymmetricKey, String) {
        match message {
            ClientMessage::Chat(ChatAction::InitializeConnection {
                encrypted_symmetric_key,
                encrypted_token,
            }) => (
                unwrap_key(&self.private, encrypted_symmetric_key).unwrap(),
                encrypted_token.clone(),
            ),
            other => panic!("expected initialize_connection, got {:?}", other),
        }
    }

    pub fn chat(key: &SymmetricKey, username: &str, message: &str) -> ServerMessage {
        ServerMessage::Chat {
            username: encrypt(key, username).unwrap(),
            message: encrypt(key, message).unwrap(),
        }
    }

    /// `new_symmetric_key`: base64 of the raw new key, sealed under the current key.
    pub fn rotation(current: &SymmetricKey, next: &SymmetricKey) -> ServerMessage {
        ServerMessage::NewSymmetricKey {
            new_symmetric_key: encrypt(current, &next.to_base64()).unwrap(),
        }
    }
}

pub fn single_send(actions: &[SessionAction]) -> &ClientMessage {
    match actions {
        [SessionAction::Send(message)] => message,
        other => panic!("expected exactly one Send, got {:?}", other),
    }
}

pub fn credentials(message: &ClientMessage) -> &CredentialsData {
    match message {
        ClientMessage::Credentials(data) => data,
        other => panic!("expected credentials, got {:?}", other),
    }
}
