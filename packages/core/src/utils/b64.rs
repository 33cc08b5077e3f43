// Base64 утилиты

use crate::utils::error::{Result, WhopeError};
use base64::{engine::general_purpose, Engine};

pub fn encode(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}

pub fn decode(data: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(data)
        .map_err(|e| WhopeError::Format(format!("Base64 decode failed: {}", e)))
}

pub fn is_valid(data: &str) -> bool {
    general_purpose::STANDARD.decode(data).is_ok()
}
