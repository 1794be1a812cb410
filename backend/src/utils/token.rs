//! Opaque random tokens and the hashes used to look them up.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Bytes of entropy in bearer and join tokens.
pub const SHORT_TOKEN_BYTES: usize = 16;
/// Bytes of entropy in password reset tokens.
pub const LONG_TOKEN_BYTES: usize = 32;

/// Generates a URL-safe random token carrying `byte_len` bytes of entropy.
pub fn generate_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex SHA-256 of a token value; the only form that reaches storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
