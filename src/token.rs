//! Deterministic HMAC bearer tokens.
//!
//! A token is `base64(HMAC-SHA256(secret, email))`. Tokens carry no expiry
//! or nonce, the same email and secret always produce the same token.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::keys::SecretKey;

type HmacSha256 = Hmac<Sha256>;

/// Generates the token for the given email.
///
/// Returns `None` only if the MAC could not be keyed.
pub fn generate(email: &str, secret: &SecretKey) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.expose()).ok()?;
    mac.update(email.as_bytes());
    Some(base64::encode(mac.finalize().into_bytes()))
}

/// Checks a presented token against the one expected for `email`.
///
/// Any crypto failure is treated as a mismatch.
pub fn verify(email: &str, token: &str, secret: &SecretKey) -> bool {
    match generate(email, secret) {
        Some(expected) => constant_time_eq(expected.as_bytes(), token.as_bytes()),
        None => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
