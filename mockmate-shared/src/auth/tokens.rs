/// Random secrets and their at-rest digests
///
/// One-time codes, email-verification links, password-reset links and
/// tenant API keys all follow the same pattern: generate a random secret,
/// hand the plaintext to the user once, store only its SHA-256 hex digest
/// and compare digests in constant time.

use rand::Rng;
use sha2::{Digest, Sha256};

const BASE62: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of email-verification and password-reset tokens
pub const LINK_TOKEN_LENGTH: usize = 32;

/// Generates a random base62 string of `length` characters
pub fn random_token(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| BASE62[rng.gen_range(0..BASE62.len())] as char)
        .collect()
}

/// Generates a numeric one-time code with exactly `digits` digits
///
/// Leading zeros are allowed, so every code of the given width is equally likely.
pub fn numeric_code(digits: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..digits.max(1))
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// SHA-256 hex digest of a secret
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Checks a plaintext secret against a stored digest in constant time
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    constant_time_compare(&hash_secret(secret), stored_hash)
}

/// Compares two strings without short-circuiting on the first differing byte
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_token_shape() {
        let token = random_token(LINK_TOKEN_LENGTH);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, random_token(LINK_TOKEN_LENGTH));
    }

    #[test]
    fn test_numeric_code_shape() {
        for digits in [4, 6, 8] {
            let code = numeric_code(digits);
            assert_eq!(code.len(), digits);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
        assert_eq!(numeric_code(0).len(), 1);
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_secret("123456");
        assert_eq!(hash.len(), 64);
        assert!(verify_secret("123456", &hash));
        assert!(!verify_secret("123457", &hash));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
