/// Password hashing for MockMate accounts
///
/// Account passwords are stored as Argon2id PHC strings. The parameters are
/// embedded in every hash, so raising the cost later only affects new hashes;
/// [`needs_rehash`] reports hashes produced with weaker settings so the login
/// flow can upgrade them transparently.
///
/// # Example
///
/// ```
/// use mockmate_shared::auth::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Interview-ready-42")?;
/// assert!(verify_password("Interview-ready-42", &hash)?);
/// assert!(!verify_password("interview-ready-42", &hash)?);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, ParamsBuilder, Version,
};
use std::sync::OnceLock;

/// Memory cost in KiB (64 MiB)
const MEMORY_COST_KIB: u32 = 65_536;

/// Number of passes
const TIME_COST: u32 = 3;

/// Degree of parallelism
const PARALLELISM: u32 = 4;

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum accepted password length
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Failed to hash password
    #[error("Failed to hash password: {0}")]
    HashError(String),

    /// Failed to verify password
    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    /// Stored hash could not be parsed
    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

fn params() -> Result<Params, PasswordError> {
    ParamsBuilder::new()
        .m_cost(MEMORY_COST_KIB)
        .t_cost(TIME_COST)
        .p_cost(PARALLELISM)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))
}

/// Hashes a password with Argon2id and a fresh random salt
///
/// # Errors
///
/// Returns `PasswordError::HashError` if the hasher rejects the input.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params()?);

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))
}

/// Verifies a password against a stored PHC hash
///
/// Returns `Ok(false)` on mismatch; errors are reserved for malformed hashes.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| PasswordError::InvalidHash(format!("Failed to parse hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(format!("Verification failed: {}", e))),
    }
}

/// Hash of a password no account has, built once with the current parameters
fn absent_account_hash() -> Option<&'static str> {
    static HASH: OnceLock<Option<String>> = OnceLock::new();
    HASH.get_or_init(|| hash_password("absent-account-placeholder").ok())
        .as_deref()
}

/// Runs a full verification against a placeholder hash and always fails
///
/// Login calls this for unknown emails so they cost as much as a wrong
/// password for a real account.
pub fn verify_absent_account(password: &str) -> bool {
    if let Some(hash) = absent_account_hash() {
        let _ = verify_password(password, hash);
    }
    false
}

/// Reports whether a stored hash was produced with weaker parameters than
/// the current policy (or a different algorithm)
pub fn needs_rehash(hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return true;
    };

    if parsed.algorithm.as_str() != "argon2id" {
        return true;
    }

    let Ok(stored) = Params::try_from(&parsed) else {
        return true;
    };

    stored.m_cost() < MEMORY_COST_KIB || stored.t_cost() < TIME_COST || stored.p_cost() < PARALLELISM
}

/// Validates a candidate password against the account password policy
///
/// The policy requires 8 to 128 characters with at least one letter and one
/// digit. The returned message is safe to show to end users.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at most {} characters long",
            MAX_PASSWORD_LENGTH
        ));
    }

    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain at least one letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_account_never_verifies() {
        let hash = absent_account_hash().unwrap();
        assert!(!needs_rehash(hash));
        assert!(!verify_absent_account("absent-account-placeholder"));
        assert!(!verify_absent_account("anything else"));
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse 1").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse 1", &hash).unwrap());
        assert!(!verify_password("correct horse 2", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same-password-1").unwrap();
        let b = hash_password("same-password-1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-hash"),
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_needs_rehash() {
        let current = hash_password("policy-check-9").unwrap();
        assert!(!needs_rehash(&current));

        let weak_params = ParamsBuilder::new().m_cost(8).t_cost(1).p_cost(1).build().unwrap();
        let weak = Argon2::new(Algorithm::Argon2id, Version::V0x13, weak_params)
            .hash_password(b"policy-check-9", &SaltString::generate(&mut OsRng))
            .unwrap()
            .to_string();
        assert!(needs_rehash(&weak));
        assert!(needs_rehash("garbage"));
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password_strength("abc12345").is_ok());
        assert!(validate_password_strength("short1").is_err());
        assert!(validate_password_strength("onlyletters").is_err());
        assert!(validate_password_strength("1234567890").is_err());
        assert!(validate_password_strength(&"a1".repeat(70)).is_err());
    }
}
