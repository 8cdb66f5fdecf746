/// Authentication and authorization utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength rules
/// - [`jwt`]: access/refresh JWT issuance and validation
/// - [`api_key`]: tenant API key generation, hashing and scopes
/// - [`tokens`]: random link tokens and numeric one-time codes
/// - [`middleware`]: request authentication and the `AuthContext` extractor
/// - [`authorization`]: platform and tenant role checks
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::auth::password::{hash_password, verify_password};
/// use mockmate_shared::auth::jwt::{issue_token_pair, TokenTtl};
/// use mockmate_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password1")?;
/// assert!(verify_password("user_password1", &hash)?);
///
/// let pair = issue_token_pair(Uuid::new_v4(), UserRole::User, None, "secret-key", &TokenTtl::default())?;
/// # Ok(())
/// # }
/// ```

pub mod api_key;
pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod tokens;
