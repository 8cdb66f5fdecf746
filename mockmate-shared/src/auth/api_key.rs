/// Tenant API keys
///
/// Keys look like `mm_` followed by 32 base62 characters. Only the SHA-256
/// digest is stored (`tenant_api_keys.key_hash`); the first characters are
/// kept separately as `key_prefix` so admins can tell keys apart.
///
/// Scopes are `resource:action` strings. A scope ending in `:*` grants every
/// action on that resource and `*` grants everything.
///
/// # Example
///
/// ```
/// use mockmate_shared::auth::api_key::{generate_api_key, has_scope, validate_api_key_format};
///
/// let generated = generate_api_key();
/// assert!(generated.key.starts_with("mm_"));
/// assert!(validate_api_key_format(&generated.key));
///
/// let scopes = vec!["sessions:*".to_string()];
/// assert!(has_scope(&scopes, "sessions:read"));
/// assert!(!has_scope(&scopes, "users:read"));
/// ```

use super::tokens::{hash_secret, random_token, verify_secret};

/// API key prefix
pub const KEY_PREFIX: &str = "mm_";

const KEY_RANDOM_LENGTH: usize = 32;

/// Characters of the key kept in clear for display
const DISPLAY_PREFIX_LENGTH: usize = 11;

/// Total length of an API key
pub const API_KEY_LENGTH: usize = KEY_PREFIX.len() + KEY_RANDOM_LENGTH;

/// Scopes every tenant key can be granted
pub const KNOWN_SCOPES: &[&str] = &[
    "sessions:read",
    "sessions:write",
    "users:read",
    "alerts:read",
    "alerts:write",
    "analytics:read",
];

/// A freshly generated key
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    /// Plaintext key, shown to the caller exactly once
    pub key: String,
    /// Display prefix, e.g. `mm_Ab3dE9fG`
    pub prefix: String,
    /// SHA-256 hex digest for storage
    pub hash: String,
}

pub fn generate_api_key() -> GeneratedApiKey {
    let key = format!("{}{}", KEY_PREFIX, random_token(KEY_RANDOM_LENGTH));

    GeneratedApiKey {
        prefix: key[..DISPLAY_PREFIX_LENGTH].to_string(),
        hash: hash_secret(&key),
        key,
    }
}

pub fn hash_api_key(key: &str) -> String {
    hash_secret(key)
}

/// Checks prefix, length and alphabet without touching the database
pub fn validate_api_key_format(key: &str) -> bool {
    key.len() == API_KEY_LENGTH
        && key
            .strip_prefix(KEY_PREFIX)
            .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

pub fn verify_api_key(key: &str, stored_hash: &str) -> bool {
    verify_secret(key, stored_hash)
}

/// Splits a comma-separated scope list
pub fn parse_scopes(scopes: &str) -> Vec<String> {
    scopes
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rejects scopes that are neither known nor a wildcard over a known resource
pub fn validate_scopes(scopes: &[String]) -> Result<(), String> {
    for scope in scopes {
        if scope == "*" || KNOWN_SCOPES.contains(&scope.as_str()) {
            continue;
        }

        let resource_wildcard = scope
            .strip_suffix(":*")
            .is_some_and(|resource| KNOWN_SCOPES.iter().any(|k| k.starts_with(&format!("{}:", resource))));

        if !resource_wildcard {
            return Err(format!("Unknown scope: {}", scope));
        }
    }

    Ok(())
}

/// Whether `scopes` grants `required`, honouring `resource:*` and `*`
pub fn has_scope(scopes: &[String], required: &str) -> bool {
    scopes.iter().any(|scope| {
        scope == "*"
            || scope == required
            || scope
                .strip_suffix('*')
                .is_some_and(|prefix| prefix.ends_with(':') && required.starts_with(prefix))
    })
}
