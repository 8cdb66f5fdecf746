/// Tenant API keys
///
/// Integrations authenticate with `X-Api-Key: mm_...`. The plaintext key is
/// returned once from [`TenantApiKey::create`]; afterwards only the SHA-256
/// digest and a display prefix exist.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tenant_api_keys (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     name VARCHAR(255) NOT NULL,
///     key_prefix VARCHAR(16) NOT NULL,
///     key_hash VARCHAR(64) NOT NULL UNIQUE,
///     scopes TEXT[] NOT NULL DEFAULT ARRAY['sessions:read'],
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_used_at TIMESTAMPTZ,
///     revoked BOOLEAN NOT NULL DEFAULT FALSE,
///     revoked_at TIMESTAMPTZ,
///     expires_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::models::tenant_api_key::{CreateTenantApiKey, TenantApiKey};
/// use mockmate_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let (key, plaintext) = TenantApiKey::create(&pool, CreateTenantApiKey {
///     tenant_id: Uuid::new_v4(),
///     name: "ATS sync".to_string(),
///     scopes: vec!["sessions:read".to_string()],
///     created_by: None,
///     expires_at: None,
/// }).await?;
///
/// let validated = TenantApiKey::validate(&pool, &plaintext).await?;
/// assert_eq!(validated.map(|k| k.id), Some(key.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::api_key::{generate_api_key, has_scope, hash_api_key};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantApiKey {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,

    /// First characters of the key, safe to display
    pub key_prefix: String,

    #[serde(skip_serializing, default)]
    pub key_hash: String,

    pub scopes: Vec<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantApiKey {
    pub tenant_id: Uuid,
    pub name: String,
    pub scopes: Vec<String>,
    pub created_by: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TenantApiKey {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    pub fn is_usable(&self) -> bool {
        !self.revoked && !self.is_expired()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        has_scope(&self.scopes, scope)
    }

    /// Generates and stores a key, returning the row and the plaintext
    pub async fn create(pool: &PgPool, data: CreateTenantApiKey) -> Result<(Self, String), sqlx::Error> {
        let generated = generate_api_key();

        let key = sqlx::query_as::<_, TenantApiKey>(
            r#"
            INSERT INTO tenant_api_keys (tenant_id, name, key_prefix, key_hash, scopes, created_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(data.tenant_id)
        .bind(&data.name)
        .bind(&generated.prefix)
        .bind(&generated.hash)
        .bind(&data.scopes)
        .bind(data.created_by)
        .bind(data.expires_at)
        .fetch_one(pool)
        .await?;

        Ok((key, generated.key))
    }

    /// Looks up a usable key by plaintext and stamps `last_used_at`
    ///
    /// Revoked or expired keys yield `None`.
    pub async fn validate(pool: &PgPool, plaintext: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TenantApiKey>(
            r#"
            UPDATE tenant_api_keys
            SET last_used_at = NOW()
            WHERE key_hash = $1
              AND revoked = FALSE
              AND (expires_at IS NULL OR expires_at > NOW())
            RETURNING *
            "#,
        )
        .bind(hash_api_key(plaintext))
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_tenant(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TenantApiKey>(
            "SELECT * FROM tenant_api_keys WHERE tenant_id = $1 ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_active(pool: &PgPool, tenant_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM tenant_api_keys
            WHERE tenant_id = $1 AND revoked = FALSE
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(tenant_id)
        .fetch_one(pool)
        .await
    }

    /// Revokes a key belonging to `tenant_id`; false if none matched
    pub async fn revoke(pool: &PgPool, id: Uuid, tenant_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_api_keys
            SET revoked = TRUE, revoked_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND revoked = FALSE
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(expires_at: Option<DateTime<Utc>>, revoked: bool) -> TenantApiKey {
        TenantApiKey {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "test".into(),
            key_prefix: "mm_abcdefgh".into(),
            key_hash: "x".repeat(64),
            scopes: vec!["sessions:*".into()],
            created_by: None,
            created_at: Utc::now(),
            last_used_at: None,
            revoked,
            revoked_at: None,
            expires_at,
        }
    }

    #[test]
    fn test_usability() {
        assert!(key(None, false).is_usable());
        assert!(key(Some(Utc::now() + Duration::days(1)), false).is_usable());
        assert!(!key(Some(Utc::now() - Duration::seconds(1)), false).is_usable());
        assert!(!key(None, true).is_usable());
    }

    #[test]
    fn test_scope_and_serialization() {
        let k = key(None, false);
        assert!(k.has_scope("sessions:write"));
        assert!(!k.has_scope("users:read"));
        let json = serde_json::to_value(&k).unwrap();
        assert!(json.get("key_hash").is_none());
    }
}
