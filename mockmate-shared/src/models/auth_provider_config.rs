/// Login provider configuration
///
/// A row enables or disables one login method, either globally
/// (`tenant_id IS NULL`) or for a single tenant. Tenant rows override global
/// rows for the same provider. OAuth client secrets are stored here but never
/// serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    EmailPassword,
    Otp,
    Google,
    Github,
    Microsoft,
}

impl AuthProvider {
    pub const ALL: [AuthProvider; 5] = [
        AuthProvider::EmailPassword,
        AuthProvider::Otp,
        AuthProvider::Google,
        AuthProvider::Github,
        AuthProvider::Microsoft,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::EmailPassword => "email_password",
            AuthProvider::Otp => "otp",
            AuthProvider::Google => "google",
            AuthProvider::Github => "github",
            AuthProvider::Microsoft => "microsoft",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    /// Whether the provider needs an OAuth client id/secret
    pub fn is_oauth(&self) -> bool {
        matches!(self, AuthProvider::Google | AuthProvider::Github | AuthProvider::Microsoft)
    }

    /// Providers available when nothing is configured
    pub fn enabled_by_default(&self) -> bool {
        matches!(self, AuthProvider::EmailPassword | AuthProvider::Otp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthProviderConfig {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub provider: String,
    pub enabled: bool,
    pub client_id: Option<String>,

    #[serde(skip_serializing, default)]
    pub client_secret: Option<String>,

    pub config: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertAuthProvider {
    pub enabled: bool,
    pub client_id: Option<String>,

    /// `None` keeps the stored secret
    pub client_secret: Option<String>,
    pub config: Option<JsonValue>,
}

/// A provider as offered on the login screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicProvider {
    pub provider: String,
    pub client_id: Option<String>,
}

impl AuthProviderConfig {
    pub fn has_client_secret(&self) -> bool {
        self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Creates or updates the row for `(tenant_id, provider)`
    pub async fn upsert(
        pool: &PgPool,
        tenant_id: Option<Uuid>,
        provider: AuthProvider,
        data: UpsertAuthProvider,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM auth_provider_configs
            WHERE provider = $1 AND tenant_id IS NOT DISTINCT FROM $2
            FOR UPDATE
            "#,
        )
        .bind(provider.as_str())
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match existing {
            Some(id) => {
                sqlx::query_as::<_, AuthProviderConfig>(
                    r#"
                    UPDATE auth_provider_configs
                    SET enabled = $2,
                        client_id = $3,
                        client_secret = COALESCE($4, client_secret),
                        config = COALESCE($5, config),
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(data.enabled)
                .bind(&data.client_id)
                .bind(&data.client_secret)
                .bind(&data.config)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, AuthProviderConfig>(
                    r#"
                    INSERT INTO auth_provider_configs (tenant_id, provider, enabled, client_id, client_secret, config)
                    VALUES ($1, $2, $3, $4, $5, COALESCE($6, '{}'::JSONB))
                    RETURNING *
                    "#,
                )
                .bind(tenant_id)
                .bind(provider.as_str())
                .bind(data.enabled)
                .bind(&data.client_id)
                .bind(&data.client_secret)
                .bind(&data.config)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;
        Ok(row)
    }

    /// Rows configured at exactly this scope (global when `tenant_id` is `None`)
    pub async fn list(pool: &PgPool, tenant_id: Option<Uuid>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuthProviderConfig>(
            "SELECT * FROM auth_provider_configs WHERE tenant_id IS NOT DISTINCT FROM $1 ORDER BY provider",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    /// Effective configuration for a tenant: tenant rows win over global rows
    pub async fn effective(pool: &PgPool, tenant_id: Option<Uuid>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuthProviderConfig>(
            r#"
            SELECT DISTINCT ON (provider) *
            FROM auth_provider_configs
            WHERE tenant_id IS NULL OR tenant_id = $1
            ORDER BY provider, tenant_id NULLS LAST
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    /// Enabled providers for the login screen
    ///
    /// Providers without any row fall back to [`AuthProvider::enabled_by_default`].
    pub async fn enabled_providers(pool: &PgPool, tenant_id: Option<Uuid>) -> Result<Vec<PublicProvider>, sqlx::Error> {
        let rows = Self::effective(pool, tenant_id).await?;
        Ok(resolve_enabled(&rows))
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_provider_configs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn resolve_enabled(rows: &[AuthProviderConfig]) -> Vec<PublicProvider> {
    AuthProvider::ALL
        .into_iter()
        .filter_map(|provider| {
            let row = rows.iter().find(|r| r.provider == provider.as_str());
            let enabled = row.map_or(provider.enabled_by_default(), |r| r.enabled);

            enabled.then(|| PublicProvider {
                provider: provider.as_str().to_string(),
                client_id: row.and_then(|r| r.client_id.clone()),
            })
        })
        .collect()
}
