/// Tenants (customer organizations)
///
/// A tenant groups users (through `tenant_users`), owns API keys and scopes
/// interview sessions. The plan decides the quotas in [`crate::quota`].
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tenants (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     slug VARCHAR(100) NOT NULL UNIQUE,
///     plan VARCHAR(50) NOT NULL DEFAULT 'trial',
///     status VARCHAR(20) NOT NULL DEFAULT 'active',
///     settings JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::models::tenant::{CreateTenant, Tenant, TenantPlan};
/// use mockmate_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let tenant = Tenant::create(&pool, CreateTenant {
///     name: "Acme Hiring".to_string(),
///     slug: None,
///     plan: TenantPlan::Starter,
///     settings: None,
/// }).await?;
/// assert_eq!(tenant.slug, "acme-hiring");
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantPlan {
    Trial,
    Starter,
    Pro,
    Enterprise,
}

impl TenantPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantPlan::Trial => "trial",
            TenantPlan::Starter => "starter",
            TenantPlan::Pro => "pro",
            TenantPlan::Enterprise => "enterprise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trial" => Some(TenantPlan::Trial),
            "starter" => Some(TenantPlan::Starter),
            "pro" => Some(TenantPlan::Pro),
            "enterprise" => Some(TenantPlan::Enterprise),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,

    /// URL-safe unique handle
    pub slug: String,

    pub plan: String,
    pub status: String,

    /// Free-form tenant settings (branding, rule variables, ...)
    pub settings: JsonValue,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn get_plan(&self) -> TenantPlan {
        TenantPlan::parse(&self.plan).unwrap_or(TenantPlan::Trial)
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,

    /// Derived from the name when omitted
    pub slug: Option<String>,

    pub plan: TenantPlan,
    pub settings: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTenant {
    pub name: Option<String>,
    pub plan: Option<TenantPlan>,
    pub status: Option<TenantStatus>,
    pub settings: Option<JsonValue>,
}

/// Lowercase, ASCII alphanumerics separated by single dashes
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(100);
    slug
}

impl Tenant {
    /// Creates a tenant
    ///
    /// # Errors
    ///
    /// A taken slug fails with a unique violation on `tenants_slug_unique`.
    pub async fn create<'e, E: PgExecutor<'e>>(executor: E, data: CreateTenant) -> Result<Self, sqlx::Error> {
        let slug = data
            .slug
            .as_deref()
            .map(slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&data.name));

        sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (name, slug, plan, settings)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(slug)
        .bind(data.plan.as_str())
        .bind(data.settings.unwrap_or_else(|| serde_json::json!({})))
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE slug = $1")
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at DESC LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tenants").fetch_one(pool).await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateTenant) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE tenants SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.plan.is_some() {
            bind_count += 1;
            query.push_str(&format!(", plan = ${}", bind_count));
        }
        if data.status.is_some() {
            bind_count += 1;
            query.push_str(&format!(", status = ${}", bind_count));
        }
        if data.settings.is_some() {
            bind_count += 1;
            query.push_str(&format!(", settings = ${}", bind_count));
        }

        query.push_str(" WHERE id = $1 RETURNING *");

        let mut q = sqlx::query_as::<_, Tenant>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(plan) = data.plan {
            q = q.bind(plan.as_str());
        }
        if let Some(status) = data.status {
            q = q.bind(status.as_str());
        }
        if let Some(settings) = data.settings {
            q = q.bind(settings);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes a tenant; memberships and API keys cascade, sessions keep
    /// their rows with `tenant_id` cleared
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
