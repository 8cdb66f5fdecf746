/// Tenant membership with a per-tenant role
///
/// # Schema
///
/// ```sql
/// CREATE TYPE tenant_role AS ENUM ('owner', 'admin', 'member', 'viewer');
///
/// CREATE TABLE tenant_users (
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role tenant_role NOT NULL DEFAULT 'member',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (tenant_id, user_id)
/// );
/// ```
///
/// # Roles
///
/// - **owner**: everything, including deleting the tenant
/// - **admin**: manage members and API keys
/// - **member**: run interview sessions under the tenant
/// - **viewer**: read-only access to tenant data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tenant_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TenantRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl TenantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantRole::Owner => "owner",
            TenantRole::Admin => "admin",
            TenantRole::Member => "member",
            TenantRole::Viewer => "viewer",
        }
    }

    /// Owner > Admin > Member > Viewer
    pub fn has_permission(&self, required: &TenantRole) -> bool {
        self.permission_level() >= required.permission_level()
    }

    pub fn can_manage_members(&self) -> bool {
        self.has_permission(&TenantRole::Admin)
    }

    fn permission_level(&self) -> u8 {
        match self {
            TenantRole::Owner => 4,
            TenantRole::Admin => 3,
            TenantRole::Member => 2,
            TenantRole::Viewer => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantUser {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: TenantRole,
    pub created_at: DateTime<Utc>,
}

/// Membership joined with the user's identity, for member listings
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantMember {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: TenantRole,
    pub created_at: DateTime<Utc>,
}

/// Tenant as seen from one of its members
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserTenant {
    pub tenant_id: Uuid,
    pub name: String,
    pub slug: String,
    pub plan: String,
    pub role: TenantRole,
}

impl TenantUser {
    /// Adds a user to a tenant
    ///
    /// # Errors
    ///
    /// Fails with a unique violation if the user is already a member and a
    /// foreign-key violation if either side does not exist.
    pub async fn add<'e, E: PgExecutor<'e>>(
        executor: E,
        tenant_id: Uuid,
        user_id: Uuid,
        role: TenantRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, TenantUser>(
            r#"
            INSERT INTO tenant_users (tenant_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING tenant_id, user_id, role, created_at
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(executor)
        .await
    }

    pub async fn get_role(pool: &PgPool, tenant_id: Uuid, user_id: Uuid) -> Result<Option<TenantRole>, sqlx::Error> {
        sqlx::query_scalar("SELECT role FROM tenant_users WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn update_role(
        pool: &PgPool,
        tenant_id: Uuid,
        user_id: Uuid,
        role: TenantRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TenantUser>(
            r#"
            UPDATE tenant_users SET role = $3
            WHERE tenant_id = $1 AND user_id = $2
            RETURNING tenant_id, user_id, role, created_at
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(role)
        .fetch_optional(pool)
        .await
    }

    pub async fn remove(pool: &PgPool, tenant_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tenant_users WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_members(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<TenantMember>, sqlx::Error> {
        sqlx::query_as::<_, TenantMember>(
            r#"
            SELECT tu.user_id, u.email, u.name, tu.role, tu.created_at
            FROM tenant_users tu
            JOIN users u ON u.id = tu.user_id
            WHERE tu.tenant_id = $1
            ORDER BY tu.created_at
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<UserTenant>, sqlx::Error> {
        sqlx::query_as::<_, UserTenant>(
            r#"
            SELECT t.id AS tenant_id, t.name, t.slug, t.plan, tu.role
            FROM tenant_users tu
            JOIN tenants t ON t.id = tu.tenant_id
            WHERE tu.user_id = $1
            ORDER BY tu.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_members(pool: &PgPool, tenant_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tenant_users WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(pool)
            .await
    }

    pub async fn count_owners(pool: &PgPool, tenant_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tenant_users WHERE tenant_id = $1 AND role = 'owner'")
            .bind(tenant_id)
            .fetch_one(pool)
            .await
    }
}
