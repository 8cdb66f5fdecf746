/// Authorization helpers and permission checks
///
/// MockMate has two layers of roles:
///
/// 1. **Platform role** on the user (`user` or `admin`); admins pass every
///    tenant and ownership check.
/// 2. **Tenant role** from `tenant_users` (Owner > Admin > Member > Viewer).
///
/// API-key callers carry scopes instead of roles and are checked with
/// [`require_scope`].
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::auth::authorization::{require_tenant_role, require_scope};
/// use mockmate_shared::auth::middleware::AuthContext;
/// use mockmate_shared::models::tenant_user::TenantRole;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// async fn check(pool: &PgPool, auth: &AuthContext, tenant_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
///     require_tenant_role(pool, auth, tenant_id, TenantRole::Admin).await?;
///     require_scope(auth, "sessions:read")?;
///     Ok(())
/// }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use super::middleware::{AuthContext, AuthMethod};
use crate::models::tenant_user::{TenantRole, TenantUser};

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// User is not a member of the tenant
    #[error("Not a member of tenant {0}")]
    NotMember(Uuid),

    #[error("Insufficient permissions: requires {required:?}, has {actual:?}")]
    InsufficientRole { required: TenantRole, actual: TenantRole },

    /// API key lacks the scope
    #[error("Missing required scope: {0}")]
    MissingScope(String),

    #[error("Admin access required")]
    AdminRequired,

    /// The endpoint needs a user, not an API key
    #[error("This endpoint requires a user session")]
    UserRequired,

    #[error("Not authorized to access this resource")]
    NotAuthorized,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

pub fn require_admin(auth: &AuthContext) -> Result<(), AuthzError> {
    if auth.is_admin() {
        Ok(())
    } else {
        Err(AuthzError::AdminRequired)
    }
}

pub fn require_scope(auth: &AuthContext, required_scope: &str) -> Result<(), AuthzError> {
    if !auth.has_scope(required_scope) {
        return Err(AuthzError::MissingScope(required_scope.to_string()));
    }

    Ok(())
}

/// Owner or platform admin
pub fn require_ownership(auth: &AuthContext, resource_owner_id: Uuid) -> Result<(), AuthzError> {
    if auth.is_admin() || auth.user_id == Some(resource_owner_id) {
        return Ok(());
    }

    Err(AuthzError::NotAuthorized)
}

/// Requires at least `required` in the tenant
///
/// Platform admins always pass. An API key passes only for its own tenant;
/// scopes are checked separately.
pub async fn require_tenant_role(
    pool: &PgPool,
    auth: &AuthContext,
    tenant_id: Uuid,
    required: TenantRole,
) -> Result<(), AuthzError> {
    if auth.is_admin() {
        return Ok(());
    }

    if auth.method == AuthMethod::ApiKey {
        return if auth.tenant_id == Some(tenant_id) {
            Ok(())
        } else {
            Err(AuthzError::NotMember(tenant_id))
        };
    }

    let user_id = auth.require_user()?;
    let actual = TenantUser::get_role(pool, tenant_id, user_id)
        .await?
        .ok_or(AuthzError::NotMember(tenant_id))?;

    check_role(actual, required)
}

fn check_role(actual: TenantRole, required: TenantRole) -> Result<(), AuthzError> {
    if !actual.has_permission(&required) {
        return Err(AuthzError::InsufficientRole { required, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;

    fn user_ctx(role: UserRole) -> AuthContext {
        AuthContext {
            user_id: Some(Uuid::new_v4()),
            role: Some(role),
            tenant_id: None,
            method: AuthMethod::Jwt,
            scopes: None,
            api_key_id: None,
        }
    }

    #[test]
    fn test_check_role_hierarchy() {
        assert!(check_role(TenantRole::Owner, TenantRole::Admin).is_ok());
        assert!(check_role(TenantRole::Member, TenantRole::Member).is_ok());
        assert!(matches!(
            check_role(TenantRole::Viewer, TenantRole::Member),
            Err(AuthzError::InsufficientRole { .. })
        ));
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&user_ctx(UserRole::Admin)).is_ok());
        assert!(matches!(require_admin(&user_ctx(UserRole::User)), Err(AuthzError::AdminRequired)));
    }

    #[test]
    fn test_require_ownership() {
        let ctx = user_ctx(UserRole::User);
        let own = ctx.user_id.unwrap();
        assert!(require_ownership(&ctx, own).is_ok());
        assert!(require_ownership(&ctx, Uuid::new_v4()).is_err());
        assert!(require_ownership(&user_ctx(UserRole::Admin), Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_require_scope() {
        let ctx = AuthContext {
            user_id: None,
            role: None,
            tenant_id: Some(Uuid::new_v4()),
            method: AuthMethod::ApiKey,
            scopes: Some(vec!["sessions:read".to_string()]),
            api_key_id: None,
        };

        assert!(require_scope(&ctx, "sessions:read").is_ok());
        assert!(matches!(require_scope(&ctx, "sessions:write"), Err(AuthzError::MissingScope(_))));
        assert!(require_scope(&user_ctx(UserRole::User), "sessions:write").is_ok());
    }
}
