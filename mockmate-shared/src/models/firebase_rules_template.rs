/// Firebase security-rules templates
///
/// Admins keep reusable rules documents with `{{ variable }}` placeholders.
/// Rendering for a tenant merges, in increasing precedence: the template's
/// default `variables`, the tenant's `settings.firebase` object, the tenant
/// identity (`tenant_id`, `tenant_slug`, `tenant_name`) and request overrides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use super::tenant::Tenant;
use crate::templating::{merge_vars, render, RenderMode, TemplateError};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FirebaseRulesTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub template: String,

    /// Default values for placeholders
    pub variables: JsonValue,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRulesTemplate {
    pub name: String,
    pub description: Option<String>,
    pub template: String,
    pub variables: Option<JsonValue>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRulesTemplate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub template: Option<String>,
    pub variables: Option<JsonValue>,
    pub is_default: Option<bool>,
}

impl FirebaseRulesTemplate {
    /// Renders the template for an optional tenant with request overrides
    ///
    /// # Errors
    ///
    /// Fails if a placeholder has no value in any layer.
    pub fn render_for(&self, tenant: Option<&Tenant>, overrides: &JsonValue) -> Result<String, TemplateError> {
        let tenant_vars = tenant
            .map(|t| {
                serde_json::json!({
                    "tenant_id": t.id,
                    "tenant_slug": t.slug,
                    "tenant_name": t.name,
                })
            })
            .unwrap_or(JsonValue::Null);
        let tenant_settings = tenant
            .and_then(|t| t.settings.get("firebase").cloned())
            .unwrap_or(JsonValue::Null);

        let vars = merge_vars([&self.variables, &tenant_settings, &tenant_vars, overrides]);
        render(&self.template, &vars, RenderMode::Strict)
    }

    /// Creates a template; marking it default clears the previous default
    pub async fn create(pool: &PgPool, data: CreateRulesTemplate) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        if data.is_default {
            sqlx::query("UPDATE firebase_rules_templates SET is_default = FALSE WHERE is_default")
                .execute(&mut *tx)
                .await?;
        }

        let template = sqlx::query_as::<_, FirebaseRulesTemplate>(
            r#"
            INSERT INTO firebase_rules_templates (name, description, template, variables, is_default)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.template)
        .bind(data.variables.unwrap_or_else(|| serde_json::json!({})))
        .bind(data.is_default)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(template)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FirebaseRulesTemplate>("SELECT * FROM firebase_rules_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_default(pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FirebaseRulesTemplate>(
            "SELECT * FROM firebase_rules_templates WHERE is_default ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, FirebaseRulesTemplate>(
            "SELECT * FROM firebase_rules_templates ORDER BY is_default DESC, name",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateRulesTemplate) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        if data.is_default == Some(true) {
            sqlx::query("UPDATE firebase_rules_templates SET is_default = FALSE WHERE is_default AND id <> $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let template = sqlx::query_as::<_, FirebaseRulesTemplate>(
            r#"
            UPDATE firebase_rules_templates
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                template = COALESCE($4, template),
                variables = COALESCE($5, variables),
                is_default = COALESCE($6, is_default),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.template)
        .bind(&data.variables)
        .bind(data.is_default)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(template)
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM firebase_rules_templates WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> FirebaseRulesTemplate {
        FirebaseRulesTemplate {
            id: Uuid::new_v4(),
            name: "tenant-isolation".into(),
            description: None,
            template: "match /tenants/{{ tenant_id }}/{doc=**} { allow read: if {{ read_rule }}; }".into(),
            variables: json!({"read_rule": "request.auth != null"}),
            is_default: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn tenant() -> Tenant {
        Tenant {
            id: Uuid::nil(),
            name: "Acme".into(),
            slug: "acme".into(),
            plan: "pro".into(),
            status: "active".into(),
            settings: json!({"firebase": {"read_rule": "request.auth.token.tenant == 'acme'"}}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_defaults_apply_without_tenant() {
        let out = template()
            .render_for(None, &json!({"tenant_id": "global"}))
            .unwrap();
        assert_eq!(
            out,
            "match /tenants/global/{doc=**} { allow read: if request.auth != null; }"
        );
    }

    #[test]
    fn test_tenant_settings_and_overrides_take_precedence() {
        let t = tenant();
        let out = template().render_for(Some(&t), &json!({})).unwrap();
        assert!(out.contains(&format!("/tenants/{}/", Uuid::nil())));
        assert!(out.contains("request.auth.token.tenant == 'acme'"));

        let out = template()
            .render_for(Some(&t), &json!({"read_rule": "false"}))
            .unwrap();
        assert!(out.contains("allow read: if false;"));
    }

    #[test]
    fn test_missing_variable_fails() {
        assert!(template().render_for(None, &json!({})).is_err());
    }
}
