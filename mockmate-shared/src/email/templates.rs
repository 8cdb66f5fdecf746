/// Built-in email templates
///
/// Plain layouts used when `email_templates` has no active row for a key.

pub const OTP: &str = "otp";
pub const EMAIL_VERIFICATION: &str = "email_verification";
pub const PASSWORD_RESET: &str = "password_reset";
pub const WELCOME: &str = "welcome";
pub const PAYMENT_RECEIPT: &str = "payment_receipt";
pub const ALERT: &str = "alert";

#[derive(Debug, Clone, Copy)]
pub struct BuiltinTemplate {
    pub key: &'static str,
    pub subject: &'static str,
    pub html: &'static str,
    pub text: &'static str,
    /// Variables the template expects, shown in the admin editor
    pub variables: &'static [&'static str],
}

const BUILTINS: &[BuiltinTemplate] = &[
    BuiltinTemplate {
        key: OTP,
        subject: "Your {{ app_name }} code: {{ code }}",
        html: "<p>Your one-time code is <strong>{{ code }}</strong>.</p>\
               <p>It expires in {{ minutes }} minutes. If you did not request it, ignore this email.</p>",
        text: "Your one-time code is {{ code }}. It expires in {{ minutes }} minutes.",
        variables: &["app_name", "code", "minutes"],
    },
    BuiltinTemplate {
        key: EMAIL_VERIFICATION,
        subject: "Verify your email for {{ app_name }}",
        html: "<p>Hi {{ name }},</p>\
               <p>Confirm your email address by opening <a href=\"{{ link }}\">this link</a>.</p>\
               <p>The link expires in {{ hours }} hours.</p>",
        text: "Hi {{ name }},\n\nConfirm your email address: {{ link }}\n\nThe link expires in {{ hours }} hours.",
        variables: &["app_name", "name", "link", "hours"],
    },
    BuiltinTemplate {
        key: PASSWORD_RESET,
        subject: "Reset your {{ app_name }} password",
        html: "<p>Hi {{ name }},</p>\
               <p>Reset your password with <a href=\"{{ link }}\">this link</a>. It expires in {{ minutes }} minutes.</p>\
               <p>If you did not ask for a reset, you can ignore this email.</p>",
        text: "Hi {{ name }},\n\nReset your password: {{ link }}\n\nThe link expires in {{ minutes }} minutes.",
        variables: &["app_name", "name", "link", "minutes"],
    },
    BuiltinTemplate {
        key: WELCOME,
        subject: "Welcome to {{ app_name }}",
        html: "<p>Hi {{ name }},</p>\
               <p>Your account is ready and holds {{ credits }} free interview credits.</p>\
               <p>Questions? Write to {{ support_email }}.</p>",
        text: "Hi {{ name }},\n\nYour account is ready and holds {{ credits }} free interview credits.\n\nQuestions? Write to {{ support_email }}.",
        variables: &["app_name", "name", "credits", "support_email"],
    },
    BuiltinTemplate {
        key: PAYMENT_RECEIPT,
        subject: "{{ app_name }} receipt for order {{ order_id }}",
        html: "<p>Hi {{ name }},</p>\
               <p>We received {{ amount }} {{ currency }} for the {{ package }} package.</p>\
               <p>{{ credits }} credits were added; your balance is {{ balance }}.</p>",
        text: "Hi {{ name }},\n\nWe received {{ amount }} {{ currency }} for the {{ package }} package.\n{{ credits }} credits were added; your balance is {{ balance }}.",
        variables: &["app_name", "name", "order_id", "amount", "currency", "package", "credits", "balance"],
    },
    BuiltinTemplate {
        key: ALERT,
        subject: "{{ title }}",
        html: "<p>{{ message }}</p>",
        text: "{{ message }}",
        variables: &["title", "message"],
    },
];

pub fn builtin(key: &str) -> Option<&'static BuiltinTemplate> {
    BUILTINS.iter().find(|t| t.key == key)
}

pub fn all() -> &'static [BuiltinTemplate] {
    BUILTINS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templating::{render, RenderMode};
    use serde_json::json;

    #[test]
    fn test_every_builtin_renders_with_its_variables() {
        for template in all() {
            let vars: serde_json::Map<String, serde_json::Value> = template
                .variables
                .iter()
                .map(|v| (v.to_string(), json!("x")))
                .collect();
            let vars = serde_json::Value::Object(vars);

            render(template.subject, &vars, RenderMode::Strict).unwrap();
            render(template.text, &vars, RenderMode::Strict).unwrap();
            render(template.html, &vars, RenderMode::Html).unwrap();
        }
    }

    #[test]
    fn test_lookup() {
        assert!(builtin(OTP).is_some());
        assert!(builtin("newsletter").is_none());
    }
}
