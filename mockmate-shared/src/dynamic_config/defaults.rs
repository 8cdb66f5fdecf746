/// Built-in configuration defaults
///
/// Every key the code reads has an entry here so a fresh database (or an
/// unreachable one) still yields working values. Stored rows override them.

use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const SESSION_COST_CREDITS: &str = "interview.session_cost_credits";
pub const INTERVIEW_MAX_QUESTIONS: &str = "interview.max_questions";
pub const SIGNUP_BONUS_CREDITS: &str = "auth.signup_bonus_credits";
pub const REQUIRE_EMAIL_VERIFICATION: &str = "auth.require_email_verification";
pub const OTP_LENGTH: &str = "otp.length";
pub const OTP_TTL_SECONDS: &str = "otp.ttl_seconds";
pub const OTP_MAX_ATTEMPTS: &str = "otp.max_attempts";
pub const OTP_COOLDOWN_SECONDS: &str = "otp.cooldown_seconds";
pub const EMAIL_VERIFICATION_TTL_HOURS: &str = "email_verification.ttl_hours";
pub const PASSWORD_RESET_TTL_MINUTES: &str = "password_reset.ttl_minutes";
pub const CREDIT_PACKAGES: &str = "payments.packages";
pub const MAINTENANCE_MODE: &str = "features.maintenance_mode";
pub const SUPPORT_EMAIL: &str = "app.support_email";
pub const APP_NAME: &str = "app.name";

#[derive(Debug, Clone)]
pub struct DefaultSetting {
    pub key: &'static str,
    pub value: JsonValue,
    pub category: &'static str,
    pub description: &'static str,
    pub is_public: bool,
}

fn setting(key: &'static str, value: JsonValue, category: &'static str, description: &'static str, is_public: bool) -> DefaultSetting {
    DefaultSetting {
        key,
        value,
        category,
        description,
        is_public,
    }
}

pub fn builtin_defaults() -> &'static BTreeMap<&'static str, DefaultSetting> {
    static DEFAULTS: OnceLock<BTreeMap<&'static str, DefaultSetting>> = OnceLock::new();

    DEFAULTS.get_or_init(|| {
        [
            setting(SESSION_COST_CREDITS, json!(1), "interview", "Credits debited per interview session", true),
            setting(INTERVIEW_MAX_QUESTIONS, json!(8), "interview", "Questions asked before the interviewer wraps up", false),
            setting(SIGNUP_BONUS_CREDITS, json!(3), "auth", "Credits granted on registration", true),
            setting(REQUIRE_EMAIL_VERIFICATION, json!(false), "auth", "Block password login until the email is verified", true),
            setting(OTP_LENGTH, json!(6), "otp", "Digits in a one-time code", false),
            setting(OTP_TTL_SECONDS, json!(300), "otp", "Lifetime of a one-time code", false),
            setting(OTP_MAX_ATTEMPTS, json!(5), "otp", "Wrong guesses before a code locks", false),
            setting(OTP_COOLDOWN_SECONDS, json!(60), "otp", "Minimum delay between codes", true),
            setting(EMAIL_VERIFICATION_TTL_HOURS, json!(24), "email", "Lifetime of a verification link", false),
            setting(PASSWORD_RESET_TTL_MINUTES, json!(60), "email", "Lifetime of a password reset link", false),
            setting(
                CREDIT_PACKAGES,
                json!([
                    {"id": "starter", "name": "Starter", "credits": 5, "amount_minor": 49900, "currency": "INR"},
                    {"id": "pro", "name": "Pro", "credits": 15, "amount_minor": 129900, "currency": "INR"},
                    {"id": "intensive", "name": "Intensive", "credits": 40, "amount_minor": 299900, "currency": "INR"}
                ]),
                "payments",
                "Credit packages offered at checkout",
                true,
            ),
            setting(MAINTENANCE_MODE, json!(false), "features", "Reject new sessions and payments", true),
            setting(SUPPORT_EMAIL, json!("support@mockmate.app"), "app", "Contact address shown in emails", true),
            setting(APP_NAME, json!("MockMate"), "app", "Product name used in emails", true),
        ]
        .into_iter()
        .map(|s| (s.key, s))
        .collect()
    })
}

pub fn default_for(key: &str) -> Option<&'static JsonValue> {
    builtin_defaults().get(key).map(|s| &s.value)
}

/// Inclusive bounds for integer settings
pub fn numeric_range(key: &str) -> Option<(i64, i64)> {
    let range = match key {
        SESSION_COST_CREDITS | SIGNUP_BONUS_CREDITS => (0, 1_000),
        INTERVIEW_MAX_QUESTIONS => (1, 50),
        OTP_LENGTH => (4, 10),
        OTP_TTL_SECONDS => (30, 86_400),
        OTP_MAX_ATTEMPTS => (1, 20),
        OTP_COOLDOWN_SECONDS => (0, 3_600),
        EMAIL_VERIFICATION_TTL_HOURS => (1, 720),
        PASSWORD_RESET_TTL_MINUTES => (5, 1_440),
        _ => return None,
    };
    Some(range)
}
