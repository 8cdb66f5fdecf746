/// `{{ variable }}` rendering for email bodies and Firebase rules
///
/// Both email templates and Firebase security-rules templates are stored as
/// text with `{{ name }}` placeholders. Rendering goes through minijinja so
/// conditionals and filters are available to template authors as well.
///
/// # Example
///
/// ```
/// use mockmate_shared::templating::{render, RenderMode};
/// use serde_json::json;
///
/// let out = render("Hi {{ name }}!", &json!({"name": "Ada"}), RenderMode::Text).unwrap();
/// assert_eq!(out, "Hi Ada!");
/// ```

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde_json::Value as JsonValue;

#[derive(Debug, thiserror::Error)]
#[error("Template error: {0}")]
pub struct TemplateError(String);

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        TemplateError(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Plain text; missing variables render empty
    Text,
    /// HTML with escaped variables; missing variables render empty
    Html,
    /// Plain text; a missing variable is an error
    Strict,
}

pub fn render(source: &str, vars: &JsonValue, mode: RenderMode) -> Result<String, TemplateError> {
    let mut env = Environment::new();

    match mode {
        RenderMode::Html => {
            env.set_auto_escape_callback(|_| AutoEscape::Html);
            env.set_undefined_behavior(UndefinedBehavior::Lenient);
        }
        RenderMode::Text => {
            env.set_auto_escape_callback(|_| AutoEscape::None);
            env.set_undefined_behavior(UndefinedBehavior::Lenient);
        }
        RenderMode::Strict => {
            env.set_auto_escape_callback(|_| AutoEscape::None);
            env.set_undefined_behavior(UndefinedBehavior::Strict);
        }
    }

    Ok(env.render_str(source, vars)?)
}

/// Shallow-merges JSON objects left to right; later keys win
pub fn merge_vars<'a>(layers: impl IntoIterator<Item = &'a JsonValue>) -> JsonValue {
    let mut merged = serde_json::Map::new();
    for layer in layers {
        if let JsonValue::Object(map) = layer {
            for (k, v) in map {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    JsonValue::Object(merged)
}
