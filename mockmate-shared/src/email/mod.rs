/// Outbound email
///
/// Templates are looked up by key: an active `email_templates` row wins,
/// otherwise the built-in template from [`templates`] is used. Messages are
/// sent over SMTP, or written to the log when SMTP is not configured.

use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::collections::VecDeque;
use std::env;
use std::sync::{Arc, Mutex};

use crate::models::email_template::EmailTemplate;
use crate::templating::{render, RenderMode, TemplateError};

pub mod templates;

/// Messages remembered by the log transport
const OUTBOX_CAPACITY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Unknown email template: {0}")]
    UnknownTemplate(String),

    #[error("Invalid email address: {0}")]
    Address(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    Transport(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// STARTTLS when true
    pub secure: bool,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// `None` selects the log transport
    pub smtp: Option<SmtpConfig>,
    pub from_email: String,
    pub from_name: String,
}

impl EmailConfig {
    /// Reads `SMTP_*`; without `SMTP_HOST` mail is only logged
    pub fn from_env() -> Self {
        let smtp = env::var("SMTP_HOST").ok().filter(|h| !h.is_empty()).map(|host| SmtpConfig {
            host,
            port: env::var("SMTP_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(587),
            username: env::var("SMTP_USER").ok().filter(|s| !s.is_empty()),
            password: env::var("SMTP_PASS").ok().filter(|s| !s.is_empty()),
            secure: env::var("SMTP_SECURE").map(|s| s != "false" && s != "0").unwrap_or(true),
        });

        Self {
            smtp,
            from_email: env::var("SMTP_FROM").unwrap_or_else(|_| "no-reply@mockmate.app".to_string()),
            from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "MockMate".to_string()),
        }
    }

    pub fn log_only() -> Self {
        Self {
            smtp: None,
            from_email: "no-reply@mockmate.app".to_string(),
            from_name: "MockMate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedEmail {
    pub template_key: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    /// `database` or `builtin`
    pub source: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentEmail {
    pub to: String,
    pub template_key: String,
    pub subject: String,
    pub text: String,
}

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Log(Mutex<VecDeque<SentEmail>>),
}

#[derive(Clone)]
pub struct EmailService {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Transport,
    from: Mailbox,
    pool: Option<PgPool>,
}

impl EmailService {
    /// `pool` enables database template overrides
    pub fn new(config: &EmailConfig, pool: Option<PgPool>) -> Result<Self, EmailError> {
        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| EmailError::Address(format!("from address: {}", e)))?;

        let transport = match &config.smtp {
            Some(smtp) => {
                if !smtp.secure {
                    tracing::warn!("SMTP TLS is disabled");
                }

                let mut builder = if smtp.secure {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
                        .map_err(|e| EmailError::Transport(format!("create SMTP transport: {}", e)))?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
                }
                .port(smtp.port);

                if let (Some(user), Some(pass)) = (&smtp.username, &smtp.password) {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }

                tracing::info!(host = %smtp.host, port = smtp.port, "SMTP transport configured");
                Transport::Smtp(builder.build())
            }
            None => {
                tracing::info!("SMTP not configured, emails will be logged");
                Transport::Log(Mutex::new(VecDeque::new()))
            }
        };

        Ok(Self {
            inner: Arc::new(Inner { transport, from, pool }),
        })
    }

    pub fn is_smtp(&self) -> bool {
        matches!(self.inner.transport, Transport::Smtp(_))
    }

    /// Renders a template without sending it
    pub async fn render(&self, key: &str, vars: &JsonValue) -> Result<RenderedEmail, EmailError> {
        let stored = match &self.inner.pool {
            Some(pool) => match EmailTemplate::find_active(pool, key).await {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(template = key, error = %e, "Email template lookup failed, using built-in");
                    None
                }
            },
            None => None,
        };

        if let Some(row) = stored {
            let html = render(&row.body_html, vars, RenderMode::Html)?;
            let text = match &row.body_text {
                Some(text) => render(text, vars, RenderMode::Text)?,
                None => html_to_text(&html),
            };
            return Ok(RenderedEmail {
                template_key: key.to_string(),
                subject: render(&row.subject, vars, RenderMode::Text)?,
                html,
                text,
                source: "database",
            });
        }

        let builtin = templates::builtin(key).ok_or_else(|| EmailError::UnknownTemplate(key.to_string()))?;
        Ok(RenderedEmail {
            template_key: key.to_string(),
            subject: render(builtin.subject, vars, RenderMode::Text)?,
            html: render(builtin.html, vars, RenderMode::Html)?,
            text: render(builtin.text, vars, RenderMode::Text)?,
            source: "builtin",
        })
    }

    pub async fn send_template(&self, to: &str, key: &str, vars: &JsonValue) -> Result<(), EmailError> {
        let rendered = self.render(key, vars).await?;
        self.send(to, &rendered).await
    }

    /// Sends in the background; failures are logged
    pub fn send_template_detached(&self, to: String, key: &'static str, vars: JsonValue) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.send_template(&to, key, &vars).await {
                tracing::error!(template = key, error = %e, "Failed to send email");
            }
        });
    }

    pub async fn send(&self, to: &str, email: &RenderedEmail) -> Result<(), EmailError> {
        let recipient = to
            .parse::<Mailbox>()
            .map_err(|e| EmailError::Address(format!("{}: {}", to, e)))?;

        match &self.inner.transport {
            Transport::Smtp(smtp) => {
                let message = Message::builder()
                    .from(self.inner.from.clone())
                    .to(recipient)
                    .subject(email.subject.clone())
                    .multipart(MultiPart::alternative_plain_html(email.text.clone(), email.html.clone()))
                    .map_err(|e| EmailError::Build(e.to_string()))?;

                smtp.send(message)
                    .await
                    .map_err(|e| EmailError::Transport(e.to_string()))?;

                tracing::info!(template = %email.template_key, "Email sent");
            }
            Transport::Log(outbox) => {
                tracing::info!(
                    to = %to,
                    template = %email.template_key,
                    subject = %email.subject,
                    body = %email.text,
                    "Email (log transport)"
                );

                if let Ok(mut outbox) = outbox.lock() {
                    if outbox.len() == OUTBOX_CAPACITY {
                        outbox.pop_front();
                    }
                    outbox.push_back(SentEmail {
                        to: to.to_string(),
                        template_key: email.template_key.clone(),
                        subject: email.subject.clone(),
                        text: email.text.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Most recent messages kept by the log transport, oldest first
    pub fn outbox(&self) -> Vec<SentEmail> {
        match &self.inner.transport {
            Transport::Log(outbox) => outbox.lock().map(|o| o.iter().cloned().collect()).unwrap_or_default(),
            Transport::Smtp(_) => Vec::new(),
        }
    }
}

/// Crude tag stripper for templates stored without a text body
fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_render_builtin() {
        let service = EmailService::new(&EmailConfig::log_only(), None).unwrap();
        let email = service
            .render(templates::OTP, &json!({"app_name": "MockMate", "code": "424242", "minutes": 5}))
            .await
            .unwrap();

        assert_eq!(email.subject, "Your MockMate code: 424242");
        assert!(email.text.contains("424242"));
        assert_eq!(email.source, "builtin");
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let service = EmailService::new(&EmailConfig::log_only(), None).unwrap();
        let result = service.render("nope", &json!({})).await;
        assert!(matches!(result, Err(EmailError::UnknownTemplate(_))));
    }

    #[tokio::test]
    async fn test_log_transport_records_outbox() {
        let service = EmailService::new(&EmailConfig::log_only(), None).unwrap();
        service
            .send_template("ada@example.com", templates::ALERT, &json!({"title": "Hi", "message": "Hello"}))
            .await
            .unwrap();

        let outbox = service.outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to, "ada@example.com");
        assert_eq!(outbox[0].subject, "Hi");
    }

    #[tokio::test]
    async fn test_bad_recipient() {
        let service = EmailService::new(&EmailConfig::log_only(), None).unwrap();
        let result = service
            .send_template("not-an-address", templates::ALERT, &json!({"title": "t", "message": "m"}))
            .await;
        assert!(matches!(result, Err(EmailError::Address(_))));
    }

    #[test]
    fn test_html_to_text() {
        assert_eq!(html_to_text("<p>Hello <b>there</b></p><p>bye</p>"), "Hello there bye");
    }
}
