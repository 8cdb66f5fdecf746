/// Transcript messages of an interview session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    Candidate,
    Interviewer,
    System,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSender::Candidate => "candidate",
            MessageSender::Interviewer => "interviewer",
            MessageSender::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "candidate" => Some(MessageSender::Candidate),
            "interviewer" => Some(MessageSender::Interviewer),
            "system" => Some(MessageSender::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InterviewMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: String,
    pub content: String,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl InterviewMessage {
    pub fn get_sender(&self) -> Option<MessageSender> {
        MessageSender::parse(&self.sender)
    }

    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        session_id: Uuid,
        sender: MessageSender,
        content: &str,
        metadata: Option<JsonValue>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, InterviewMessage>(
            r#"
            INSERT INTO interview_messages (session_id, sender, content, metadata)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(sender.as_str())
        .bind(content)
        .bind(metadata.unwrap_or_else(|| serde_json::json!({})))
        .fetch_one(executor)
        .await
    }

    /// Full transcript in chronological order
    pub async fn list_for_session(pool: &PgPool, session_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, InterviewMessage>(
            "SELECT * FROM interview_messages WHERE session_id = $1 ORDER BY created_at, id",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_by_sender(pool: &PgPool, session_id: Uuid, sender: MessageSender) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM interview_messages WHERE session_id = $1 AND sender = $2")
            .bind(session_id)
            .bind(sender.as_str())
            .fetch_one(pool)
            .await
    }
}
