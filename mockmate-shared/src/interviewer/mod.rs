/// The AI interviewer
///
/// An [`Interviewer`] produces the next interviewer turn from the transcript
/// so far and grades a finished transcript. Two implementations exist: an
/// OpenAI-compatible chat-completions client and a deterministic scripted
/// interviewer used when no AI key is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;

use crate::models::interview_message::{InterviewMessage, MessageSender};
use crate::models::interview_session::{Difficulty, InterviewSession, InterviewType};

pub mod chat_completions;
pub mod scripted;

pub use chat_completions::ChatCompletionsInterviewer;
pub use scripted::ScriptedInterviewer;

#[derive(Debug, thiserror::Error)]
pub enum InterviewerError {
    #[error("Interviewer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Interviewer API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Interviewer returned an unusable response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct InterviewerConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl InterviewerConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("AI_API_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: env::var("AI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            model: env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            timeout_secs: env::var("AI_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(30),
        }
    }
}

/// Chat-completions when an API key is configured, scripted otherwise
pub fn create_interviewer(config: &InterviewerConfig) -> Arc<dyn Interviewer> {
    match &config.api_key {
        Some(_) => {
            tracing::info!(model = %config.model, "Using chat-completions interviewer");
            Arc::new(ChatCompletionsInterviewer::new(config.clone()))
        }
        None => {
            tracing::info!("AI_API_KEY not set, using scripted interviewer");
            Arc::new(ScriptedInterviewer)
        }
    }
}

/// What the interviewer knows about the session
#[derive(Debug, Clone)]
pub struct InterviewContext {
    pub interview_type: InterviewType,
    pub difficulty: Difficulty,
    pub job_role: String,
    pub resume_text: Option<String>,
    pub max_questions: usize,
}

impl InterviewContext {
    pub fn for_session(session: &InterviewSession, resume_text: Option<String>, max_questions: usize) -> Self {
        Self {
            interview_type: session.get_type(),
            difficulty: session.get_difficulty(),
            job_role: session.job_role.clone(),
            resume_text,
            max_questions: max_questions.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub sender: MessageSender,
    pub content: String,
}

impl Turn {
    pub fn from_messages(messages: &[InterviewMessage]) -> Vec<Turn> {
        messages
            .iter()
            .filter_map(|m| {
                m.get_sender().map(|sender| Turn {
                    sender,
                    content: m.content.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 0..=100
    pub score: i32,
    pub feedback: String,
}

#[async_trait]
pub trait Interviewer: Send + Sync {
    fn name(&self) -> &'static str;

    /// The next interviewer message; an empty transcript yields the opening
    async fn reply(&self, context: &InterviewContext, transcript: &[Turn]) -> Result<String, InterviewerError>;

    async fn evaluate(&self, context: &InterviewContext, transcript: &[Turn]) -> Result<Evaluation, InterviewerError>;
}

pub(crate) fn count_turns(transcript: &[Turn], sender: MessageSender) -> usize {
    transcript.iter().filter(|t| t.sender == sender).count()
}
