/// Interviewer backed by an OpenAI-compatible `/chat/completions` endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{count_turns, Evaluation, InterviewContext, Interviewer, InterviewerConfig, InterviewerError, Turn};
use crate::models::interview_message::MessageSender;

/// Resume text beyond this is cut before it goes into the prompt
const RESUME_PROMPT_CHARS: usize = 4000;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct ChatCompletionsInterviewer {
    config: InterviewerConfig,
    http: reqwest::Client,
}

impl ChatCompletionsInterviewer {
    pub fn new(config: InterviewerConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    fn endpoint(&self) -> String {
        let base = self.config.api_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    async fn complete(&self, messages: Vec<ChatMessage>, json_mode: bool) -> Result<String, InterviewerError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: if json_mode { 0.0 } else { 0.7 },
            response_format: json_mode.then(|| serde_json::json!({"type": "json_object"})),
        };

        let mut builder = self.http.post(self.endpoint()).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Chat completions request failed");
            return Err(InterviewerError::Api {
                status: status.as_u16(),
                message: message.chars().take(500).collect(),
            });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| InterviewerError::InvalidResponse("no choices".to_string()))
    }
}

fn system_prompt(context: &InterviewContext, asked: usize) -> String {
    let mut prompt = format!(
        "You are a professional interviewer running a {} interview at {} difficulty for a {} role. \
         Ask one question at a time, follow up on vague answers, and keep replies under 120 words. \
         You have asked {} of {} questions.",
        context.interview_type.as_str().replace('_', " "),
        context.difficulty.as_str(),
        context.job_role,
        asked,
        context.max_questions,
    );
    if asked >= context.max_questions {
        prompt.push_str(" Do not ask further questions; thank the candidate and close the interview.");
    }
    if let Some(resume) = &context.resume_text {
        let excerpt: String = resume.chars().take(RESUME_PROMPT_CHARS).collect();
        prompt.push_str("\n\nCandidate resume:\n");
        prompt.push_str(&excerpt);
    }
    prompt
}

fn transcript_messages(transcript: &[Turn]) -> Vec<ChatMessage> {
    transcript
        .iter()
        .filter_map(|turn| {
            let role = match turn.sender {
                MessageSender::Candidate => "user",
                MessageSender::Interviewer => "assistant",
                MessageSender::System => return None,
            };
            Some(ChatMessage {
                role: role.to_string(),
                content: turn.content.clone(),
            })
        })
        .collect()
}

/// Parses `{"score": n, "feedback": "..."}`, tolerating surrounding prose
fn parse_evaluation(content: &str) -> Result<Evaluation, InterviewerError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &content[s..=e],
        _ => return Err(InterviewerError::InvalidResponse("evaluation is not JSON".to_string())),
    };

    let mut evaluation: Evaluation =
        serde_json::from_str(json).map_err(|e| InterviewerError::InvalidResponse(e.to_string()))?;
    evaluation.score = evaluation.score.clamp(0, 100);
    Ok(evaluation)
}

#[async_trait]
impl Interviewer for ChatCompletionsInterviewer {
    fn name(&self) -> &'static str {
        "chat_completions"
    }

    async fn reply(&self, context: &InterviewContext, transcript: &[Turn]) -> Result<String, InterviewerError> {
        let asked = count_turns(transcript, MessageSender::Interviewer);

        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: system_prompt(context, asked),
        }];
        if transcript.is_empty() {
            messages.push(ChatMessage {
                role: "user".to_string(),
                content: "Please introduce yourself briefly and ask the first question.".to_string(),
            });
        } else {
            messages.extend(transcript_messages(transcript));
        }

        self.complete(messages, false).await
    }

    async fn evaluate(&self, context: &InterviewContext, transcript: &[Turn]) -> Result<Evaluation, InterviewerError> {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: format!(
                "You evaluate mock interviews for a {} role. Reply with a JSON object \
                 {{\"score\": <integer 0-100>, \"feedback\": \"<strengths and improvements, under 200 words>\"}}.",
                context.job_role
            ),
        }];
        messages.extend(transcript_messages(transcript));
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: "The interview is over. Evaluate my performance.".to_string(),
        });

        let content = self.complete(messages, true).await?;
        parse_evaluation(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::interview_session::{Difficulty, InterviewType};

    fn context() -> InterviewContext {
        InterviewContext {
            interview_type: InterviewType::SystemDesign,
            difficulty: Difficulty::Hard,
            job_role: "Staff Engineer".into(),
            resume_text: Some("Ten years of distributed systems.".into()),
            max_questions: 5,
        }
    }

    #[test]
    fn test_endpoint_normalization() {
        let mut config = InterviewerConfig {
            api_url: "https://api.example.com/v1/".into(),
            api_key: Some("k".into()),
            model: "m".into(),
            timeout_secs: 5,
        };
        assert_eq!(
            ChatCompletionsInterviewer::new(config.clone()).endpoint(),
            "https://api.example.com/v1/chat/completions"
        );

        config.api_url = "https://proxy.example.com/chat/completions".into();
        assert_eq!(
            ChatCompletionsInterviewer::new(config).endpoint(),
            "https://proxy.example.com/chat/completions"
        );
    }

    #[test]
    fn test_system_prompt_contents() {
        let prompt = system_prompt(&context(), 5);
        assert!(prompt.contains("system design"));
        assert!(prompt.contains("Staff Engineer"));
        assert!(prompt.contains("close the interview"));
        assert!(prompt.contains("distributed systems"));
    }

    #[test]
    fn test_transcript_roles() {
        let transcript = vec![
            Turn { sender: MessageSender::System, content: "started".into() },
            Turn { sender: MessageSender::Interviewer, content: "q".into() },
            Turn { sender: MessageSender::Candidate, content: "a".into() },
        ];
        let roles: Vec<String> = transcript_messages(&transcript).into_iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["assistant", "user"]);
    }

    #[test]
    fn test_parse_evaluation() {
        let eval = parse_evaluation("Here you go: {\"score\": 140, \"feedback\": \"Great\"}").unwrap();
        assert_eq!(eval.score, 100);
        assert_eq!(eval.feedback, "Great");

        assert!(parse_evaluation("no json here").is_err());
    }
}
