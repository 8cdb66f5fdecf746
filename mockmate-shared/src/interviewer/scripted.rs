/// Deterministic interviewer backed by a fixed question bank

use async_trait::async_trait;

use super::{count_turns, Evaluation, InterviewContext, Interviewer, InterviewerError, Turn};
use crate::models::interview_message::MessageSender;
use crate::models::interview_session::{Difficulty, InterviewType};

/// Answers shorter than this many words count as shallow
const DEPTH_TARGET_WORDS: usize = 60;

const TECHNICAL: &[&str] = &[
    "Walk me through a recent project you are proud of. What was your role?",
    "How would you find and fix a memory leak in a long-running service?",
    "Explain the difference between a process and a thread, and when you would pick each.",
    "How do you decide what to cover with unit tests versus integration tests?",
    "Describe how a hash map works internally and what affects its performance.",
    "Tell me about a production incident you debugged. How did you find the root cause?",
    "How would you design an API so it can evolve without breaking clients?",
    "What trade-offs do you weigh when choosing between SQL and NoSQL storage?",
];

const BEHAVIORAL: &[&str] = &[
    "Tell me about yourself and what brings you to this role.",
    "Describe a time you disagreed with a teammate. How did you resolve it?",
    "Tell me about a deadline you missed or nearly missed. What did you learn?",
    "Give an example of feedback that changed how you work.",
    "Describe a situation where you had to lead without formal authority.",
    "Tell me about a decision you made with incomplete information.",
    "How do you prioritize when everything seems urgent?",
    "What accomplishment are you most proud of, and why?",
];

const SYSTEM_DESIGN: &[&str] = &[
    "Design a URL shortener. Start with the requirements you would clarify.",
    "How would you store and serve the links at high read volume?",
    "How would you design a rate limiter shared by many API servers?",
    "Design the notification system for a chat application.",
    "How would you keep a cache consistent with its database?",
    "What would you monitor to know the system is healthy?",
    "How would the design change at ten times the traffic?",
    "Where are the single points of failure, and how would you remove them?",
];

const HR: &[&str] = &[
    "Why are you interested in this company?",
    "Where do you see yourself in three years?",
    "What kind of team environment helps you do your best work?",
    "Why are you leaving your current position?",
    "What are your salary expectations, and how did you arrive at them?",
    "How do you handle stress and pressure?",
    "What would your previous manager say is your biggest strength?",
    "Do you have any questions for us?",
];

pub fn question_bank(interview_type: InterviewType) -> &'static [&'static str] {
    match interview_type {
        InterviewType::Technical => TECHNICAL,
        InterviewType::Behavioral => BEHAVIORAL,
        InterviewType::SystemDesign => SYSTEM_DESIGN,
        InterviewType::Hr => HR,
        InterviewType::Mixed => TECHNICAL,
    }
}

/// The `index`-th question; mixed interviews alternate between banks
fn question(interview_type: InterviewType, index: usize) -> &'static str {
    let bank = match interview_type {
        InterviewType::Mixed => match index % 3 {
            0 => BEHAVIORAL,
            1 => TECHNICAL,
            _ => SYSTEM_DESIGN,
        },
        other => question_bank(other),
    };
    let position = match interview_type {
        InterviewType::Mixed => index / 3,
        _ => index,
    };
    bank[position % bank.len()]
}

fn difficulty_note(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "We will keep things conversational.",
        Difficulty::Medium => "Expect a few follow-up questions.",
        Difficulty::Hard => "I will push on details, so be specific.",
    }
}

pub struct ScriptedInterviewer;

#[async_trait]
impl Interviewer for ScriptedInterviewer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn reply(&self, context: &InterviewContext, transcript: &[Turn]) -> Result<String, InterviewerError> {
        let asked = count_turns(transcript, MessageSender::Interviewer);

        if asked == 0 {
            return Ok(format!(
                "Hello! I'll be interviewing you for the {} role today. {} {}",
                context.job_role,
                difficulty_note(context.difficulty),
                question(context.interview_type, 0)
            ));
        }

        if asked >= context.max_questions {
            return Ok("Thank you, that covers everything I wanted to ask. \
                       You can end the session to receive your evaluation."
                .to_string());
        }

        Ok(format!("Thanks. Next question: {}", question(context.interview_type, asked)))
    }

    async fn evaluate(&self, context: &InterviewContext, transcript: &[Turn]) -> Result<Evaluation, InterviewerError> {
        let answers: Vec<&Turn> = transcript
            .iter()
            .filter(|t| t.sender == MessageSender::Candidate)
            .collect();

        if answers.is_empty() {
            return Ok(Evaluation {
                score: 0,
                feedback: "No answers were given, so there is nothing to evaluate.".to_string(),
            });
        }

        let answered = answers.len().min(context.max_questions);
        let total_words: usize = answers.iter().map(|t| t.content.split_whitespace().count()).sum();
        let average_words = total_words / answers.len();

        let coverage = answered * 50 / context.max_questions;
        let depth = average_words.min(DEPTH_TARGET_WORDS) * 50 / DEPTH_TARGET_WORDS;
        let score = (coverage + depth).min(100) as i32;

        let mut feedback = format!(
            "You answered {} of {} questions with about {} words per answer.",
            answered, context.max_questions, average_words
        );
        if depth < 25 {
            feedback.push_str(" Give more detail: concrete examples, numbers and the reasoning behind decisions.");
        }
        if coverage < 50 {
            feedback.push_str(" Finishing the full interview gives a more reliable evaluation.");
        }
        if score >= 75 {
            feedback.push_str(" Strong, well-developed answers overall.");
        }

        Ok(Evaluation { score, feedback })
    }
}
