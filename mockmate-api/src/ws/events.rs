/// WebSocket frames
///
/// Every frame in either direction is a JSON object
/// `{"event": "<name>", "data": <payload>}`.

use chrono::Utc;
use mockmate_shared::models::alert::Alert;
use mockmate_shared::models::interview_message::InterviewMessage;
use mockmate_shared::models::interview_session::InterviewSession;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events pushed to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected { user_id: Uuid, unread_alerts: i64 },
    JoinedSession { session_id: Uuid },
    LeftSession { session_id: Uuid },
    NewMessage(InterviewMessage),
    InterviewerTyping { session_id: Uuid, typing: bool },
    Typing { session_id: Uuid, user_id: Uuid, typing: bool },
    SessionUpdated(InterviewSession),
    NewAlert(Alert),
    AlertRead { alert_id: Option<Uuid>, unread_count: i64 },
    CreditsUpdated { balance: i32 },
    PaymentStatus { order_id: String, status: String, credits: i32 },
    Pong { ts: i64 },
    Error { code: String, message: String },
}

impl ServerEvent {
    /// The `event` tag, also used as the SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::JoinedSession { .. } => "joined_session",
            ServerEvent::LeftSession { .. } => "left_session",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::InterviewerTyping { .. } => "interviewer_typing",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::SessionUpdated(_) => "session_updated",
            ServerEvent::NewAlert(_) => "new_alert",
            ServerEvent::AlertRead { .. } => "alert_read",
            ServerEvent::CreditsUpdated { .. } => "credits_updated",
            ServerEvent::PaymentStatus { .. } => "payment_status",
            ServerEvent::Pong { .. } => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn pong() -> Self {
        ServerEvent::Pong {
            ts: Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, event = self.name(), "Failed to serialize event");
            r#"{"event":"error","data":{"code":"INTERNAL_ERROR","message":"serialization failed"}}"#.to_string()
        })
    }
}

/// Events sent by clients
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinSession { session_id: Uuid },
    LeaveSession { session_id: Uuid },
    SendMessage { session_id: Uuid, content: String },
    Typing { session_id: Uuid, typing: bool },
    MarkAlertRead { alert_id: Uuid },
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_frame_shape() {
        let id = Uuid::new_v4();
        let frame: serde_json::Value =
            serde_json::from_str(&ServerEvent::JoinedSession { session_id: id }.to_json()).unwrap();
        assert_eq!(frame, json!({ "event": "joined_session", "data": { "session_id": id } }));
    }

    #[test]
    fn test_name_matches_tag() {
        let events = [
            ServerEvent::pong(),
            ServerEvent::error("FORBIDDEN", "no"),
            ServerEvent::CreditsUpdated { balance: 3 },
            ServerEvent::AlertRead {
                alert_id: None,
                unread_count: 0,
            },
        ];
        for event in events {
            let frame: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
            assert_eq!(frame["event"], event.name());
        }
    }

    #[test]
    fn test_parse_client_events() {
        let id = Uuid::new_v4();
        let parsed: ClientEvent = serde_json::from_value(json!({
            "event": "send_message",
            "data": { "session_id": id, "content": "I would use a hash map" }
        }))
        .unwrap();
        assert_eq!(
            parsed,
            ClientEvent::SendMessage {
                session_id: id,
                content: "I would use a hash map".to_string()
            }
        );

        let ping: ClientEvent = serde_json::from_value(json!({ "event": "ping" })).unwrap();
        assert_eq!(ping, ClientEvent::Ping);
    }

    #[test]
    fn test_unknown_client_event_is_rejected() {
        assert!(serde_json::from_value::<ClientEvent>(json!({ "event": "drop_tables" })).is_err());
    }
}
