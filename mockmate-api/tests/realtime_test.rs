/// Realtime delivery tests: WebSocket connections and the SSE alert stream
///
/// Connections are driven directly through `Connection` so room membership
/// and replies can be checked without a socket. The SSE stream goes through
/// the router like any other request.
///
/// These tests require a running PostgreSQL database.
/// Run with: cargo test -p mockmate-api --test realtime_test

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{create_account, TestContext};
use futures::StreamExt;
use mockmate_api::ws::events::{ClientEvent, ServerEvent};
use mockmate_api::ws::handler::Connection;
use mockmate_api::ws::hub::session_room;
use mockmate_shared::models::alert::{Alert, CreateAlert};
use mockmate_shared::models::user::{User, UserRole};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt as _;
use uuid::Uuid;

/// Creates a session for the context user and returns its id
async fn scheduled_session(ctx: &TestContext) -> Uuid {
    ctx.grant_credits(ctx.user.id, 1).await.unwrap();
    let (status, body) = ctx
        .send(
            "POST",
            "/api/sessions",
            Some(&ctx.user_auth()),
            Some(json!({ "job_role": "Platform Engineer", "interview_type": "technical" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["session"]["id"].as_str().unwrap().parse().unwrap()
}

/// Waits for the first event matching `pick`
async fn expect_event<T>(conn: &mut Connection, mut pick: impl FnMut(&ServerEvent) -> Option<T>) -> T {
    let wait = async {
        loop {
            let event: Arc<ServerEvent> = conn.next_event().await.expect("connection has rooms");
            if let Some(found) = pick(event.as_ref()) {
                return found;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("event within 5 seconds")
}

fn error_code(event: Option<ServerEvent>) -> Option<String> {
    match event {
        Some(ServerEvent::Error { code, .. }) => Some(code),
        _ => None,
    }
}

#[tokio::test]
async fn test_connected_event_carries_unread_count() {
    let ctx = TestContext::new().await.unwrap();
    Alert::create(&ctx.db, CreateAlert::new(ctx.user.id, "Welcome", "Your first interview is free"))
        .await
        .unwrap();
    Alert::create(&ctx.db, CreateAlert::new(ctx.user.id, "Tip", "Upload a resume for tailored questions"))
        .await
        .unwrap();

    let (conn, hello) = Connection::open(ctx.state.clone(), ctx.user.clone()).await;
    match hello {
        ServerEvent::Connected { user_id, unread_alerts } => {
            assert_eq!(user_id, ctx.user.id);
            assert_eq!(unread_alerts, 2);
        }
        other => panic!("expected connected, got {:?}", other),
    }
    conn.close();

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_join_session_only_for_owner_or_admin() {
    let ctx = TestContext::new().await.unwrap();
    let session_id = scheduled_session(&ctx).await;
    let stranger = create_account(&ctx.db, "stranger", UserRole::User).await.unwrap();
    let room = session_room(session_id);

    let (mut conn, _) = Connection::open(ctx.state.clone(), stranger.clone()).await;
    let reply = conn.handle(ClientEvent::JoinSession { session_id }).await;
    assert_eq!(error_code(reply).as_deref(), Some("FORBIDDEN"));
    assert!(!conn.is_in_room(&room));

    let reply = conn
        .handle(ClientEvent::SendMessage {
            session_id,
            content: "Let me answer instead".into(),
        })
        .await;
    assert_eq!(error_code(reply).as_deref(), Some("FORBIDDEN"));

    let reply = conn
        .handle(ClientEvent::JoinSession {
            session_id: Uuid::new_v4(),
        })
        .await;
    assert_eq!(error_code(reply).as_deref(), Some("NOT_FOUND"));
    conn.close();

    let (mut owner, _) = Connection::open(ctx.state.clone(), ctx.user.clone()).await;
    let reply = owner.handle(ClientEvent::JoinSession { session_id }).await;
    assert!(matches!(reply, Some(ServerEvent::JoinedSession { session_id: id }) if id == session_id));
    assert!(owner.is_in_room(&room));
    owner.close();

    let (mut admin, _) = Connection::open(ctx.state.clone(), ctx.admin.clone()).await;
    let reply = admin.handle(ClientEvent::JoinSession { session_id }).await;
    assert!(matches!(reply, Some(ServerEvent::JoinedSession { .. })));

    // Admins watch but do not answer
    let reply = admin
        .handle(ClientEvent::SendMessage {
            session_id,
            content: "Hello".into(),
        })
        .await;
    assert_eq!(error_code(reply).as_deref(), Some("FORBIDDEN"));
    admin.close();

    User::purge_data(&ctx.db, stranger.id, true).await.unwrap();
    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_send_message_persists_and_broadcasts() {
    let ctx = TestContext::new().await.unwrap();
    let session_id = scheduled_session(&ctx).await;
    let (status, _) = ctx
        .send("POST", &format!("/api/sessions/{}/start", session_id), Some(&ctx.user_auth()), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (mut watcher, _) = Connection::open(ctx.state.clone(), ctx.admin.clone()).await;
    watcher.handle(ClientEvent::JoinSession { session_id }).await;

    let (mut candidate, _) = Connection::open(ctx.state.clone(), ctx.user.clone()).await;
    let reply = candidate
        .handle(ClientEvent::SendMessage {
            session_id,
            content: "I would start by sharding the write path.".into(),
        })
        .await;
    assert!(reply.is_none(), "{:?}", reply);
    assert!(candidate.is_in_room(&session_room(session_id)));

    let answer = expect_event(&mut candidate, |event| match event {
        ServerEvent::NewMessage(m) if m.sender == "candidate" => Some(m.clone()),
        _ => None,
    })
    .await;
    assert_eq!(answer.session_id, session_id);
    assert_eq!(answer.content, "I would start by sharding the write path.");

    // Everyone in the room sees the answer and the interviewer's follow-up
    let seen = expect_event(&mut watcher, |event| match event {
        ServerEvent::NewMessage(m) if m.sender == "candidate" => Some(m.id),
        _ => None,
    })
    .await;
    assert_eq!(seen, answer.id);
    expect_event(&mut candidate, |event| match event {
        ServerEvent::NewMessage(m) if m.sender == "interviewer" => Some(()),
        _ => None,
    })
    .await;

    let (status, body) = ctx
        .send("GET", &format!("/api/sessions/{}/messages", session_id), Some(&ctx.user_auth()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m["id"] == answer.id.to_string()));

    candidate.close();
    watcher.close();
    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_alert_stream_delivers_new_alerts() {
    let ctx = TestContext::new().await.unwrap();

    let request = Request::builder()
        .method("GET")
        .uri("/api/alerts/stream")
        .header("authorization", ctx.user_auth())
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let mut body = response.into_body().into_data_stream();
    let mut received = String::new();

    let (status, _) = ctx
        .send(
            "POST",
            "/admin/alerts",
            Some(&ctx.admin_auth()),
            Some(json!({
                "title": "Scheduled maintenance",
                "message": "Interviews pause at 02:00 UTC",
                "user_id": ctx.user.id,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let read = async {
        while !received.contains("event: new_alert") {
            let chunk = body.next().await.expect("stream open").unwrap();
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("alert within 5 seconds");

    assert!(received.contains("event: connected"));
    assert!(received.contains("Scheduled maintenance"));

    ctx.cleanup().await.unwrap();
}
