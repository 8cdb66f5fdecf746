/// WebSocket endpoint
///
/// `GET /ws?token=<access JWT>` (or `Authorization: Bearer`). A connection
/// starts in its owner's `user_<id>` and `alerts_<id>` rooms and joins
/// `session_<id>` rooms on request. Every room is a broadcast receiver
/// merged into one `StreamMap`, so a single task serves the socket.

use super::events::{ClientEvent, ServerEvent};
use super::hub::{alerts_room, session_room, user_room};
use crate::{app::AppState, error::ApiResult, middleware::auth::authenticate_user, routes::sessions};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use mockmate_shared::auth::middleware::bearer_token;
use mockmate_shared::models::alert::Alert;
use mockmate_shared::models::interview_session::InterviewSession;
use mockmate_shared::models::user::User;
use serde::Deserialize;
use std::sync::Arc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamMap;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Authenticates before upgrading so bad tokens get a plain HTTP 401
pub async fn upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let token = match params.token.as_deref() {
        Some(token) => token,
        None => bearer_token(&headers)?,
    };
    let (_, user) = authenticate_user(&state, token).await?;

    tracing::debug!(user_id = %user.id, "WebSocket upgrade");
    Ok(ws.on_upgrade(move |socket| serve(state, user, socket)))
}

type Rooms = StreamMap<String, BroadcastStream<Arc<ServerEvent>>>;

/// One authenticated client and the rooms it listens to
pub struct Connection {
    state: AppState,
    user: User,
    rooms: Rooms,
}

impl Connection {
    /// Joins the user's own rooms and builds the `connected` greeting
    pub async fn open(state: AppState, user: User) -> (Self, ServerEvent) {
        let user_id = user.id;
        let mut conn = Connection {
            state,
            user,
            rooms: StreamMap::new(),
        };
        conn.join(user_room(user_id));
        conn.join(alerts_room(user_id));

        let unread_alerts = match Alert::unread_count(&conn.state.db, user_id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Unread alert count failed, reporting zero");
                0
            }
        };

        (conn, ServerEvent::Connected { user_id, unread_alerts })
    }

    pub fn is_in_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Next event from any joined room, skipping over lag notices
    pub async fn next_event(&mut self) -> Option<Arc<ServerEvent>> {
        while let Some((room, item)) = self.rooms.next().await {
            match item {
                Ok(event) => return Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %self.user.id, %room, skipped, "WebSocket client lagging, events dropped");
                }
            }
        }
        None
    }

    /// Leaves every room so idle ones can be dropped
    pub fn close(mut self) {
        self.leave_all();
    }

    fn join(&mut self, room: String) {
        if !self.rooms.contains_key(&room) {
            let receiver = self.state.hub.subscribe(&room);
            self.rooms.insert(room, BroadcastStream::new(receiver));
        }
    }

    fn leave(&mut self, room: &str) {
        if self.rooms.remove(room).is_some() {
            self.state.hub.release(room);
        }
    }

    fn leave_all(&mut self) {
        let rooms: Vec<String> = self.rooms.keys().cloned().collect();
        for room in rooms {
            self.leave(&room);
        }
    }

    /// Session the caller may watch: the owner or an admin
    async fn visible_session(&self, session_id: Uuid) -> Result<InterviewSession, ServerEvent> {
        let session = InterviewSession::find_by_id(&self.state.db, session_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %session_id, "Session lookup failed");
                ServerEvent::error("INTERNAL_ERROR", "Session lookup failed")
            })?
            .ok_or_else(|| ServerEvent::error("NOT_FOUND", "Session not found"))?;

        if !session.is_owned_by(self.user.id) && !self.user.is_admin() {
            return Err(ServerEvent::error("FORBIDDEN", "Not your session"));
        }
        Ok(session)
    }

    /// Handles one client frame; the return value goes to this socket only
    pub async fn handle(&mut self, event: ClientEvent) -> Option<ServerEvent> {
        match event {
            ClientEvent::Ping => Some(ServerEvent::pong()),

            ClientEvent::JoinSession { session_id } => match self.visible_session(session_id).await {
                Ok(_) => {
                    self.join(session_room(session_id));
                    Some(ServerEvent::JoinedSession { session_id })
                }
                Err(error) => Some(error),
            },

            ClientEvent::LeaveSession { session_id } => {
                self.leave(&session_room(session_id));
                Some(ServerEvent::LeftSession { session_id })
            }

            ClientEvent::Typing { session_id, typing } => {
                if self.rooms.contains_key(&session_room(session_id)) {
                    self.state.hub.emit_to_session(
                        session_id,
                        ServerEvent::Typing {
                            session_id,
                            user_id: self.user.id,
                            typing,
                        },
                    );
                    None
                } else {
                    Some(ServerEvent::error("NOT_IN_SESSION", "Join the session first"))
                }
            }

            ClientEvent::SendMessage { session_id, content } => {
                let session = match self.visible_session(session_id).await {
                    Ok(session) if session.is_owned_by(self.user.id) => session,
                    Ok(_) => return Some(ServerEvent::error("FORBIDDEN", "Only the candidate can answer")),
                    Err(error) => return Some(error),
                };
                self.join(session_room(session_id));

                // The reply can take seconds; it arrives through the session room
                let state = self.state.clone();
                let user_id = self.user.id;
                tokio::spawn(async move {
                    if let Err(e) = sessions::converse(&state, &session, &content).await {
                        state
                            .hub
                            .emit_to_user(user_id, ServerEvent::error(e.code(), e.to_string()));
                    }
                });
                None
            }

            ClientEvent::MarkAlertRead { alert_id } => {
                let db = &self.state.db;
                let result = async {
                    let alert = Alert::mark_read(db, alert_id, self.user.id).await?;
                    let unread = Alert::unread_count(db, self.user.id).await?;
                    Ok::<_, sqlx::Error>((alert, unread))
                }
                .await;

                match result {
                    Ok((Some(_), unread_count)) => {
                        self.state.hub.emit_alert(
                            self.user.id,
                            ServerEvent::AlertRead {
                                alert_id: Some(alert_id),
                                unread_count,
                            },
                        );
                        None
                    }
                    Ok((None, _)) => Some(ServerEvent::error("NOT_FOUND", "Alert not found")),
                    Err(e) => {
                        tracing::error!(error = %e, %alert_id, "Failed to mark alert read");
                        Some(ServerEvent::error("INTERNAL_ERROR", "Could not update alert"))
                    }
                }
            }
        }
    }
}

async fn serve(state: AppState, user: User, socket: WebSocket) {
    let _guard = state.hub.connect();
    let user_id = user.id;
    let (mut sink, mut stream) = socket.split();

    let (mut conn, hello) = Connection::open(state, user).await;
    if sink.send(Message::Text(hello.to_json())).await.is_err() {
        conn.close();
        return;
    }

    tracing::info!(%user_id, "WebSocket connected");

    loop {
        tokio::select! {
            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(%user_id, error = %e, "WebSocket read failed");
                        break;
                    }
                };

                let reply = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => conn.handle(event).await,
                    Err(e) => Some(ServerEvent::error("INVALID_EVENT", e.to_string())),
                };

                if let Some(reply) = reply {
                    if sink.send(Message::Text(reply.to_json())).await.is_err() {
                        break;
                    }
                }
            }

            Some(event) = conn.next_event(), if !conn.rooms.is_empty() => {
                if sink.send(Message::Text(event.to_json())).await.is_err() {
                    break;
                }
            }
        }
    }

    conn.close();
    tracing::info!(%user_id, "WebSocket disconnected");
}
