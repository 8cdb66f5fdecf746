/// User alert endpoints
///
/// - `GET /api/alerts?unread_only=true&page=1` - List visible alerts
/// - `GET /api/alerts/unread-count`
/// - `PUT /api/alerts/:id/read` / `PUT /api/alerts/read-all`
/// - `DELETE /api/alerts/:id`
/// - `GET /api/alerts/stream` - Server-Sent Events for `alerts_<id>`
///
/// Read-state changes are echoed as `alert_read` events so other open tabs
/// update their badge.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::Pagination,
    middleware::auth::CurrentUser,
    ws::{events::ServerEvent, hub::alerts_room},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{
    future,
    stream::{self, Stream, StreamExt},
};
use mockmate_shared::email::templates;
use mockmate_shared::models::{alert::Alert, user::User};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{convert::Infallible, time::Duration};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct AlertList {
    pub alerts: Vec<Alert>,
    pub unread_count: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllRead {
    pub updated: u64,
}

/// Pushes freshly stored alerts to their recipients
///
/// With `email` set, each recipient also gets the alert by mail.
pub(crate) async fn deliver(state: &AppState, alerts: &[Alert], email: bool) -> ApiResult<()> {
    for alert in alerts {
        state.hub.emit_alert(alert.user_id, ServerEvent::NewAlert(alert.clone()));
    }

    if email {
        for alert in alerts {
            if let Some(user) = User::find_by_id(&state.db, alert.user_id).await? {
                state.email.send_template_detached(
                    user.email,
                    templates::ALERT,
                    json!({ "title": alert.title, "message": alert.message }),
                );
            }
        }
    }

    Ok(())
}

pub(crate) async fn announce_read(state: &AppState, user_id: Uuid, alert_id: Option<Uuid>) -> ApiResult<i64> {
    let unread_count = Alert::unread_count(&state.db, user_id).await?;
    state
        .hub
        .emit_alert(user_id, ServerEvent::AlertRead { alert_id, unread_count });
    Ok(unread_count)
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(query): Query<AlertQuery>,
) -> ApiResult<Json<AlertList>> {
    let alerts = Alert::list_for_user(
        &state.db,
        user.id,
        query.unread_only,
        pagination.limit(),
        pagination.offset(),
    )
    .await?;
    let unread_count = Alert::unread_count(&state.db, user.id).await?;

    Ok(Json(AlertList {
        alerts,
        unread_count,
        page: pagination.page(),
        per_page: pagination.per_page(),
    }))
}

pub async fn unread_count(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<UnreadCount>> {
    Ok(Json(UnreadCount {
        unread_count: Alert::unread_count(&state.db, user.id).await?,
    }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Alert>> {
    let alert = Alert::mark_read(&state.db, id, user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Alert not found"))?;

    announce_read(&state, user.id, Some(id)).await?;
    Ok(Json(alert))
}

pub async fn mark_all_read(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<MarkAllRead>> {
    let updated = Alert::mark_all_read(&state.db, user.id).await?;
    announce_read(&state, user.id, None).await?;

    Ok(Json(MarkAllRead { updated }))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !Alert::delete_for_user(&state.db, id, user.id).await? {
        return Err(ApiError::not_found("Alert not found"));
    }

    announce_read(&state, user.id, Some(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn sse_event(event: &ServerEvent) -> Event {
    Event::default().event(event.name()).data(event.to_json())
}

/// Live alert feed over Server-Sent Events
///
/// Opens with a `connected` event carrying the unread count, then relays
/// `new_alert` and `alert_read`. A keep-alive comment goes out every 15
/// seconds. Events missed while the client lags are skipped.
///
/// ```text
/// event: new_alert
/// data: {"event":"new_alert","data":{"id":"...","title":"..."}}
/// ```
pub async fn stream(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before counting so nothing falls between the two
    let receiver = state.hub.subscribe(&alerts_room(user.id));
    let unread_alerts = Alert::unread_count(&state.db, user.id).await?;

    let hello = ServerEvent::Connected {
        user_id: user.id,
        unread_alerts,
    };
    let user_id = user.id;

    let live = BroadcastStream::new(receiver).filter_map(move |item| {
        future::ready(match item {
            Ok(event) => Some(Ok::<_, Infallible>(sse_event(&event))),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(%user_id, skipped, "Alert stream lagging, events dropped");
                None
            }
        })
    });

    tracing::debug!(%user_id, "Alert stream opened");

    let events = stream::once(future::ready(Ok::<_, Infallible>(sse_event(&hello)))).chain(live);

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
