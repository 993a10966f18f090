// =============================================================================
// WebSocket Handler — Push-based snapshot updates
// =============================================================================
//
// Clients connect to `/api/v1/ws?token=<token>` and receive an immediate
// snapshot on connect, then a fresh one every 500 ms whenever `snapshot_id`
// has advanced. `snapshot_id` is already a per-cycle monotonic counter, so
// there is no need for a separate version counter here.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::api::auth::validate_token;
use crate::app_state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    if !validate_token(&token) {
        warn!("WebSocket connection rejected: invalid token");
        return (
            axum::http::StatusCode::FORBIDDEN,
            "Invalid or missing token",
        )
            .into_response();
    }

    info!("WebSocket connection accepted — upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut last_sent_snapshot_id: Option<u64> = None;
    if send_snapshot(&mut sender, &state, &mut last_sent_snapshot_id)
        .await
        .is_err()
    {
        warn!("failed to send initial WebSocket snapshot");
        return;
    }

    let mut push_interval = interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = push_interval.tick() => {
                if send_snapshot(&mut sender, &state, &mut last_sent_snapshot_id).await.is_err() {
                    debug!("WebSocket send failed — disconnecting");
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket connection closed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error — disconnecting");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn send_snapshot(
    sender: &mut (impl futures_util::Sink<Message, Error = axum::Error> + Unpin),
    state: &Arc<AppState>,
    last_sent_snapshot_id: &mut Option<u64>,
) -> Result<(), axum::Error> {
    let Some(snapshot) = state.datahub.get_latest() else {
        return Ok(());
    };
    if *last_sent_snapshot_id == Some(snapshot.snapshot_id) {
        return Ok(());
    }

    match serde_json::to_string(snapshot.as_ref()) {
        Ok(json) => {
            sender.send(Message::Text(json.into())).await?;
            *last_sent_snapshot_id = Some(snapshot.snapshot_id);
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "failed to serialize snapshot");
            Ok(())
        }
    }
}
