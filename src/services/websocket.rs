
use axum::{
    extract::{Extension, ws::{WebSocket, WebSocketUpgrade, Message}},
    response::IntoResponse,
};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::{debug, error};
use crate::dto::{participant_dto::ParticipantUpdate, team_dto::{Team, TeamsUpdate}};
use crate::services::database::fetch_participants;
use futures_util::{StreamExt, SinkExt};

pub fn send_teams_update(tx: &broadcast::Sender<String>, event_id: &str, teams: &[Team]) {
    let update = TeamsUpdate {
        r#type: "teams_update".to_string(),
        event_id: event_id.to_string(),
        teams: teams.to_vec(),
    };

    match serde_json::to_string(&update) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            error!("Failed to serialize teams update message: {}", e);
        }
    }
}

pub async fn send_participant_update(pool: &SqlitePool, tx: &broadcast::Sender<String>, event_id: &str) {
    let participants = match fetch_participants(pool, event_id).await {
        Ok(participants) => participants,
        Err(e) => {
            error!("Failed to load participants for update: {}", e);
            return;
        }
    };

    let update_msg = ParticipantUpdate {
        r#type: "participant_update".to_string(),
        event_id: event_id.to_string(),
        participants,
    };

    match serde_json::to_string(&update_msg) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            error!("Failed to serialize participant update message: {}", e);
        }
    }
}

/* Web Socket stuff */
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Extension(tx): Extension<broadcast::Sender<String>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, tx))
}

async fn handle_socket(socket: WebSocket, tx: broadcast::Sender<String>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = tx.subscribe();
    debug!("Websocket client connected.");

    // Forward every broadcast to this client
    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if sender.send(Message::Text(msg.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Websocket client lagged, skipped {} messages.", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Client text is re-broadcast unchanged to every subscriber, including
    // other events' listeners. Clients must not trust relayed messages.
    while let Some(Ok(Message::Text(msg))) = receiver.next().await {
        let _ = tx.send(msg.to_string());
    }

    send_task.abort();
    debug!("Websocket client disconnected.");
}
