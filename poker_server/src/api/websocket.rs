//! WebSocket edge: pumps bytes between a client socket and the engine's
//! message-queue session fabric (spec §4.1, §6).
//!
//! The first frame a client sends must deserialize as
//! [`InboundMessage::Connect`]; the lobby uses it to resolve a profile and
//! seat the player. Every later frame is forwarded verbatim onto the
//! player's inbound queue, and every message the engine raises for that
//! player is forwarded back out as a text frame, mirroring the teacher's
//! `websocket_handler`/`handle_socket` split (send task + receive loop).

use std::time::{Duration, Instant};

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use poker_engine::messages::{InboundMessage, OutboundEvent};
use poker_engine::queue::Channel;

use super::AppState;

/// Poll interval for the outbound-forwarding loop.
const FORWARD_POLL: Duration = Duration::from_millis(50);

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Some(Ok(Message::Text(text))) = receiver.next().await else {
        return;
    };
    let (player_id, display_name, session_id, room_id) = match serde_json::from_str::<InboundMessage>(&text) {
        Ok(InboundMessage::Connect {
            session_id,
            player,
            room_id,
            ..
        }) => (player.id, player.name, session_id, room_id),
        _ => {
            let _ = sender
                .send(Message::Text(
                    r#"{"event":"error","target":"","error":"first message must be connect"}"#.into(),
                ))
                .await;
            return;
        }
    };

    let outcome = match state.lobby.connect(&player_id, &display_name, &session_id, room_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("lobby connect failed for {player_id}: {e}");
            let _ = sender
                .send(Message::Text(format!(
                    r#"{{"event":"error","target":"{player_id}","error":"{e}"}}"#
                ).into()))
                .await;
            return;
        }
    };
    let joined_room_id = outcome.room_id;
    info!("player {player_id} connected to room {joined_room_id}");

    let client_channel = Channel::counterpart(state.broker.clone(), &player_id, &session_id);

    let connect_ack = OutboundEvent::Connect {
        server_id: state.lobby.server_id().to_string(),
        player: outcome.player,
    };
    if let Err(e) = client_channel.send(&connect_ack).await {
        warn!("failed to ack connect for {player_id}: {e}");
    }

    let forward_channel = client_channel.clone();
    let mut forward_task = tokio::spawn(async move {
        loop {
            match forward_channel.recv(Instant::now() + FORWARD_POLL).await {
                Ok(value) => {
                    if sender.send(Message::Text(value.to_string().into())).await.is_err() {
                        return;
                    }
                }
                Err(poker_engine::ChannelError::Timeout) => {}
                Err(poker_engine::ChannelError::Disconnected) => return,
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut forward_task => break,
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(value) => {
                                if let Err(e) = client_channel.send(&value).await {
                                    warn!("failed to push inbound frame for {player_id}: {e}");
                                }
                            }
                            Err(e) => warn!("malformed frame from {player_id}: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("websocket error for {player_id}: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    forward_task.abort();
    let _ = client_channel.send(&serde_json::json!({"type": "disconnect"})).await;
    let _ = state.lobby.disconnect(&joined_room_id, &player_id).await;
    info!("player {player_id} disconnected from room {joined_room_id}");
}
