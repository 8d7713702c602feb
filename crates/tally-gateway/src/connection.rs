use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use tally_types::events::{GatewayCommand, GatewayEvent, RoomId};

use crate::rooms::RoomRegistry;

/// Heartbeat interval: server sends a Ping every 30 seconds.
/// If 2 consecutive Pongs are missed (~60s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Handle a single WebSocket connection for the lifetime of the socket.
///
/// The connection starts in no rooms; the client must send `join_room`
/// commands (again after every reconnect; room membership is not
/// persisted anywhere). Everything the connection joined is torn down
/// when either task exits.
pub async fn handle_connection(socket: WebSocket, registry: RoomRegistry) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut event_rx) = registry.register().await;
    info!("connection {} opened", conn_id);

    let ready = GatewayEvent::Ready {
        connection_id: conn_id,
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        registry.disconnect(conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room events to the client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = event_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("connection {} heartbeat timeout, dropping", conn_id);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read join/leave commands from the client
    let registry_recv = registry.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&registry_recv, conn_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.disconnect(conn_id).await;
    info!("connection {} closed", conn_id);
}

async fn handle_command(registry: &RoomRegistry, conn_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::JoinRoom { room } => match room.parse::<RoomId>() {
            Ok(room) => {
                info!("connection {} joined {}", conn_id, room);
                registry.join(conn_id, room).await;
            }
            Err(e) => warn!("connection {} join rejected: {}", conn_id, e),
        },
        GatewayCommand::LeaveRoom { room } => match room.parse::<RoomId>() {
            Ok(room) => {
                info!("connection {} left {}", conn_id, room);
                registry.leave(conn_id, room).await;
            }
            Err(e) => warn!("connection {} leave rejected: {}", conn_id, e),
        },
    }
}
