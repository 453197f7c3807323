use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use vigil_types::events::{ClientCommand, ServerEvent};

use crate::auth::initial_rooms;
use crate::rooms::{Room, RoomRegistry, SessionId, SessionIdentity};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one WebSocket connection from handshake to disconnect.
///
/// `identity` is `None` for anonymous sessions, which join no rooms until
/// they send `join:group`.
pub async fn handle_connection(
    socket: WebSocket,
    registry: RoomRegistry,
    identity: Option<SessionIdentity>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (session_id, mut session_rx) = registry.connect(identity);

    let rooms = initial_rooms(identity.as_ref());
    for room in &rooms {
        registry.join(session_id, *room);
    }

    match identity {
        Some(id) => info!(
            "User {} connected to gateway as session {} ({} rooms)",
            id.user_id,
            session_id,
            rooms.len()
        ),
        None => info!("Anonymous session {} connected to gateway", session_id),
    }

    let ready_sent = match serde_json::to_string(&ready_event(identity, &rooms)) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode ready event: {}", e);
            false
        }
    };
    if !ready_sent {
        registry.disconnect(session_id);
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued room broadcasts -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = session_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame.as_ref().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read subscription commands from client
    let recv_registry = registry.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => handle_command(&recv_registry, session_id, text.as_str()),
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.disconnect(session_id);
    info!("Session {} disconnected from gateway", session_id);
}

/// First frame of every session: who the server thinks you are and which
/// rooms it put you in.
pub fn ready_event(identity: Option<SessionIdentity>, rooms: &[Room]) -> ServerEvent {
    ServerEvent::Ready {
        user_id: identity.map(|id| id.user_id),
        rooms: rooms.iter().map(ToString::to_string).collect(),
    }
}

/// Apply one inbound client command. Malformed commands are logged and
/// ignored; room membership is a broadcast filter, not an access check.
pub fn handle_command(registry: &RoomRegistry, session_id: SessionId, text: &str) {
    match ClientCommand::parse(text) {
        Ok(ClientCommand::JoinGroup { group_id }) => {
            let changed = registry.join(session_id, Room::Group(group_id));
            debug!("Session {} join group:{} (changed: {})", session_id, group_id, changed);
        }
        Ok(ClientCommand::LeaveGroup { group_id }) => {
            let changed = registry.leave(session_id, Room::Group(group_id));
            debug!("Session {} leave group:{} (changed: {})", session_id, group_id, changed);
        }
        Err(e) => {
            warn!(
                "Session {} bad command: {} -- raw: {}",
                session_id,
                e,
                text.chars().take(200).collect::<String>()
            );
        }
    }
}
