use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChatMessage;

/// A logical fan-out channel. Every user has an inbox room for direct
/// messages; every group has one shared room for all of its members.
///
/// Rooms are ephemeral: membership lives only as long as the connection,
/// and clients must rejoin after a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    User(i64),
    Group(i64),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user_{}", id),
            Self::Group(id) => write!(f, "group_{}", id),
        }
    }
}

/// Error returned when a room string is neither `user_<id>` nor `group_<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoomIdError(pub String);

impl fmt::Display for ParseRoomIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid room name: {}", self.0)
    }
}

impl std::error::Error for ParseRoomIdError {}

impl FromStr for RoomId {
    type Err = ParseRoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = s
            .strip_prefix("user_")
            .map(|rest| rest.parse().map(Self::User))
            .or_else(|| s.strip_prefix("group_").map(|rest| rest.parse().map(Self::Group)));

        match parsed {
            Some(Ok(room)) => Ok(room),
            _ => Err(ParseRoomIdError(s.to_string())),
        }
    }
}

/// Commands sent FROM client TO server over the WebSocket.
///
/// Room names arrive as raw strings (`user_7`, `group_3`) and are parsed
/// server-side; a join carries no ownership proof, so any connection may
/// subscribe to any room it can name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Subscribe this connection to a room.
    JoinRoom { room: String },

    /// Unsubscribe this connection from a room.
    LeaveRoom { room: String },
}

/// Events pushed from server to client over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Sent once after the socket is accepted.
    Ready { connection_id: Uuid },

    /// A chat message was delivered to a room this connection joined.
    ReceiveMessage { message: ChatMessage },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_round_trip() {
        for room in [RoomId::User(7), RoomId::Group(42)] {
            let parsed: RoomId = room.to_string().parse().unwrap();
            assert_eq!(parsed, room);
        }
    }

    #[test]
    fn room_id_rejects_garbage() {
        assert!("user_".parse::<RoomId>().is_err());
        assert!("group_abc".parse::<RoomId>().is_err());
        assert!("lobby".parse::<RoomId>().is_err());
        assert!("".parse::<RoomId>().is_err());
    }

    #[test]
    fn commands_use_snake_case_tags() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"join_room","data":{"room":"user_5"}}"#).unwrap();
        match cmd {
            GatewayCommand::JoinRoom { room } => assert_eq!(room, "user_5"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn receive_message_event_shape() {
        let message = ChatMessage::Personal(crate::models::PersonalMessage {
            id: 9,
            sender_id: 1,
            receiver_id: 2,
            body: "hi".into(),
            is_seen: false,
            created_at: chrono::DateTime::default(),
        });

        let json = serde_json::to_value(GatewayEvent::ReceiveMessage { message }).unwrap();
        assert_eq!(json["type"], "receive_message");
        assert_eq!(json["data"]["message"]["receiver_id"], 2);
        assert!(json["data"]["message"].get("group_id").is_none());
    }
}
