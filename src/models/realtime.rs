// src/models/realtime.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RealtimeEventKind {
    #[serde(rename = "shift:updated")]
    ShiftUpdated,
    #[serde(rename = "shift:log-new")]
    ShiftLogNew,
    #[serde(rename = "shift:authorization-new")]
    AuthorizationNew,
    #[serde(rename = "shift:authorization-updated")]
    AuthorizationUpdated,
    #[serde(rename = "shift:exchange-updated")]
    ExchangeUpdated,
    #[serde(rename = "notification:new")]
    NotificationNew,
}

/// Sala do canal em tempo real: por filial ou por usuário.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Branch(Uuid),
    User(Uuid),
}

impl Room {
    pub fn key(&self) -> String {
        match self {
            Room::Branch(id) => format!("branch:{}", id),
            Room::User(id) => format!("user:{}", id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeEvent {
    pub event: RealtimeEventKind,
    pub room: String,
    pub data: Value,
}

impl RealtimeEvent {
    pub fn new(room: Room, event: RealtimeEventKind, data: impl Serialize) -> Self {
        Self {
            event,
            room: room.key(),
            // Os modelos sempre serializam; se não, mandamos null em vez de derrubar o fluxo
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }
}

/// Mensagens que o cliente manda pelo WebSocket.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Join { branch_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Leave { branch_id: Uuid },
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_names_match_channel_contract() {
        let event = RealtimeEvent::new(Room::Branch(Uuid::nil()), RealtimeEventKind::AuthorizationNew, json!({ "x": 1 }));
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["event"], "shift:authorization-new");
        assert_eq!(wire["room"], format!("branch:{}", Uuid::nil()));
    }

    #[test]
    fn parses_client_join() {
        let id = Uuid::from_u128(5);
        let msg: ClientMessage = serde_json::from_value(json!({ "action": "join", "branchId": id })).unwrap();
        assert_eq!(msg, ClientMessage::Join { branch_id: id });
    }
}
