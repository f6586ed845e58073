// src/services/realtime.rs
//
// Salas em memória para o canal em tempo real. Cada sala é um broadcast;
// quem está conectado no WebSocket assina as salas que lhe interessam.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::realtime::{RealtimeEvent, RealtimeEventKind, Room};

const ROOM_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct RealtimeHub {
    rooms: Arc<DashMap<String, broadcast::Sender<Arc<RealtimeEvent>>>>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self { rooms: Arc::new(DashMap::new()) }
    }

    pub fn subscribe(&self, room: Room) -> broadcast::Receiver<Arc<RealtimeEvent>> {
        self.rooms
            .entry(room.key())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Publica na sala e devolve quantos assinantes receberam.
    /// Sem assinantes o evento é descartado (não há replay).
    pub fn publish(&self, event: RealtimeEvent) -> usize {
        let Some(sender) = self.rooms.get(&event.room).map(|s| s.value().clone()) else {
            return 0;
        };
        sender.send(Arc::new(event)).unwrap_or(0)
    }

    pub fn emit(&self, room: Room, kind: RealtimeEventKind, data: impl Serialize) -> usize {
        self.publish(RealtimeEvent::new(room, kind, data))
    }

    /// O usuário tem alguma sessão ativa no canal?
    pub fn has_session(&self, user_id: Uuid) -> bool {
        self.rooms
            .get(&Room::User(user_id).key())
            .is_some_and(|sender| sender.receiver_count() > 0)
    }

    /// Remove salas sem assinantes.
    pub fn prune(&self) {
        self.rooms.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
