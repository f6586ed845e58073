// src/handlers/realtime.rs
//
// Canal em tempo real. A sessão assina a sala do próprio usuário ao conectar
// e entra/sai das salas de filial conforme as mensagens do cliente.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde_json::{json, Value};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        auth::Claims,
        realtime::{ClientMessage, RealtimeEvent, Room},
    },
    services::realtime::RealtimeHub,
};

const OUTBOX_CAPACITY: usize = 128;

// GET /api/realtime/ws?token=...
#[utoipa::path(
    get,
    path = "/api/realtime/ws",
    tag = "Tempo Real",
    params(("token" = String, Query, description = "JWT (o navegador não envia cabeçalho no handshake)")),
    responses(
        (status = 101, description = "Conexão WebSocket aberta"),
        (status = 401, description = "Token inválido")
    )
)]
pub async fn realtime_ws(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = app_state.hub.clone();
    ws.on_upgrade(move |socket| session(socket, hub, user.0))
}

/// O que a sessão faz com uma mensagem do cliente. Separado do socket para ser testável.
#[derive(Debug, PartialEq)]
enum Command {
    Join(Uuid),
    Leave(Uuid),
    Reply(Value),
}

fn interpret(claims: &Claims, text: &str) -> Command {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Join { branch_id }) if claims.can_watch_branch(branch_id) => Command::Join(branch_id),
        Ok(ClientMessage::Join { branch_id }) => Command::Reply(json!({
            "event": "error",
            "message": "sem acesso a esta filial",
            "branchId": branch_id,
        })),
        Ok(ClientMessage::Leave { branch_id }) => Command::Leave(branch_id),
        Ok(ClientMessage::Ping) => Command::Reply(json!({ "event": "pong" })),
        Err(e) => Command::Reply(json!({ "event": "error", "message": format!("mensagem inválida: {}", e) })),
    }
}

async fn session(socket: WebSocket, hub: RealtimeHub, claims: Claims) {
    let user_id = claims.sub;
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);

    // Escritor único do socket
    let writer = tokio::spawn(async move {
        while let Some(text) = outbox_rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let user_room = forward(hub.subscribe(Room::User(user_id)), outbox.clone());
    let mut branches: HashMap<Uuid, JoinHandle<()>> = HashMap::new();
    tracing::debug!(%user_id, "Sessão de tempo real aberta");

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match interpret(&claims, text.as_str()) {
            Command::Join(branch_id) => {
                branches
                    .entry(branch_id)
                    .or_insert_with(|| forward(hub.subscribe(Room::Branch(branch_id)), outbox.clone()));
                reply(&outbox, json!({ "event": "joined", "branchId": branch_id })).await;
            }
            Command::Leave(branch_id) => {
                if let Some(task) = branches.remove(&branch_id) {
                    task.abort();
                }
                reply(&outbox, json!({ "event": "left", "branchId": branch_id })).await;
            }
            Command::Reply(body) => reply(&outbox, body).await,
        }
    }

    // Encerramento: solta os receivers antes de podar as salas vazias
    user_room.abort();
    for (_, task) in branches.drain() {
        task.abort();
    }
    drop(outbox);
    let _ = writer.await;
    hub.prune();
    tracing::debug!(%user_id, "Sessão de tempo real encerrada");
}

async fn reply(outbox: &mpsc::Sender<String>, body: Value) {
    let _ = outbox.send(body.to_string()).await;
}

fn forward(mut rx: broadcast::Receiver<Arc<RealtimeEvent>>, outbox: mpsc::Sender<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(event.as_ref()) else {
                        continue;
                    };
                    if outbox.send(text).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Cliente lento; eventos de tempo real descartados");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{auth::CAP_VIEW_ALL_BRANCHES, realtime::RealtimeEventKind};

    fn claims(capabilities: &[&str], branch_ids: Vec<Uuid>) -> Claims {
        Claims {
            sub: Uuid::from_u128(1),
            exp: 0,
            iat: 0,
            company_ids: vec![],
            branch_ids,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn join_requires_branch_assignment_or_view_all() {
        let branch = Uuid::from_u128(7);
        let join = json!({ "action": "join", "branchId": branch }).to_string();

        assert_eq!(interpret(&claims(&[], vec![branch]), &join), Command::Join(branch));
        assert_eq!(interpret(&claims(&[CAP_VIEW_ALL_BRANCHES], vec![]), &join), Command::Join(branch));

        let Command::Reply(body) = interpret(&claims(&[], vec![]), &join) else {
            panic!("esperava recusa");
        };
        assert_eq!(body["event"], "error");
    }

    #[test]
    fn ping_and_garbage() {
        let c = claims(&[], vec![]);
        assert_eq!(interpret(&c, r#"{"action":"ping"}"#), Command::Reply(json!({ "event": "pong" })));

        let Command::Reply(body) = interpret(&c, "not json") else {
            panic!("esperava erro");
        };
        assert_eq!(body["event"], "error");
    }

    #[tokio::test]
    async fn forwards_room_events_to_the_outbox() {
        let hub = RealtimeHub::new();
        let user = Uuid::from_u128(9);
        let (tx, mut rx) = mpsc::channel(8);
        let task = forward(hub.subscribe(Room::User(user)), tx);

        assert!(hub.has_session(user));
        hub.emit(Room::User(user), RealtimeEventKind::NotificationNew, json!({ "id": 1 }));

        let text = rx.recv().await.unwrap();
        let wire: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(wire["event"], "notification:new");
        assert_eq!(wire["data"]["id"], 1);

        task.abort();
        let _ = task.await;
        hub.prune();
        assert!(!hub.has_session(user));
    }
}
