// src/models/notification.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// ---
// Notification (imutável, exceto is_read)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(example = "Hora extra aprovada")]
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    #[schema(example = "authorization_resolved")]
    pub kind: String,
    pub link_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub link_url: Option<String>,
}

// ---
// PushSubscription
// ---
// is_active=false é definitivo (só um novo registro explícito reativa).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub p256dh: String,
    #[serde(skip_serializing)]
    pub auth: String,
    pub is_active: bool,
    pub failure_count: i32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// O que o gateway de push devolve para uma entrega.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// O endpoint respondeu com um status HTTP de falha.
    Rejected { status: u16, reason: String },
    /// Não chegamos a obter resposta (rede, timeout, relay fora).
    Unreachable(String),
}

/// Como a saúde da inscrição muda após uma tentativa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushHealthUpdate {
    Success,
    Failure(String),
    Deactivate(String),
}

impl PushHealthUpdate {
    // 404/410 = endpoint permanentemente inválido: desativa já na primeira vez.
    pub fn from_outcome(outcome: &PushOutcome) -> Self {
        match outcome {
            PushOutcome::Delivered => PushHealthUpdate::Success,
            PushOutcome::Rejected { status: 404 | 410, reason } => {
                PushHealthUpdate::Deactivate(format!("endpoint inválido: {}", reason))
            }
            PushOutcome::Rejected { status, reason } => {
                PushHealthUpdate::Failure(format!("HTTP {}: {}", status, reason))
            }
            PushOutcome::Unreachable(reason) => PushHealthUpdate::Failure(reason.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub url: Option<&'a str>,
    pub notification_id: Uuid,
}

// --- Payloads ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPushPayload {
    #[validate(url(message = "Endpoint inválido"))]
    pub endpoint: String,
    #[validate(length(min = 1, message = "Chave p256dh obrigatória"))]
    pub p256dh: String,
    #[validate(length(min = 1, message = "Chave auth obrigatória"))]
    pub auth: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemovePushPayload {
    pub endpoint: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub push_enabled: bool,
}
