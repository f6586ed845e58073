// src/services/notification_service.rs
//
// Notificações: grava primeiro, depois tenta tempo real e, se o usuário não
// estiver conectado, push. Falhas de entrega nunca voltam para quem notificou.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::NotificationRepository,
    models::{
        notification::{
            NewNotification, Notification, NotificationSettings, PushHealthUpdate, PushOutcome, PushPayload,
            PushSubscription, RegisterPushPayload,
        },
        realtime::{RealtimeEventKind, Room},
    },
    services::realtime::RealtimeHub,
};

/// Saída de push (Web Push). A implementação real fala com um relay HTTP.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &Value) -> PushOutcome;
}

/// Envia `{ subscription, payload }` ao relay, que assina com VAPID e devolve
/// o status HTTP do serviço de push do navegador.
pub struct RelayPushGateway {
    client: reqwest::Client,
    relay_url: String,
}

impl RelayPushGateway {
    pub fn new(client: reqwest::Client, relay_url: String) -> Self {
        Self { client, relay_url }
    }
}

#[async_trait]
impl PushGateway for RelayPushGateway {
    async fn send(&self, subscription: &PushSubscription, payload: &Value) -> PushOutcome {
        let body = json!({
            "subscription": {
                "endpoint": subscription.endpoint,
                "keys": { "p256dh": subscription.p256dh, "auth": subscription.auth },
            },
            "payload": payload,
        });

        match self.client.post(&self.relay_url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => PushOutcome::Delivered,
            Ok(resp) => {
                let status = resp.status().as_u16();
                let reason = resp.text().await.unwrap_or_default();
                PushOutcome::Rejected { status, reason }
            }
            Err(e) => PushOutcome::Unreachable(e.to_string()),
        }
    }
}

/// Resumo de uma entrega (usado em log e testes).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub realtime_listeners: usize,
    pub push_attempted: usize,
    pub push_delivered: usize,
    pub push_deactivated: usize,
}

#[derive(Clone)]
pub struct NotificationService {
    repo: NotificationRepository,
    hub: RealtimeHub,
    push: Option<Arc<dyn PushGateway>>,
}

impl NotificationService {
    pub fn new(repo: NotificationRepository, hub: RealtimeHub, push: Option<Arc<dyn PushGateway>>) -> Self {
        Self { repo, hub, push }
    }

    /// Só grava. Serve para notificar dentro da transação de um fluxo;
    /// a entrega acontece depois do commit com `deliver`.
    pub async fn record<'e, E>(&self, executor: E, new: &NewNotification) -> Result<Notification, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.repo.insert(executor, new).await
    }

    /// Grava e entrega.
    pub async fn dispatch(&self, pool: &PgPool, new: &NewNotification) -> Result<Notification, AppError> {
        let notification = self.repo.insert(pool, new).await?;
        self.deliver(pool, &notification).await;
        Ok(notification)
    }

    /// Entrega best-effort de uma notificação já gravada.
    #[tracing::instrument(skip_all, fields(notification_id = %notification.id, user_id = %notification.user_id))]
    pub async fn deliver(&self, pool: &PgPool, notification: &Notification) -> DeliveryReport {
        let mut report = DeliveryReport {
            realtime_listeners: self.hub.emit(
                Room::User(notification.user_id),
                RealtimeEventKind::NotificationNew,
                notification,
            ),
            ..Default::default()
        };

        // Conectado no canal: o push seria redundante
        if self.hub.has_session(notification.user_id) {
            return report;
        }
        let Some(push) = self.push.as_deref() else {
            return report;
        };

        match self.push_targets(pool, notification.user_id).await {
            Ok(subscriptions) => {
                let payload = push_payload(notification);
                for (subscription_id, update) in send_to_subscriptions(push, &subscriptions, &payload).await {
                    report.push_attempted += 1;
                    match &update {
                        PushHealthUpdate::Success => report.push_delivered += 1,
                        PushHealthUpdate::Deactivate(reason) => {
                            report.push_deactivated += 1;
                            tracing::info!(%subscription_id, %reason, "Inscrição de push desativada");
                        }
                        PushHealthUpdate::Failure(reason) => {
                            tracing::warn!(%subscription_id, %reason, "Falha no envio de push");
                        }
                    }
                    if let Err(e) = self.repo.record_delivery(pool, subscription_id, &update).await {
                        tracing::warn!(%subscription_id, error = %e, "Não foi possível registrar o resultado do push");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Não foi possível carregar as inscrições de push"),
        }

        report
    }

    async fn push_targets(&self, pool: &PgPool, user_id: Uuid) -> Result<Vec<PushSubscription>, AppError> {
        if !self.repo.push_enabled(pool, user_id).await? {
            return Ok(Vec::new());
        }
        self.repo.active_subscriptions(pool, user_id).await
    }

    // =========================================================================
    //  OPERAÇÕES DO PRÓPRIO USUÁRIO
    // =========================================================================

    pub async fn list(&self, pool: &PgPool, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>, AppError> {
        self.repo.list_for_user(pool, user_id, unread_only).await
    }

    pub async fn mark_read(&self, pool: &PgPool, user_id: Uuid, notification_id: Uuid) -> Result<Notification, AppError> {
        self.repo.mark_read(pool, user_id, notification_id).await
    }

    pub async fn mark_all_read(&self, pool: &PgPool, user_id: Uuid) -> Result<u64, AppError> {
        self.repo.mark_all_read(pool, user_id).await
    }

    pub async fn register_subscription(
        &self,
        pool: &PgPool,
        user_id: Uuid,
        payload: &RegisterPushPayload,
    ) -> Result<PushSubscription, AppError> {
        self.repo
            .upsert_subscription(pool, user_id, &payload.endpoint, &payload.p256dh, &payload.auth)
            .await
    }

    pub async fn remove_subscription(&self, pool: &PgPool, user_id: Uuid, endpoint: &str) -> Result<(), AppError> {
        if !self.repo.remove_subscription(pool, user_id, endpoint).await? {
            return Err(AppError::ResourceNotFound("Inscrição de push".into()));
        }
        Ok(())
    }

    pub async fn settings(&self, pool: &PgPool, user_id: Uuid) -> Result<NotificationSettings, AppError> {
        let push_enabled = self.repo.push_enabled(pool, user_id).await?;
        Ok(NotificationSettings { push_enabled })
    }

    pub async fn update_settings(
        &self,
        pool: &PgPool,
        user_id: Uuid,
        settings: &NotificationSettings,
    ) -> Result<NotificationSettings, AppError> {
        self.repo.set_push_enabled(pool, user_id, settings.push_enabled).await?;
        Ok(NotificationSettings { push_enabled: settings.push_enabled })
    }
}

fn push_payload(notification: &Notification) -> Value {
    let payload = PushPayload {
        title: &notification.title,
        body: &notification.message,
        url: notification.link_url.as_deref(),
        notification_id: notification.id,
    };
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

/// Envia para cada inscrição e classifica o resultado. Não toca no banco.
pub async fn send_to_subscriptions(
    push: &dyn PushGateway,
    subscriptions: &[PushSubscription],
    payload: &Value,
) -> Vec<(Uuid, PushHealthUpdate)> {
    let mut results = Vec::with_capacity(subscriptions.len());
    for subscription in subscriptions {
        let outcome = push.send(subscription, payload).await;
        results.push((subscription.id, PushHealthUpdate::from_outcome(&outcome)));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingPush {
        outcomes: HashMap<String, PushOutcome>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushGateway for RecordingPush {
        async fn send(&self, subscription: &PushSubscription, _payload: &Value) -> PushOutcome {
            self.sent.lock().await.push(subscription.endpoint.clone());
            self.outcomes
                .get(&subscription.endpoint)
                .cloned()
                .unwrap_or(PushOutcome::Delivered)
        }
    }

    fn subscription(endpoint: &str) -> PushSubscription {
        PushSubscription {
            id: Uuid::new_v4(),
            user_id: Uuid::from_u128(1),
            endpoint: endpoint.into(),
            p256dh: "key".into(),
            auth: "secret".into(),
            is_active: true,
            failure_count: 0,
            last_success_at: None,
            last_failure_at: None,
            last_failure_reason: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn gone_endpoint_is_deactivated_while_others_succeed() {
        let push = RecordingPush {
            outcomes: HashMap::from([(
                "https://push.example/gone".to_string(),
                PushOutcome::Rejected { status: 410, reason: "Gone".into() },
            )]),
            ..Default::default()
        };
        let subs = vec![subscription("https://push.example/ok"), subscription("https://push.example/gone")];

        let results = send_to_subscriptions(&push, &subs, &json!({ "title": "x" })).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], (subs[0].id, PushHealthUpdate::Success));
        assert!(matches!(&results[1], (id, PushHealthUpdate::Deactivate(_)) if *id == subs[1].id));
        assert_eq!(push.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn transient_failure_is_only_counted() {
        let push = RecordingPush {
            outcomes: HashMap::from([(
                "https://push.example/busy".to_string(),
                PushOutcome::Unreachable("timeout".into()),
            )]),
            ..Default::default()
        };
        let subs = vec![subscription("https://push.example/busy")];
        let results = send_to_subscriptions(&push, &subs, &Value::Null).await;
        assert_eq!(results[0].1, PushHealthUpdate::Failure("timeout".into()));
    }

    #[test]
    fn payload_carries_link_and_id() {
        let notification = Notification {
            id: Uuid::from_u128(3),
            user_id: Uuid::from_u128(1),
            title: "Hora extra aprovada".into(),
            message: "Sua hora extra foi aprovada".into(),
            kind: "authorization_resolved".into(),
            link_url: Some("/shifts/1".into()),
            is_read: false,
            created_at: Utc::now(),
        };
        let payload = push_payload(&notification);
        assert_eq!(payload["url"], "/shifts/1");
        assert_eq!(payload["notificationId"], Uuid::from_u128(3).to_string());
    }
}
