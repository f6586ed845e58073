// src/db/notification_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::notification::{NewNotification, Notification, PushHealthUpdate, PushSubscription},
};

#[derive(Clone, Default)]
pub struct NotificationRepository;

impl NotificationRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    //  NOTIFICAÇÕES
    // =========================================================================

    pub async fn insert<'e, E>(&self, executor: E, new: &NewNotification) -> Result<Notification, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, title, message, type, link_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.message)
        .bind(&new.kind)
        .bind(&new.link_url)
        .fetch_one(executor)
        .await?;

        Ok(row)
    }

    pub async fn list_for_user<'e, E>(&self, executor: E, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT 100
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(executor)
        .await?;

        Ok(rows)
    }

    pub async fn mark_read<'e, E>(&self, executor: E, user_id: Uuid, notification_id: Uuid) -> Result<Notification, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::ResourceNotFound("Notificação".into()))
    }

    pub async fn mark_all_read<'e, E>(&self, executor: E, user_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE")
            .bind(user_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    //  PREFERÊNCIAS
    // =========================================================================

    /// Sem linha de preferências = push ligado.
    pub async fn push_enabled<'e, E>(&self, executor: E, user_id: Uuid) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let enabled = sqlx::query_scalar::<_, bool>("SELECT push_enabled FROM user_notification_settings WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(executor)
            .await?;
        Ok(enabled.unwrap_or(true))
    }

    pub async fn set_push_enabled<'e, E>(&self, executor: E, user_id: Uuid, enabled: bool) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO user_notification_settings (user_id, push_enabled)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET push_enabled = EXCLUDED.push_enabled, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(enabled)
        .execute(executor)
        .await?;
        Ok(())
    }

    // =========================================================================
    //  INSCRIÇÕES DE PUSH
    // =========================================================================

    /// Registro explícito: é o único caminho que reativa uma inscrição desativada.
    pub async fn upsert_subscription<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<PushSubscription, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, PushSubscription>(
            r#"
            INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (endpoint) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                p256dh = EXCLUDED.p256dh,
                auth = EXCLUDED.auth,
                is_active = TRUE,
                failure_count = 0,
                last_failure_reason = NULL
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(endpoint)
        .bind(p256dh)
        .bind(auth)
        .fetch_one(executor)
        .await?;

        Ok(row)
    }

    pub async fn remove_subscription<'e, E>(&self, executor: E, user_id: Uuid, endpoint: &str) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE user_id = $1 AND endpoint = $2")
            .bind(user_id)
            .bind(endpoint)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn active_subscriptions<'e, E>(&self, executor: E, user_id: Uuid) -> Result<Vec<PushSubscription>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, PushSubscription>(
            "SELECT * FROM push_subscriptions WHERE user_id = $1 AND is_active = TRUE",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Registra o resultado de uma entrega. Desativação nunca é desfeita aqui.
    pub async fn record_delivery<'e, E>(&self, executor: E, subscription_id: Uuid, update: &PushHealthUpdate) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let query = match update {
            PushHealthUpdate::Success => sqlx::query(
                r#"
                UPDATE push_subscriptions
                SET failure_count = 0, last_success_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(subscription_id),
            PushHealthUpdate::Failure(reason) => sqlx::query(
                r#"
                UPDATE push_subscriptions
                SET failure_count = failure_count + 1, last_failure_at = NOW(), last_failure_reason = $2
                WHERE id = $1
                "#,
            )
            .bind(subscription_id)
            .bind(reason),
            PushHealthUpdate::Deactivate(reason) => sqlx::query(
                r#"
                UPDATE push_subscriptions
                SET is_active = FALSE, failure_count = failure_count + 1,
                    last_failure_at = NOW(), last_failure_reason = $2
                WHERE id = $1
                "#,
            )
            .bind(subscription_id)
            .bind(reason),
        };

        query.execute(executor).await?;
        Ok(())
    }
}
