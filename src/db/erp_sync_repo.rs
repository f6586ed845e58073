// src/db/erp_sync_repo.rs
//
// Fila de sincronização com o ERP (tabela erp_sync_jobs do tenant).

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::erp::{ErpSyncJob, NewErpSyncJob},
};

#[derive(Clone, Default)]
pub struct ErpSyncRepository;

impl ErpSyncRepository {
    pub fn new() -> Self {
        Self
    }

    /// Enfileira na mesma transação da resolução da autorização.
    pub async fn enqueue<'e, E>(&self, executor: E, job: &NewErpSyncJob) -> Result<ErpSyncJob, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ErpSyncJob>(
            r#"
            INSERT INTO erp_sync_jobs (operation, authorization_id, erp_attendance_id, target_time)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(job.operation)
        .bind(job.authorization_id)
        .bind(job.erp_attendance_id)
        .bind(job.target_time)
        .fetch_one(executor)
        .await?;

        Ok(row)
    }

    /// Reivindica jobs vencidos: empurra o `due_at` para frente (lease) e conta a tentativa.
    /// Outro worker não pega o mesmo job enquanto o lease não vencer.
    pub async fn claim_due<'e, E>(&self, executor: E, limit: i64, lease_secs: i64) -> Result<Vec<ErpSyncJob>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, ErpSyncJob>(
            r#"
            UPDATE erp_sync_jobs
            SET attempt = attempt + 1,
                due_at = NOW() + make_interval(secs => $2),
                updated_at = NOW()
            WHERE id IN (
                SELECT id FROM erp_sync_jobs
                WHERE status = 'pending' AND due_at <= NOW()
                ORDER BY due_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .bind(lease_secs as f64)
        .fetch_all(executor)
        .await?;

        Ok(rows)
    }

    pub async fn mark_done<'e, E>(&self, executor: E, id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE erp_sync_jobs SET status = 'done', last_error = NULL, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn reschedule<'e, E>(&self, executor: E, id: Uuid, due_at: DateTime<Utc>, error: &str) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE erp_sync_jobs SET due_at = $2, last_error = $3, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(due_at)
            .bind(error)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn mark_dead<'e, E>(&self, executor: E, id: Uuid, error: &str) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE erp_sync_jobs SET status = 'dead', last_error = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn list_for_authorization<'e, E>(&self, executor: E, authorization_id: Uuid) -> Result<Vec<ErpSyncJob>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, ErpSyncJob>(
            "SELECT * FROM erp_sync_jobs WHERE authorization_id = $1 ORDER BY created_at",
        )
        .bind(authorization_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }
}
