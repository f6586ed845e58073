// src/db/authorization_repo.rs

use sqlx::{Executor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    common::{db_utils::GuardedUpdate, error::AppError},
    models::authorization::{AuthorizationFilter, NewAuthorization, OvertimeType, Resolution, ShiftAuthorization},
};

#[derive(Clone, Default)]
pub struct AuthorizationRepository;

impl AuthorizationRepository {
    pub fn new() -> Self {
        Self
    }

    /// Cria a autorização se ainda não existir uma do mesmo tipo para o turno.
    /// `None` = já existia (evento repetido); o chamador não deve mexer no contador.
    pub async fn create_pending_if_absent<'e, E>(
        &self,
        executor: E,
        new: &NewAuthorization,
    ) -> Result<Option<ShiftAuthorization>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ShiftAuthorization>(
            r#"
            INSERT INTO shift_authorizations (
                shift_id, branch_id, user_id, auth_type, diff_minutes, needs_employee_reason
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (shift_id, auth_type) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(new.shift_id)
        .bind(new.branch_id)
        .bind(new.user_id)
        .bind(new.auth_type)
        .bind(new.diff_minutes)
        .bind(new.needs_employee_reason)
        .fetch_optional(executor)
        .await?;

        Ok(row)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<ShiftAuthorization, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, ShiftAuthorization>("SELECT * FROM shift_authorizations WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Autorização".into()))
    }

    /// Trava a linha até o fim da transação (serializa aprovações concorrentes).
    pub async fn find_for_update<'e, E>(&self, executor: E, id: Uuid) -> Result<ShiftAuthorization, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, ShiftAuthorization>("SELECT * FROM shift_authorizations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Autorização".into()))
    }

    pub async fn set_employee_reason<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        reason: &str,
    ) -> Result<GuardedUpdate<ShiftAuthorization>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ShiftAuthorization>(
            r#"
            UPDATE shift_authorizations
            SET employee_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND employee_reason IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reason)
        .fetch_optional(executor)
        .await?;

        Ok(GuardedUpdate::from_row(row))
    }

    /// `pending -> approved|rejected`, protegido pelo status atual.
    pub async fn resolve<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        resolution: Resolution,
        resolved_by: Uuid,
        overtime_type: Option<OvertimeType>,
        rejection_reason: Option<&str>,
    ) -> Result<GuardedUpdate<ShiftAuthorization>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ShiftAuthorization>(
            r#"
            UPDATE shift_authorizations
            SET status = $2,
                resolved_by = $3,
                resolved_at = NOW(),
                overtime_type = $4,
                rejection_reason = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(resolution.status())
        .bind(resolved_by)
        .bind(overtime_type)
        .bind(rejection_reason)
        .fetch_optional(executor)
        .await?;

        Ok(GuardedUpdate::from_row(row))
    }

    pub async fn count_pending<'e, E>(&self, executor: E, shift_id: Uuid) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shift_authorizations WHERE shift_id = $1 AND status = 'pending'",
        )
        .bind(shift_id)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    /// Listagem com filtros opcionais. `branch_ids = None` = todas as filiais.
    pub async fn list<'e, E>(
        &self,
        executor: E,
        filter: &AuthorizationFilter,
        branch_ids: Option<&[Uuid]>,
        user_id: Option<Uuid>,
    ) -> Result<Vec<ShiftAuthorization>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM shift_authorizations WHERE TRUE");

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(branch_id) = filter.branch_id {
            qb.push(" AND branch_id = ").push_bind(branch_id);
        }
        if let Some(shift_id) = filter.shift_id {
            qb.push(" AND shift_id = ").push_bind(shift_id);
        }
        if let Some(branch_ids) = branch_ids {
            qb.push(" AND branch_id = ANY(").push_bind(branch_ids.to_vec()).push(")");
        }
        if let Some(user_id) = user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        qb.push(" ORDER BY created_at DESC LIMIT 500");

        let rows = qb.build_query_as::<ShiftAuthorization>().fetch_all(executor).await?;
        Ok(rows)
    }
}
