// src/db/exchange_repo.rs
//
// Banco master: registro da saga de troca de turnos.

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{is_unique_violation, GuardedUpdate},
        error::{AppError, Precondition},
    },
    models::exchange::{NewExchangeRequest, ShiftExchangeRequest, SwapStep},
};

pub fn shift_lock_key(company_id: Uuid, shift_id: Uuid) -> String {
    format!("shift_exchange:{}:{}", company_id, shift_id)
}

#[derive(Clone, Default)]
pub struct ExchangeRepository;

impl ExchangeRepository {
    pub fn new() -> Self {
        Self
    }

    /// Trava, até o fim da transação, a entrada de um turno em trocas pendentes.
    /// Quem cria uma troca trava os dois turnos em ordem antes de checar e inserir.
    pub async fn lock_shift<'e, E>(&self, executor: E, company_id: Uuid, shift_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(shift_lock_key(company_id, shift_id))
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Algum dos dois turnos já participa de uma troca pendente (em qualquer papel)?
    pub async fn exists_pending_for_shifts<'e, E>(
        &self,
        executor: E,
        requester: (Uuid, Uuid),
        accepting: (Uuid, Uuid),
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM shift_exchange_requests
                WHERE status = 'pending'
                  AND (
                       (requester_company_id = $1 AND requester_shift_id = $2)
                    OR (accepting_company_id = $1 AND accepting_shift_id = $2)
                    OR (requester_company_id = $3 AND requester_shift_id = $4)
                    OR (accepting_company_id = $3 AND accepting_shift_id = $4)
                  )
            )
            "#,
        )
        .bind(requester.0)
        .bind(requester.1)
        .bind(accepting.0)
        .bind(accepting.1)
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }

    /// Os índices únicos parciais são a última barreira contra corrida no check-then-insert.
    pub async fn insert<'e, E>(&self, executor: E, new: &NewExchangeRequest) -> Result<ShiftExchangeRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, ShiftExchangeRequest>(
            r#"
            INSERT INTO shift_exchange_requests (
                requester_user_id, accepting_user_id,
                requester_company_id, requester_db_name, requester_branch_id, requester_shift_id, requester_erp_shift_id,
                accepting_company_id, accepting_db_name, accepting_branch_id, accepting_shift_id, accepting_erp_shift_id,
                request_reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(new.requester_user_id)
        .bind(new.accepting_user_id)
        .bind(new.requester_company_id)
        .bind(&new.requester_db_name)
        .bind(new.requester_branch_id)
        .bind(new.requester_shift_id)
        .bind(new.requester_erp_shift_id)
        .bind(new.accepting_company_id)
        .bind(&new.accepting_db_name)
        .bind(new.accepting_branch_id)
        .bind(new.accepting_shift_id)
        .bind(new.accepting_erp_shift_id)
        .bind(&new.request_reason)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Precondition::ExchangeAlreadyPending.into()
            } else {
                e.into()
            }
        })
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<ShiftExchangeRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, ShiftExchangeRequest>("SELECT * FROM shift_exchange_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Solicitação de troca".into()))
    }

    pub async fn find_for_update<'e, E>(&self, executor: E, id: Uuid) -> Result<ShiftExchangeRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, ShiftExchangeRequest>("SELECT * FROM shift_exchange_requests WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Solicitação de troca".into()))
    }

    pub async fn list_for_user<'e, E>(&self, executor: E, user_id: Uuid) -> Result<Vec<ShiftExchangeRequest>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, ShiftExchangeRequest>(
            r#"
            SELECT * FROM shift_exchange_requests
            WHERE requester_user_id = $1 OR accepting_user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Fila do RH: trocas aceitas pelo funcionário envolvendo as empresas do usuário.
    pub async fn list_awaiting_hr<'e, E>(&self, executor: E, company_ids: &[Uuid]) -> Result<Vec<ShiftExchangeRequest>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, ShiftExchangeRequest>(
            r#"
            SELECT * FROM shift_exchange_requests
            WHERE approval_stage = 'awaiting_hr'
              AND (requester_company_id = ANY($1) OR accepting_company_id = ANY($1))
            ORDER BY created_at
            "#,
        )
        .bind(company_ids.to_vec())
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    // =========================================================================
    //  TRANSIÇÕES (protegidas pelo estágio atual)
    // =========================================================================

    pub async fn employee_accept<'e, E>(&self, executor: E, id: Uuid) -> Result<GuardedUpdate<ShiftExchangeRequest>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ShiftExchangeRequest>(
            r#"
            UPDATE shift_exchange_requests
            SET approval_stage = 'awaiting_hr', employee_decision_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND approval_stage = 'awaiting_employee'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(GuardedUpdate::from_row(row))
    }

    pub async fn employee_reject<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        reason: Option<&str>,
    ) -> Result<GuardedUpdate<ShiftExchangeRequest>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ShiftExchangeRequest>(
            r#"
            UPDATE shift_exchange_requests
            SET status = 'rejected', approval_stage = 'resolved',
                employee_decision_at = NOW(), employee_rejection_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND approval_stage = 'awaiting_employee'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reason)
        .fetch_optional(executor)
        .await?;
        Ok(GuardedUpdate::from_row(row))
    }

    pub async fn hr_approve<'e, E>(&self, executor: E, id: Uuid, hr_user: Uuid) -> Result<GuardedUpdate<ShiftExchangeRequest>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ShiftExchangeRequest>(
            r#"
            UPDATE shift_exchange_requests
            SET status = 'approved', approval_stage = 'resolved',
                hr_decision_by = $2, hr_decision_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND approval_stage = 'awaiting_hr'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(hr_user)
        .fetch_optional(executor)
        .await?;
        Ok(GuardedUpdate::from_row(row))
    }

    pub async fn hr_reject<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        hr_user: Uuid,
        reason: &str,
    ) -> Result<GuardedUpdate<ShiftExchangeRequest>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ShiftExchangeRequest>(
            r#"
            UPDATE shift_exchange_requests
            SET status = 'rejected', approval_stage = 'resolved',
                hr_decision_by = $2, hr_decision_at = NOW(), hr_rejection_reason = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND approval_stage = 'awaiting_hr'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(hr_user)
        .bind(reason)
        .fetch_optional(executor)
        .await?;
        Ok(GuardedUpdate::from_row(row))
    }

    // =========================================================================
    //  SAGA
    // =========================================================================

    pub async fn advance_swap<'e, E>(&self, executor: E, id: Uuid, step: SwapStep) -> Result<ShiftExchangeRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ShiftExchangeRequest>(
            r#"
            UPDATE shift_exchange_requests
            SET swap_step = $2, swap_last_error = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(step)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    pub async fn record_swap_failure<'e, E>(&self, executor: E, id: Uuid, error: &str) -> Result<ShiftExchangeRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ShiftExchangeRequest>(
            r#"
            UPDATE shift_exchange_requests
            SET swap_attempts = swap_attempts + 1, swap_last_error = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    /// Trocas aprovadas cuja aplicação nos bancos das empresas não terminou.
    pub async fn list_incomplete_swaps<'e, E>(&self, executor: E, max_attempts: i32) -> Result<Vec<ShiftExchangeRequest>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, ShiftExchangeRequest>(
            r#"
            SELECT * FROM shift_exchange_requests
            WHERE status = 'approved' AND swap_step <> 'completed' AND swap_attempts < $1
            ORDER BY updated_at
            LIMIT 50
            "#,
        )
        .bind(max_attempts)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    pub async fn count_stuck_swaps<'e, E>(&self, executor: E, max_attempts: i32) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shift_exchange_requests WHERE status = 'approved' AND swap_step <> 'completed' AND swap_attempts >= $1",
        )
        .bind(max_attempts)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }
}
