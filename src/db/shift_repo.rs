// src/db/shift_repo.rs
//
// Banco da empresa: filiais, turnos e a trilha de auditoria dos turnos.

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::shift::{AttendanceUpdate, Branch, EmployeeShift, NewShiftLog, ShiftLog, ShiftUpsert},
};

#[derive(Clone, Default)]
pub struct ShiftRepository;

impl ShiftRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    //  FILIAIS
    // =========================================================================

    pub async fn create_main_branch<'e, E>(&self, executor: E, name: &str) -> Result<Branch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let branch = sqlx::query_as::<_, Branch>(
            r#"
            INSERT INTO branches (name, is_main_branch)
            VALUES ($1, TRUE)
            ON CONFLICT (is_main_branch) WHERE is_main_branch DO UPDATE SET updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(name)
        .fetch_one(executor)
        .await?;

        Ok(branch)
    }

    /// Filial do turno: a mapeada pelo id do ERP ou, na falta, a matriz.
    pub async fn resolve_branch<'e, E>(&self, executor: E, erp_branch_id: Option<i64>) -> Result<Branch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Branch>(
            r#"
            SELECT * FROM branches
            WHERE is_active AND (erp_branch_id = $1 OR is_main_branch)
            ORDER BY (erp_branch_id = $1) DESC NULLS LAST, is_main_branch DESC
            LIMIT 1
            "#,
        )
        .bind(erp_branch_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::ResourceNotFound("Filial".into()))
    }

    pub async fn find_branch<'e, E>(&self, executor: E, branch_id: Uuid) -> Result<Option<Branch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let branch = sqlx::query_as::<_, Branch>("SELECT * FROM branches WHERE id = $1")
            .bind(branch_id)
            .fetch_optional(executor)
            .await?;
        Ok(branch)
    }

    // =========================================================================
    //  TURNOS
    // =========================================================================

    pub async fn find_by_id<'e, E>(&self, executor: E, shift_id: Uuid) -> Result<Option<EmployeeShift>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let shift = sqlx::query_as::<_, EmployeeShift>("SELECT * FROM employee_shifts WHERE id = $1")
            .bind(shift_id)
            .fetch_optional(executor)
            .await?;
        Ok(shift)
    }

    pub async fn find_by_erp_id_for_update<'e, E>(&self, executor: E, erp_shift_id: i64) -> Result<Option<EmployeeShift>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let shift = sqlx::query_as::<_, EmployeeShift>(
            "SELECT * FROM employee_shifts WHERE erp_shift_id = $1 FOR UPDATE",
        )
        .bind(erp_shift_id)
        .fetch_optional(executor)
        .await?;
        Ok(shift)
    }

    pub async fn lock<'e, E>(&self, executor: E, shift_id: Uuid) -> Result<EmployeeShift, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, EmployeeShift>("SELECT * FROM employee_shifts WHERE id = $1 FOR UPDATE")
            .bind(shift_id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Turno".into()))
    }

    /// Upsert pelo id do ERP. Não toca em check-in/out nem em pending_approvals,
/// e um turno `ended` continua `ended`.
    pub async fn upsert<'e, E>(&self, executor: E, shift: &ShiftUpsert) -> Result<EmployeeShift, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, EmployeeShift>(
            r#"
            INSERT INTO employee_shifts (
                erp_shift_id, branch_id, user_id, erp_employee_id,
                shift_start, shift_end, allocated_hours, total_worked_hours, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (erp_shift_id) DO UPDATE SET
                branch_id          = EXCLUDED.branch_id,
                user_id            = COALESCE(EXCLUDED.user_id, employee_shifts.user_id),
                erp_employee_id    = EXCLUDED.erp_employee_id,
                shift_start        = EXCLUDED.shift_start,
                shift_end          = EXCLUDED.shift_end,
                allocated_hours    = EXCLUDED.allocated_hours,
                total_worked_hours = COALESCE(EXCLUDED.total_worked_hours, employee_shifts.total_worked_hours),
                status             = CASE WHEN employee_shifts.status = 'ended'
                                              THEN employee_shifts.status
                                              ELSE EXCLUDED.status END,
                updated_at         = NOW()
            RETURNING *
            "#,
        )
        .bind(shift.erp_shift_id)
        .bind(shift.branch_id)
        .bind(shift.user_id)
        .bind(shift.erp_employee_id)
        .bind(shift.shift_start)
        .bind(shift.shift_end)
        .bind(shift.allocated_hours)
        .bind(shift.total_worked_hours)
        .bind(shift.status)
        .fetch_one(executor)
        .await?;

        Ok(row)
    }

    pub async fn apply_attendance<'e, E>(&self, executor: E, shift_id: Uuid, update: &AttendanceUpdate) -> Result<EmployeeShift, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, EmployeeShift>(
            r#"
            UPDATE employee_shifts SET
                erp_attendance_id  = $2,
                check_in_at        = $3,
                check_out_at       = $4,
                total_worked_hours = COALESCE($5, total_worked_hours),
                status             = $6,
                updated_at         = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(shift_id)
        .bind(update.erp_attendance_id)
        .bind(update.check_in_at)
        .bind(update.check_out_at)
        .bind(update.total_worked_hours)
        .bind(update.status)
        .fetch_one(executor)
        .await?;

        Ok(row)
    }

    /// Soma `delta` ao contador, sem deixar ficar negativo.
    pub async fn adjust_pending<'e, E>(&self, executor: E, shift_id: Uuid, delta: i32) -> Result<EmployeeShift, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, EmployeeShift>(
            r#"
            UPDATE employee_shifts
            SET pending_approvals = GREATEST(pending_approvals + $2, 0), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(shift_id)
        .bind(delta)
        .fetch_one(executor)
        .await?;

        Ok(row)
    }

    /// Passo da troca: só reatribui se o turno ainda estiver com o dono antigo
    /// (ou já com o novo), o que torna o passo idempotente.
    pub async fn reassign_owner<'e, E>(
        &self,
        executor: E,
        shift_id: Uuid,
        from_user: Uuid,
        to_user: Uuid,
        to_erp_employee: Option<i64>,
    ) -> Result<Option<EmployeeShift>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, EmployeeShift>(
            r#"
            UPDATE employee_shifts
            SET user_id = $3,
                erp_employee_id = COALESCE($4, erp_employee_id),
                updated_at = NOW()
            WHERE id = $1 AND user_id IN ($2, $3)
            RETURNING *
            "#,
        )
        .bind(shift_id)
        .bind(from_user)
        .bind(to_user)
        .bind(to_erp_employee)
        .fetch_optional(executor)
        .await?;

        Ok(row)
    }

    pub async fn delete_by_erp_id<'e, E>(&self, executor: E, erp_shift_id: i64) -> Result<Option<EmployeeShift>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, EmployeeShift>("DELETE FROM employee_shifts WHERE erp_shift_id = $1 RETURNING *")
            .bind(erp_shift_id)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    /// Ponto apagado no ERP: limpa as marcações sem mexer nas autorizações já criadas.
    pub async fn clear_attendance<'e, E>(&self, executor: E, erp_attendance_id: i64) -> Result<Option<EmployeeShift>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, EmployeeShift>(
            r#"
            UPDATE employee_shifts
            SET erp_attendance_id = NULL, check_in_at = NULL, check_out_at = NULL, updated_at = NOW()
            WHERE erp_attendance_id = $1
            RETURNING *
            "#,
        )
        .bind(erp_attendance_id)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    // =========================================================================
    //  LOGS (somente INSERT)
    // =========================================================================

    pub async fn append_log<'e, E>(&self, executor: E, log: &NewShiftLog) -> Result<ShiftLog, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ShiftLog>(
            r#"
            INSERT INTO shift_logs (shift_id, log_type, erp_attendance_id, changes, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(log.shift_id)
        .bind(log.log_type)
        .bind(log.erp_attendance_id)
        .bind(&log.changes)
        .bind(log.created_by)
        .fetch_one(executor)
        .await?;

        Ok(row)
    }

    pub async fn list_logs<'e, E>(&self, executor: E, shift_id: Uuid) -> Result<Vec<ShiftLog>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let logs = sqlx::query_as::<_, ShiftLog>("SELECT * FROM shift_logs WHERE shift_id = $1 ORDER BY created_at")
            .bind(shift_id)
            .fetch_all(executor)
            .await?;
        Ok(logs)
    }
}
