// src/db/pos_repo.rs
//
// Projeções do PDV: upsert pelo id externo, delete quando o ERP apaga.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, Postgres};

use crate::{
    common::error::AppError,
    models::pos::{CashMovement, PosOrder, PosSession, PosVerification},
};

#[derive(Clone, Default)]
pub struct PosRepository;

impl PosRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn upsert_session<'e, E>(
        &self,
        executor: E,
        erp_session_id: i64,
        name: &str,
        state: &str,
        erp_user_id: Option<i64>,
        opened_at: Option<DateTime<Utc>>,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<PosSession, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, PosSession>(
            r#"
            INSERT INTO pos_sessions (erp_session_id, name, state, erp_user_id, opened_at, closed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (erp_session_id) DO UPDATE SET
                name = EXCLUDED.name,
                state = EXCLUDED.state,
                erp_user_id = EXCLUDED.erp_user_id,
                opened_at = EXCLUDED.opened_at,
                closed_at = EXCLUDED.closed_at,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(erp_session_id)
        .bind(name)
        .bind(state)
        .bind(erp_user_id)
        .bind(opened_at)
        .bind(closed_at)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    pub async fn upsert_verification<'e, E>(
        &self,
        executor: E,
        erp_verification_id: i64,
        erp_session_id: Option<i64>,
        erp_employee_id: Option<i64>,
        result: &str,
        verified_at: Option<DateTime<Utc>>,
    ) -> Result<PosVerification, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, PosVerification>(
            r#"
            INSERT INTO pos_verifications (erp_verification_id, erp_session_id, erp_employee_id, result, verified_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (erp_verification_id) DO UPDATE SET
                erp_session_id = EXCLUDED.erp_session_id,
                erp_employee_id = EXCLUDED.erp_employee_id,
                result = EXCLUDED.result,
                verified_at = EXCLUDED.verified_at,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(erp_verification_id)
        .bind(erp_session_id)
        .bind(erp_employee_id)
        .bind(result)
        .bind(verified_at)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    pub async fn upsert_order<'e, E>(
        &self,
        executor: E,
        erp_order_id: i64,
        erp_session_id: Option<i64>,
        name: &str,
        state: &str,
        amount_total: Decimal,
        ordered_at: Option<DateTime<Utc>>,
    ) -> Result<PosOrder, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, PosOrder>(
            r#"
            INSERT INTO pos_orders (erp_order_id, erp_session_id, name, state, amount_total, ordered_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (erp_order_id) DO UPDATE SET
                erp_session_id = EXCLUDED.erp_session_id,
                name = EXCLUDED.name,
                state = EXCLUDED.state,
                amount_total = EXCLUDED.amount_total,
                ordered_at = EXCLUDED.ordered_at,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(erp_order_id)
        .bind(erp_session_id)
        .bind(name)
        .bind(state)
        .bind(amount_total)
        .bind(ordered_at)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    pub async fn upsert_cash_movement<'e, E>(
        &self,
        executor: E,
        erp_movement_id: i64,
        erp_session_id: Option<i64>,
        amount: Decimal,
        reason: Option<&str>,
        moved_at: Option<DateTime<Utc>>,
    ) -> Result<CashMovement, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, CashMovement>(
            r#"
            INSERT INTO cash_movements (erp_movement_id, erp_session_id, amount, reason, moved_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (erp_movement_id) DO UPDATE SET
                erp_session_id = EXCLUDED.erp_session_id,
                amount = EXCLUDED.amount,
                reason = EXCLUDED.reason,
                moved_at = EXCLUDED.moved_at,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(erp_movement_id)
        .bind(erp_session_id)
        .bind(amount)
        .bind(reason)
        .bind(moved_at)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    /// Apaga pelo id externo. A tabela vem de uma lista fechada, nunca do payload.
    pub async fn delete_by_external_id<'e, E>(&self, executor: E, table: PosTable, external_id: i64) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let (table_name, column) = table.target();
        let sql = format!("DELETE FROM {} WHERE {} = $1", table_name, column);
        let result = sqlx::query(&sql).bind(external_id).execute(executor).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosTable {
    Sessions,
    Verifications,
    Orders,
    CashMovements,
}

impl PosTable {
    fn target(self) -> (&'static str, &'static str) {
        match self {
            PosTable::Sessions => ("pos_sessions", "erp_session_id"),
            PosTable::Verifications => ("pos_verifications", "erp_verification_id"),
            PosTable::Orders => ("pos_orders", "erp_order_id"),
            PosTable::CashMovements => ("cash_movements", "erp_movement_id"),
        }
    }
}
