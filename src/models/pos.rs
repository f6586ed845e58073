// src/models/pos.rs
//
// Projeções simples do PDV: upsert pelo id externo do ERP, sem efeitos derivados.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PosSession {
    pub id: Uuid,
    pub erp_session_id: i64,
    pub name: String,
    pub state: String,
    pub erp_user_id: Option<i64>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PosVerification {
    pub id: Uuid,
    pub erp_verification_id: i64,
    pub erp_session_id: Option<i64>,
    pub erp_employee_id: Option<i64>,
    pub result: String,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PosOrder {
    pub id: Uuid,
    pub erp_order_id: i64,
    pub erp_session_id: Option<i64>,
    pub name: String,
    pub state: String,
    pub amount_total: Decimal,
    pub ordered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CashMovement {
    pub id: Uuid,
    pub erp_movement_id: i64,
    pub erp_session_id: Option<i64>,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub moved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
