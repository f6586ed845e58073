// src/models/shift.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enums ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "shift_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Open,
    Started,
    Ended,
}

impl ShiftStatus {
    /// Converte o `state` do ERP. Estados desconhecidos não são aceitos.
    pub fn from_erp_state(state: &str) -> Option<Self> {
        match state.trim().to_lowercase().as_str() {
            "draft" | "open" | "planned" | "published" => Some(ShiftStatus::Open),
            "started" | "in_progress" | "progress" => Some(ShiftStatus::Started),
            "ended" | "done" | "closed" => Some(ShiftStatus::Ended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "shift_log_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShiftLogType {
    ShiftEnded,
    AuthorizationCreated,
    AuthorizationResolved,
    AttendanceRecorded,
    ExchangeApplied,
}

// ---
// Branch (a "Filial")
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: Uuid,
    pub erp_branch_id: Option<i64>,
    #[schema(example = "Matriz")]
    pub name: String,
    pub is_active: bool,
    pub is_main_branch: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// EmployeeShift (o "Turno")
// ---
// pending_approvals só é alterado pelo fluxo de autorizações.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeShift {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub user_id: Option<Uuid>,
    pub erp_shift_id: i64,
    pub erp_employee_id: Option<i64>,
    pub erp_attendance_id: Option<i64>,
    pub shift_start: DateTime<Utc>,
    pub shift_end: DateTime<Utc>,
    pub check_in_at: Option<DateTime<Utc>>,
    pub check_out_at: Option<DateTime<Utc>>,
    #[schema(example = "8.0")]
    pub allocated_hours: Decimal,
    #[schema(example = "9.5")]
    pub total_worked_hours: Option<Decimal>,
    pub status: ShiftStatus,
    pub pending_approvals: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// O que o projetor grava (chaveado pelo id externo do ERP)
#[derive(Debug, Clone)]
pub struct ShiftUpsert {
    pub erp_shift_id: i64,
    pub branch_id: Uuid,
    pub user_id: Option<Uuid>,
    pub erp_employee_id: Option<i64>,
    pub shift_start: DateTime<Utc>,
    pub shift_end: DateTime<Utc>,
    pub allocated_hours: Decimal,
    pub total_worked_hours: Option<Decimal>,
    pub status: ShiftStatus,
}

#[derive(Debug, Clone)]
pub struct AttendanceUpdate {
    pub erp_attendance_id: i64,
    pub check_in_at: DateTime<Utc>,
    pub check_out_at: Option<DateTime<Utc>>,
    pub total_worked_hours: Option<Decimal>,
    pub status: ShiftStatus,
}

// ---
// ShiftLog (trilha de auditoria, nunca atualizada)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShiftLog {
    pub id: Uuid,
    pub shift_id: Uuid,
    pub log_type: ShiftLogType,
    pub erp_attendance_id: Option<i64>,
    #[schema(value_type = Object)]
    pub changes: Value,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewShiftLog {
    pub shift_id: Uuid,
    pub log_type: ShiftLogType,
    pub erp_attendance_id: Option<i64>,
    pub changes: Value,
    pub created_by: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_erp_states() {
        assert_eq!(ShiftStatus::from_erp_state("Draft"), Some(ShiftStatus::Open));
        assert_eq!(ShiftStatus::from_erp_state("in_progress"), Some(ShiftStatus::Started));
        assert_eq!(ShiftStatus::from_erp_state(" done "), Some(ShiftStatus::Ended));
        assert_eq!(ShiftStatus::from_erp_state("cancel"), None);
    }
}
