// src/models/erp.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::authorization::{AuthorizationType, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "erp_sync_operation", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErpSyncOperation {
    RewriteCheckIn,
    RewriteCheckOut,
}

impl ErpSyncOperation {
    /// Qual reescrita de ponto uma resolução exige no ERP (se exigir).
    pub fn for_resolution(auth_type: AuthorizationType, resolution: Resolution) -> Option<Self> {
        match (auth_type, resolution) {
            (AuthorizationType::Tardiness, Resolution::Approved) => Some(ErpSyncOperation::RewriteCheckIn),
            (AuthorizationType::EarlyCheckIn, Resolution::Rejected) => Some(ErpSyncOperation::RewriteCheckIn),
            (AuthorizationType::LateCheckOut, Resolution::Rejected) => Some(ErpSyncOperation::RewriteCheckOut),
            _ => None,
        }
    }

    /// Horário agendado que passa a valer no ERP.
    pub fn target_time(self, shift_start: DateTime<Utc>, shift_end: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ErpSyncOperation::RewriteCheckIn => shift_start,
            ErpSyncOperation::RewriteCheckOut => shift_end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "erp_sync_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErpSyncStatus {
    Pending,
    Done,
    Dead,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErpSyncJob {
    pub id: Uuid,
    pub operation: ErpSyncOperation,
    pub authorization_id: Uuid,
    pub erp_attendance_id: i64,
    pub target_time: DateTime<Utc>,
    pub status: ErpSyncStatus,
    pub attempt: i32,
    pub due_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewErpSyncJob {
    pub operation: ErpSyncOperation,
    pub authorization_id: Uuid,
    pub erp_attendance_id: i64,
    pub target_time: DateTime<Utc>,
}

/// Funcionário lido do ERP (hr.employee).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErpEmployee {
    pub id: i64,
    pub name: String,
    pub work_email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn back_sync_plan_per_type_and_outcome() {
        use AuthorizationType::*;
        assert_eq!(ErpSyncOperation::for_resolution(Tardiness, Resolution::Approved), Some(ErpSyncOperation::RewriteCheckIn));
        assert_eq!(ErpSyncOperation::for_resolution(Tardiness, Resolution::Rejected), None);
        assert_eq!(ErpSyncOperation::for_resolution(EarlyCheckIn, Resolution::Rejected), Some(ErpSyncOperation::RewriteCheckIn));
        assert_eq!(ErpSyncOperation::for_resolution(EarlyCheckIn, Resolution::Approved), None);
        assert_eq!(ErpSyncOperation::for_resolution(LateCheckOut, Resolution::Rejected), Some(ErpSyncOperation::RewriteCheckOut));
        assert_eq!(ErpSyncOperation::for_resolution(Overtime, Resolution::Approved), None);
        assert_eq!(ErpSyncOperation::for_resolution(EarlyCheckOut, Resolution::Rejected), None);
    }

    #[test]
    fn target_time_uses_schedule_boundaries() {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 10, 16, 0, 0).unwrap();
        assert_eq!(ErpSyncOperation::RewriteCheckIn.target_time(start, end), start);
        assert_eq!(ErpSyncOperation::RewriteCheckOut.target_time(start, end), end);
    }
}
