// src/models/exchange.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::error::{AppError, Precondition};
use crate::models::auth::{Claims, CAP_APPROVE_EXCHANGES};
use crate::models::shift::{Branch, EmployeeShift};

// --- Enums ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "exchange_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "approval_stage", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStage {
    AwaitingEmployee,
    AwaitingHr,
    Resolved,
}

// Passo persistido da saga de troca (aplicação em cada banco de empresa)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "swap_step", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SwapStep {
    NotStarted,
    RequesterApplied,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeAction {
    Accept,
    Reject,
}

// ---
// ShiftExchangeRequest (no banco master: a única visão consistente entre empresas)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShiftExchangeRequest {
    pub id: Uuid,
    pub requester_user_id: Uuid,
    pub accepting_user_id: Uuid,

    pub requester_company_id: Uuid,
    pub requester_db_name: String,
    pub requester_branch_id: Uuid,
    pub requester_shift_id: Uuid,
    pub requester_erp_shift_id: Option<i64>,

    pub accepting_company_id: Uuid,
    pub accepting_db_name: String,
    pub accepting_branch_id: Uuid,
    pub accepting_shift_id: Uuid,
    pub accepting_erp_shift_id: Option<i64>,

    pub status: ExchangeStatus,
    pub approval_stage: ApprovalStage,
    pub request_reason: Option<String>,

    pub employee_decision_at: Option<DateTime<Utc>>,
    pub employee_rejection_reason: Option<String>,
    pub hr_decision_by: Option<Uuid>,
    pub hr_decision_at: Option<DateTime<Utc>>,
    pub hr_rejection_reason: Option<String>,

    pub swap_step: SwapStep,
    pub swap_attempts: i32,
    pub swap_last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShiftExchangeRequest {
    /// Valida a resposta do funcionário convidado e devolve o motivo (se houver).
    pub fn check_respond(
        &self,
        acting_user_id: Uuid,
        action: EmployeeAction,
        reason: Option<&str>,
    ) -> Result<Option<String>, AppError> {
        if self.accepting_user_id != acting_user_id {
            return Err(Precondition::NotAcceptingEmployee.into());
        }
        if self.approval_stage != ApprovalStage::AwaitingEmployee {
            return Err(self.stage_error(Precondition::ExchangeNotAwaitingEmployee));
        }
        let reason = reason.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string);
        Ok(match action {
            EmployeeAction::Accept => None,
            EmployeeAction::Reject => reason,
        })
    }

    /// Aprovação do RH: só depois do aceite do funcionário.
    pub fn check_hr_approve(&self) -> Result<(), AppError> {
        if self.approval_stage != ApprovalStage::AwaitingHr {
            return Err(self.stage_error(Precondition::ExchangeNotAwaitingHr));
        }
        Ok(())
    }

    pub fn check_hr_reject(&self, reason: Option<&str>) -> Result<String, AppError> {
        self.check_hr_approve()?;
        match reason.map(str::trim) {
            Some(r) if !r.is_empty() => Ok(r.to_string()),
            _ => Err(Precondition::RejectionReasonRequired.into()),
        }
    }

    pub fn involves_company(&self, company_id: Uuid) -> bool {
        self.requester_company_id == company_id || self.accepting_company_id == company_id
    }

    /// O RH só decide trocas que tocam uma das empresas do seu token.
    pub fn check_hr_scope(&self, claims: &Claims) -> Result<(), AppError> {
        if claims.company_ids.iter().any(|c| self.involves_company(*c)) {
            Ok(())
        } else {
            Err(AppError::Forbidden("A troca não envolve nenhuma das suas empresas.".into()))
        }
    }

    /// Leitura do detalhe: os dois funcionários ou o RH de uma das empresas.
    pub fn check_visible_to(&self, claims: &Claims) -> Result<(), AppError> {
        if claims.sub == self.requester_user_id || claims.sub == self.accepting_user_id {
            return Ok(());
        }
        if claims.has_capability(CAP_APPROVE_EXCHANGES) {
            return self.check_hr_scope(claims);
        }
        Err(AppError::Forbidden("Você não participa desta troca.".into()))
    }

    fn stage_error(&self, when_pending: Precondition) -> AppError {
        if self.approval_stage == ApprovalStage::Resolved {
            Precondition::ExchangeAlreadyResolved.into()
        } else {
            when_pending.into()
        }
    }

    pub fn needs_swap(&self) -> bool {
        self.status == ExchangeStatus::Approved && self.swap_step != SwapStep::Completed
    }
}

// Dados para inserir uma nova solicitação
#[derive(Debug, Clone)]
pub struct NewExchangeRequest {
    pub requester_user_id: Uuid,
    pub accepting_user_id: Uuid,
    pub requester_company_id: Uuid,
    pub requester_db_name: String,
    pub requester_branch_id: Uuid,
    pub requester_shift_id: Uuid,
    pub requester_erp_shift_id: Option<i64>,
    pub accepting_company_id: Uuid,
    pub accepting_db_name: String,
    pub accepting_branch_id: Uuid,
    pub accepting_shift_id: Uuid,
    pub accepting_erp_shift_id: Option<i64>,
    pub request_reason: Option<String>,
}

// --- Payloads ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateExchangePayload {
    pub requester_shift_id: Uuid,
    pub target_company_id: Uuid,
    pub target_shift_id: Uuid,
    #[validate(length(max = 500, message = "Motivo muito longo"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RespondExchangePayload {
    pub action: EmployeeAction,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HrRejectPayload {
    pub reason: Option<String>,
}

// --- Resposta "mesclada" com dados dos dois bancos ---

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSide {
    pub company_id: Uuid,
    pub shift: Option<EmployeeShift>,
    pub branch: Option<Branch>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeDetail {
    #[serde(flatten)]
    pub request: ShiftExchangeRequest,
    pub requester: ExchangeSide,
    pub accepting: ExchangeSide,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(stage: ApprovalStage, status: ExchangeStatus) -> ShiftExchangeRequest {
        let now = Utc::now();
        ShiftExchangeRequest {
            id: Uuid::new_v4(),
            requester_user_id: Uuid::from_u128(1),
            accepting_user_id: Uuid::from_u128(2),
            requester_company_id: Uuid::from_u128(10),
            requester_db_name: "tenant_a".into(),
            requester_branch_id: Uuid::new_v4(),
            requester_shift_id: Uuid::new_v4(),
            requester_erp_shift_id: Some(100),
            accepting_company_id: Uuid::from_u128(20),
            accepting_db_name: "tenant_b".into(),
            accepting_branch_id: Uuid::new_v4(),
            accepting_shift_id: Uuid::new_v4(),
            accepting_erp_shift_id: Some(200),
            status,
            approval_stage: stage,
            request_reason: None,
            employee_decision_at: None,
            employee_rejection_reason: None,
            hr_decision_by: None,
            hr_decision_at: None,
            hr_rejection_reason: None,
            swap_step: SwapStep::NotStarted,
            swap_attempts: 0,
            swap_last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn precondition(err: AppError) -> Precondition {
        match err {
            AppError::Precondition(p) => p,
            other => panic!("esperava Precondition, veio {:?}", other),
        }
    }

    #[test]
    fn only_accepting_user_responds() {
        let r = request(ApprovalStage::AwaitingEmployee, ExchangeStatus::Pending);
        let err = r.check_respond(Uuid::from_u128(1), EmployeeAction::Accept, None).unwrap_err();
        assert_eq!(precondition(err), Precondition::NotAcceptingEmployee);
        assert!(r.check_respond(Uuid::from_u128(2), EmployeeAction::Accept, None).is_ok());
    }

    #[test]
    fn reject_keeps_trimmed_reason() {
        let r = request(ApprovalStage::AwaitingEmployee, ExchangeStatus::Pending);
        let reason = r
            .check_respond(Uuid::from_u128(2), EmployeeAction::Reject, Some("  tenho consulta "))
            .unwrap();
        assert_eq!(reason.as_deref(), Some("tenho consulta"));
    }

    #[test]
    fn hr_cannot_approve_before_employee_accepts() {
        let r = request(ApprovalStage::AwaitingEmployee, ExchangeStatus::Pending);
        assert_eq!(precondition(r.check_hr_approve().unwrap_err()), Precondition::ExchangeNotAwaitingHr);

        let accepted = request(ApprovalStage::AwaitingHr, ExchangeStatus::Pending);
        assert!(accepted.check_hr_approve().is_ok());
        assert_eq!(
            precondition(accepted.check_respond(Uuid::from_u128(2), EmployeeAction::Accept, None).unwrap_err()),
            Precondition::ExchangeNotAwaitingEmployee
        );
    }

    #[test]
    fn resolved_requests_report_already_resolved() {
        let r = request(ApprovalStage::Resolved, ExchangeStatus::Rejected);
        assert_eq!(precondition(r.check_hr_approve().unwrap_err()), Precondition::ExchangeAlreadyResolved);
        assert_eq!(
            precondition(r.check_respond(Uuid::from_u128(2), EmployeeAction::Reject, None).unwrap_err()),
            Precondition::ExchangeAlreadyResolved
        );
    }

    #[test]
    fn hr_reject_requires_reason() {
        let r = request(ApprovalStage::AwaitingHr, ExchangeStatus::Pending);
        assert_eq!(precondition(r.check_hr_reject(Some(" ")).unwrap_err()), Precondition::RejectionReasonRequired);
        assert_eq!(r.check_hr_reject(Some("escala fechada")).unwrap(), "escala fechada");
    }

    #[test]
    fn swap_needed_only_after_approval() {
        let mut r = request(ApprovalStage::Resolved, ExchangeStatus::Approved);
        assert!(r.needs_swap());
        r.swap_step = SwapStep::Completed;
        assert!(!r.needs_swap());
        assert!(!request(ApprovalStage::AwaitingHr, ExchangeStatus::Pending).needs_swap());
    }

    fn hr(company_ids: Vec<Uuid>) -> Claims {
        Claims {
            sub: Uuid::from_u128(99),
            exp: 0,
            iat: 0,
            company_ids,
            branch_ids: vec![],
            capabilities: vec![CAP_APPROVE_EXCHANGES.to_string()],
        }
    }

    #[test]
    fn hr_acts_only_on_exchanges_of_its_companies() {
        let r = request(ApprovalStage::AwaitingHr, ExchangeStatus::Pending);
        assert!(r.check_hr_scope(&hr(vec![Uuid::from_u128(10)])).is_ok());
        assert!(r.check_hr_scope(&hr(vec![Uuid::from_u128(20)])).is_ok());

        let outsider = hr(vec![Uuid::from_u128(30)]);
        assert!(matches!(r.check_hr_scope(&outsider), Err(AppError::Forbidden(_))));
        assert!(matches!(r.check_visible_to(&outsider), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn participants_see_the_detail_without_capability() {
        let r = request(ApprovalStage::AwaitingEmployee, ExchangeStatus::Pending);
        let mut employee = hr(vec![]);
        employee.capabilities.clear();
        employee.sub = Uuid::from_u128(2);
        assert!(r.check_visible_to(&employee).is_ok());

        employee.sub = Uuid::from_u128(5);
        assert!(matches!(r.check_visible_to(&employee), Err(AppError::Forbidden(_))));
    }
}
