// src/models/authorization.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::{AppError, Precondition};
use crate::models::auth::{Claims, CAP_RESOLVE_AUTHORIZATIONS, CAP_VIEW_ALL_BRANCHES};

// --- Enums ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "authorization_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationType {
    EarlyCheckIn,
    Tardiness,
    EarlyCheckOut,
    LateCheckOut,
    Overtime,
}

impl AuthorizationType {
    /// Tipos em que o funcionário precisa justificar antes da aprovação.
    pub fn needs_employee_reason(self) -> bool {
        matches!(self, AuthorizationType::Tardiness | AuthorizationType::EarlyCheckOut)
    }

    pub fn label(self) -> &'static str {
        match self {
            AuthorizationType::EarlyCheckIn => "Entrada antecipada",
            AuthorizationType::Tardiness => "Atraso",
            AuthorizationType::EarlyCheckOut => "Saída antecipada",
            AuthorizationType::LateCheckOut => "Saída tardia",
            AuthorizationType::Overtime => "Hora extra",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "authorization_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "overtime_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OvertimeType {
    NormalOvertime,
    OvertimePremium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Approved,
    Rejected,
}

impl Resolution {
    pub fn status(self) -> AuthorizationStatus {
        match self {
            Resolution::Approved => AuthorizationStatus::Approved,
            Resolution::Rejected => AuthorizationStatus::Rejected,
        }
    }
}

// ---
// ShiftAuthorization
// ---
// pending -> {approved, rejected}. Estados terminais não reabrem.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShiftAuthorization {
    pub id: Uuid,
    pub shift_id: Uuid,
    pub branch_id: Uuid,
    pub user_id: Option<Uuid>,
    pub auth_type: AuthorizationType,
    #[schema(example = 90)]
    pub diff_minutes: i32,
    pub needs_employee_reason: bool,
    pub employee_reason: Option<String>,
    pub status: AuthorizationStatus,
    pub overtime_type: Option<OvertimeType>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShiftAuthorization {
    fn ensure_pending(&self) -> Result<(), AppError> {
        if self.status != AuthorizationStatus::Pending {
            return Err(Precondition::AuthorizationAlreadyResolved.into());
        }
        Ok(())
    }

    /// Valida `submitReason` e devolve a justificativa já aparada.
    pub fn check_submit_reason(&self, employee_id: Uuid, reason: &str) -> Result<String, AppError> {
        self.ensure_pending()?;
        if self.user_id != Some(employee_id) {
            return Err(Precondition::NotAuthorizationOwner.into());
        }
        if !self.needs_employee_reason {
            return Err(Precondition::ReasonNotRequired.into());
        }
        if self.employee_reason.is_some() {
            return Err(Precondition::ReasonAlreadySubmitted.into());
        }
        let trimmed = reason.trim();
        if trimmed.is_empty() {
            return Err(Precondition::ReasonEmpty.into());
        }
        Ok(trimmed.to_string())
    }

    /// Valida `approve`. Hora extra exige o tipo; os demais tipos não aceitam tipo.
    pub fn check_approve(&self, overtime_type: Option<OvertimeType>) -> Result<Option<OvertimeType>, AppError> {
        self.ensure_pending()?;
        if self.needs_employee_reason && self.employee_reason.is_none() {
            return Err(Precondition::ReasonNotSubmitted.into());
        }
        match (self.auth_type, overtime_type) {
            (AuthorizationType::Overtime, None) => Err(Precondition::OvertimeTypeRequired.into()),
            (AuthorizationType::Overtime, Some(kind)) => Ok(Some(kind)),
            (_, Some(_)) => Err(Precondition::OvertimeTypeNotApplicable.into()),
            (_, None) => Ok(None),
        }
    }

    /// Valida `reject`. Não depende da justificativa do funcionário.
    pub fn check_reject(&self, reason: Option<&str>) -> Result<String, AppError> {
        self.ensure_pending()?;
        match reason.map(str::trim) {
            Some(r) if !r.is_empty() => Ok(r.to_string()),
            _ => Err(Precondition::RejectionReasonRequired.into()),
        }
    }
}

/// O que o usuário alcança: gestor vê as filiais atribuídas (ou todas),
/// funcionário vê só as próprias autorizações.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationScope {
    AllBranches,
    Branches(Vec<Uuid>),
    OwnUser(Uuid),
}

impl AuthorizationScope {
    pub fn for_claims(claims: &Claims) -> Self {
        if !claims.has_capability(CAP_RESOLVE_AUTHORIZATIONS) {
            AuthorizationScope::OwnUser(claims.sub)
        } else if claims.has_capability(CAP_VIEW_ALL_BRANCHES) {
            AuthorizationScope::AllBranches
        } else {
            AuthorizationScope::Branches(claims.branch_ids.clone())
        }
    }

    pub fn allows(&self, authorization: &ShiftAuthorization) -> bool {
        match self {
            AuthorizationScope::AllBranches => true,
            AuthorizationScope::Branches(ids) => ids.contains(&authorization.branch_id),
            AuthorizationScope::OwnUser(user_id) => authorization.user_id == Some(*user_id),
        }
    }

    pub fn ensure(&self, authorization: &ShiftAuthorization) -> Result<(), AppError> {
        if self.allows(authorization) {
            Ok(())
        } else {
            Err(AppError::Forbidden("Autorização fora do seu escopo de filiais.".into()))
        }
    }

    /// Filtros equivalentes para a listagem: (filiais, usuário).
    pub fn list_filters(&self) -> (Option<&[Uuid]>, Option<Uuid>) {
        match self {
            AuthorizationScope::AllBranches => (None, None),
            AuthorizationScope::Branches(ids) => (Some(ids.as_slice()), None),
            AuthorizationScope::OwnUser(user_id) => (None, Some(*user_id)),
        }
    }
}

// Usado pelo projetor ao detectar desvios de ponto
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuthorization {
    pub shift_id: Uuid,
    pub branch_id: Uuid,
    pub user_id: Option<Uuid>,
    pub auth_type: AuthorizationType,
    pub diff_minutes: i32,
    pub needs_employee_reason: bool,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AuthorizationFilter {
    pub status: Option<AuthorizationStatus>,
    pub branch_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(auth_type: AuthorizationType, needs_reason: bool) -> ShiftAuthorization {
        let now = Utc::now();
        ShiftAuthorization {
            id: Uuid::new_v4(),
            shift_id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            user_id: Some(Uuid::from_u128(7)),
            auth_type,
            diff_minutes: 20,
            needs_employee_reason: needs_reason,
            employee_reason: None,
            status: AuthorizationStatus::Pending,
            overtime_type: None,
            resolved_by: None,
            resolved_at: None,
            rejection_reason: None,
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
    fn approve_requires_submitted_reason_when_needed() {
        let a = auth(AuthorizationType::Tardiness, true);
        assert_eq!(precondition(a.check_approve(None).unwrap_err()), Precondition::ReasonNotSubmitted);

        let mut with_reason = a.clone();
        with_reason.employee_reason = Some("ônibus atrasou".into());
        assert_eq!(with_reason.check_approve(None).unwrap(), None);
    }

    #[test]
    fn reject_does_not_need_employee_reason() {
        let a = auth(AuthorizationType::Tardiness, true);
        assert_eq!(a.check_reject(Some("  sem justificativa  ")).unwrap(), "sem justificativa");
        assert_eq!(precondition(a.check_reject(Some("   ")).unwrap_err()), Precondition::RejectionReasonRequired);
        assert_eq!(precondition(a.check_reject(None).unwrap_err()), Precondition::RejectionReasonRequired);
    }

    #[test]
    fn overtime_approval_needs_overtime_type() {
        let a = auth(AuthorizationType::Overtime, false);
        assert_eq!(precondition(a.check_approve(None).unwrap_err()), Precondition::OvertimeTypeRequired);
        assert_eq!(
            a.check_approve(Some(OvertimeType::OvertimePremium)).unwrap(),
            Some(OvertimeType::OvertimePremium)
        );

        let tardy = auth(AuthorizationType::EarlyCheckIn, false);
        assert_eq!(
            precondition(tardy.check_approve(Some(OvertimeType::NormalOvertime)).unwrap_err()),
            Precondition::OvertimeTypeNotApplicable
        );
    }

    #[test]
    fn submit_reason_rules() {
        let owner = Uuid::from_u128(7);
        let a = auth(AuthorizationType::Tardiness, true);
        assert_eq!(a.check_submit_reason(owner, "  trânsito ").unwrap(), "trânsito");
        assert_eq!(precondition(a.check_submit_reason(owner, "  ").unwrap_err()), Precondition::ReasonEmpty);
        assert_eq!(
            precondition(a.check_submit_reason(Uuid::from_u128(8), "x").unwrap_err()),
            Precondition::NotAuthorizationOwner
        );

        let mut submitted = a.clone();
        submitted.employee_reason = Some("já enviei".into());
        assert_eq!(
            precondition(submitted.check_submit_reason(owner, "de novo").unwrap_err()),
            Precondition::ReasonAlreadySubmitted
        );

        let no_reason = auth(AuthorizationType::LateCheckOut, false);
        assert_eq!(
            precondition(no_reason.check_submit_reason(owner, "x").unwrap_err()),
            Precondition::ReasonNotRequired
        );
    }

    #[test]
    fn terminal_states_do_not_reopen() {
        let mut a = auth(AuthorizationType::Overtime, false);
        a.status = AuthorizationStatus::Approved;
        assert_eq!(
            precondition(a.check_approve(Some(OvertimeType::NormalOvertime)).unwrap_err()),
            Precondition::AuthorizationAlreadyResolved
        );
        assert_eq!(precondition(a.check_reject(Some("x")).unwrap_err()), Precondition::AuthorizationAlreadyResolved);
        assert_eq!(
            precondition(a.check_submit_reason(Uuid::from_u128(7), "x").unwrap_err()),
            Precondition::AuthorizationAlreadyResolved
        );
    }

    #[test]
    fn reason_requirement_per_type() {
        assert!(AuthorizationType::Tardiness.needs_employee_reason());
        assert!(AuthorizationType::EarlyCheckOut.needs_employee_reason());
        assert!(!AuthorizationType::EarlyCheckIn.needs_employee_reason());
        assert!(!AuthorizationType::LateCheckOut.needs_employee_reason());
        assert!(!AuthorizationType::Overtime.needs_employee_reason());
    }

    fn claims(capabilities: &[&str], branch_ids: Vec<Uuid>) -> Claims {
        Claims {
            sub: Uuid::from_u128(50),
            exp: 0,
            iat: 0,
            company_ids: vec![],
            branch_ids,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn branch_manager_only_reaches_assigned_branches() {
        let a = auth(AuthorizationType::Tardiness, true);
        let elsewhere = claims(&[CAP_RESOLVE_AUTHORIZATIONS], vec![Uuid::from_u128(900)]);
        let scope = AuthorizationScope::for_claims(&elsewhere);
        assert!(matches!(scope.ensure(&a), Err(AppError::Forbidden(_))));

        let here = AuthorizationScope::for_claims(&claims(&[CAP_RESOLVE_AUTHORIZATIONS], vec![a.branch_id]));
        assert!(here.allows(&a));

        let all = AuthorizationScope::for_claims(&claims(&[CAP_RESOLVE_AUTHORIZATIONS, CAP_VIEW_ALL_BRANCHES], vec![]));
        assert_eq!(all, AuthorizationScope::AllBranches);
        assert!(all.allows(&a));
    }

    #[test]
    fn employee_only_reaches_own_authorizations() {
        let a = auth(AuthorizationType::Tardiness, true);
        let mut employee = claims(&[], vec![a.branch_id]);
        assert!(!AuthorizationScope::for_claims(&employee).allows(&a));

        employee.sub = Uuid::from_u128(7);
        let scope = AuthorizationScope::for_claims(&employee);
        assert!(scope.allows(&a));
        assert_eq!(scope.list_filters(), (None, Some(Uuid::from_u128(7))));
    }
}
