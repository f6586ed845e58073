// src/services/exchange_service.rs
//
// Troca de turnos entre funcionários (possivelmente de empresas diferentes).
// A solicitação vive no banco master; a aplicação da troca é uma saga de dois
// passos, um em cada banco de empresa, com o passo atual persistido.

use std::time::Duration;

use serde_json::json;
use sqlx::PgPool;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    common::error::{AppError, Precondition},
    db::{CompanyRepository, ExchangeRepository, ShiftRepository, TenantPoolRegistry},
    models::{
        auth::Claims,
        company::Company,
        exchange::{
            CreateExchangePayload, EmployeeAction, ExchangeDetail, ExchangeSide, NewExchangeRequest,
            ShiftExchangeRequest, SwapStep,
        },
        notification::NewNotification,
        realtime::{RealtimeEventKind, Room},
        shift::{EmployeeShift, NewShiftLog, ShiftLogType, ShiftStatus},
    },
    services::{notification_service::NotificationService, realtime::RealtimeHub},
};

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub interval: Duration,
    pub max_attempts: i32,
}

/// O que fazer com um lado da troca, dado o dono atual do turno.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SideAction {
    Apply,
    AlreadyApplied,
    OwnerChanged,
}

fn side_action(current_owner: Option<Uuid>, from_user: Uuid, to_user: Uuid) -> SideAction {
    match current_owner {
        Some(owner) if owner == to_user => SideAction::AlreadyApplied,
        Some(owner) if owner == from_user => SideAction::Apply,
        _ => SideAction::OwnerChanged,
    }
}

/// Regras de criação sobre os dois turnos já carregados.
fn check_pair(requester_user: Uuid, requester_shift: &EmployeeShift, target_shift: &EmployeeShift) -> Result<Uuid, AppError> {
    if requester_shift.user_id != Some(requester_user) {
        return Err(Precondition::NotShiftOwner.into());
    }
    let Some(accepting_user) = target_shift.user_id else {
        return Err(Precondition::ShiftWithoutEmployee.into());
    };
    if accepting_user == requester_user {
        return Err(Precondition::SameEmployee.into());
    }
    if requester_shift.status == ShiftStatus::Ended || target_shift.status == ShiftStatus::Ended {
        return Err(Precondition::ShiftAlreadyEnded.into());
    }
    Ok(accepting_user)
}

/// Ordem fixa de travamento para duas criações concorrentes não se bloquearem mutuamente.
fn lock_order(a: (Uuid, Uuid), b: (Uuid, Uuid)) -> Vec<(Uuid, Uuid)> {
    let mut keys = vec![a, b];
    keys.sort();
    keys.dedup();
    keys
}

#[derive(Clone)]
pub struct ExchangeService {
    registry: TenantPoolRegistry,
    companies: CompanyRepository,
    exchanges: ExchangeRepository,
    shifts: ShiftRepository,
    notifications: NotificationService,
    hub: RealtimeHub,
    reconcile: ReconcileSettings,
}

impl ExchangeService {
    pub fn new(
        registry: TenantPoolRegistry,
        companies: CompanyRepository,
        exchanges: ExchangeRepository,
        shifts: ShiftRepository,
        notifications: NotificationService,
        hub: RealtimeHub,
        reconcile: ReconcileSettings,
    ) -> Self {
        Self { registry, companies, exchanges, shifts, notifications, hub, reconcile }
    }

    // =========================================================================
    //  CRIAÇÃO
    // =========================================================================

    #[tracing::instrument(skip_all, fields(requester = %requester_user, company_id = %requester_company.id))]
    pub async fn create(
        &self,
        requester_user: Uuid,
        requester_company: &Company,
        payload: &CreateExchangePayload,
    ) -> Result<ShiftExchangeRequest, AppError> {
        let master = self.registry.get_master().await?;
        let target_company = self.companies.find_active(&master, payload.target_company_id).await?;

        let requester_pool = self.registry.get_tenant(&requester_company.db_name).await?;
        let requester_shift = self
            .shifts
            .find_by_id(&requester_pool, payload.requester_shift_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Turno".into()))?;

        let target_pool = self.registry.get_tenant(&target_company.db_name).await?;
        let target_shift = self
            .shifts
            .find_by_id(&target_pool, payload.target_shift_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Turno alvo".into()))?;

        let accepting_user = check_pair(requester_user, &requester_shift, &target_shift)?;

        let requester_key = (requester_company.id, requester_shift.id);
        let target_key = (target_company.id, target_shift.id);

        // Checagem e inserção sob os locks dos dois turnos, em qualquer papel
        let mut tx = master.begin().await?;
        for (company_id, shift_id) in lock_order(requester_key, target_key) {
            self.exchanges.lock_shift(&mut *tx, company_id, shift_id).await?;
        }

        if self.exchanges.exists_pending_for_shifts(&mut *tx, requester_key, target_key).await? {
            return Err(Precondition::ExchangeAlreadyPending.into());
        }

        let request = self
            .exchanges
            .insert(
                &mut *tx,
                &NewExchangeRequest {
                    requester_user_id: requester_user,
                    accepting_user_id: accepting_user,
                    requester_company_id: requester_company.id,
                    requester_db_name: requester_company.db_name.clone(),
                    requester_branch_id: requester_shift.branch_id,
                    requester_shift_id: requester_shift.id,
                    requester_erp_shift_id: Some(requester_shift.erp_shift_id),
                    accepting_company_id: target_company.id,
                    accepting_db_name: target_company.db_name.clone(),
                    accepting_branch_id: target_shift.branch_id,
                    accepting_shift_id: target_shift.id,
                    accepting_erp_shift_id: Some(target_shift.erp_shift_id),
                    request_reason: payload.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()).map(str::to_string),
                },
            )
            .await?;

        tx.commit().await?;

        tracing::info!(exchange_id = %request.id, accepting = %accepting_user, "Troca de turno solicitada");

        self.notify(
            &request.accepting_db_name,
            request.accepting_user_id,
            "Pedido de troca de turno",
            "Um colega quer trocar de turno com você. Responda ao pedido.".into(),
            request.id,
        )
        .await;
        self.broadcast(&request);

        Ok(request)
    }

    // =========================================================================
    //  RESPOSTA DO FUNCIONÁRIO
    // =========================================================================

    #[tracing::instrument(skip(self, reason))]
    pub async fn respond(
        &self,
        exchange_id: Uuid,
        acting_user: Uuid,
        action: EmployeeAction,
        reason: Option<&str>,
    ) -> Result<ShiftExchangeRequest, AppError> {
        let master = self.registry.get_master().await?;
        let mut tx = master.begin().await?;

        let current = self.exchanges.find_for_update(&mut *tx, exchange_id).await?;
        let reason = current.check_respond(acting_user, action, reason)?;

        let guarded = match action {
            EmployeeAction::Accept => self.exchanges.employee_accept(&mut *tx, exchange_id).await?,
            EmployeeAction::Reject => self.exchanges.employee_reject(&mut *tx, exchange_id, reason.as_deref()).await?,
        };
        let request = guarded.or_conflict(|| AppError::Conflict("A troca foi alterada por outra requisição.".into()))?;

        tx.commit().await?;

        let (title, message) = match action {
            EmployeeAction::Accept => ("Troca aceita", "Seu colega aceitou a troca. Aguardando aprovação do RH.".to_string()),
            EmployeeAction::Reject => (
                "Troca recusada",
                match &request.employee_rejection_reason {
                    Some(r) => format!("Seu colega recusou a troca: {}", r),
                    None => "Seu colega recusou a troca.".to_string(),
                },
            ),
        };
        self.notify(&request.requester_db_name, request.requester_user_id, title, message, request.id).await;
        self.broadcast(&request);

        Ok(request)
    }

    // =========================================================================
    //  DECISÃO DO RH
    // =========================================================================

    /// Aprova e aplica a troca. A aprovação vale mesmo que a saga falhe no meio:
    /// o passo fica registrado e o reconciliador tenta de novo.
    #[tracing::instrument(skip(self, hr), fields(hr_user = %hr.sub))]
    pub async fn hr_approve(&self, exchange_id: Uuid, hr: &Claims) -> Result<ShiftExchangeRequest, AppError> {
        let hr_user = hr.sub;
        let master = self.registry.get_master().await?;
        let mut tx = master.begin().await?;

        let current = self.exchanges.find_for_update(&mut *tx, exchange_id).await?;
        current.check_hr_scope(hr)?;
        current.check_hr_approve()?;
        let approved = self
            .exchanges
            .hr_approve(&mut *tx, exchange_id, hr_user)
            .await?
            .or_conflict(|| AppError::Conflict("A troca já foi decidida por outra requisição.".into()))?;

        tx.commit().await?;

        let request = self.run_swap(&master, approved, Some(hr_user)).await;

        for (db_name, user_id) in [
            (&request.requester_db_name, request.requester_user_id),
            (&request.accepting_db_name, request.accepting_user_id),
        ] {
            self.notify(db_name, user_id, "Troca aprovada", "O RH aprovou a troca de turno.".into(), request.id).await;
        }
        self.broadcast(&request);

        Ok(request)
    }

    #[tracing::instrument(skip(self, hr, reason), fields(hr_user = %hr.sub))]
    pub async fn hr_reject(&self, exchange_id: Uuid, hr: &Claims, reason: Option<&str>) -> Result<ShiftExchangeRequest, AppError> {
        let hr_user = hr.sub;
        let master = self.registry.get_master().await?;
        let mut tx = master.begin().await?;

        let current = self.exchanges.find_for_update(&mut *tx, exchange_id).await?;
        current.check_hr_scope(hr)?;
        let reason = current.check_hr_reject(reason)?;
        let request = self
            .exchanges
            .hr_reject(&mut *tx, exchange_id, hr_user, &reason)
            .await?
            .or_conflict(|| AppError::Conflict("A troca já foi decidida por outra requisição.".into()))?;

        tx.commit().await?;

        for (db_name, user_id) in [
            (&request.requester_db_name, request.requester_user_id),
            (&request.accepting_db_name, request.accepting_user_id),
        ] {
            self.notify(db_name, user_id, "Troca rejeitada", format!("O RH rejeitou a troca de turno: {}", reason), request.id)
                .await;
        }
        self.broadcast(&request);

        Ok(request)
    }

    // =========================================================================
    //  SAGA
    // =========================================================================

    /// Avança a saga a partir do passo persistido. Falhas ficam registradas
    /// na solicitação e não sobem para quem aprovou.
    async fn run_swap(&self, master: &PgPool, request: ShiftExchangeRequest, actor: Option<Uuid>) -> ShiftExchangeRequest {
        let mut current = request;
        while current.needs_swap() {
            match self.advance(master, &current, actor).await {
                Ok(next) => current = next,
                Err(e) => {
                    let reason = e.to_string();
                    tracing::error!(exchange_id = %current.id, step = ?current.swap_step, %reason, "Falha ao aplicar troca de turno");
                    match self.exchanges.record_swap_failure(master, current.id, &reason).await {
                        Ok(updated) => {
                            if updated.swap_attempts >= self.reconcile.max_attempts {
                                tracing::error!(
                                    exchange_id = %updated.id,
                                    attempts = updated.swap_attempts,
                                    "Troca aprovada mas não aplicada; reconciliação manual necessária"
                                );
                            }
                            current = updated;
                        }
                        Err(record_err) => {
                            tracing::error!(exchange_id = %current.id, error = %record_err, "Não foi possível registrar a falha da troca");
                        }
                    }
                    break;
                }
            }
        }
        current
    }

    async fn advance(&self, master: &PgPool, request: &ShiftExchangeRequest, actor: Option<Uuid>) -> Result<ShiftExchangeRequest, AppError> {
        match request.swap_step {
            SwapStep::NotStarted => {
                self.apply_side(
                    master,
                    request,
                    request.requester_company_id,
                    &request.requester_db_name,
                    request.requester_shift_id,
                    request.requester_user_id,
                    request.accepting_user_id,
                    actor,
                )
                .await?;
                self.exchanges.advance_swap(master, request.id, SwapStep::RequesterApplied).await
            }
            SwapStep::RequesterApplied => {
                self.apply_side(
                    master,
                    request,
                    request.accepting_company_id,
                    &request.accepting_db_name,
                    request.accepting_shift_id,
                    request.accepting_user_id,
                    request.requester_user_id,
                    actor,
                )
                .await?;
                let done = self.exchanges.advance_swap(master, request.id, SwapStep::Completed).await?;
                tracing::info!(exchange_id = %done.id, "Troca de turno aplicada nos dois bancos");
                Ok(done)
            }
            SwapStep::Completed => Ok(request.clone()),
        }
    }

    /// Um passo local: trava o turno, reatribui e registra o log. Reexecutar é seguro.
    #[allow(clippy::too_many_arguments)]
    async fn apply_side(
        &self,
        master: &PgPool,
        request: &ShiftExchangeRequest,
        company_id: Uuid,
        db_name: &str,
        shift_id: Uuid,
        from_user: Uuid,
        to_user: Uuid,
        actor: Option<Uuid>,
    ) -> Result<(), AppError> {
        let to_erp_employee = self.companies.erp_employee_for_user(master, to_user, company_id).await?;
        let pool = self.registry.get_tenant(db_name).await?;
        let mut tx = pool.begin().await?;

        let shift = self.shifts.lock(&mut *tx, shift_id).await?;
        match side_action(shift.user_id, from_user, to_user) {
            SideAction::AlreadyApplied => return Ok(()),
            SideAction::OwnerChanged => {
                return Err(AppError::Conflict(format!(
                    "O turno {} mudou de dono desde a solicitação da troca.",
                    shift_id
                )))
            }
            SideAction::Apply => {}
        }

        let updated = self
            .shifts
            .reassign_owner(&mut *tx, shift_id, from_user, to_user, to_erp_employee)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Turno".into()))?;

        let log = self
            .shifts
            .append_log(
                &mut *tx,
                &NewShiftLog {
                    shift_id,
                    log_type: ShiftLogType::ExchangeApplied,
                    erp_attendance_id: updated.erp_attendance_id,
                    changes: json!({
                        "exchangeId": request.id,
                        "userId": { "from": from_user, "to": to_user },
                    }),
                    created_by: actor,
                },
            )
            .await?;

        tx.commit().await?;

        let room = Room::Branch(updated.branch_id);
        self.hub.emit(room, RealtimeEventKind::ShiftUpdated, &updated);
        self.hub.emit(room, RealtimeEventKind::ShiftLogNew, &log);
        Ok(())
    }

    // =========================================================================
    //  RECONCILIADOR
    // =========================================================================

    /// Retoma trocas aprovadas cuja saga parou no meio. Devolve quantas foram concluídas.
    pub async fn reconcile_once(&self) -> Result<usize, AppError> {
        let master = self.registry.get_master().await?;
        let mut completed = 0;

        for request in self.exchanges.list_incomplete_swaps(&master, self.reconcile.max_attempts).await? {
            tracing::info!(exchange_id = %request.id, step = ?request.swap_step, attempts = request.swap_attempts, "Retomando troca");
            let after = self.run_swap(&master, request, None).await;
            if after.swap_step == SwapStep::Completed {
                completed += 1;
                self.broadcast(&after);
            }
        }

        let stuck = self.exchanges.count_stuck_swaps(&master, self.reconcile.max_attempts).await?;
        if stuck > 0 {
            tracing::error!(stuck, "Trocas aprovadas sem aplicação após o máximo de tentativas; reconciliação manual necessária");
        }

        Ok(completed)
    }

    pub async fn run_reconciler(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.reconcile.interval.as_secs(), "Reconciliador de trocas iniciado");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.reconcile.interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }

            match self.reconcile_once().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(completed = n, "Trocas reconciliadas"),
                Err(e) => tracing::error!(error = %e, "Erro no reconciliador de trocas"),
            }
        }

        tracing::info!("Reconciliador de trocas encerrado");
    }

    // =========================================================================
    //  LEITURA
    // =========================================================================

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ShiftExchangeRequest>, AppError> {
        let master = self.registry.get_master().await?;
        self.exchanges.list_for_user(&master, user_id).await
    }

    pub async fn list_awaiting_hr(&self, company_ids: &[Uuid]) -> Result<Vec<ShiftExchangeRequest>, AppError> {
        let master = self.registry.get_master().await?;
        self.exchanges.list_awaiting_hr(&master, company_ids).await
    }

    /// Solicitação + dados de turno/filial lidos dos dois bancos de empresa.
    pub async fn detail(&self, exchange_id: Uuid, claims: &Claims) -> Result<ExchangeDetail, AppError> {
        let master = self.registry.get_master().await?;
        let request = self.exchanges.find_by_id(&master, exchange_id).await?;

        request.check_visible_to(claims)?;

        let requester = self
            .side(request.requester_company_id, &request.requester_db_name, request.requester_shift_id, request.requester_branch_id)
            .await;
        let accepting = self
            .side(request.accepting_company_id, &request.accepting_db_name, request.accepting_shift_id, request.accepting_branch_id)
            .await;

        Ok(ExchangeDetail { request, requester, accepting })
    }

    // Um banco fora do ar não impede a leitura do outro lado
    async fn side(&self, company_id: Uuid, db_name: &str, shift_id: Uuid, branch_id: Uuid) -> ExchangeSide {
        let mut side = ExchangeSide { company_id, shift: None, branch: None };
        let pool = match self.registry.get_tenant(db_name).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(%company_id, error = %e, "Banco da empresa indisponível para o detalhe da troca");
                return side;
            }
        };
        match self.shifts.find_by_id(&pool, shift_id).await {
            Ok(shift) => side.shift = shift,
            Err(e) => tracing::warn!(%company_id, %shift_id, error = %e, "Falha ao ler o turno da troca"),
        }
        let branch_id = side.shift.as_ref().map(|s| s.branch_id).unwrap_or(branch_id);
        match self.shifts.find_branch(&pool, branch_id).await {
            Ok(branch) => side.branch = branch,
            Err(e) => tracing::warn!(%company_id, %branch_id, error = %e, "Falha ao ler a filial da troca"),
        }
        side
    }

    // =========================================================================
    //  AVISOS
    // =========================================================================

    async fn notify(&self, db_name: &str, user_id: Uuid, title: &str, message: String, exchange_id: Uuid) {
        let new = NewNotification {
            user_id,
            title: title.to_string(),
            message,
            kind: "shift_exchange".into(),
            link_url: Some(format!("/exchanges/{}", exchange_id)),
        };
        let result = async {
            let pool = self.registry.get_tenant(db_name).await?;
            self.notifications.dispatch(&pool, &new).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(%user_id, %exchange_id, error = %e, "Falha ao notificar sobre a troca");
        }
    }

    fn broadcast(&self, request: &ShiftExchangeRequest) {
        self.hub.emit(Room::User(request.requester_user_id), RealtimeEventKind::ExchangeUpdated, request);
        self.hub.emit(Room::User(request.accepting_user_id), RealtimeEventKind::ExchangeUpdated, request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn shift(owner: Option<Uuid>, status: ShiftStatus) -> EmployeeShift {
        let now = Utc::now();
        EmployeeShift {
            id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            user_id: owner,
            erp_shift_id: 10,
            erp_employee_id: None,
            erp_attendance_id: None,
            shift_start: now,
            shift_end: now,
            check_in_at: None,
            check_out_at: None,
            allocated_hours: Decimal::from(8),
            total_worked_hours: None,
            status,
            pending_approvals: 0,
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
    fn pair_rules() {
        let alice = Uuid::from_u128(1);
        let bob = Uuid::from_u128(2);

        let ok = check_pair(alice, &shift(Some(alice), ShiftStatus::Open), &shift(Some(bob), ShiftStatus::Open));
        assert_eq!(ok.unwrap(), bob);

        let not_mine = check_pair(alice, &shift(Some(bob), ShiftStatus::Open), &shift(Some(bob), ShiftStatus::Open));
        assert_eq!(precondition(not_mine.unwrap_err()), Precondition::NotShiftOwner);

        let nobody = check_pair(alice, &shift(Some(alice), ShiftStatus::Open), &shift(None, ShiftStatus::Open));
        assert_eq!(precondition(nobody.unwrap_err()), Precondition::ShiftWithoutEmployee);

        let myself = check_pair(alice, &shift(Some(alice), ShiftStatus::Open), &shift(Some(alice), ShiftStatus::Open));
        assert_eq!(precondition(myself.unwrap_err()), Precondition::SameEmployee);

        let ended = check_pair(alice, &shift(Some(alice), ShiftStatus::Open), &shift(Some(bob), ShiftStatus::Ended));
        assert_eq!(precondition(ended.unwrap_err()), Precondition::ShiftAlreadyEnded);
    }

    #[test]
    fn swap_side_is_idempotent() {
        let from = Uuid::from_u128(1);
        let to = Uuid::from_u128(2);
        assert_eq!(side_action(Some(from), from, to), SideAction::Apply);
        assert_eq!(side_action(Some(to), from, to), SideAction::AlreadyApplied);
        assert_eq!(side_action(Some(Uuid::from_u128(3)), from, to), SideAction::OwnerChanged);
        assert_eq!(side_action(None, from, to), SideAction::OwnerChanged);
    }

    #[test]
    fn creation_locks_both_shifts_in_a_fixed_order() {
        let a = (Uuid::from_u128(10), Uuid::from_u128(1));
        let c = (Uuid::from_u128(10), Uuid::from_u128(3));
        // A como solicitante e A como alvo travam na mesma ordem
        assert_eq!(lock_order(a, c), lock_order(c, a));
        assert_eq!(lock_order(a, c), vec![a, c]);
        assert_eq!(lock_order(a, a), vec![a]);
    }
}
