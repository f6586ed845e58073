// src/services/ingestion_service.rs
//
// Projeta os eventos do ERP no banco da empresa. Cada evento é idempotente:
// upsert pelo id externo e autorizações derivadas criadas no máximo uma vez
// por (turno, tipo).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde_json::{json, Value};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{AuthorizationRepository, CompanyRepository, PosRepository, PosTable, ShiftRepository, TenantPoolRegistry},
    models::{
        authorization::{AuthorizationType, NewAuthorization},
        company::Company,
        notification::{NewNotification, Notification},
        realtime::{RealtimeEventKind, Room},
        shift::{AttendanceUpdate, EmployeeShift, NewShiftLog, ShiftLogType, ShiftStatus, ShiftUpsert},
        webhook::{
            AttendanceEvent, CashMovementEvent, ErpRef, OrderEvent, PosSessionEvent, PosVerificationEvent,
            ProjectionOutcome, ShiftEvent, WebhookEvent,
        },
    },
    services::{erp_sync_service::ErpGateway, notification_service::NotificationService, realtime::RealtimeHub},
};

// =============================================================================
//  Regras puras
// =============================================================================

/// Minutos de hora extra: round((trabalhadas - alocadas) * 60). `None` se não houver excesso.
pub fn overtime_minutes(worked_hours: Decimal, allocated_hours: Decimal) -> Option<i32> {
    if worked_hours <= allocated_hours {
        return None;
    }
    ((worked_hours - allocated_hours) * Decimal::from(60))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i32()
        .filter(|m| *m > 0)
}

/// Desvio de ponto em relação à escala.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deviation {
    pub auth_type: AuthorizationType,
    pub diff_minutes: i32,
}

/// Compara a marcação com a escala. Diferenças dentro da tolerância são ignoradas.
pub fn detect_deviations(
    shift_start: DateTime<Utc>,
    shift_end: DateTime<Utc>,
    check_in: DateTime<Utc>,
    check_out: Option<DateTime<Utc>>,
    grace_minutes: i64,
) -> Vec<Deviation> {
    let mut found = Vec::new();
    let minutes = |d: chrono::Duration| i32::try_from(d.num_minutes()).unwrap_or(i32::MAX);

    let entry = check_in - shift_start;
    if entry.num_minutes() < -grace_minutes {
        found.push(Deviation { auth_type: AuthorizationType::EarlyCheckIn, diff_minutes: minutes(-entry) });
    } else if entry.num_minutes() > grace_minutes {
        found.push(Deviation { auth_type: AuthorizationType::Tardiness, diff_minutes: minutes(entry) });
    }

    if let Some(check_out) = check_out {
        let exit = check_out - shift_end;
        if exit.num_minutes() < -grace_minutes {
            found.push(Deviation { auth_type: AuthorizationType::EarlyCheckOut, diff_minutes: minutes(-exit) });
        } else if exit.num_minutes() > grace_minutes {
            found.push(Deviation { auth_type: AuthorizationType::LateCheckOut, diff_minutes: minutes(exit) });
        }
    }

    found
}

/// Horas trabalhadas a partir das marcações, quando o ERP não manda o total.
pub fn worked_hours_between(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> Option<Decimal> {
    let seconds = (check_out - check_in).num_seconds();
    if seconds < 0 {
        return None;
    }
    Some((Decimal::from(seconds) / Decimal::from(3600)).round_dp(2))
}

// Efeitos para depois do commit (tempo real + entrega de notificações)
#[derive(Default)]
struct Effects {
    events: Vec<(Room, RealtimeEventKind, Value)>,
    notifications: Vec<Notification>,
}

impl Effects {
    fn emit(&mut self, room: Room, kind: RealtimeEventKind, data: impl serde::Serialize) {
        self.events.push((room, kind, serde_json::to_value(data).unwrap_or(Value::Null)));
    }
}

#[derive(Clone)]
pub struct IngestionService {
    registry: TenantPoolRegistry,
    companies: CompanyRepository,
    shifts: ShiftRepository,
    authorizations: AuthorizationRepository,
    pos: PosRepository,
    notifications: NotificationService,
    hub: RealtimeHub,
    erp: Option<Arc<dyn ErpGateway>>,
    grace_minutes: i64,
}

impl IngestionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: TenantPoolRegistry,
        companies: CompanyRepository,
        shifts: ShiftRepository,
        authorizations: AuthorizationRepository,
        pos: PosRepository,
        notifications: NotificationService,
        hub: RealtimeHub,
        erp: Option<Arc<dyn ErpGateway>>,
        grace_minutes: i64,
    ) -> Self {
        Self { registry, companies, shifts, authorizations, pos, notifications, hub, erp, grace_minutes }
    }

    /// Ponto de entrada do webhook: resolve a empresa e despacha pelo tipo do evento.
    #[tracing::instrument(skip_all, fields(kind = ?event.kind(), external_id = event.external_id(), erp_company_id = event.erp_company_id()))]
    pub async fn ingest(&self, event: WebhookEvent) -> Result<ProjectionOutcome, AppError> {
        let master = self.registry.get_master().await?;
        let company = self
            .companies
            .find_active_by_erp_id(&master, event.erp_company_id())
            .await?
            .ok_or_else(|| {
                tracing::warn!("Evento descartado: empresa desconhecida");
                AppError::CompanyNotFound(format!("erp_company_id={}", event.erp_company_id()))
            })?;

        let pool = self.registry.get_tenant(&company.db_name).await?;
        let deleted = event.is_delete();
        let mut effects = Effects::default();

        let data = match &event {
            WebhookEvent::Shift(e) if deleted => self.delete_shift(&pool, e, &mut effects).await?,
            WebhookEvent::Shift(e) => self.project_shift(&master, &pool, &company, e, &mut effects).await?,
            WebhookEvent::Attendance(e) if deleted => self.delete_attendance(&pool, e, &mut effects).await?,
            WebhookEvent::Attendance(e) => self.project_attendance(&pool, e, &mut effects).await?,
            WebhookEvent::PosSession(e) => self.project_pos_session(&pool, e, deleted).await?,
            WebhookEvent::PosVerification(e) => self.project_pos_verification(&pool, e, deleted).await?,
            WebhookEvent::Order(e) => self.project_order(&pool, e, deleted).await?,
            WebhookEvent::CashMovement(e) => self.project_cash_movement(&pool, e, deleted).await?,
        };

        self.flush(&pool, effects).await;
        Ok(ProjectionOutcome { deleted, data })
    }

    async fn flush(&self, pool: &PgPool, effects: Effects) {
        for (room, kind, data) in effects.events {
            self.hub.emit(room, kind, data);
        }
        for notification in &effects.notifications {
            self.notifications.deliver(pool, notification).await;
        }
    }

    // =========================================================================
    //  TURNOS
    // =========================================================================

    async fn project_shift(
        &self,
        master: &PgPool,
        pool: &PgPool,
        company: &Company,
        event: &ShiftEvent,
        effects: &mut Effects,
    ) -> Result<Value, AppError> {
        let shift_start = event.start_datetime.ok_or(AppError::MissingField("start_datetime"))?;
        let shift_end = event.end_datetime.ok_or(AppError::MissingField("end_datetime"))?;
        let incoming_status = event
            .state
            .as_deref()
            .map(|state| {
                ShiftStatus::from_erp_state(state)
                    .ok_or_else(|| AppError::InvalidPayload(format!("estado de turno desconhecido: {}", state)))
            })
            .transpose()?;

        // Fora da transação: pode consultar o ERP
        let user_id = self.resolve_user(master, company, event.employee_id.as_ref()).await;

        let mut tx = pool.begin().await?;

        let branch = self.shifts.resolve_branch(&mut *tx, event.x_branch_id.as_ref().map(|b| b.id)).await?;
        let previous = self.shifts.find_by_erp_id_for_update(&mut *tx, event.id).await?;
        let status = next_shift_status(previous.as_ref().map(|s| s.status), incoming_status);

        let upsert = ShiftUpsert {
            erp_shift_id: event.id,
            branch_id: branch.id,
            user_id,
            erp_employee_id: event.employee_id.as_ref().map(|e| e.id),
            shift_start,
            shift_end,
            allocated_hours: event.allocated_hours.unwrap_or_default(),
            total_worked_hours: event.worked_hours,
            status,
        };
        let mut shift = self.shifts.upsert(&mut *tx, &upsert).await?;

        if entered_ended(previous.as_ref().map(|s| s.status), shift.status) {
            shift = self.on_shift_ended(&mut tx, shift, effects).await?;
        }

        tx.commit().await?;

        effects.emit(Room::Branch(shift.branch_id), RealtimeEventKind::ShiftUpdated, &shift);
        Ok(serde_json::to_value(&shift).unwrap_or(Value::Null))
    }

    async fn delete_shift(&self, pool: &PgPool, event: &ShiftEvent, effects: &mut Effects) -> Result<Value, AppError> {
        let removed = self.shifts.delete_by_erp_id(pool, event.id).await?;
        if let Some(shift) = &removed {
            effects.emit(
                Room::Branch(shift.branch_id),
                RealtimeEventKind::ShiftUpdated,
                json!({ "id": shift.id, "deleted": true }),
            );
        }
        Ok(json!({ "erpShiftId": event.id, "deleted": removed.is_some() }))
    }

    // =========================================================================
    //  PONTO (hr.attendance)
    // =========================================================================

    async fn project_attendance(&self, pool: &PgPool, event: &AttendanceEvent, effects: &mut Effects) -> Result<Value, AppError> {
        let erp_shift_id = event.x_shift_id.as_ref().map(|s| s.id).ok_or(AppError::MissingField("x_shift_id"))?;
        let check_in = event.check_in.ok_or(AppError::MissingField("check_in"))?;
        if event.check_out.is_some_and(|out| out < check_in) {
            return Err(AppError::InvalidPayload("check_out anterior ao check_in".into()));
        }

        let mut tx = pool.begin().await?;

        let previous = self
            .shifts
            .find_by_erp_id_for_update(&mut *tx, erp_shift_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(format!("Turno do ERP {}", erp_shift_id)))?;

        let update = AttendanceUpdate {
            erp_attendance_id: event.id,
            check_in_at: check_in,
            check_out_at: event.check_out,
            total_worked_hours: event
                .worked_hours
                .or_else(|| event.check_out.and_then(|out| worked_hours_between(check_in, out))),
            status: if event.check_out.is_some() { ShiftStatus::Ended } else { ShiftStatus::Started },
        };
        let mut shift = self.shifts.apply_attendance(&mut *tx, previous.id, &update).await?;

        let changed = previous.erp_attendance_id != Some(event.id)
            || previous.check_in_at != Some(check_in)
            || previous.check_out_at != event.check_out;
        if changed {
            let log = self
                .shifts
                .append_log(
                    &mut *tx,
                    &NewShiftLog {
                        shift_id: shift.id,
                        log_type: ShiftLogType::AttendanceRecorded,
                        erp_attendance_id: Some(event.id),
                        changes: json!({
                            "checkIn": { "from": previous.check_in_at, "to": check_in },
                            "checkOut": { "from": previous.check_out_at, "to": event.check_out },
                            "workedHours": update.total_worked_hours,
                        }),
                        created_by: None,
                    },
                )
                .await?;
            effects.emit(Room::Branch(shift.branch_id), RealtimeEventKind::ShiftLogNew, &log);
        }

        for deviation in detect_deviations(shift.shift_start, shift.shift_end, check_in, event.check_out, self.grace_minutes) {
            shift = self.raise_authorization(&mut tx, shift, deviation.auth_type, deviation.diff_minutes, effects).await?;
        }

        if entered_ended(Some(previous.status), shift.status) {
            shift = self.on_shift_ended(&mut tx, shift, effects).await?;
        }

        tx.commit().await?;

        effects.emit(Room::Branch(shift.branch_id), RealtimeEventKind::ShiftUpdated, &shift);
        Ok(serde_json::to_value(&shift).unwrap_or(Value::Null))
    }

    async fn delete_attendance(&self, pool: &PgPool, event: &AttendanceEvent, effects: &mut Effects) -> Result<Value, AppError> {
        let cleared = self.shifts.clear_attendance(pool, event.id).await?;
        if let Some(shift) = &cleared {
            effects.emit(Room::Branch(shift.branch_id), RealtimeEventKind::ShiftUpdated, shift);
        }
        Ok(json!({ "erpAttendanceId": event.id, "deleted": cleared.is_some() }))
    }

    // =========================================================================
    //  EFEITOS DERIVADOS
    // =========================================================================

    /// Transição para `ended`: log de encerramento e, havendo excesso, hora extra.
    async fn on_shift_ended(
        &self,
        conn: &mut PgConnection,
        shift: EmployeeShift,
        effects: &mut Effects,
    ) -> Result<EmployeeShift, AppError> {
        let log = self
            .shifts
            .append_log(
                &mut *conn,
                &NewShiftLog {
                    shift_id: shift.id,
                    log_type: ShiftLogType::ShiftEnded,
                    erp_attendance_id: shift.erp_attendance_id,
                    changes: json!({
                        "allocatedHours": shift.allocated_hours,
                        "totalWorkedHours": shift.total_worked_hours,
                    }),
                    created_by: None,
                },
            )
            .await?;
        effects.emit(Room::Branch(shift.branch_id), RealtimeEventKind::ShiftLogNew, &log);

        let extra = shift
            .total_worked_hours
            .and_then(|worked| overtime_minutes(worked, shift.allocated_hours));
        match extra {
            Some(minutes) => self.raise_authorization(conn, shift, AuthorizationType::Overtime, minutes, effects).await,
            None => Ok(shift),
        }
    }

    /// Cria a autorização se ainda não existir; só então incrementa o contador.
    async fn raise_authorization(
        &self,
        conn: &mut PgConnection,
        shift: EmployeeShift,
        auth_type: AuthorizationType,
        diff_minutes: i32,
        effects: &mut Effects,
    ) -> Result<EmployeeShift, AppError> {
        let new = NewAuthorization {
            shift_id: shift.id,
            branch_id: shift.branch_id,
            user_id: shift.user_id,
            auth_type,
            diff_minutes,
            needs_employee_reason: auth_type.needs_employee_reason(),
        };

        let Some(authorization) = self.authorizations.create_pending_if_absent(&mut *conn, &new).await? else {
            return Ok(shift);
        };

        let shift = self.shifts.adjust_pending(&mut *conn, shift.id, 1).await?;
        let log = self
            .shifts
            .append_log(
                &mut *conn,
                &NewShiftLog {
                    shift_id: shift.id,
                    log_type: ShiftLogType::AuthorizationCreated,
                    erp_attendance_id: shift.erp_attendance_id,
                    changes: json!({
                        "authorizationId": authorization.id,
                        "authType": authorization.auth_type,
                        "diffMinutes": authorization.diff_minutes,
                    }),
                    created_by: None,
                },
            )
            .await?;

        tracing::info!(shift_id = %shift.id, auth_type = ?auth_type, diff_minutes, "Autorização pendente criada");
        effects.emit(Room::Branch(shift.branch_id), RealtimeEventKind::AuthorizationNew, &authorization);
        effects.emit(Room::Branch(shift.branch_id), RealtimeEventKind::ShiftLogNew, &log);

        if let (true, Some(user_id)) = (authorization.needs_employee_reason, authorization.user_id) {
            let notification = self
                .notifications
                .record(
                    &mut *conn,
                    &NewNotification {
                        user_id,
                        title: "Justificativa necessária".into(),
                        message: format!(
                            "{} de {} minutos registrado(a) no seu turno. Envie uma justificativa.",
                            auth_type.label(),
                            diff_minutes
                        ),
                        kind: "authorization_created".into(),
                        link_url: Some(format!("/shifts/{}", shift.id)),
                    },
                )
                .await?;
            effects.notifications.push(notification);
        }

        Ok(shift)
    }

    /// Funcionário do ERP -> usuário da plataforma. Falhas deixam o turno sem dono.
    async fn resolve_user(&self, master: &PgPool, company: &Company, employee: Option<&ErpRef>) -> Option<Uuid> {
        let employee = employee?;
        match self.companies.find_user_by_erp_employee(master, company.id, employee.id).await {
            Ok(Some(user_id)) => return Some(user_id),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(erp_employee_id = employee.id, error = %e, "Falha ao consultar vínculo do funcionário");
                return None;
            }
        }

        let erp = self.erp.as_deref()?;
        match self.link_by_email(erp, master, company, employee.id).await {
            Ok(Some(user_id)) => {
                tracing::info!(erp_employee_id = employee.id, %user_id, "Funcionário do ERP vinculado pelo e-mail");
                Some(user_id)
            }
            Ok(None) => {
                tracing::warn!(erp_employee_id = employee.id, "Funcionário do ERP sem usuário correspondente; turno sem dono");
                None
            }
            Err(e) => {
                tracing::warn!(erp_employee_id = employee.id, error = %e, "Falha ao resolver funcionário no ERP; turno sem dono");
                None
            }
        }
    }

    async fn link_by_email(
        &self,
        erp: &dyn ErpGateway,
        master: &PgPool,
        company: &Company,
        erp_employee_id: i64,
    ) -> Result<Option<Uuid>, AppError> {
        let Some(found) = erp.read_employee(erp_employee_id, company.erp_company_id).await? else {
            return Ok(None);
        };
        let Some(email) = found.work_email else {
            return Ok(None);
        };
        let Some(user_id) = self.companies.find_active_user_by_email(master, &email).await? else {
            return Ok(None);
        };
        self.companies.link_user(master, user_id, company.id, erp_employee_id).await?;
        Ok(Some(user_id))
    }

    // =========================================================================
    //  PDV (projeções simples)
    // =========================================================================

    async fn project_pos_session(&self, pool: &PgPool, e: &PosSessionEvent, deleted: bool) -> Result<Value, AppError> {
        if deleted {
            let removed = self.pos.delete_by_external_id(pool, PosTable::Sessions, e.id).await?;
            return Ok(json!({ "erpSessionId": e.id, "deleted": removed }));
        }
        let row = self
            .pos
            .upsert_session(
                pool,
                e.id,
                e.name.as_deref().unwrap_or_default(),
                e.state.as_deref().ok_or(AppError::MissingField("state"))?,
                e.user_id.as_ref().map(|u| u.id),
                e.start_at,
                e.stop_at,
            )
            .await?;
        Ok(serde_json::to_value(row).unwrap_or(Value::Null))
    }

    async fn project_pos_verification(&self, pool: &PgPool, e: &PosVerificationEvent, deleted: bool) -> Result<Value, AppError> {
        if deleted {
            let removed = self.pos.delete_by_external_id(pool, PosTable::Verifications, e.id).await?;
            return Ok(json!({ "erpVerificationId": e.id, "deleted": removed }));
        }
        let row = self
            .pos
            .upsert_verification(
                pool,
                e.id,
                e.session_id.as_ref().map(|s| s.id),
                e.employee_id.as_ref().map(|s| s.id),
                e.result.as_deref().ok_or(AppError::MissingField("result"))?,
                e.verified_at,
            )
            .await?;
        Ok(serde_json::to_value(row).unwrap_or(Value::Null))
    }

    async fn project_order(&self, pool: &PgPool, e: &OrderEvent, deleted: bool) -> Result<Value, AppError> {
        if deleted {
            let removed = self.pos.delete_by_external_id(pool, PosTable::Orders, e.id).await?;
            return Ok(json!({ "erpOrderId": e.id, "deleted": removed }));
        }
        let row = self
            .pos
            .upsert_order(
                pool,
                e.id,
                e.session_id.as_ref().map(|s| s.id),
                e.name.as_deref().unwrap_or_default(),
                e.state.as_deref().unwrap_or("draft"),
                e.amount_total.unwrap_or_default(),
                e.date_order,
            )
            .await?;
        Ok(serde_json::to_value(row).unwrap_or(Value::Null))
    }

    async fn project_cash_movement(&self, pool: &PgPool, e: &CashMovementEvent, deleted: bool) -> Result<Value, AppError> {
        if deleted {
            let removed = self.pos.delete_by_external_id(pool, PosTable::CashMovements, e.id).await?;
            return Ok(json!({ "erpMovementId": e.id, "deleted": removed }));
        }
        let row = self
            .pos
            .upsert_cash_movement(
                pool,
                e.id,
                e.session_id.as_ref().map(|s| s.id),
                e.amount.ok_or(AppError::MissingField("amount"))?,
                e.payment_ref.as_deref(),
                e.date,
            )
            .await?;
        Ok(serde_json::to_value(row).unwrap_or(Value::Null))
    }
}

/// Status após um evento de turno: sem `state` mantém o atual e um turno
/// encerrado não volta a abrir.
fn next_shift_status(previous: Option<ShiftStatus>, incoming: Option<ShiftStatus>) -> ShiftStatus {
    match (previous, incoming) {
        (Some(ShiftStatus::Ended), _) => ShiftStatus::Ended,
        (_, Some(status)) => status,
        (Some(status), None) => status,
        (None, None) => ShiftStatus::Open,
    }
}

/// Só a transição para `ended` dispara os efeitos de encerramento (replays não).
fn entered_ended(previous: Option<ShiftStatus>, current: ShiftStatus) -> bool {
    current == ShiftStatus::Ended && previous != Some(ShiftStatus::Ended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn overtime_is_rounded_minutes_over_allocation() {
        assert_eq!(overtime_minutes(Decimal::new(95, 1), Decimal::from(8)), Some(90));
        assert_eq!(overtime_minutes(Decimal::new(80083, 4), Decimal::from(8)), None);
        assert_eq!(overtime_minutes(Decimal::new(80125, 4), Decimal::from(8)), Some(1));
        assert_eq!(overtime_minutes(Decimal::from(8), Decimal::from(8)), None);
        assert_eq!(overtime_minutes(Decimal::from(7), Decimal::from(8)), None);
    }

    #[test]
    fn punctual_attendance_has_no_deviation() {
        let found = detect_deviations(at(8, 0), at(16, 0), at(8, 4), Some(at(16, 3)), 5);
        assert!(found.is_empty());
    }

    #[test]
    fn late_arrival_and_early_exit() {
        let found = detect_deviations(at(8, 0), at(16, 0), at(8, 20), Some(at(15, 30)), 5);
        assert_eq!(
            found,
            vec![
                Deviation { auth_type: AuthorizationType::Tardiness, diff_minutes: 20 },
                Deviation { auth_type: AuthorizationType::EarlyCheckOut, diff_minutes: 30 },
            ]
        );
        assert!(found.iter().all(|d| d.auth_type.needs_employee_reason()));
    }

    #[test]
    fn early_arrival_and_late_exit_need_no_reason() {
        let found = detect_deviations(at(8, 0), at(16, 0), at(7, 40), Some(at(17, 30)), 5);
        assert_eq!(
            found,
            vec![
                Deviation { auth_type: AuthorizationType::EarlyCheckIn, diff_minutes: 20 },
                Deviation { auth_type: AuthorizationType::LateCheckOut, diff_minutes: 90 },
            ]
        );
        assert!(found.iter().all(|d| !d.auth_type.needs_employee_reason()));
    }

    #[test]
    fn open_attendance_only_checks_entry() {
        let found = detect_deviations(at(8, 0), at(16, 0), at(8, 30), None, 5);
        assert_eq!(found, vec![Deviation { auth_type: AuthorizationType::Tardiness, diff_minutes: 30 }]);
    }

    #[test]
    fn shift_update_never_reopens_an_ended_shift() {
        assert_eq!(next_shift_status(Some(ShiftStatus::Ended), None), ShiftStatus::Ended);
        assert_eq!(next_shift_status(Some(ShiftStatus::Ended), Some(ShiftStatus::Open)), ShiftStatus::Ended);
        assert_eq!(next_shift_status(Some(ShiftStatus::Started), None), ShiftStatus::Started);
        assert_eq!(next_shift_status(Some(ShiftStatus::Open), Some(ShiftStatus::Ended)), ShiftStatus::Ended);
        assert_eq!(next_shift_status(None, None), ShiftStatus::Open);
        assert!(!entered_ended(Some(ShiftStatus::Ended), next_shift_status(Some(ShiftStatus::Ended), None)));
    }

    #[test]
    fn worked_hours_from_marks() {
        assert_eq!(worked_hours_between(at(8, 0), at(17, 30)), Some(Decimal::new(95, 1)));
        assert_eq!(worked_hours_between(at(9, 0), at(8, 0)), None);
    }

    #[test]
    fn only_the_transition_into_ended_counts() {
        assert!(entered_ended(Some(ShiftStatus::Started), ShiftStatus::Ended));
        assert!(entered_ended(None, ShiftStatus::Ended));
        assert!(!entered_ended(Some(ShiftStatus::Ended), ShiftStatus::Ended));
        assert!(!entered_ended(Some(ShiftStatus::Open), ShiftStatus::Started));
    }
}
