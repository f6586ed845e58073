// src/services/authorization_service.rs

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{AuthorizationRepository, ShiftRepository},
    models::{
        authorization::{AuthorizationFilter, AuthorizationScope, OvertimeType, Resolution, ShiftAuthorization},
        erp::ErpSyncJob,
        notification::NewNotification,
        realtime::{RealtimeEventKind, Room},
        shift::{NewShiftLog, ShiftLogType},
    },
    services::{erp_sync_service::ErpSyncService, notification_service::NotificationService, realtime::RealtimeHub},
};

#[derive(Clone)]
pub struct AuthorizationService {
    shifts: ShiftRepository,
    authorizations: AuthorizationRepository,
    notifications: NotificationService,
    erp_sync: ErpSyncService,
    hub: RealtimeHub,
}

impl AuthorizationService {
    pub fn new(
        shifts: ShiftRepository,
        authorizations: AuthorizationRepository,
        notifications: NotificationService,
        erp_sync: ErpSyncService,
        hub: RealtimeHub,
    ) -> Self {
        Self { shifts, authorizations, notifications, erp_sync, hub }
    }

    // =========================================================================
    //  LEITURA
    // =========================================================================

    pub async fn list(
        &self,
        pool: &PgPool,
        filter: &AuthorizationFilter,
        scope: &AuthorizationScope,
    ) -> Result<Vec<ShiftAuthorization>, AppError> {
        let (branch_ids, own_user) = scope.list_filters();
        self.authorizations.list(pool, filter, branch_ids, own_user).await
    }

    pub async fn get(&self, pool: &PgPool, authorization_id: Uuid, scope: &AuthorizationScope) -> Result<ShiftAuthorization, AppError> {
        let authorization = self.authorizations.find_by_id(pool, authorization_id).await?;
        scope.ensure(&authorization)?;
        Ok(authorization)
    }

    /// Jobs de reescrita no ERP gerados pela resolução (estado do side channel).
    pub async fn sync_jobs(&self, pool: &PgPool, authorization_id: Uuid, scope: &AuthorizationScope) -> Result<Vec<ErpSyncJob>, AppError> {
        self.get(pool, authorization_id, scope).await?;
        self.erp_sync.jobs_for_authorization(pool, authorization_id).await
    }

    // =========================================================================
    //  TRANSIÇÕES
    // =========================================================================

    #[tracing::instrument(skip(self, pool, reason))]
    pub async fn submit_reason(
        &self,
        pool: &PgPool,
        authorization_id: Uuid,
        employee_id: Uuid,
        reason: &str,
    ) -> Result<ShiftAuthorization, AppError> {
        let mut tx = pool.begin().await?;

        let current = self.authorizations.find_for_update(&mut *tx, authorization_id).await?;
        let reason = current.check_submit_reason(employee_id, reason)?;
        let updated = self
            .authorizations
            .set_employee_reason(&mut *tx, authorization_id, &reason)
            .await?
            .or_conflict(|| AppError::Conflict("A autorização foi alterada por outra requisição.".into()))?;

        tx.commit().await?;

        self.hub.emit(Room::Branch(updated.branch_id), RealtimeEventKind::AuthorizationUpdated, &updated);
        Ok(updated)
    }

    pub async fn approve(
        &self,
        pool: &PgPool,
        authorization_id: Uuid,
        scope: &AuthorizationScope,
        manager_id: Uuid,
        overtime_type: Option<OvertimeType>,
    ) -> Result<ShiftAuthorization, AppError> {
        self.resolve(pool, authorization_id, scope, manager_id, Resolution::Approved, overtime_type, None).await
    }

    pub async fn reject(
        &self,
        pool: &PgPool,
        authorization_id: Uuid,
        scope: &AuthorizationScope,
        manager_id: Uuid,
        reason: Option<&str>,
    ) -> Result<ShiftAuthorization, AppError> {
        self.resolve(pool, authorization_id, scope, manager_id, Resolution::Rejected, None, reason).await
    }

    /// Resolve e aplica todos os efeitos na mesma transação:
    /// contador, log, notificação e job do ERP. Tempo real e push só depois do commit.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(self, pool, scope, overtime_type, rejection_reason))]
    async fn resolve(
        &self,
        pool: &PgPool,
        authorization_id: Uuid,
        scope: &AuthorizationScope,
        manager_id: Uuid,
        resolution: Resolution,
        overtime_type: Option<OvertimeType>,
        rejection_reason: Option<&str>,
    ) -> Result<ShiftAuthorization, AppError> {
        let mut tx = pool.begin().await?;

        let current = self.authorizations.find_for_update(&mut *tx, authorization_id).await?;
        scope.ensure(&current)?;
        let (overtime_type, rejection_reason) = match resolution {
            Resolution::Approved => (current.check_approve(overtime_type)?, None),
            Resolution::Rejected => (None, Some(current.check_reject(rejection_reason)?)),
        };

        let shift = self.shifts.lock(&mut *tx, current.shift_id).await?;

        let resolved = self
            .authorizations
            .resolve(&mut *tx, authorization_id, resolution, manager_id, overtime_type, rejection_reason.as_deref())
            .await?
            .or_conflict(|| AppError::Conflict("A autorização já foi resolvida por outra requisição.".into()))?;

        let shift = self.shifts.adjust_pending(&mut *tx, shift.id, -1).await?;

        let log = self
            .shifts
            .append_log(
                &mut *tx,
                &NewShiftLog {
                    shift_id: shift.id,
                    log_type: ShiftLogType::AuthorizationResolved,
                    erp_attendance_id: shift.erp_attendance_id,
                    changes: json!({
                        "authorizationId": resolved.id,
                        "authType": resolved.auth_type,
                        "status": resolved.status,
                        "overtimeType": resolved.overtime_type,
                        "rejectionReason": resolved.rejection_reason,
                    }),
                    created_by: Some(manager_id),
                },
            )
            .await?;

        let notification = match resolution_notice(&resolved) {
            Some(new) => Some(self.notifications.record(&mut *tx, &new).await?),
            None => None,
        };

        let job = self.erp_sync.enqueue_for_resolution(&mut *tx, &resolved, &shift, resolution).await?;

        tx.commit().await?;

        tracing::info!(
            status = ?resolved.status,
            erp_job = ?job.as_ref().map(|j| j.id),
            "Autorização resolvida"
        );

        let room = Room::Branch(resolved.branch_id);
        self.hub.emit(room, RealtimeEventKind::AuthorizationUpdated, &resolved);
        self.hub.emit(room, RealtimeEventKind::ShiftUpdated, &shift);
        self.hub.emit(room, RealtimeEventKind::ShiftLogNew, &log);
        if let Some(notification) = &notification {
            self.notifications.deliver(pool, notification).await;
        }

        Ok(resolved)
    }
}

/// Aviso ao funcionário do turno. Turno sem dono não gera notificação.
fn resolution_notice(authorization: &ShiftAuthorization) -> Option<NewNotification> {
    let user_id = authorization.user_id?;
    // "Autorização" concorda com aprovada/rejeitada qualquer que seja o tipo
    let subject = format!("Autorização de {}", authorization.auth_type.label().to_lowercase());
    let minutes = authorization.diff_minutes;
    let (title, message) = match (&authorization.rejection_reason, authorization.overtime_type) {
        (Some(reason), _) => (
            format!("{} rejeitada", subject),
            format!("{} ({} minutos) foi rejeitada: {}", subject, minutes, reason),
        ),
        (None, Some(OvertimeType::OvertimePremium)) => (
            format!("{} aprovada", subject),
            format!("{} ({} minutos) foi aprovada com adicional.", subject, minutes),
        ),
        (None, _) => (
            format!("{} aprovada", subject),
            format!("{} ({} minutos) foi aprovada.", subject, minutes),
        ),
    };

    Some(NewNotification {
        user_id,
        title,
        message,
        kind: "authorization_resolved".into(),
        link_url: Some(format!("/shifts/{}", authorization.shift_id)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::authorization::{AuthorizationStatus, AuthorizationType};
    use chrono::Utc;

    fn resolved(auth_type: AuthorizationType, status: AuthorizationStatus) -> ShiftAuthorization {
        let now = Utc::now();
        ShiftAuthorization {
            id: Uuid::new_v4(),
            shift_id: Uuid::from_u128(7),
            branch_id: Uuid::new_v4(),
            user_id: Some(Uuid::from_u128(1)),
            auth_type,
            diff_minutes: 45,
            needs_employee_reason: auth_type.needs_employee_reason(),
            employee_reason: None,
            status,
            overtime_type: None,
            resolved_by: Some(Uuid::from_u128(2)),
            resolved_at: Some(now),
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rejection_notice_carries_the_reason() {
        let mut auth = resolved(AuthorizationType::Tardiness, AuthorizationStatus::Rejected);
        auth.rejection_reason = Some("sem atestado".into());

        let notice = resolution_notice(&auth).unwrap();
        assert_eq!(notice.user_id, Uuid::from_u128(1));
        assert_eq!(notice.title, "Autorização de atraso rejeitada");
        assert_eq!(notice.message, "Autorização de atraso (45 minutos) foi rejeitada: sem atestado");
        assert!(notice.message.ends_with("sem atestado"));
        assert_eq!(notice.link_url.as_deref(), Some(format!("/shifts/{}", Uuid::from_u128(7)).as_str()));
    }

    #[test]
    fn premium_overtime_is_mentioned() {
        let mut auth = resolved(AuthorizationType::Overtime, AuthorizationStatus::Approved);
        auth.overtime_type = Some(OvertimeType::OvertimePremium);
        let notice = resolution_notice(&auth).unwrap();
        assert_eq!(notice.kind, "authorization_resolved");
        assert_eq!(notice.title, "Autorização de hora extra aprovada");
        assert!(notice.message.contains("com adicional"));
    }

    #[test]
    fn ownerless_shift_gets_no_notice() {
        let mut auth = resolved(AuthorizationType::Overtime, AuthorizationStatus::Approved);
        auth.user_id = None;
        assert!(resolution_notice(&auth).is_none());
    }
}
