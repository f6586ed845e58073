// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Webhooks do ERP ---
        handlers::webhooks::receive_erp_event,

        // --- Autorizações ---
        handlers::authorizations::list_authorizations,
        handlers::authorizations::get_authorization,
        handlers::authorizations::list_sync_jobs,
        handlers::authorizations::submit_reason,
        handlers::authorizations::approve,
        handlers::authorizations::reject,

        // --- Trocas ---
        handlers::exchanges::create_exchange,
        handlers::exchanges::list_my_exchanges,
        handlers::exchanges::list_pending_hr,
        handlers::exchanges::get_exchange,
        handlers::exchanges::respond_exchange,
        handlers::exchanges::approve_exchange,
        handlers::exchanges::reject_exchange,

        // --- Notificações ---
        handlers::notifications::list_notifications,
        handlers::notifications::mark_read,
        handlers::notifications::mark_all_read,
        handlers::notifications::get_settings,
        handlers::notifications::update_settings,
        handlers::notifications::register_push,
        handlers::notifications::remove_push,

        // --- Tempo real ---
        handlers::realtime::realtime_ws,

        // --- Empresas ---
        handlers::companies::provision_company,
        handlers::companies::list_companies,
        handlers::companies::migrate_company,
        handlers::companies::deactivate_company,

        // --- Saúde ---
        handlers::health::readiness,
    ),
    components(
        schemas(
            // --- Turnos ---
            models::shift::ShiftStatus,
            models::shift::ShiftLogType,
            models::shift::Branch,
            models::shift::EmployeeShift,
            models::shift::ShiftLog,

            // --- Autorizações ---
            models::authorization::AuthorizationType,
            models::authorization::AuthorizationStatus,
            models::authorization::OvertimeType,
            models::authorization::ShiftAuthorization,
            models::erp::ErpSyncOperation,
            models::erp::ErpSyncStatus,
            models::erp::ErpSyncJob,
            handlers::authorizations::SubmitReasonPayload,
            handlers::authorizations::ApprovePayload,
            handlers::authorizations::RejectPayload,

            // --- Trocas ---
            models::exchange::ExchangeStatus,
            models::exchange::ApprovalStage,
            models::exchange::SwapStep,
            models::exchange::EmployeeAction,
            models::exchange::ShiftExchangeRequest,
            models::exchange::ExchangeSide,
            models::exchange::ExchangeDetail,
            models::exchange::CreateExchangePayload,
            models::exchange::RespondExchangePayload,
            models::exchange::HrRejectPayload,

            // --- Notificações ---
            models::notification::Notification,
            models::notification::PushSubscription,
            models::notification::NotificationSettings,
            models::notification::RegisterPushPayload,
            models::notification::RemovePushPayload,

            // --- Empresas ---
            models::company::Company,
            models::company::ProvisionCompanyPayload,
            models::company::MigrationReport,
            models::company::ProvisionedCompany,
        )
    ),
    tags(
        (name = "Webhooks", description = "Eventos vindos do ERP"),
        (name = "Autorizações", description = "Horas extras e desvios de ponto"),
        (name = "Trocas de Turno", description = "Troca entre funcionários (inclusive entre empresas)"),
        (name = "Notificações", description = "Caixa de entrada e push"),
        (name = "Tempo Real", description = "Canal WebSocket por filial e por usuário"),
        (name = "Empresas", description = "Provisionamento e migrações dos bancos"),
        (name = "Saúde", description = "Verificações de disponibilidade")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_workflow_routes_and_jwt_scheme() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/api/webhooks/erp/{kind}"));
        assert!(paths.contains_key("/api/authorizations/{id}/approve"));
        assert!(paths.contains_key("/api/exchanges/{id}/respond"));

        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("api_jwt"));
    }
}
