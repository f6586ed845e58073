// tests/workflow_scenarios.rs
//
// Cenários de ponta a ponta contra um Postgres real. Precisam de
// TEST_MASTER_DATABASE_URL (usuário com permissão de CREATE DATABASE):
//
//   TEST_MASTER_DATABASE_URL=postgres://... cargo test -- --ignored

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use workforce_backend::{
    common::error::AppError,
    config::{AppConfig, AppState},
    db::{ExchangeRepository, ShiftRepository},
    models::{
        auth::{Claims, CAP_APPROVE_EXCHANGES},
        authorization::{AuthorizationFilter, AuthorizationScope, AuthorizationStatus, AuthorizationType, OvertimeType},
        company::{Company, ProvisionCompanyPayload},
        exchange::{ApprovalStage, CreateExchangePayload, EmployeeAction, ExchangeStatus, SwapStep},
        notification::{NewNotification, PushOutcome, PushSubscription, RegisterPushPayload},
        shift::{EmployeeShift, ShiftLogType, ShiftStatus},
        webhook::{WebhookEvent, WebhookKind},
    },
    services::notification_service::PushGateway,
};

// =============================================================================
//  HARNESS
// =============================================================================

struct Tenant {
    company: Company,
    pool: PgPool,
}

struct Harness {
    state: AppState,
    master: PgPool,
    created: Vec<Company>,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with_push(None).await
    }

    async fn start_with_push(push: Option<Arc<dyn PushGateway>>) -> Self {
        let url = std::env::var("TEST_MASTER_DATABASE_URL").expect("TEST_MASTER_DATABASE_URL não definida");
        let vars: HashMap<&str, String> = HashMap::from([
            ("MASTER_DATABASE_URL", url),
            ("JWT_SECRET", "segredo-de-teste".to_string()),
            ("ERP_WEBHOOK_SECRET", "webhook-de-teste".to_string()),
        ]);
        let config = AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
        let base = AppState::new(config.clone()).unwrap();
        let state = AppState::assemble(config, base.registry.clone(), None, push);

        let master = state.registry.get_master().await.unwrap();
        sqlx::migrate!("./migrations/master").run(&master).await.unwrap();

        Harness { state, master, created: Vec::new() }
    }

    async fn company(&mut self) -> Tenant {
        let tag = Uuid::new_v4().simple().to_string();
        let provisioned = self
            .state
            .provisioning_service
            .provision(&ProvisionCompanyPayload {
                name: format!("Empresa {}", &tag[..6]),
                slug: format!("teste-{}", &tag[..12]),
                company_code: format!("T{}", &tag[..10]),
                erp_company_id: (Uuid::new_v4().as_u128() & 0x7fff_ffff) as i64 + 1,
            })
            .await
            .unwrap();

        let pool = self.state.registry.get_tenant(&provisioned.company.db_name).await.unwrap();
        self.created.push(provisioned.company.clone());
        Tenant { company: provisioned.company, pool }
    }

    async fn employee(&self, tenant: &Tenant, erp_employee_id: i64) -> Uuid {
        let user_id: Uuid = sqlx::query_scalar("INSERT INTO users (email, full_name) VALUES ($1, $2) RETURNING id")
            .bind(format!("{}@teste.local", Uuid::new_v4().simple()))
            .bind("Funcionária de Teste")
            .fetch_one(&self.master)
            .await
            .unwrap();
        self.link(user_id, tenant, erp_employee_id).await;
        user_id
    }

    async fn link(&self, user_id: Uuid, tenant: &Tenant, erp_employee_id: i64) {
        self.state
            .company_repo
            .link_user(&self.master, user_id, tenant.company.id, erp_employee_id)
            .await
            .unwrap();
    }

    async fn ingest(&self, kind: WebhookKind, body: Value) -> Value {
        let event = WebhookEvent::parse(kind, body).unwrap();
        self.state.ingestion_service.ingest(event).await.unwrap().data
    }

    async fn shift(&self, tenant: &Tenant, erp_shift_id: i64, erp_employee_id: i64, state: Option<&str>, worked: Option<f64>) -> EmployeeShift {
        let mut body = json!({
            "_action": "update",
            "id": erp_shift_id,
            "x_company_id": [tenant.company.erp_company_id, "Empresa"],
            "employee_id": [erp_employee_id, "Maria"],
            "x_branch_id": false,
            "start_datetime": "2030-03-10 08:00:00",
            "end_datetime": "2030-03-10 16:00:00",
            "allocated_hours": 8
        });
        if let Some(state) = state {
            body["state"] = json!(state);
        }
        if let Some(worked) = worked {
            body["worked_hours"] = json!(worked);
        }
        serde_json::from_value(self.ingest(WebhookKind::Shift, body).await).unwrap()
    }

    async fn attendance(
        &self,
        tenant: &Tenant,
        erp_attendance_id: i64,
        erp_shift_id: i64,
        erp_employee_id: i64,
        check_in: &str,
        check_out: &str,
    ) -> EmployeeShift {
        let body = json!({
            "_action": "update",
            "id": erp_attendance_id,
            "x_company_id": [tenant.company.erp_company_id, "Empresa"],
            "employee_id": [erp_employee_id, "Maria"],
            "x_shift_id": [erp_shift_id, "Turno"],
            "check_in": check_in,
            "check_out": check_out
        });
        serde_json::from_value(self.ingest(WebhookKind::Attendance, body).await).unwrap()
    }

    fn hr(&self, company_ids: Vec<Uuid>) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            exp: 0,
            iat: 0,
            company_ids,
            branch_ids: vec![],
            capabilities: vec![CAP_APPROVE_EXCHANGES.to_string()],
        }
    }

    async fn cleanup(self) {
        for company in &self.created {
            self.state.registry.close_tenant(&company.db_name).await;
            let _ = self.state.registry.terminate_connections(&company.db_name).await;
            let _ = self.state.registry.drop_database(&company.db_name).await;
            let _ = sqlx::query("DELETE FROM shift_exchange_requests WHERE requester_company_id = $1 OR accepting_company_id = $1")
                .bind(company.id)
                .execute(&self.master)
                .await;
            let _ = self.state.company_repo.delete(&self.master, company.id).await;
        }
    }
}

fn exchange(requester_shift: &EmployeeShift, target: &Tenant, target_shift: &EmployeeShift) -> CreateExchangePayload {
    CreateExchangePayload {
        requester_shift_id: requester_shift.id,
        target_company_id: target.company.id,
        target_shift_id: target_shift.id,
        reason: Some("Consulta médica".into()),
    }
}

// =============================================================================
//  AUTORIZAÇÕES
// =============================================================================

#[tokio::test]
#[ignore = "precisa de Postgres (TEST_MASTER_DATABASE_URL)"]
async fn overtime_is_created_once_and_approval_settles_the_counter() {
    let mut h = Harness::start().await;
    let t = h.company().await;
    let employee = h.employee(&t, 42).await;
    let manager = h.employee(&t, 7).await;
    let shifts = ShiftRepository::new();
    let all = AuthorizationScope::AllBranches;

    // A. Turno encerrado com 9,5h trabalhadas contra 8h alocadas
    let shift = h.shift(&t, 881, 42, Some("done"), Some(9.5)).await;
    assert_eq!(shift.user_id, Some(employee));
    assert_eq!(shift.pending_approvals, 1);

    let filter = AuthorizationFilter { shift_id: Some(shift.id), ..Default::default() };
    let authorizations = h.state.authorization_service.list(&t.pool, &filter, &all).await.unwrap();
    assert_eq!(authorizations.len(), 1);
    let overtime = &authorizations[0];
    assert_eq!(overtime.auth_type, AuthorizationType::Overtime);
    assert_eq!(overtime.diff_minutes, 90);

    // Reenvio idêntico não duplica
    let replayed = h.shift(&t, 881, 42, Some("done"), Some(9.5)).await;
    assert_eq!(replayed.id, shift.id);
    assert_eq!(replayed.pending_approvals, 1);
    assert_eq!(h.state.authorization_service.list(&t.pool, &filter, &all).await.unwrap().len(), 1);

    // Gestor de outra filial não alcança a autorização
    let elsewhere = AuthorizationScope::Branches(vec![Uuid::new_v4()]);
    let blocked = h
        .state
        .authorization_service
        .approve(&t.pool, overtime.id, &elsewhere, manager, Some(OvertimeType::NormalOvertime))
        .await;
    assert!(matches!(blocked, Err(AppError::Forbidden(_))));

    // B. Aprovação com hora extra premium
    let approved = h
        .state
        .authorization_service
        .approve(&t.pool, overtime.id, &all, manager, Some(OvertimeType::OvertimePremium))
        .await
        .unwrap();
    assert_eq!(approved.status, AuthorizationStatus::Approved);
    assert_eq!(approved.overtime_type, Some(OvertimeType::OvertimePremium));
    assert_eq!(approved.resolved_by, Some(manager));

    let after = shifts.find_by_id(&t.pool, shift.id).await.unwrap().unwrap();
    assert_eq!(after.pending_approvals, 0);

    let logs = shifts.list_logs(&t.pool, shift.id).await.unwrap();
    let resolved_logs = logs.iter().filter(|l| l.log_type == ShiftLogType::AuthorizationResolved).count();
    assert_eq!(resolved_logs, 1);

    let inbox = h.state.notification_service.list(&t.pool, employee, false).await.unwrap();
    assert_eq!(inbox.iter().filter(|n| n.kind == "authorization_resolved").count(), 1);

    // Segunda decisão: conflito e linha intacta
    let second = h.state.authorization_service.reject(&t.pool, overtime.id, &all, manager, Some("tarde demais")).await;
    let err = second.expect_err("a segunda decisão deveria falhar");
    assert_eq!(err.status(), StatusCode::CONFLICT);

    let unchanged = h.state.authorization_service.get(&t.pool, overtime.id, &all).await.unwrap();
    assert_eq!(unchanged.status, AuthorizationStatus::Approved);
    assert_eq!(unchanged.resolved_at, approved.resolved_at);

    h.cleanup().await;
}

#[tokio::test]
#[ignore = "precisa de Postgres (TEST_MASTER_DATABASE_URL)"]
async fn tardiness_pair_counts_and_rejection_releases_one() {
    let mut h = Harness::start().await;
    let t = h.company().await;
    let employee = h.employee(&t, 51).await;
    let manager = h.employee(&t, 52).await;
    let all = AuthorizationScope::AllBranches;

    let shift = h.shift(&t, 700, 51, Some("published"), None).await;
    assert_eq!(shift.pending_approvals, 0);

    // Entrada 20 min atrasada e saída 30 min antes
    let ended = h.attendance(&t, 9700, 700, 51, "2030-03-10 08:20:00", "2030-03-10 15:30:00").await;
    assert_eq!(ended.status, ShiftStatus::Ended);
    assert_eq!(ended.pending_approvals, 2);

    let filter = AuthorizationFilter { shift_id: Some(shift.id), ..Default::default() };
    let found = h.state.authorization_service.list(&t.pool, &filter, &all).await.unwrap();
    let tardiness = found.iter().find(|a| a.auth_type == AuthorizationType::Tardiness).unwrap();
    assert_eq!(tardiness.diff_minutes, 20);
    assert_eq!(tardiness.user_id, Some(employee));
    assert!(found.iter().any(|a| a.auth_type == AuthorizationType::EarlyCheckOut && a.diff_minutes == 30));

    let rejected = h
        .state
        .authorization_service
        .reject(&t.pool, tardiness.id, &all, manager, Some("sem justificativa"))
        .await
        .unwrap();
    assert_eq!(rejected.status, AuthorizationStatus::Rejected);

    let after = ShiftRepository::new().find_by_id(&t.pool, shift.id).await.unwrap().unwrap();
    assert_eq!(after.pending_approvals, 1);

    h.cleanup().await;
}

#[tokio::test]
#[ignore = "precisa de Postgres (TEST_MASTER_DATABASE_URL)"]
async fn shift_update_without_state_keeps_an_ended_shift_ended() {
    let mut h = Harness::start().await;
    let t = h.company().await;
    h.employee(&t, 61).await;
    let shifts = ShiftRepository::new();

    h.shift(&t, 800, 61, Some("published"), None).await;
    let ended = h.attendance(&t, 9800, 800, 61, "2030-03-10 08:00:00", "2030-03-10 16:00:00").await;
    assert_eq!(ended.status, ShiftStatus::Ended);

    // O ERP reenvia o turno sem `state`, e depois um `state` antigo
    let stateless = h.shift(&t, 800, 61, None, None).await;
    assert_eq!(stateless.status, ShiftStatus::Ended);
    let stale = h.shift(&t, 800, 61, Some("published"), None).await;
    assert_eq!(stale.status, ShiftStatus::Ended);

    // Replay da mesma marcação não reencerra o turno
    h.attendance(&t, 9800, 800, 61, "2030-03-10 08:00:00", "2030-03-10 16:00:00").await;
    let logs = shifts.list_logs(&t.pool, ended.id).await.unwrap();
    assert_eq!(logs.iter().filter(|l| l.log_type == ShiftLogType::ShiftEnded).count(), 1);

    h.cleanup().await;
}

// =============================================================================
//  TROCAS DE TURNO
// =============================================================================

#[tokio::test]
#[ignore = "precisa de Postgres (TEST_MASTER_DATABASE_URL)"]
async fn exchange_stages_are_enforced_and_pending_requests_are_unique() {
    let mut h = Harness::start().await;
    let t = h.company().await;
    let requester = h.employee(&t, 100).await;
    let colleague = h.employee(&t, 200).await;
    let hr = h.hr(vec![t.company.id]);

    let offered = h.shift(&t, 9001, 100, Some("published"), None).await;
    let wanted = h.shift(&t, 9002, 200, Some("published"), None).await;

    let payload = exchange(&offered, &t, &wanted);
    let request = h.state.exchange_service.create(requester, &t.company, &payload).await.unwrap();
    assert_eq!(request.accepting_user_id, colleague);
    assert_eq!(request.approval_stage, ApprovalStage::AwaitingEmployee);

    // Não existe segunda troca pendente para os mesmos turnos
    let duplicate = h.state.exchange_service.create(requester, &t.company, &payload).await;
    assert!(matches!(duplicate, Err(ref e) if e.status() == StatusCode::CONFLICT));

    // O RH não aprova antes do aceite
    let early = h.state.exchange_service.hr_approve(request.id, &hr).await;
    assert!(matches!(early, Err(AppError::Precondition(_))));

    // Recusa do colega encerra a troca
    let rejected = h
        .state
        .exchange_service
        .respond(request.id, colleague, EmployeeAction::Reject, Some("Não posso"))
        .await
        .unwrap();
    assert_eq!(rejected.status, ExchangeStatus::Rejected);
    assert_eq!(rejected.approval_stage, ApprovalStage::Resolved);

    h.cleanup().await;
}

#[tokio::test]
#[ignore = "precisa de Postgres (TEST_MASTER_DATABASE_URL)"]
async fn concurrent_creations_never_put_a_shift_in_two_pending_exchanges() {
    let mut h = Harness::start().await;
    let t = h.company().await;
    let alice = h.employee(&t, 301).await;
    h.employee(&t, 302).await;
    let carol = h.employee(&t, 303).await;

    for round in 0..5_i64 {
        let a = h.shift(&t, 31_000 + round * 10, 301, Some("published"), None).await;
        let b = h.shift(&t, 31_001 + round * 10, 302, Some("published"), None).await;
        let c = h.shift(&t, 31_002 + round * 10, 303, Some("published"), None).await;

        // A como solicitante e A como alvo, ao mesmo tempo
        let as_requester = exchange(&a, &t, &b);
        let as_target = exchange(&c, &t, &a);
        let (first, second) = tokio::join!(
            h.state.exchange_service.create(alice, &t.company, &as_requester),
            h.state.exchange_service.create(carol, &t.company, &as_target),
        );

        let created = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(created, 1, "rodada {}: o turno A entrou em {} trocas pendentes", round, created);
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(loser, Err(ref e) if e.status() == StatusCode::CONFLICT));
    }

    h.cleanup().await;
}

#[tokio::test]
#[ignore = "precisa de Postgres (TEST_MASTER_DATABASE_URL)"]
async fn approved_exchange_swaps_owners_in_both_companies() {
    let mut h = Harness::start().await;
    let home = h.company().await;
    let other = h.company().await;
    let requester = h.employee(&home, 400).await;
    let colleague = h.employee(&other, 500).await;
    h.link(requester, &other, 401).await;
    h.link(colleague, &home, 501).await;
    let shifts = ShiftRepository::new();

    let offered = h.shift(&home, 40_001, 400, Some("published"), None).await;
    let wanted = h.shift(&other, 50_001, 500, Some("published"), None).await;

    let request = h
        .state
        .exchange_service
        .create(requester, &home.company, &exchange(&offered, &other, &wanted))
        .await
        .unwrap();
    h.state
        .exchange_service
        .respond(request.id, colleague, EmployeeAction::Accept, None)
        .await
        .unwrap();

    // RH de uma empresa que não participa da troca
    let outsider = h.hr(vec![Uuid::new_v4()]);
    let blocked = h.state.exchange_service.hr_approve(request.id, &outsider).await;
    assert!(matches!(blocked, Err(AppError::Forbidden(_))));
    assert!(matches!(h.state.exchange_service.detail(request.id, &outsider).await, Err(AppError::Forbidden(_))));

    let approved = h
        .state
        .exchange_service
        .hr_approve(request.id, &h.hr(vec![other.company.id]))
        .await
        .unwrap();
    assert_eq!(approved.status, ExchangeStatus::Approved);
    assert_eq!(approved.swap_step, SwapStep::Completed);

    let offered_now = shifts.find_by_id(&home.pool, offered.id).await.unwrap().unwrap();
    let wanted_now = shifts.find_by_id(&other.pool, wanted.id).await.unwrap().unwrap();
    assert_eq!(offered_now.user_id, Some(colleague));
    assert_eq!(wanted_now.user_id, Some(requester));

    let logs = shifts.list_logs(&other.pool, wanted.id).await.unwrap();
    assert_eq!(logs.iter().filter(|l| l.log_type == ShiftLogType::ExchangeApplied).count(), 1);

    h.cleanup().await;
}

#[tokio::test]
#[ignore = "precisa de Postgres (TEST_MASTER_DATABASE_URL)"]
async fn reconciler_resumes_a_swap_stopped_after_the_first_side() {
    let mut h = Harness::start().await;
    let home = h.company().await;
    let other = h.company().await;
    let requester = h.employee(&home, 600).await;
    let colleague = h.employee(&other, 700).await;
    let shifts = ShiftRepository::new();
    let exchanges = ExchangeRepository::new();

    let offered = h.shift(&home, 60_001, 600, Some("published"), None).await;
    let wanted = h.shift(&other, 70_001, 700, Some("published"), None).await;

    let request = h
        .state
        .exchange_service
        .create(requester, &home.company, &exchange(&offered, &other, &wanted))
        .await
        .unwrap();
    h.state
        .exchange_service
        .respond(request.id, colleague, EmployeeAction::Accept, None)
        .await
        .unwrap();

    // O banco do segundo lado fica inalcançável durante a aprovação
    let missing_db = format!("ausente_{}", Uuid::new_v4().simple());
    sqlx::query("UPDATE shift_exchange_requests SET accepting_db_name = $1 WHERE id = $2")
        .bind(&missing_db)
        .bind(request.id)
        .execute(&h.master)
        .await
        .unwrap();

    let approved = h
        .state
        .exchange_service
        .hr_approve(request.id, &h.hr(vec![home.company.id]))
        .await
        .unwrap();
    assert_eq!(approved.status, ExchangeStatus::Approved);
    assert_eq!(approved.swap_step, SwapStep::RequesterApplied);
    assert_eq!(approved.swap_attempts, 1);
    assert!(approved.swap_last_error.is_some());

    let offered_now = shifts.find_by_id(&home.pool, offered.id).await.unwrap().unwrap();
    assert_eq!(offered_now.user_id, Some(colleague));
    let wanted_now = shifts.find_by_id(&other.pool, wanted.id).await.unwrap().unwrap();
    assert_eq!(wanted_now.user_id, Some(colleague));

    // O banco volta e o reconciliador termina a partir do passo salvo
    sqlx::query("UPDATE shift_exchange_requests SET accepting_db_name = $1 WHERE id = $2")
        .bind(&other.company.db_name)
        .bind(request.id)
        .execute(&h.master)
        .await
        .unwrap();

    let completed = h.state.exchange_service.reconcile_once().await.unwrap();
    assert!(completed >= 1);

    let finished = exchanges.find_by_id(&h.master, request.id).await.unwrap();
    assert_eq!(finished.swap_step, SwapStep::Completed);
    let wanted_now = shifts.find_by_id(&other.pool, wanted.id).await.unwrap().unwrap();
    assert_eq!(wanted_now.user_id, Some(requester));

    // O primeiro lado não foi reaplicado
    let logs = shifts.list_logs(&home.pool, offered.id).await.unwrap();
    assert_eq!(logs.iter().filter(|l| l.log_type == ShiftLogType::ExchangeApplied).count(), 1);

    h.state.registry.close_tenant(&missing_db).await;
    h.cleanup().await;
}

// =============================================================================
//  PUSH
// =============================================================================

/// Endpoints com "gone" respondem 410; os demais recebem.
struct ExpiringPush;

#[async_trait]
impl PushGateway for ExpiringPush {
    async fn send(&self, subscription: &PushSubscription, _payload: &Value) -> PushOutcome {
        if subscription.endpoint.contains("gone") {
            PushOutcome::Rejected { status: 410, reason: "Gone".into() }
        } else {
            PushOutcome::Delivered
        }
    }
}

#[tokio::test]
#[ignore = "precisa de Postgres (TEST_MASTER_DATABASE_URL)"]
async fn expired_push_endpoint_is_deactivated_in_the_database() {
    let mut h = Harness::start_with_push(Some(Arc::new(ExpiringPush))).await;
    let t = h.company().await;
    let employee = h.employee(&t, 81).await;
    let notifications = &h.state.notification_service;

    for endpoint in ["https://push.example.com/gone/1", "https://push.example.com/ok/1"] {
        notifications
            .register_subscription(
                &t.pool,
                employee,
                &RegisterPushPayload { endpoint: endpoint.into(), p256dh: "chave".into(), auth: "segredo".into() },
            )
            .await
            .unwrap();
    }

    let new = NewNotification {
        user_id: employee,
        title: "Aviso".into(),
        message: "Teste de entrega".into(),
        kind: "test".into(),
        link_url: None,
    };
    let stored = notifications.record(&t.pool, &new).await.unwrap();
    let report = notifications.deliver(&t.pool, &stored).await;
    assert_eq!(report.push_attempted, 2);
    assert_eq!(report.push_delivered, 1);
    assert_eq!(report.push_deactivated, 1);

    let gone_active: bool = sqlx::query_scalar("SELECT is_active FROM push_subscriptions WHERE endpoint = $1")
        .bind("https://push.example.com/gone/1")
        .fetch_one(&t.pool)
        .await
        .unwrap();
    assert!(!gone_active);

    // A próxima entrega só tenta o endpoint que continua ativo
    let again = notifications.deliver(&t.pool, &stored).await;
    assert_eq!(again.push_attempted, 1);

    h.cleanup().await;
}
