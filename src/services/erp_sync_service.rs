// src/services/erp_sync_service.rs
//
// Sincronização de volta para o ERP. Roda como canal lateral: os jobs são
// gravados junto com a resolução da autorização e um worker os executa depois,
// com backoff exponencial limitado e dead-letter. Uma falha aqui nunca desfaz
// a transição local.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::{Executor, PgPool, Postgres};
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CompanyRepository, ErpSyncRepository, TenantPoolRegistry},
    models::{
        authorization::{Resolution, ShiftAuthorization},
        erp::{ErpEmployee, ErpSyncJob, ErpSyncOperation, NewErpSyncJob},
        shift::EmployeeShift,
    },
};

/// Qual ponta da marcação está sendo reescrita.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceEdge {
    CheckIn,
    CheckOut,
}

impl From<ErpSyncOperation> for AttendanceEdge {
    fn from(op: ErpSyncOperation) -> Self {
        match op {
            ErpSyncOperation::RewriteCheckIn => AttendanceEdge::CheckIn,
            ErpSyncOperation::RewriteCheckOut => AttendanceEdge::CheckOut,
        }
    }
}

#[async_trait]
pub trait ErpGateway: Send + Sync {
    /// Reescreve check-in ou check-out de uma marcação (hr.attendance).
    async fn rewrite_attendance(&self, attendance_id: i64, edge: AttendanceEdge, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Ajusta início/fim das entradas de trabalho ligadas à marcação. Devolve quantas mudaram.
    async fn patch_work_entries(&self, attendance_id: i64, edge: AttendanceEdge, at: DateTime<Utc>) -> Result<usize, AppError>;

    /// Lê o funcionário pelo id externo dentro da empresa do ERP.
    async fn read_employee(&self, erp_employee_id: i64, erp_company_id: i64) -> Result<Option<ErpEmployee>, AppError>;
}

// =============================================================================
//  Cliente JSON-RPC (Odoo)
// =============================================================================

#[derive(Debug, Clone)]
pub struct OdooSettings {
    pub base_url: String,
    pub database: String,
    pub user_id: i64,
    pub api_key: String,
}

pub struct OdooGateway {
    client: reqwest::Client,
    settings: OdooSettings,
}

// Impede que a chave da API apareça em logs
impl std::fmt::Debug for OdooGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdooGateway")
            .field("base_url", &self.settings.base_url)
            .field("database", &self.settings.database)
            .finish()
    }
}

impl OdooGateway {
    pub fn new(client: reqwest::Client, settings: OdooSettings) -> Self {
        Self { client, settings }
    }

    async fn execute_kw(&self, model: &str, method: &str, args: Value, kwargs: Value) -> Result<Value, AppError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {
                "service": "object",
                "method": "execute_kw",
                "args": [
                    self.settings.database,
                    self.settings.user_id,
                    self.settings.api_key,
                    model,
                    method,
                    args,
                    kwargs,
                ],
            },
            "id": 1,
        });

        let url = format!("{}/jsonrpc", self.settings.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("{}.{}: {}", model, method, e)))?;

        if !resp.status().is_success() {
            return Err(AppError::ExternalService(format!("{}.{}: HTTP {}", model, method, resp.status())));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("{}.{}: resposta inválida: {}", model, method, e)))?;

        rpc_result(payload).map_err(|msg| AppError::ExternalService(format!("{}.{}: {}", model, method, msg)))
    }
}

/// Extrai `result` de uma resposta JSON-RPC ou a mensagem de erro do servidor.
fn rpc_result(mut payload: Value) -> Result<Value, String> {
    if let Some(error) = payload.get("error") {
        let message = error
            .pointer("/data/message")
            .or_else(|| error.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("erro desconhecido");
        return Err(message.to_string());
    }
    Ok(payload.get_mut("result").map(Value::take).unwrap_or(Value::Null))
}

fn erp_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn parse_employee(record: &Value) -> Option<ErpEmployee> {
    Some(ErpEmployee {
        id: record.get("id")?.as_i64()?,
        name: record.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        // O ERP manda `false` quando o campo está vazio
        work_email: record
            .get("work_email")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
    })
}

#[async_trait]
impl ErpGateway for OdooGateway {
    async fn rewrite_attendance(&self, attendance_id: i64, edge: AttendanceEdge, at: DateTime<Utc>) -> Result<(), AppError> {
        let field = match edge {
            AttendanceEdge::CheckIn => "check_in",
            AttendanceEdge::CheckOut => "check_out",
        };
        self.execute_kw(
            "hr.attendance",
            "write",
            json!([[attendance_id], { field: erp_timestamp(at) }]),
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn patch_work_entries(&self, attendance_id: i64, edge: AttendanceEdge, at: DateTime<Utc>) -> Result<usize, AppError> {
        let ids = self
            .execute_kw(
                "hr.work.entry",
                "search",
                json!([[["x_attendance_id", "=", attendance_id]]]),
                json!({}),
            )
            .await?;
        let ids: Vec<i64> = ids.as_array().map(|a| a.iter().filter_map(Value::as_i64).collect()).unwrap_or_default();
        if ids.is_empty() {
            return Ok(0);
        }

        let field = match edge {
            AttendanceEdge::CheckIn => "date_start",
            AttendanceEdge::CheckOut => "date_stop",
        };
        self.execute_kw("hr.work.entry", "write", json!([ids, { field: erp_timestamp(at) }]), json!({}))
            .await?;
        Ok(ids.len())
    }

    async fn read_employee(&self, erp_employee_id: i64, erp_company_id: i64) -> Result<Option<ErpEmployee>, AppError> {
        let records = self
            .execute_kw(
                "hr.employee",
                "search_read",
                json!([[["id", "=", erp_employee_id], ["company_id", "=", erp_company_id]]]),
                json!({ "fields": ["id", "name", "work_email"], "limit": 1 }),
            )
            .await?;

        Ok(records.as_array().and_then(|a| a.first()).and_then(parse_employee))
    }
}

// =============================================================================
//  Serviço + worker
// =============================================================================

#[derive(Debug, Clone)]
pub struct ErpSyncSettings {
    pub interval: Duration,
    pub max_attempts: i32,
    pub max_backoff_secs: i64,
    pub batch_size: i64,
    pub lease_secs: i64,
}

/// O que fazer com um job que falhou.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    RetryAt(DateTime<Utc>),
    DeadLetter,
}

/// Backoff exponencial: 5s * 2^tentativa, limitado por `cap_secs` (<= 0 = sem limite extra).
pub fn next_backoff_secs(attempt: i32, cap_secs: i64) -> i64 {
    let secs = 5_i64 * (1_i64 << attempt.clamp(0, 10));
    if cap_secs <= 0 { secs } else { secs.min(cap_secs) }
}

pub fn failure_action(attempt: i32, settings: &ErpSyncSettings, now: DateTime<Utc>) -> FailureAction {
    if attempt >= settings.max_attempts {
        return FailureAction::DeadLetter;
    }
    FailureAction::RetryAt(now + chrono::Duration::seconds(next_backoff_secs(attempt, settings.max_backoff_secs)))
}

/// Processa cada job do lote. Um erro ao gravar o resultado de um job é
/// logado e o lote segue; devolve quantos foram fechados.
async fn settle_each<'a, F, Fut>(jobs: &'a [ErpSyncJob], mut handle: F) -> usize
where
    F: FnMut(&'a ErpSyncJob) -> Fut,
    Fut: Future<Output = Result<(), AppError>>,
{
    let mut settled = 0;
    for job in jobs {
        match handle(job).await {
            Ok(()) => settled += 1,
            Err(e) => tracing::error!(job_id = %job.id, error = %e, "Falha ao registrar o resultado do job no banco"),
        }
    }
    settled
}

#[derive(Clone)]
pub struct ErpSyncService {
    repo: ErpSyncRepository,
    gateway: Option<Arc<dyn ErpGateway>>,
    settings: ErpSyncSettings,
}

impl ErpSyncService {
    pub fn new(repo: ErpSyncRepository, gateway: Option<Arc<dyn ErpGateway>>, settings: ErpSyncSettings) -> Self {
        Self { repo, gateway, settings }
    }

    pub fn gateway(&self) -> Option<&dyn ErpGateway> {
        self.gateway.as_deref()
    }

    pub async fn jobs_for_authorization(&self, pool: &PgPool, authorization_id: Uuid) -> Result<Vec<ErpSyncJob>, AppError> {
        self.repo.list_for_authorization(pool, authorization_id).await
    }

    /// Grava o job exigido pela resolução (se houver) na transação do chamador.
    /// Sem id de marcação não há o que reescrever no ERP.
    pub async fn enqueue_for_resolution<'e, E>(
        &self,
        executor: E,
        authorization: &ShiftAuthorization,
        shift: &EmployeeShift,
        resolution: Resolution,
    ) -> Result<Option<ErpSyncJob>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let Some(operation) = ErpSyncOperation::for_resolution(authorization.auth_type, resolution) else {
            return Ok(None);
        };
        let Some(erp_attendance_id) = shift.erp_attendance_id else {
            tracing::warn!(
                authorization_id = %authorization.id,
                shift_id = %shift.id,
                "Turno sem marcação do ERP; reescrita de ponto ignorada"
            );
            return Ok(None);
        };

        let job = NewErpSyncJob {
            operation,
            authorization_id: authorization.id,
            erp_attendance_id,
            target_time: operation.target_time(shift.shift_start, shift.shift_end),
        };
        self.repo.enqueue(executor, &job).await.map(Some)
    }

    /// Executa um job no ERP: marcação primeiro, depois as entradas de trabalho.
    pub async fn execute(&self, gateway: &dyn ErpGateway, job: &ErpSyncJob) -> Result<usize, AppError> {
        let edge = AttendanceEdge::from(job.operation);
        gateway.rewrite_attendance(job.erp_attendance_id, edge, job.target_time).await?;
        gateway.patch_work_entries(job.erp_attendance_id, edge, job.target_time).await
    }

    /// Processa os jobs vencidos de um tenant. Devolve quantos foram reivindicados.
    #[tracing::instrument(skip_all, fields(db = %db_name))]
    pub async fn process_due(&self, pool: &PgPool, db_name: &str) -> Result<usize, AppError> {
        let Some(gateway) = self.gateway.as_deref() else {
            return Ok(0);
        };

        let jobs = self
            .repo
            .claim_due(pool, self.settings.batch_size, self.settings.lease_secs)
            .await?;

        let settled = settle_each(&jobs, |job| self.run_job(pool, gateway, job)).await;
        if settled < jobs.len() {
            tracing::warn!(db = db_name, claimed = jobs.len(), settled, "Parte do lote fica para quando o lease expirar");
        }

        Ok(jobs.len())
    }

    /// Executa um job e grava o resultado (feito, nova tentativa ou dead-letter).
    async fn run_job(&self, pool: &PgPool, gateway: &dyn ErpGateway, job: &ErpSyncJob) -> Result<(), AppError> {
        match self.execute(gateway, job).await {
            Ok(entries) => {
                self.repo.mark_done(pool, job.id).await?;
                tracing::info!(job_id = %job.id, attempt = job.attempt, work_entries = entries, "Ponto reescrito no ERP");
            }
            Err(err) => {
                let reason = err.to_string();
                match failure_action(job.attempt, &self.settings, Utc::now()) {
                    FailureAction::RetryAt(due_at) => {
                        tracing::warn!(job_id = %job.id, attempt = job.attempt, %reason, "Falha ao sincronizar com o ERP; backoff");
                        self.repo.reschedule(pool, job.id, due_at, &reason).await?;
                    }
                    FailureAction::DeadLetter => {
                        tracing::error!(
                            job_id = %job.id,
                            authorization_id = %job.authorization_id,
                            attempt = job.attempt,
                            %reason,
                            "Sincronização com o ERP desistiu após o máximo de tentativas"
                        );
                        self.repo.mark_dead(pool, job.id, &reason).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Laço do worker: a cada intervalo, varre as empresas ativas.
    pub async fn run_worker(self, registry: TenantPoolRegistry, companies: CompanyRepository, mut shutdown: watch::Receiver<bool>) {
        if self.gateway.is_none() {
            tracing::info!("ERP não configurado; worker de sincronização desligado");
            return;
        }
        tracing::info!(interval_secs = self.settings.interval.as_secs(), "Worker de sincronização com o ERP iniciado");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.sweep(&registry, &companies).await {
                tracing::error!(error = %e, "Erro no worker de sincronização com o ERP");
            }
        }

        tracing::info!("Worker de sincronização com o ERP encerrado");
    }

    async fn sweep(&self, registry: &TenantPoolRegistry, companies: &CompanyRepository) -> Result<(), AppError> {
        let master = registry.get_master().await?;
        for company in companies.list_active(&master).await? {
            let result = async {
                let pool = registry.get_tenant(&company.db_name).await?;
                self.process_due(&pool, &company.db_name).await
            }
            .await;

            if let Err(e) = result {
                tracing::warn!(company_id = %company.id, error = %e, "Falha ao processar a fila do ERP da empresa");
            }
        }
        Ok(())
    }
}
