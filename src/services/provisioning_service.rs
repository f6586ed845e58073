// src/services/provisioning_service.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{db_name_for_slug, validate_db_name},
        error::AppError,
    },
    db::{migrator, CompanyRepository, ShiftRepository, TenantPoolRegistry},
    models::company::{Company, MigrationReport, ProvisionCompanyPayload, ProvisionedCompany},
};

const MAIN_BRANCH_NAME: &str = "Matriz";

#[derive(Clone)]
pub struct ProvisioningService {
    registry: TenantPoolRegistry,
    companies: CompanyRepository,
    shifts: ShiftRepository,
}

impl ProvisioningService {
    pub fn new(registry: TenantPoolRegistry, companies: CompanyRepository, shifts: ShiftRepository) -> Self {
        Self { registry, companies, shifts }
    }

    pub async fn list(&self) -> Result<Vec<Company>, AppError> {
        let master = self.registry.get_master().await?;
        self.companies.list_active(&master).await
    }

    /// Cria a empresa no master e o banco dela, já migrado e com a filial principal.
    /// Se algo falhar depois de criar o banco, desfaz tudo.
    #[tracing::instrument(skip_all, fields(slug = %payload.slug, erp_company_id = payload.erp_company_id))]
    pub async fn provision(&self, payload: &ProvisionCompanyPayload) -> Result<ProvisionedCompany, AppError> {
        let db_name = db_name_for_slug(&payload.slug);
        validate_db_name(&db_name)?;

        let master = self.registry.get_master().await?;

        // 1. Registra a empresa no master (unicidade de slug/código/id do ERP)
        let company = self
            .companies
            .insert(&master, &payload.name, &payload.slug, &db_name, &payload.company_code, payload.erp_company_id)
            .await?;

        // 2. Cria o banco físico
        if let Err(e) = self.registry.create_database(&db_name).await {
            if let Err(cleanup) = self.companies.delete(&master, company.id).await {
                tracing::warn!(company_id = %company.id, error = %cleanup, "Falha ao remover empresa após erro no CREATE DATABASE");
            }
            return Err(e);
        }

        // 3. Migrações + filial principal; em caso de erro, rollback completo
        match self.setup(&master, &company).await {
            Ok(migrations) => {
                tracing::info!(company_id = %company.id, db = %db_name, version = migrations.current_version, "Empresa provisionada");
                let company = self.companies.find_active(&master, company.id).await?;
                Ok(ProvisionedCompany { company, migrations })
            }
            Err(e) => {
                tracing::error!(company_id = %company.id, db = %db_name, error = %e, "Provisionamento falhou; desfazendo");
                self.rollback(&master, &company).await;
                Err(e)
            }
        }
    }

    async fn setup(&self, master: &PgPool, company: &Company) -> Result<MigrationReport, AppError> {
        let pool = self.registry.get_tenant(&company.db_name).await?;
        let report = migrator::migrate(&pool).await?;
        self.shifts.create_main_branch(&pool, MAIN_BRANCH_NAME).await?;
        self.companies.set_migration_version(master, company.id, report.current_version).await?;
        Ok(report)
    }

    // Best-effort: cada passo loga e segue para o próximo
    async fn rollback(&self, master: &PgPool, company: &Company) {
        self.registry.close_tenant(&company.db_name).await;
        if let Err(e) = self.registry.terminate_connections(&company.db_name).await {
            tracing::warn!(db = %company.db_name, error = %e, "Falha ao encerrar sessões do banco");
        }
        if let Err(e) = self.registry.drop_database(&company.db_name).await {
            tracing::warn!(db = %company.db_name, error = %e, "Falha ao remover o banco");
        }
        if let Err(e) = self.companies.delete(master, company.id).await {
            tracing::warn!(company_id = %company.id, error = %e, "Falha ao remover a empresa do master");
        }
    }

    /// Aplica as migrações pendentes de uma empresa e atualiza a versão no master.
    #[tracing::instrument(skip(self))]
    pub async fn migrate_company(&self, company_id: Uuid) -> Result<MigrationReport, AppError> {
        let master = self.registry.get_master().await?;
        let company = self.companies.find_active(&master, company_id).await?;
        let pool = self.registry.get_tenant(&company.db_name).await?;

        let report = migrator::migrate(&pool).await?;
        if report.current_version != company.migration_version {
            self.companies.set_migration_version(&master, company.id, report.current_version).await?;
        }
        Ok(report)
    }

    /// Usado no boot. Falhas são logadas por empresa e não interrompem as demais.
    /// Devolve quantas empresas ficaram na versão mais recente.
    pub async fn migrate_all(&self) -> Result<usize, AppError> {
        let master = self.registry.get_master().await?;
        let companies = self.companies.list_active(&master).await?;
        let latest = migrator::latest_version();
        let mut up_to_date = 0;

        for company in &companies {
            match self.migrate_company(company.id).await {
                Ok(report) => {
                    if !report.applied.is_empty() {
                        tracing::info!(company_id = %company.id, applied = ?report.applied, "Migrações aplicadas");
                    }
                    if report.current_version == latest {
                        up_to_date += 1;
                    }
                }
                Err(e) => tracing::error!(company_id = %company.id, db = %company.db_name, error = %e, "Falha ao migrar empresa"),
            }
        }

        tracing::info!(total = companies.len(), up_to_date, latest, "Migrações de empresas concluídas");
        Ok(up_to_date)
    }

    /// Desativa a empresa e fecha o pool dela. O banco é mantido.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, company_id: Uuid) -> Result<Company, AppError> {
        let master = self.registry.get_master().await?;
        let company = self.companies.deactivate(&master, company_id).await?;
        self.registry.close_tenant(&company.db_name).await;
        tracing::info!(db = %company.db_name, "Empresa desativada");
        Ok(company)
    }
}
