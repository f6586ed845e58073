// src/db/company_repo.rs
//
// Banco master: diretório de empresas, usuários e vínculo funcionário do ERP <-> usuário.

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::{db_utils::is_unique_violation, error::AppError},
    models::company::Company,
};

#[derive(Clone, Default)]
pub struct CompanyRepository;

impl CompanyRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    //  EMPRESAS
    // =========================================================================

    /// Resolve o tenant de um evento do ERP. Empresas inativas não recebem eventos.
    pub async fn find_active_by_erp_id<'e, E>(&self, executor: E, erp_company_id: i64) -> Result<Option<Company>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let company = sqlx::query_as::<_, Company>(
            "SELECT * FROM companies WHERE erp_company_id = $1 AND is_active = TRUE",
        )
        .bind(erp_company_id)
        .fetch_optional(executor)
        .await?;

        Ok(company)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, company_id: Uuid) -> Result<Option<Company>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
            .bind(company_id)
            .fetch_optional(executor)
            .await?;

        Ok(company)
    }

    pub async fn find_active<'e, E>(&self, executor: E, company_id: Uuid) -> Result<Company, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1 AND is_active = TRUE")
            .bind(company_id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::CompanyNotFound(company_id.to_string()))
    }

    pub async fn list_active<'e, E>(&self, executor: E) -> Result<Vec<Company>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let companies = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE is_active = TRUE ORDER BY name")
            .fetch_all(executor)
            .await?;

        Ok(companies)
    }

    pub async fn insert<'e, E>(
        &self,
        executor: E,
        name: &str,
        slug: &str,
        db_name: &str,
        company_code: &str,
        erp_company_id: i64,
    ) -> Result<Company, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Company>(
            r#"
            INSERT INTO companies (name, slug, db_name, company_code, erp_company_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(slug)
        .bind(db_name)
        .bind(company_code)
        .bind(erp_company_id)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Já existe uma empresa com o slug '{}', código ou id do ERP informados", slug))
            } else {
                e.into()
            }
        })
    }

    pub async fn delete<'e, E>(&self, executor: E, company_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("DELETE FROM companies WHERE id = $1")
            .bind(company_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn set_migration_version<'e, E>(&self, executor: E, company_id: Uuid, version: i64) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE companies SET migration_version = $2, updated_at = NOW() WHERE id = $1")
            .bind(company_id)
            .bind(version)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn deactivate<'e, E>(&self, executor: E, company_id: Uuid) -> Result<Company, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Company>(
            "UPDATE companies SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(company_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::CompanyNotFound(company_id.to_string()))
    }

    // =========================================================================
    //  USUÁRIOS & VÍNCULOS COM O ERP
    // =========================================================================

    pub async fn find_user_by_erp_employee<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        erp_employee_id: i64,
    ) -> Result<Option<Uuid>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM user_company_links WHERE company_id = $1 AND erp_employee_id = $2",
        )
        .bind(company_id)
        .bind(erp_employee_id)
        .fetch_optional(executor)
        .await?;

        Ok(user_id)
    }

    pub async fn find_active_user_by_email<'e, E>(&self, executor: E, email: &str) -> Result<Option<Uuid>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM users WHERE LOWER(email) = LOWER($1) AND is_active = TRUE",
        )
        .bind(email.trim())
        .fetch_optional(executor)
        .await?;

        Ok(user_id)
    }

    /// Grava o vínculo. Se já existir para o usuário nessa empresa, atualiza o id do ERP.
    pub async fn link_user<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        company_id: Uuid,
        erp_employee_id: i64,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO user_company_links (user_id, company_id, erp_employee_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, company_id) DO UPDATE SET erp_employee_id = EXCLUDED.erp_employee_id
            "#,
        )
        .bind(user_id)
        .bind(company_id)
        .bind(erp_employee_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Vínculo do usuário com a empresa (usado na troca entre empresas).
    pub async fn erp_employee_for_user<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        company_id: Uuid,
    ) -> Result<Option<i64>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let erp_id = sqlx::query_scalar::<_, i64>(
            "SELECT erp_employee_id FROM user_company_links WHERE user_id = $1 AND company_id = $2",
        )
        .bind(user_id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(erp_id)
    }
}
