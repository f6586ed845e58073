// src/models/company.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// ---
// 1. Company (a "Empresa" no banco master)
// ---
// Cada empresa é dona de exatamente um banco (db_name).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: Uuid,
    #[schema(example = "Padaria Central")]
    pub name: String,
    #[schema(example = "padaria-central")]
    pub slug: String,
    #[schema(example = "tenant_padaria_central")]
    pub db_name: String,
    #[schema(example = "PC001")]
    pub company_code: String,
    // Id numérico da empresa no ERP (res.company)
    #[schema(example = 3)]
    pub erp_company_id: i64,
    pub is_active: bool,
    pub migration_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// 2. Payload de provisionamento
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionCompanyPayload {
    #[validate(length(min = 2, message = "O nome deve ter no mínimo 2 caracteres"))]
    #[schema(example = "Padaria Central")]
    pub name: String,

    #[validate(length(min = 2, max = 50, message = "O slug deve ter entre 2 e 50 caracteres"))]
    #[schema(example = "padaria-central")]
    pub slug: String,

    #[validate(length(min = 1, message = "O código da empresa é obrigatório"))]
    #[schema(example = "PC001")]
    pub company_code: String,

    #[validate(range(min = 1, message = "Id do ERP inválido"))]
    #[schema(example = 3)]
    pub erp_company_id: i64,
}

/// Resultado de uma rodada de migrações em um tenant.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub previous_version: i64,
    pub current_version: i64,
    pub batch: i32,
    pub applied: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedCompany {
    pub company: Company,
    pub migrations: MigrationReport,
}
