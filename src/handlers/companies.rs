// src/handlers/companies.rs
//
// Administração da plataforma: empresas no master e seus bancos.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        i18n::Locale,
        rbac::{PermManageCompanies, RequirePermission},
    },
    models::company::{Company, MigrationReport, ProvisionCompanyPayload, ProvisionedCompany},
};

// POST /api/companies
#[utoipa::path(
    post,
    path = "/api/companies",
    tag = "Empresas",
    request_body = ProvisionCompanyPayload,
    responses(
        (status = 201, description = "Empresa criada com banco próprio", body = ProvisionedCompany),
        (status = 400, description = "Dados inválidos"),
        (status = 409, description = "Slug, código ou id do ERP já usados"),
        (status = 500, description = "Falha no provisionamento (desfeito)")
    ),
    security(("api_jwt" = []))
)]
pub async fn provision_company(
    State(app_state): State<AppState>,
    locale: Locale,
    _perm: RequirePermission<PermManageCompanies>,
    Json(payload): Json<ProvisionCompanyPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let provisioned = app_state
        .provisioning_service
        .provision(&payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(provisioned)))
}

// GET /api/companies
#[utoipa::path(
    get,
    path = "/api/companies",
    tag = "Empresas",
    responses(
        (status = 200, description = "Empresas ativas", body = Vec<Company>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_companies(
    State(app_state): State<AppState>,
    locale: Locale,
    _perm: RequirePermission<PermManageCompanies>,
) -> Result<impl IntoResponse, ApiError> {
    let companies = app_state
        .provisioning_service
        .list()
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(companies)))
}

// POST /api/companies/{id}/migrate
#[utoipa::path(
    post,
    path = "/api/companies/{id}/migrate",
    tag = "Empresas",
    params(("id" = Uuid, Path, description = "ID da empresa")),
    responses(
        (status = 200, description = "Migrações aplicadas", body = MigrationReport),
        (status = 500, description = "Migração falhou")
    ),
    security(("api_jwt" = []))
)]
pub async fn migrate_company(
    State(app_state): State<AppState>,
    locale: Locale,
    _perm: RequirePermission<PermManageCompanies>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let report = app_state
        .provisioning_service
        .migrate_company(id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(report)))
}

// POST /api/companies/{id}/deactivate
#[utoipa::path(
    post,
    path = "/api/companies/{id}/deactivate",
    tag = "Empresas",
    params(("id" = Uuid, Path, description = "ID da empresa")),
    responses(
        (status = 200, description = "Empresa desativada", body = Company),
        (status = 404, description = "Não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn deactivate_company(
    State(app_state): State<AppState>,
    locale: Locale,
    _perm: RequirePermission<PermManageCompanies>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let company = app_state
        .provisioning_service
        .deactivate(id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(company)))
}
