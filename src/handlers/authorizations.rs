// src/handlers/authorizations.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{PermResolveAuthorizations, RequirePermission},
        tenancy::TenantContext,
    },
    models::{
        authorization::{AuthorizationFilter, AuthorizationScope, OvertimeType, ShiftAuthorization},
        erp::ErpSyncJob,
    },
};

// =============================================================================
//  PAYLOADS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReasonPayload {
    #[validate(length(max = 1000, message = "Justificativa muito longa"))]
    #[schema(example = "Ônibus atrasou por causa da chuva")]
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovePayload {
    pub overtime_type: Option<OvertimeType>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectPayload {
    #[validate(length(max = 1000, message = "Motivo muito longo"))]
    #[schema(example = "Sem justificativa válida")]
    pub reason: Option<String>,
}

// =============================================================================
//  LEITURA
// =============================================================================

// GET /api/authorizations
#[utoipa::path(
    get,
    path = "/api/authorizations",
    tag = "Autorizações",
    params(
        AuthorizationFilter,
        ("x-company-id" = Uuid, Header, description = "ID da Empresa")
    ),
    responses(
        (status = 200, description = "Autorizações visíveis ao usuário", body = Vec<ShiftAuthorization>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_authorizations(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Query(filter): Query<AuthorizationFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = AuthorizationScope::for_claims(&user.0);

    let authorizations = app_state
        .authorization_service
        .list(&tenant.pool, &filter, &scope)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(authorizations)))
}

// GET /api/authorizations/{id}
#[utoipa::path(
    get,
    path = "/api/authorizations/{id}",
    tag = "Autorizações",
    params(
        ("id" = Uuid, Path, description = "ID da autorização"),
        ("x-company-id" = Uuid, Header, description = "ID da Empresa")
    ),
    responses(
        (status = 200, description = "Autorização", body = ShiftAuthorization),
        (status = 403, description = "Fora do escopo de filiais do usuário"),
        (status = 404, description = "Não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_authorization(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let authorization = app_state
        .authorization_service
        .get(&tenant.pool, id, &AuthorizationScope::for_claims(&user.0))
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(authorization)))
}

// GET /api/authorizations/{id}/erp-sync
#[utoipa::path(
    get,
    path = "/api/authorizations/{id}/erp-sync",
    tag = "Autorizações",
    params(
        ("id" = Uuid, Path, description = "ID da autorização"),
        ("x-company-id" = Uuid, Header, description = "ID da Empresa")
    ),
    responses(
        (status = 200, description = "Jobs de reescrita no ERP", body = Vec<ErpSyncJob>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_sync_jobs(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermResolveAuthorizations>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let jobs = app_state
        .authorization_service
        .sync_jobs(&tenant.pool, id, &AuthorizationScope::for_claims(&user.0))
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(jobs)))
}

// =============================================================================
//  TRANSIÇÕES
// =============================================================================

// POST /api/authorizations/{id}/reason
#[utoipa::path(
    post,
    path = "/api/authorizations/{id}/reason",
    tag = "Autorizações",
    request_body = SubmitReasonPayload,
    params(
        ("id" = Uuid, Path, description = "ID da autorização"),
        ("x-company-id" = Uuid, Header, description = "ID da Empresa")
    ),
    responses(
        (status = 200, description = "Justificativa registrada", body = ShiftAuthorization),
        (status = 400, description = "Pré-condição não atendida"),
        (status = 403, description = "Não é o funcionário do turno"),
        (status = 409, description = "Já resolvida ou já justificada")
    ),
    security(("api_jwt" = []))
)]
pub async fn submit_reason(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitReasonPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let authorization = app_state
        .authorization_service
        .submit_reason(&tenant.pool, id, user.0.sub, &payload.reason)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(authorization)))
}

// POST /api/authorizations/{id}/approve
#[utoipa::path(
    post,
    path = "/api/authorizations/{id}/approve",
    tag = "Autorizações",
    request_body = ApprovePayload,
    params(
        ("id" = Uuid, Path, description = "ID da autorização"),
        ("x-company-id" = Uuid, Header, description = "ID da Empresa")
    ),
    responses(
        (status = 200, description = "Autorização aprovada", body = ShiftAuthorization),
        (status = 403, description = "Fora do escopo de filiais do gestor"),
        (status = 400, description = "Pré-condição não atendida"),
        (status = 409, description = "Já resolvida")
    ),
    security(("api_jwt" = []))
)]
pub async fn approve(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermResolveAuthorizations>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApprovePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let authorization = app_state
        .authorization_service
        .approve(&tenant.pool, id, &AuthorizationScope::for_claims(&user.0), user.0.sub, payload.overtime_type)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(authorization)))
}

// POST /api/authorizations/{id}/reject
#[utoipa::path(
    post,
    path = "/api/authorizations/{id}/reject",
    tag = "Autorizações",
    request_body = RejectPayload,
    params(
        ("id" = Uuid, Path, description = "ID da autorização"),
        ("x-company-id" = Uuid, Header, description = "ID da Empresa")
    ),
    responses(
        (status = 200, description = "Autorização rejeitada", body = ShiftAuthorization),
        (status = 403, description = "Fora do escopo de filiais do gestor"),
        (status = 400, description = "Motivo obrigatório"),
        (status = 409, description = "Já resolvida")
    ),
    security(("api_jwt" = []))
)]
pub async fn reject(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermResolveAuthorizations>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let authorization = app_state
        .authorization_service
        .reject(&tenant.pool, id, &AuthorizationScope::for_claims(&user.0), user.0.sub, payload.reason.as_deref())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(authorization)))
}
