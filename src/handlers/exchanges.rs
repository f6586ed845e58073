// src/handlers/exchanges.rs

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
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{PermApproveExchanges, RequirePermission},
        tenancy::TenantContext,
    },
    models::exchange::{
        CreateExchangePayload, ExchangeDetail, HrRejectPayload, RespondExchangePayload, ShiftExchangeRequest,
    },
};

// POST /api/exchanges
#[utoipa::path(
    post,
    path = "/api/exchanges",
    tag = "Trocas de Turno",
    request_body = CreateExchangePayload,
    params(
        ("x-company-id" = Uuid, Header, description = "Empresa do turno oferecido")
    ),
    responses(
        (status = 201, description = "Troca solicitada", body = ShiftExchangeRequest),
        (status = 400, description = "Turnos inválidos para troca"),
        (status = 403, description = "O turno oferecido não é seu"),
        (status = 409, description = "Já existe troca pendente para um dos turnos")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_exchange(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Json(payload): Json<CreateExchangePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let request = app_state
        .exchange_service
        .create(user.0.sub, &tenant.company, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(request)))
}

// GET /api/exchanges/mine
#[utoipa::path(
    get,
    path = "/api/exchanges/mine",
    tag = "Trocas de Turno",
    responses(
        (status = 200, description = "Trocas pedidas por mim ou para mim", body = Vec<ShiftExchangeRequest>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_my_exchanges(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let requests = app_state
        .exchange_service
        .list_for_user(user.0.sub)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(requests)))
}

// GET /api/exchanges/pending-hr
#[utoipa::path(
    get,
    path = "/api/exchanges/pending-hr",
    tag = "Trocas de Turno",
    responses(
        (status = 200, description = "Trocas aguardando o RH nas empresas do usuário", body = Vec<ShiftExchangeRequest>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_pending_hr(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermApproveExchanges>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = app_state
        .exchange_service
        .list_awaiting_hr(&user.0.company_ids)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(requests)))
}

// GET /api/exchanges/{id}
#[utoipa::path(
    get,
    path = "/api/exchanges/{id}",
    tag = "Trocas de Turno",
    params(("id" = Uuid, Path, description = "ID da troca")),
    responses(
        (status = 200, description = "Troca com os dados dos dois turnos", body = ExchangeDetail),
        (status = 403, description = "Você não participa desta troca"),
        (status = 404, description = "Não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_exchange(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .exchange_service
        .detail(id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(detail)))
}

// POST /api/exchanges/{id}/respond
#[utoipa::path(
    post,
    path = "/api/exchanges/{id}/respond",
    tag = "Trocas de Turno",
    request_body = RespondExchangePayload,
    params(("id" = Uuid, Path, description = "ID da troca")),
    responses(
        (status = 200, description = "Resposta registrada", body = ShiftExchangeRequest),
        (status = 403, description = "Apenas o funcionário convidado responde"),
        (status = 409, description = "A troca não aguarda mais o funcionário")
    ),
    security(("api_jwt" = []))
)]
pub async fn respond_exchange(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondExchangePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let request = app_state
        .exchange_service
        .respond(id, user.0.sub, payload.action, payload.reason.as_deref())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(request)))
}

// POST /api/exchanges/{id}/approve
#[utoipa::path(
    post,
    path = "/api/exchanges/{id}/approve",
    tag = "Trocas de Turno",
    params(("id" = Uuid, Path, description = "ID da troca")),
    responses(
        (status = 200, description = "Aprovada; swapStep indica até onde a troca foi aplicada", body = ShiftExchangeRequest),
        (status = 403, description = "A troca não envolve as empresas do RH"),
        (status = 409, description = "A troca não aguarda o RH")
    ),
    security(("api_jwt" = []))
)]
pub async fn approve_exchange(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermApproveExchanges>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let request = app_state
        .exchange_service
        .hr_approve(id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(request)))
}

// POST /api/exchanges/{id}/reject
#[utoipa::path(
    post,
    path = "/api/exchanges/{id}/reject",
    tag = "Trocas de Turno",
    request_body = HrRejectPayload,
    params(("id" = Uuid, Path, description = "ID da troca")),
    responses(
        (status = 200, description = "Rejeitada pelo RH", body = ShiftExchangeRequest),
        (status = 400, description = "Motivo obrigatório"),
        (status = 403, description = "A troca não envolve as empresas do RH"),
        (status = 409, description = "A troca não aguarda o RH")
    ),
    security(("api_jwt" = []))
)]
pub async fn reject_exchange(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermApproveExchanges>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HrRejectPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let request = app_state
        .exchange_service
        .hr_reject(id, &user.0, payload.reason.as_deref())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(request)))
}
