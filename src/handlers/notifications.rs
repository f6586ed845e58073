// src/handlers/notifications.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{auth::AuthenticatedUser, i18n::Locale, tenancy::TenantContext},
    models::notification::{
        Notification, NotificationSettings, PushSubscription, RegisterPushPayload, RemovePushPayload,
    },
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

// =============================================================================
//  CAIXA DE ENTRADA
// =============================================================================

// GET /api/notifications
#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "Notificações",
    params(
        NotificationQuery,
        ("x-company-id" = Uuid, Header, description = "ID da Empresa")
    ),
    responses(
        (status = 200, description = "Notificações do usuário", body = Vec<Notification>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_notifications(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Query(query): Query<NotificationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let notifications = app_state
        .notification_service
        .list(&tenant.pool, user.0.sub, query.unread_only)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(notifications)))
}

// POST /api/notifications/{id}/read
#[utoipa::path(
    post,
    path = "/api/notifications/{id}/read",
    tag = "Notificações",
    params(
        ("id" = Uuid, Path, description = "ID da notificação"),
        ("x-company-id" = Uuid, Header, description = "ID da Empresa")
    ),
    responses(
        (status = 200, description = "Marcada como lida", body = Notification),
        (status = 404, description = "Não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_read(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = app_state
        .notification_service
        .mark_read(&tenant.pool, user.0.sub, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(notification)))
}

// POST /api/notifications/read-all
#[utoipa::path(
    post,
    path = "/api/notifications/read-all",
    tag = "Notificações",
    params(("x-company-id" = Uuid, Header, description = "ID da Empresa")),
    responses(
        (status = 200, description = "Quantidade marcada como lida")
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_all_read(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
) -> Result<impl IntoResponse, ApiError> {
    let updated = app_state
        .notification_service
        .mark_all_read(&tenant.pool, user.0.sub)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(json!({ "updated": updated }))))
}

// =============================================================================
//  PREFERÊNCIAS
// =============================================================================

// GET /api/notifications/settings
#[utoipa::path(
    get,
    path = "/api/notifications/settings",
    tag = "Notificações",
    params(("x-company-id" = Uuid, Header, description = "ID da Empresa")),
    responses(
        (status = 200, description = "Preferências de push", body = NotificationSettings)
    ),
    security(("api_jwt" = []))
)]
pub async fn get_settings(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
) -> Result<impl IntoResponse, ApiError> {
    let settings = app_state
        .notification_service
        .settings(&tenant.pool, user.0.sub)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(settings)))
}

// PUT /api/notifications/settings
#[utoipa::path(
    put,
    path = "/api/notifications/settings",
    tag = "Notificações",
    request_body = NotificationSettings,
    params(("x-company-id" = Uuid, Header, description = "ID da Empresa")),
    responses(
        (status = 200, description = "Preferências atualizadas", body = NotificationSettings)
    ),
    security(("api_jwt" = []))
)]
pub async fn update_settings(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Json(payload): Json<NotificationSettings>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = app_state
        .notification_service
        .update_settings(&tenant.pool, user.0.sub, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(settings)))
}

// =============================================================================
//  INSCRIÇÕES DE PUSH
// =============================================================================

// POST /api/notifications/push-subscriptions
#[utoipa::path(
    post,
    path = "/api/notifications/push-subscriptions",
    tag = "Notificações",
    request_body = RegisterPushPayload,
    params(("x-company-id" = Uuid, Header, description = "ID da Empresa")),
    responses(
        (status = 201, description = "Inscrição registrada (ou reativada)", body = PushSubscription),
        (status = 400, description = "Dados inválidos")
    ),
    security(("api_jwt" = []))
)]
pub async fn register_push(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Json(payload): Json<RegisterPushPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let subscription = app_state
        .notification_service
        .register_subscription(&tenant.pool, user.0.sub, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(subscription)))
}

// DELETE /api/notifications/push-subscriptions
#[utoipa::path(
    delete,
    path = "/api/notifications/push-subscriptions",
    tag = "Notificações",
    request_body = RemovePushPayload,
    params(("x-company-id" = Uuid, Header, description = "ID da Empresa")),
    responses(
        (status = 204, description = "Inscrição removida"),
        (status = 404, description = "Não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn remove_push(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Json(payload): Json<RemovePushPayload>,
) -> Result<impl IntoResponse, ApiError> {
    app_state
        .notification_service
        .remove_subscription(&tenant.pool, user.0.sub, &payload.endpoint)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(StatusCode::NO_CONTENT)
}
