// src/handlers/webhooks.rs
//
// Entrada dos eventos do ERP. Não usa JWT: o ERP se autentica com o
// cabeçalho x-webhook-token e a resposta segue o envelope { success, ... }.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::i18n::Locale,
    models::webhook::{WebhookEvent, WebhookKind},
};

pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

// Comparação em tempo constante para não vazar o segredo por temporização
fn same_secret(given: &[u8], expected: &[u8]) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given.iter().zip(expected).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

fn check_token(headers: &HeaderMap, secret: &str) -> Result<(), AppError> {
    let given = headers
        .get(WEBHOOK_TOKEN_HEADER)
        .map(|v| v.as_bytes())
        .ok_or(AppError::InvalidToken)?;
    if same_secret(given, secret.as_bytes()) {
        Ok(())
    } else {
        Err(AppError::InvalidToken)
    }
}

fn failure(err: AppError, locale: &Locale) -> Response {
    if err.status().is_client_error() {
        tracing::warn!(error = %err, "Evento do ERP recusado");
    }
    let api = err.to_api_error(locale);
    let mut body = json!({ "success": false, "error": api.error });
    if let Some(details) = api.details {
        body["details"] = details;
    }
    (api.status, Json(body)).into_response()
}

async fn project(app_state: &AppState, kind: &str, body: &[u8]) -> Result<(StatusCode, Value), AppError> {
    // 1. O tipo vem da rota e define o formato esperado do corpo
    let kind: WebhookKind = kind.parse()?;
    let raw: Value = serde_json::from_slice(body).map_err(|e| AppError::InvalidPayload(e.to_string()))?;
    let event = WebhookEvent::parse(kind, raw)?;

    // 2. Projeção no banco da empresa
    let outcome = app_state.ingestion_service.ingest(event).await?;

    let status = if outcome.deleted { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, outcome.data))
}

// POST /api/webhooks/erp/{kind}
#[utoipa::path(
    post,
    path = "/api/webhooks/erp/{kind}",
    tag = "Webhooks",
    request_body(content = Object, content_type = "application/json", description = "Registro do ERP com o campo `_action`"),
    params(
        ("kind" = String, Path, description = "pos-verification | pos-session | shift | attendance | order | cash-movement"),
        ("x-webhook-token" = String, Header, description = "Segredo compartilhado com o ERP")
    ),
    responses(
        (status = 201, description = "Evento projetado (corpo: registro do ERP com o campo `_action`)"),
        (status = 200, description = "Remoção projetada"),
        (status = 400, description = "Tipo ou payload inválido"),
        (status = 401, description = "Token do webhook ausente ou errado"),
        (status = 404, description = "Empresa não encontrada")
    )
)]
pub async fn receive_erp_event(
    State(app_state): State<AppState>,
    locale: Locale,
    headers: HeaderMap,
    Path(kind): Path<String>,
    body: Bytes,
) -> Response {
    if let Err(e) = check_token(&headers, &app_state.config.webhook_secret) {
        return failure(e, &locale);
    }

    match project(&app_state, &kind, &body).await {
        Ok((status, data)) => (status, Json(json!({ "success": true, "data": data }))).into_response(),
        Err(e) => failure(e, &locale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn webhook_token_must_match_exactly() {
        let mut headers = HeaderMap::new();
        assert!(matches!(check_token(&headers, "s3gredo"), Err(AppError::InvalidToken)));

        headers.insert(WEBHOOK_TOKEN_HEADER, HeaderValue::from_static("s3gred"));
        assert!(check_token(&headers, "s3gredo").is_err());

        headers.insert(WEBHOOK_TOKEN_HEADER, HeaderValue::from_static("s3gredo"));
        assert!(check_token(&headers, "s3gredo").is_ok());
    }

    #[tokio::test]
    async fn failure_uses_the_success_envelope() {
        let response = failure(AppError::CompanyNotFound("erp 99".into()), &Locale::default());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "company not found (erp 99)");
    }
}
