// src/handlers/health.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::{common::error::ApiError, config::AppState, middleware::i18n::Locale};

// GET /api/health
pub async fn liveness() -> &'static str {
    "OK"
}

// GET /api/health/ready
#[utoipa::path(
    get,
    path = "/api/health/ready",
    tag = "Saúde",
    responses(
        (status = 200, description = "Master acessível"),
        (status = 503, description = "Banco master indisponível")
    )
)]
pub async fn readiness(State(app_state): State<AppState>, locale: Locale) -> Result<impl IntoResponse, ApiError> {
    let master = app_state
        .registry
        .get_master()
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    sqlx::query("SELECT 1")
        .execute(&master)
        .await
        .map_err(|e| crate::common::error::AppError::from(e).to_api_error(&locale))?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "tenantPools": app_state.registry.cached_tenants(),
            "realtimeRooms": app_state.hub.room_count(),
        })),
    ))
}
