// src/middleware/tenancy.rs

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{auth::AuthenticatedUser, i18n::Locale},
    models::company::Company,
};

// O nome do nosso cabeçalho HTTP customizado
pub const COMPANY_ID_HEADER: &str = "x-company-id";

/// Empresa da requisição já resolvida: registro do master + pool do banco dela.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub company: Company,
    pub pool: PgPool,
}

fn company_id_from(parts: &Parts) -> Result<Uuid, AppError> {
    let value = parts
        .headers
        .get(COMPANY_ID_HEADER)
        .ok_or(AppError::MissingField(COMPANY_ID_HEADER))?;
    let value = value
        .to_str()
        .map_err(|_| AppError::InvalidPayload("Cabeçalho x-company-id contém caracteres inválidos.".into()))?;
    Uuid::parse_str(value.trim())
        .map_err(|_| AppError::InvalidPayload("Cabeçalho x-company-id inválido (não é um UUID).".into()))
}

async fn resolve<S: Send + Sync>(parts: &mut Parts, state: &S, app_state: &AppState) -> Result<TenantContext, AppError> {
    let user = AuthenticatedUser::from_request_parts(parts, state).await?;
    let company_id = company_id_from(parts)?;

    // A. O usuário pertence à empresa?
    if !user.0.belongs_to_company(company_id) {
        return Err(AppError::Forbidden("Você não tem acesso a esta empresa.".into()));
    }

    // B. Empresa ativa no master
    let master = app_state.registry.get_master().await?;
    let company = app_state.company_repo.find_active(&master, company_id).await?;

    // C. Pool do banco da empresa
    let pool = app_state.registry.get_tenant(&company.db_name).await?;
    Ok(TenantContext { company, pool })
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let locale = Locale::from_request_parts(parts, state).await.unwrap_or_default();

        resolve(parts, state, &app_state).await.map_err(|e| e.to_api_error(&locale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/authorizations");
        if let Some(value) = header {
            builder = builder.header(COMPANY_ID_HEADER, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn reads_company_header() {
        let id = Uuid::from_u128(42);
        assert_eq!(company_id_from(&parts_with(Some(&id.to_string()))).unwrap(), id);
    }

    #[test]
    fn missing_or_malformed_header_is_a_client_error() {
        assert!(matches!(company_id_from(&parts_with(None)), Err(AppError::MissingField(COMPANY_ID_HEADER))));
        assert!(matches!(company_id_from(&parts_with(Some("loja-1"))), Err(AppError::InvalidPayload(_))));
    }
}
