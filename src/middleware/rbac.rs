// src/middleware/rbac.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;

use crate::{
    common::error::{ApiError, AppError},
    middleware::{auth::AuthenticatedUser, i18n::Locale},
    models::auth::{CAP_APPROVE_EXCHANGES, CAP_MANAGE_COMPANIES, CAP_RESOLVE_AUTHORIZATIONS},
};

/// 1. O Trait que define o que é uma Permissão
pub trait PermissionDef: Send + Sync + 'static {
    fn slug() -> &'static str;
}

/// 2. O Extractor (Guardião). As capacidades vêm nas claims do token.
pub struct RequirePermission<T>(pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequirePermission<T>
where
    T: PermissionDef,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let locale = Locale::from_request_parts(parts, state).await.unwrap_or_default();
        let user = AuthenticatedUser::from_request_parts(parts, state)
            .await
            .map_err(|e| e.to_api_error(&locale))?;

        let required_perm = T::slug();
        if !user.0.has_capability(required_perm) {
            return Err(AppError::Forbidden(format!(
                "Você precisa da permissão '{}' para realizar esta ação.",
                required_perm
            ))
            .to_api_error(&locale));
        }

        Ok(RequirePermission(PhantomData))
    }
}

// ---
// DEFINIÇÃO DAS PERMISSÕES (TIPOS)
// ---

pub struct PermResolveAuthorizations;
impl PermissionDef for PermResolveAuthorizations {
    fn slug() -> &'static str { CAP_RESOLVE_AUTHORIZATIONS }
}

pub struct PermApproveExchanges;
impl PermissionDef for PermApproveExchanges {
    fn slug() -> &'static str { CAP_APPROVE_EXCHANGES }
}

pub struct PermManageCompanies;
impl PermissionDef for PermManageCompanies {
    fn slug() -> &'static str { CAP_MANAGE_COMPANIES }
}
