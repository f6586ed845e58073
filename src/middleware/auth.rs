// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::{common::error::AppError, config::AppState, models::auth::Claims};

/// Valida o JWT (emitido fora deste serviço) e devolve as claims.
pub fn validate_token(key: &DecodingKey, token: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(token, key, &validation)?;
    Ok(data.claims)
}

// O navegador não manda cabeçalho no handshake do WebSocket; lá o token vem em ?token=
fn extract_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string());

    from_header.or_else(|| {
        request.uri().query().and_then(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(k, _)| *k == "token")
                .map(|(_, v)| v.to_string())
        })
    })
}

// O middleware em si
pub async fn auth_guard(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&request).ok_or(AppError::InvalidToken)?;
    let claims = validate_token(&app_state.jwt_key, &token)?;

    request.extensions_mut().insert(AuthenticatedUser(claims));
    Ok(next.run(request).await)
}

// Extrator para obter o usuário autenticado diretamente nos handlers
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Claims);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AppError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn token(secret: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::from_u128(1),
            exp: (now + exp_offset) as usize,
            iat: now as usize,
            company_ids: vec![Uuid::from_u128(10)],
            branch_ids: vec![],
            capabilities: vec!["authorizations:resolve".into()],
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn accepts_valid_token_and_reads_claims() {
        let claims = validate_token(&DecodingKey::from_secret(b"segredo"), &token("segredo", 600)).unwrap();
        assert_eq!(claims.sub, Uuid::from_u128(1));
        assert!(claims.has_capability("authorizations:resolve"));
    }

    #[test]
    fn rejects_wrong_secret_and_expired_token() {
        let key = DecodingKey::from_secret(b"segredo");
        assert!(validate_token(&key, &token("outro", 600)).is_err());
        assert!(validate_token(&key, &token("segredo", -600)).is_err());
    }

    #[test]
    fn token_from_header_or_query() {
        let request = Request::builder()
            .uri("/api/notifications")
            .header(header::AUTHORIZATION, "Bearer abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_token(&request).as_deref(), Some("abc"));

        let request = Request::builder().uri("/api/realtime/ws?x=1&token=xyz").body(Body::empty()).unwrap();
        assert_eq!(extract_token(&request).as_deref(), Some("xyz"));

        let request = Request::builder().uri("/api/realtime/ws").body(Body::empty()).unwrap();
        assert_eq!(extract_token(&request), None);
    }
}
