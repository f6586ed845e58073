// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::middleware::i18n::Locale;

/// A regra de workflow exata que impediu a transição.
/// O chamador sempre recebe a pré-condição que falhou, nunca um erro genérico.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    // --- Autorizações de turno ---
    AuthorizationAlreadyResolved,
    ReasonNotRequired,
    ReasonAlreadySubmitted,
    ReasonNotSubmitted,
    ReasonEmpty,
    NotAuthorizationOwner,
    OvertimeTypeRequired,
    OvertimeTypeNotApplicable,
    RejectionReasonRequired,

    // --- Troca de turnos ---
    NotShiftOwner,
    SameEmployee,
    ShiftAlreadyEnded,
    ShiftWithoutEmployee,
    ExchangeAlreadyPending,
    NotAcceptingEmployee,
    ExchangeNotAwaitingEmployee,
    ExchangeNotAwaitingHr,
    ExchangeAlreadyResolved,
}

impl Precondition {
    pub fn status(self) -> StatusCode {
        match self {
            Precondition::NotAuthorizationOwner
            | Precondition::NotShiftOwner
            | Precondition::NotAcceptingEmployee => StatusCode::FORBIDDEN,
            Precondition::AuthorizationAlreadyResolved
            | Precondition::ExchangeAlreadyPending
            | Precondition::ExchangeNotAwaitingEmployee
            | Precondition::ExchangeNotAwaitingHr
            | Precondition::ExchangeAlreadyResolved
            | Precondition::ReasonAlreadySubmitted => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(self, lang: &str) -> &'static str {
        let pt = lang == "pt";
        match self {
            Precondition::AuthorizationAlreadyResolved => if pt { "Esta autorização já foi resolvida." } else { "this authorization has already been resolved" },
            Precondition::ReasonNotRequired => if pt { "Esta autorização não exige justificativa do funcionário." } else { "this authorization does not require an employee reason" },
            Precondition::ReasonAlreadySubmitted => if pt { "A justificativa já foi enviada." } else { "the employee reason has already been submitted" },
            Precondition::ReasonNotSubmitted => if pt { "O funcionário ainda não enviou a justificativa." } else { "employee has not submitted a reason yet" },
            Precondition::ReasonEmpty => if pt { "A justificativa não pode ser vazia." } else { "reason must not be empty" },
            Precondition::NotAuthorizationOwner => if pt { "Apenas o funcionário do turno pode justificar." } else { "only the shift's employee can submit a reason" },
            Precondition::OvertimeTypeRequired => if pt { "Selecione o tipo de hora extra (overtimeType)." } else { "overtimeType is required to approve overtime" },
            Precondition::OvertimeTypeNotApplicable => if pt { "overtimeType só se aplica a horas extras." } else { "overtimeType only applies to overtime authorizations" },
            Precondition::RejectionReasonRequired => if pt { "O motivo da rejeição é obrigatório." } else { "a rejection reason is required" },
            Precondition::NotShiftOwner => if pt { "Você só pode oferecer seus próprios turnos." } else { "you can only offer your own shift" },
            Precondition::SameEmployee => if pt { "Não é possível trocar turno consigo mesmo." } else { "cannot exchange a shift with yourself" },
            Precondition::ShiftAlreadyEnded => if pt { "O turno já foi encerrado." } else { "the shift has already ended" },
            Precondition::ShiftWithoutEmployee => if pt { "O turno alvo não tem funcionário atribuído." } else { "the target shift has no assigned employee" },
            Precondition::ExchangeAlreadyPending => if pt { "Já existe uma troca pendente para um dos turnos." } else { "a pending exchange already exists for one of the shifts" },
            Precondition::NotAcceptingEmployee => if pt { "Apenas o funcionário convidado pode responder." } else { "only the invited employee can respond" },
            Precondition::ExchangeNotAwaitingEmployee => if pt { "A troca não está aguardando o funcionário." } else { "the exchange is not awaiting the employee's response" },
            Precondition::ExchangeNotAwaitingHr => if pt { "A troca não está aguardando o RH." } else { "the exchange is not awaiting HR approval" },
            Precondition::ExchangeAlreadyResolved => if pt { "A troca já foi resolvida." } else { "the exchange has already been resolved" },
        }
    }
}

// Nosso tipo de erro interno. A camada HTTP o converte em `ApiError`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Campo obrigatório ausente: {0}")]
    MissingField(&'static str),

    #[error("Payload inválido: {0}")]
    InvalidPayload(String),

    #[error("Pré-condição não atendida: {0:?}")]
    Precondition(Precondition),

    #[error("Recurso não encontrado: {0}")]
    ResourceNotFound(String),

    #[error("Empresa não encontrada: {0}")]
    CompanyNotFound(String),

    #[error("Conflito: {0}")]
    Conflict(String),

    #[error("Acesso negado: {0}")]
    Forbidden(String),

    #[error("Token inválido")]
    InvalidToken,

    #[error("Banco indisponível: {0}")]
    Connectivity(String),

    #[error("Migração {migration} falhou: {reason}")]
    MigrationFailed { migration: String, reason: String },

    #[error("Falha no sistema externo: {0}")]
    ExternalService(String),

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados: {0}")]
    DatabaseError(sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl From<Precondition> for AppError {
    fn from(p: Precondition) -> Self {
        AppError::Precondition(p)
    }
}

// Erros de pool (timeout, pool fechado, IO) são problemas de conectividade, não de dados.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => AppError::Connectivity("tempo esgotado aguardando conexão".into()),
            sqlx::Error::PoolClosed => AppError::Connectivity("pool de conexões encerrado".into()),
            sqlx::Error::Io(io) => AppError::Connectivity(io.to_string()),
            sqlx::Error::Tls(tls) => AppError::Connectivity(tls.to_string()),
            sqlx::Error::RowNotFound => AppError::ResourceNotFound("registro".into()),
            other => AppError::DatabaseError(other),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::MissingField(_) | AppError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            AppError::Precondition(p) => p.status(),
            AppError::ResourceNotFound(_) | AppError::CompanyNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InvalidToken | AppError::JwtError(_) => StatusCode::UNAUTHORIZED,
            AppError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::MigrationFailed { .. }
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Mensagem voltada ao usuário, no idioma pedido ("pt" ou inglês por padrão).
    pub fn user_message(&self, lang: &str) -> String {
        let pt = lang == "pt";
        match self {
            AppError::ValidationError(_) => if pt { "Um ou mais campos são inválidos.".into() } else { "one or more fields are invalid".into() },
            AppError::MissingField(field) => if pt { format!("O campo '{}' é obrigatório.", field) } else { format!("field '{}' is required", field) },
            AppError::InvalidPayload(msg) => if pt { format!("Payload inválido: {}", msg) } else { format!("invalid payload: {}", msg) },
            AppError::Precondition(p) => p.message(lang).to_string(),
            AppError::ResourceNotFound(what) => if pt { format!("{} não encontrado(a).", what) } else { format!("{} not found", what) },
            AppError::CompanyNotFound(key) => if pt { format!("Empresa não encontrada ({}).", key) } else { format!("company not found ({})", key) },
            AppError::Conflict(msg) => msg.clone(),
            AppError::Forbidden(msg) => msg.clone(),
            AppError::InvalidToken | AppError::JwtError(_) => if pt { "Token de autenticação inválido ou ausente.".into() } else { "invalid or missing authentication token".into() },
            AppError::Connectivity(_) => if pt { "Banco de dados indisponível no momento.".into() } else { "database is currently unavailable".into() },
            AppError::MigrationFailed { migration, .. } => if pt { format!("A migração {} falhou.", migration) } else { format!("migration {} failed", migration) },
            AppError::ExternalService(_) => if pt { "Falha ao comunicar com o ERP.".into() } else { "failed to reach the ERP".into() },
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => if pt { "Ocorreu um erro inesperado.".into() } else { "an unexpected error occurred".into() },
        }
    }

    pub fn to_api_error(self, locale: &Locale) -> ApiError {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Erro Interno do Servidor: {}", self);
        }

        let details = match &self {
            AppError::ValidationError(errors) => {
                let mut details = serde_json::Map::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<Value> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| Value::String(m.to_string())))
                        .collect();
                    details.insert(field.to_string(), Value::Array(messages));
                }
                Some(Value::Object(details))
            }
            AppError::MissingField(field) => Some(json!({ "field": field })),
            _ => None,
        };

        ApiError {
            status,
            error: self.user_message(&locale.0),
            details,
        }
    }
}

/// O erro que sai pela API (já traduzido).
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

// Sem contexto de idioma (middlewares), caímos no inglês.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error(&Locale::default()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_messages_name_the_failed_rule() {
        let err = AppError::from(Precondition::ReasonNotSubmitted);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.user_message("en"), "employee has not submitted a reason yet");
        assert_eq!(err.user_message("pt"), "O funcionário ainda não enviou a justificativa.");
    }

    #[test]
    fn already_resolved_is_a_conflict() {
        let err = AppError::from(Precondition::AuthorizationAlreadyResolved);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::from(Precondition::ExchangeNotAwaitingHr).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn pool_errors_map_to_connectivity() {
        assert!(matches!(AppError::from(sqlx::Error::PoolTimedOut), AppError::Connectivity(_)));
        assert_eq!(AppError::from(sqlx::Error::PoolClosed).status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn missing_field_carries_the_field_name() {
        let api = AppError::MissingField("reason").to_api_error(&Locale("en".into()));
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.error, "field 'reason' is required");
        assert_eq!(api.details, Some(json!({ "field": "reason" })));
    }
}
