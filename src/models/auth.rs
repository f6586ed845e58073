// src/models/auth.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Capacidades (strings opacas) que o fluxo consulta
pub const CAP_VIEW_ALL_BRANCHES: &str = "branches:view_all";
pub const CAP_RESOLVE_AUTHORIZATIONS: &str = "authorizations:resolve";
pub const CAP_APPROVE_EXCHANGES: &str = "exchanges:approve";
pub const CAP_MANAGE_COMPANIES: &str = "companies:manage";

// Estrutura de dados ("claims") dentro do JWT. A emissão do token é externa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,  // Subject (ID do usuário no banco master)
    pub exp: usize, // Expiration time (quando o token expira)
    pub iat: usize, // Issued At (quando o token foi criado)
    #[serde(default)]
    pub company_ids: Vec<Uuid>,
    #[serde(default)]
    pub branch_ids: Vec<Uuid>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Claims {
    pub fn has_capability(&self, slug: &str) -> bool {
        self.capabilities.iter().any(|c| c == slug)
    }

    pub fn belongs_to_company(&self, company_id: Uuid) -> bool {
        self.company_ids.contains(&company_id)
    }

    /// Entrar na sala da filial: "ver todas as filiais" ou atribuição explícita.
    pub fn can_watch_branch(&self, branch_id: Uuid) -> bool {
        self.has_capability(CAP_VIEW_ALL_BRANCHES) || self.branch_ids.contains(&branch_id)
    }
}
