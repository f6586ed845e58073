// src/common/db_utils.rs

use crate::common::error::AppError;

/// Resultado de um UPDATE protegido por status (`... WHERE status = 'pending' RETURNING *`).
/// Zero linhas afetadas significa que outra requisição resolveu o registro antes.
#[must_use]
#[derive(Debug)]
pub enum GuardedUpdate<T> {
    Applied(T),
    Stale,
}

impl<T> GuardedUpdate<T> {
    pub fn from_row(row: Option<T>) -> Self {
        match row {
            Some(row) => GuardedUpdate::Applied(row),
            None => GuardedUpdate::Stale,
        }
    }

    /// Converte o ramo `Stale` no erro de conflito escolhido pelo chamador.
    pub fn or_conflict(self, conflict: impl FnOnce() -> AppError) -> Result<T, AppError> {
        match self {
            GuardedUpdate::Applied(row) => Ok(row),
            GuardedUpdate::Stale => Err(conflict()),
        }
    }
}

// ---
// Helpers de DDL: identificadores não podem ser parametrizados
// ---

/// Nomes de banco aceitos: minúsculas, dígitos e '_', começando por letra, até 63 bytes.
pub fn validate_db_name(name: &str) -> Result<(), AppError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidPayload(format!("nome de banco inválido: {:?}", name)))
    }
}

/// Cita um identificador Postgres (`"nome"`), duplicando aspas internas.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Deriva o nome do banco a partir do slug da empresa ("Padaria Central" -> "tenant_padaria_central").
pub fn db_name_for_slug(slug: &str) -> String {
    let mut name = String::from("tenant_");
    let mut last_was_sep = true;
    for c in slug.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            name.push('_');
            last_was_sep = true;
        }
    }
    while name.ends_with('_') {
        name.pop();
    }
    name.truncate(63);
    name
}

pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().is_some_and(|db_err| db_err.is_unique_violation())
}

/// Nome da constraint violada, quando o banco informa.
pub fn violated_constraint(e: &sqlx::Error) -> Option<&str> {
    e.as_database_error().and_then(|db_err| db_err.constraint())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers_and_escapes_inner_quotes() {
        assert_eq!(quote_ident("tenant_acme"), "\"tenant_acme\"");
        assert_eq!(quote_ident("evil\"; DROP DATABASE x; --"), "\"evil\"\"; DROP DATABASE x; --\"");
    }

    #[test]
    fn validates_database_names() {
        assert!(validate_db_name("tenant_acme_01").is_ok());
        assert!(validate_db_name("Tenant").is_err());
        assert!(validate_db_name("1tenant").is_err());
        assert!(validate_db_name("tenant-acme").is_err());
        assert!(validate_db_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn derives_db_name_from_slug() {
        assert_eq!(db_name_for_slug("padaria-central"), "tenant_padaria_central");
        assert_eq!(db_name_for_slug("  Loja  Nº 2 "), "tenant_loja_n_2");
        assert!(validate_db_name(&db_name_for_slug("Açaí & Cia")).is_ok());
    }

    #[test]
    fn stale_guarded_update_becomes_conflict() {
        let stale: GuardedUpdate<i32> = GuardedUpdate::from_row(None);
        let err = stale.or_conflict(|| AppError::Conflict("já resolvido".into())).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let applied = GuardedUpdate::from_row(Some(7)).or_conflict(|| AppError::Conflict("x".into()));
        assert_eq!(applied.unwrap(), 7);
    }
}
