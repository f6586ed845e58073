// src/db/migrator.rs
//
// Migrações dos bancos de empresa. Ficam embutidas no binário e são aplicadas
// em ordem, cada uma na sua própria transação, registrando (id, versão, lote)
// na tabela `schema_migrations` do próprio tenant.

use sqlx::{Executor, PgConnection, PgPool};

use crate::{common::error::AppError, models::company::MigrationReport};

#[derive(Debug, Clone, Copy)]
pub struct TenantMigration {
    pub version: i64,
    pub id: &'static str,
    pub sql: &'static str,
}

pub const TENANT_MIGRATIONS: &[TenantMigration] = &[
    TenantMigration {
        version: 1,
        id: "0001_base_schema",
        sql: include_str!("../../migrations/tenant/0001_base_schema.sql"),
    },
    TenantMigration {
        version: 2,
        id: "0002_pos_projection",
        sql: include_str!("../../migrations/tenant/0002_pos_projection.sql"),
    },
    TenantMigration {
        version: 3,
        id: "0003_erp_sync_jobs",
        sql: include_str!("../../migrations/tenant/0003_erp_sync_jobs.sql"),
    },
    TenantMigration {
        version: 4,
        id: "0004_shift_guards",
        sql: include_str!("../../migrations/tenant/0004_shift_guards.sql"),
    },
];

// Serializa duas instâncias migrando o mesmo banco ao mesmo tempo
const MIGRATION_LOCK_KEY: i64 = 7_411_003;

const LEDGER_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    id         TEXT PRIMARY KEY,
    version    BIGINT NOT NULL UNIQUE,
    batch      INTEGER NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Versão mais alta embutida no binário.
pub fn latest_version() -> i64 {
    TENANT_MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Quais migrações faltam a partir da versão registrada.
/// Recusa listas fora de ordem (duas versões iguais seriam aplicadas num único lote).
pub fn plan_pending(migrations: &[TenantMigration], current_version: i64) -> Result<Vec<TenantMigration>, AppError> {
    if let Some(pair) = migrations.windows(2).find(|w| w[0].version >= w[1].version) {
        return Err(AppError::MigrationFailed {
            migration: pair[1].id.to_string(),
            reason: format!("versão {} fora de ordem", pair[1].version),
        });
    }

    Ok(migrations
        .iter()
        .filter(|m| m.version > current_version)
        .copied()
        .collect())
}

/// Versão registrada no ledger do tenant (0 se nunca migrado).
pub async fn current_version(pool: &PgPool) -> Result<i64, AppError> {
    let mut conn = pool.acquire().await?;
    (&mut *conn).execute(LEDGER_DDL).await?;
    read_version(&mut conn).await
}

async fn read_version(conn: &mut PgConnection) -> Result<i64, AppError> {
    let version: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0)::BIGINT FROM schema_migrations")
        .fetch_one(&mut *conn)
        .await?;
    Ok(version)
}

/// Aplica as migrações pendentes. Se uma falhar, as anteriores do lote
/// continuam aplicadas e o erro informa qual migração quebrou.
#[tracing::instrument(skip_all)]
pub async fn migrate(pool: &PgPool) -> Result<MigrationReport, AppError> {
    let mut conn = pool.acquire().await?;

    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await?;

    let result = migrate_locked(&mut conn).await;

    // O lock é de sessão: liberar mesmo se a migração falhou
    if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await
    {
        tracing::warn!(error = %e, "Falha ao liberar o lock de migração");
    }

    result
}

async fn migrate_locked(conn: &mut PgConnection) -> Result<MigrationReport, AppError> {
    (&mut *conn).execute(LEDGER_DDL).await?;

    let previous_version = read_version(conn).await?;
    let batch: i32 = sqlx::query_scalar("SELECT COALESCE(MAX(batch), 0)::INTEGER + 1 FROM schema_migrations")
        .fetch_one(&mut *conn)
        .await?;

    let pending = plan_pending(TENANT_MIGRATIONS, previous_version)?;
    let mut applied = Vec::with_capacity(pending.len());
    let mut current_version = previous_version;

    for migration in pending {
        apply_one(conn, &migration, batch).await.map_err(|reason| {
            tracing::error!(migration = migration.id, %reason, "🔥 Migração falhou");
            AppError::MigrationFailed {
                migration: migration.id.to_string(),
                reason,
            }
        })?;

        tracing::info!(migration = migration.id, batch, "Migração aplicada");
        current_version = migration.version;
        applied.push(migration.id.to_string());
    }

    Ok(MigrationReport {
        previous_version,
        current_version,
        batch,
        applied,
    })
}

async fn apply_one(conn: &mut PgConnection, migration: &TenantMigration, batch: i32) -> Result<(), String> {
    let mut tx = sqlx::Connection::begin(&mut *conn).await.map_err(|e| e.to_string())?;

    // &str sem parâmetros vai pelo protocolo simples: aceita vários comandos por arquivo
    (&mut *tx).execute(migration.sql).await.map_err(|e| e.to_string())?;

    sqlx::query("INSERT INTO schema_migrations (id, version, batch) VALUES ($1, $2, $3)")
        .bind(migration.id)
        .bind(migration.version)
        .bind(batch)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.to_string())?;

    tx.commit().await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(version: i64, id: &'static str) -> TenantMigration {
        TenantMigration { version, id, sql: "" }
    }

    #[test]
    fn embedded_migrations_are_strictly_ordered() {
        let plan = plan_pending(TENANT_MIGRATIONS, 0).unwrap();
        assert_eq!(plan.len(), TENANT_MIGRATIONS.len());
        assert_eq!(latest_version(), 4);
        assert!(TENANT_MIGRATIONS.iter().all(|m| m.id.starts_with(&format!("{:04}_", m.version))));
    }

    #[test]
    fn plans_only_versions_above_the_recorded_one() {
        let list = [m(1, "0001_a"), m(2, "0002_b"), m(3, "0003_c")];
        let ids: Vec<_> = plan_pending(&list, 1).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["0002_b", "0003_c"]);
        assert!(plan_pending(&list, 3).unwrap().is_empty());
    }

    #[test]
    fn rejects_out_of_order_lists() {
        let list = [m(1, "0001_a"), m(3, "0003_c"), m(2, "0002_b")];
        match plan_pending(&list, 0) {
            Err(AppError::MigrationFailed { migration, .. }) => assert_eq!(migration, "0002_b"),
            other => panic!("esperava MigrationFailed, veio {:?}", other),
        }
    }
}
