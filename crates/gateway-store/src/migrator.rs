//! Migration runner.

use crate::error::{DatabaseError, Result};
use crate::migration::{Migration, MigrationRecord};
use crate::schema;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info};

/// Table recording applied migrations.
pub const MIGRATIONS_TABLE: &str = "_gateway_migrations";

/// Applies pending migrations in version order.
pub struct Migrator {
    pool: PgPool,
    migrations: Vec<Migration>,
}

impl Migrator {
    /// Migrator over the gateway schema.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_migrations(pool, schema::all_migrations())
    }

    /// Migrator over a custom migration set.
    #[must_use]
    pub fn with_migrations(pool: PgPool, mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self { pool, migrations }
    }

    /// Registered migrations.
    #[must_use]
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    async fn init(&self) -> Result<()> {
        let sql = format!(
            r"
            CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                checksum VARCHAR(64) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                execution_time_ms BIGINT NOT NULL DEFAULT 0
            )
            "
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        debug!("migrations table ready");
        Ok(())
    }

    /// Applied migrations, ordered by version.
    pub async fn applied(&self) -> Result<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT version, name, checksum, applied_at, execution_time_ms
             FROM {MIGRATIONS_TABLE}
             ORDER BY version"
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(MigrationRecord {
                    version: row.try_get("version")?,
                    name: row.try_get("name")?,
                    checksum: row.try_get("checksum")?,
                    applied_at: row.try_get("applied_at")?,
                    execution_time_ms: row.try_get("execution_time_ms")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(DatabaseError::from)
    }

    /// Apply every pending migration.
    ///
    /// Already applied migrations are skipped; one whose SQL changed since it
    /// was applied fails the run.
    pub async fn run_pending(&self) -> Result<Vec<MigrationRecord>> {
        self.init().await?;

        let applied: HashMap<i64, MigrationRecord> = self
            .applied()
            .await?
            .into_iter()
            .map(|r| (r.version, r))
            .collect();

        let pending = pending_migrations(&self.migrations, &applied)?;
        if pending.is_empty() {
            info!("no pending migrations");
            return Ok(Vec::new());
        }

        info!(count = pending.len(), "running pending migrations");
        let mut results = Vec::with_capacity(pending.len());
        for migration in pending {
            results.push(self.apply(migration).await?);
        }
        Ok(results)
    }

    async fn apply(&self, migration: &Migration) -> Result<MigrationRecord> {
        info!(version = migration.version, name = %migration.name, "applying migration");
        let start = Instant::now();

        let outcome = async {
            let mut tx = self.pool.begin().await?;
            for statement in migration.statements() {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            let record = MigrationRecord::applied(migration, start.elapsed().as_millis() as i64);
            let sql = format!(
                "INSERT INTO {MIGRATIONS_TABLE} (version, name, checksum, applied_at, execution_time_ms)
                 VALUES ($1, $2, $3, $4, $5)"
            );
            sqlx::query(&sql)
                .bind(record.version)
                .bind(&record.name)
                .bind(&record.checksum)
                .bind(record.applied_at)
                .bind(record.execution_time_ms)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>(record)
        }
        .await;

        match outcome {
            Ok(record) => {
                info!(
                    version = migration.version,
                    execution_time_ms = record.execution_time_ms,
                    "migration applied"
                );
                Ok(record)
            }
            Err(e) => {
                error!(version = migration.version, error = %e, "migration failed");
                Err(DatabaseError::MigrationFailed {
                    version: migration.version,
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn pending_migrations<'a>(
    migrations: &'a [Migration],
    applied: &HashMap<i64, MigrationRecord>,
) -> Result<Vec<&'a Migration>> {
    let mut pending = Vec::new();
    for migration in migrations {
        match applied.get(&migration.version) {
            Some(record) if record.checksum != migration.checksum => {
                return Err(DatabaseError::ChecksumMismatch {
                    version: migration.version,
                    recorded: record.checksum.clone(),
                    defined: migration.checksum.clone(),
                });
            }
            Some(_) => {}
            None => pending.push(migration),
        }
    }
    Ok(pending)
}
