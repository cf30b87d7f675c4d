//! Migration definitions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// A versioned schema change.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version (timestamp-based).
    pub version: i64,
    /// Migration name.
    pub name: String,
    /// SQL applying the change.
    pub up_sql: String,
    /// SHA-256 of `up_sql`, hex encoded.
    pub checksum: String,
    /// Tags for grouping.
    pub tags: Vec<String>,
}

impl Migration {
    /// Create a migration builder.
    #[must_use]
    pub fn builder(version: i64, name: impl Into<String>) -> MigrationBuilder {
        MigrationBuilder::new(version, name)
    }

    /// Compute checksum for SQL content.
    #[must_use]
    pub fn compute_checksum(sql: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sql.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether the stored checksum matches the SQL.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        Self::compute_checksum(&self.up_sql) == self.checksum
    }

    /// Individual statements of the up SQL.
    ///
    /// Splits on `;` outside of dollar-quoted bodies.
    #[must_use]
    pub fn statements(&self) -> Vec<&str> {
        split_statements(&self.up_sql)
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{} - {}", self.version, self.name)
    }
}

fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_dollar = false;
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'$') {
            in_dollar = !in_dollar;
            i += 2;
            continue;
        }
        if bytes[i] == b';' && !in_dollar {
            let stmt = sql[start..i].trim();
            if !stmt.is_empty() {
                statements.push(stmt);
            }
            start = i + 1;
        }
        i += 1;
    }

    let tail = sql[start..].trim();
    if !tail.is_empty() {
        statements.push(tail);
    }
    statements
}

/// Builder for migrations.
#[derive(Debug)]
pub struct MigrationBuilder {
    version: i64,
    name: String,
    up_sql: String,
    tags: Vec<String>,
}

impl MigrationBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(version: i64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            up_sql: String::new(),
            tags: Vec::new(),
        }
    }

    /// Set the up SQL.
    #[must_use]
    pub fn up(mut self, sql: impl Into<String>) -> Self {
        self.up_sql = sql.into();
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Build the migration.
    #[must_use]
    pub fn build(self) -> Migration {
        let checksum = Migration::compute_checksum(&self.up_sql);
        Migration {
            version: self.version,
            name: self.name,
            up_sql: self.up_sql,
            checksum,
            tags: self.tags,
        }
    }
}

/// Record of an applied migration.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRecord {
    /// Migration version.
    pub version: i64,
    /// Migration name.
    pub name: String,
    /// Checksum when applied.
    pub checksum: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
    /// Execution time in milliseconds.
    pub execution_time_ms: i64,
}

impl MigrationRecord {
    /// Record for a migration just applied.
    #[must_use]
    pub fn applied(migration: &Migration, execution_time_ms: i64) -> Self {
        Self {
            version: migration.version,
            name: migration.name.clone(),
            checksum: migration.checksum.clone(),
            applied_at: Utc::now(),
            execution_time_ms,
        }
    }

    /// Check if this record matches a migration.
    #[must_use]
    pub fn matches(&self, migration: &Migration) -> bool {
        self.version == migration.version && self.checksum == migration.checksum
    }
}

impl fmt::Display for MigrationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "V{} - {} ({}ms)",
            self.version, self.name, self.execution_time_ms
        )
    }
}
