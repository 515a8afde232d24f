//! Journal of applied scripts, stored in the target database.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::AnyConnection;
use sqlx::Row;
use tracing::debug;

use sqlup_core::config::JournalConfig;
use sqlup_core::error::{Result, SqlupError};
use sqlup_core::script::{ReplayPolicy, Script};

use crate::db::Dialect;

/// A journaled script application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub script_name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

/// Where a script stands relative to the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalStatus {
    /// Never applied, or an always-on-change script whose content changed.
    Pending,
    Applied,
    /// A once-only script applied with different content.
    Drifted,
}

/// In-memory view of the journal: latest checksum per script identity.
#[derive(Debug, Clone, Default)]
pub struct AppliedScripts {
    latest: HashMap<String, String>,
}

impl AppliedScripts {
    /// Build from entries in application order; later entries win.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a JournalEntry>) -> Self {
        let mut latest = HashMap::new();
        for entry in entries {
            latest.insert(entry.script_name.clone(), entry.checksum.clone());
        }
        Self { latest }
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Latest recorded checksum for a script identity.
    pub fn checksum_of(&self, script_name: &str) -> Option<&str> {
        self.latest.get(script_name).map(String::as_str)
    }

    pub fn status(&self, script: &Script) -> JournalStatus {
        match (self.checksum_of(script.name()), script.policy()) {
            (None, _) => JournalStatus::Pending,
            (Some(recorded), _) if recorded == script.checksum() => JournalStatus::Applied,
            (Some(_), ReplayPolicy::OnceOnly) => JournalStatus::Drifted,
            (Some(_), ReplayPolicy::AlwaysOnChange) => JournalStatus::Pending,
        }
    }

    /// True iff the script must not run again.
    pub fn has_been_applied(&self, script: &Script) -> bool {
        self.status(script) != JournalStatus::Pending
    }
}

/// Reads and writes the journal table.
#[derive(Debug, Clone)]
pub struct ChangeJournal {
    dialect: Dialect,
    schema: Option<String>,
    table: String,
}

impl ChangeJournal {
    pub fn new(config: &JournalConfig, dialect: Dialect) -> Self {
        Self {
            dialect,
            schema: config.schema.clone(),
            table: config.table.clone(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Quoted, schema-qualified table name.
    pub fn qualified_table(&self) -> String {
        self.dialect.qualified_table(self.schema.as_deref(), &self.table)
    }

    /// Whether the journal table exists yet.
    pub async fn exists(&self, conn: &mut AnyConnection) -> Result<bool> {
        let count = match (self.dialect, self.schema.as_deref()) {
            (Dialect::Postgres, Some(schema)) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM information_schema.tables \
                     WHERE table_schema = $1 AND table_name = $2",
                )
                .bind(schema.to_string())
                .bind(self.table.clone())
                .fetch_one(&mut *conn)
                .await
            }
            (Dialect::Postgres, None) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM information_schema.tables \
                     WHERE table_schema = current_schema() AND table_name = $1",
                )
                .bind(self.table.clone())
                .fetch_one(&mut *conn)
                .await
            }
            (Dialect::Sqlite, schema) => {
                let master = match schema {
                    Some(schema) => format!("{}.sqlite_master", self.dialect.quote_ident(schema)),
                    None => "sqlite_master".to_string(),
                };
                let sql = format!(
                    "SELECT COUNT(*) FROM {} WHERE type = 'table' AND name = $1",
                    master
                );
                sqlx::query_scalar::<_, i64>(&sql)
                    .bind(self.table.clone())
                    .fetch_one(&mut *conn)
                    .await
            }
        }
        .map_err(|e| unavailable("check journal table", e))?;

        Ok(count > 0)
    }

    /// Create the journal table (and its PostgreSQL schema) if absent.
    pub async fn ensure_table(&self, conn: &mut AnyConnection) -> Result<()> {
        if let (Dialect::Postgres, Some(schema)) = (self.dialect, self.schema.as_deref()) {
            let ddl = format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                self.dialect.quote_ident(schema)
            );
            sqlx::raw_sql(&ddl)
                .execute(&mut *conn)
                .await
                .map_err(|e| unavailable("create journal schema", e))?;
        }

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                script_name VARCHAR(255) NOT NULL,
                checksum VARCHAR(64) NOT NULL,
                applied_at VARCHAR(40) NOT NULL,
                PRIMARY KEY (script_name, checksum)
            )
            "#,
            self.qualified_table()
        );
        sqlx::raw_sql(&ddl)
            .execute(&mut *conn)
            .await
            .map_err(|e| unavailable("create journal table", e))?;

        debug!(table = %self.qualified_table(), "Journal table ready");
        Ok(())
    }

    /// All entries in application order. An absent table reads as empty.
    pub async fn entries(&self, conn: &mut AnyConnection) -> Result<Vec<JournalEntry>> {
        if !self.exists(conn).await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT script_name, checksum, applied_at FROM {} ORDER BY applied_at, script_name",
            self.qualified_table()
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| unavailable("read journal", e))?;

        rows.iter()
            .map(|row| {
                let applied_at: String = row
                    .try_get("applied_at")
                    .map_err(|e| unavailable("read journal", e))?;
                let applied_at = DateTime::parse_from_rfc3339(&applied_at)
                    .map_err(|e| {
                        SqlupError::JournalUnavailable(format!(
                            "Invalid applied_at '{}': {}",
                            applied_at, e
                        ))
                    })?
                    .with_timezone(&Utc);

                Ok(JournalEntry {
                    script_name: row
                        .try_get("script_name")
                        .map_err(|e| unavailable("read journal", e))?,
                    checksum: row
                        .try_get("checksum")
                        .map_err(|e| unavailable("read journal", e))?,
                    applied_at,
                })
            })
            .collect()
    }

    /// Snapshot used by the planner.
    pub async fn load(&self, conn: &mut AnyConnection) -> Result<AppliedScripts> {
        let entries = self.entries(conn).await?;
        debug!("Journal holds {} entries", entries.len());
        Ok(AppliedScripts::from_entries(&entries))
    }

    /// Journal a script. Must run on the same transaction as the script.
    ///
    /// Re-applying an always-on-change script whose content returned to an
    /// earlier version refreshes that version's timestamp. A once-only
    /// script recorded twice fails with a uniqueness violation.
    pub async fn record_applied(&self, conn: &mut AnyConnection, script: &Script) -> Result<()> {
        let applied_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut sql = format!(
            "INSERT INTO {} (script_name, checksum, applied_at) VALUES ($1, $2, $3)",
            self.qualified_table()
        );
        if script.policy() == ReplayPolicy::AlwaysOnChange {
            sql.push_str(
                " ON CONFLICT (script_name, checksum) DO UPDATE SET applied_at = excluded.applied_at",
            );
        }

        sqlx::query(&sql)
            .bind(script.name().to_string())
            .bind(script.checksum().to_string())
            .bind(applied_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                SqlupError::JournalUnavailable(format!(
                    "Failed to record script '{}': {}",
                    script.name(),
                    e
                ))
            })?;

        Ok(())
    }
}

fn unavailable(action: &str, e: sqlx::Error) -> SqlupError {
    SqlupError::JournalUnavailable(format!("Failed to {}: {}", action, e))
}
