use sqlx::AnyConnection;

use sqlup_core::error::{Result, SqlupError};

/// Database flavours the engine knows how to journal against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Detect the dialect from a connection URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(SqlupError::Config(format!(
                "Unsupported database scheme '{}'",
                other
            ))),
        }
    }

    /// Detect the dialect of an open connection.
    pub fn of(conn: &AnyConnection) -> Result<Self> {
        match conn.backend_name() {
            "PostgreSQL" => Ok(Dialect::Postgres),
            "SQLite" => Ok(Dialect::Sqlite),
            other => Err(SqlupError::Database(format!(
                "Unsupported database backend '{}'",
                other
            ))),
        }
    }

    /// Quote an identifier, doubling embedded quotes.
    pub fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Fully qualified, quoted table name.
    pub fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) => format!("{}.{}", self.quote_ident(schema), self.quote_ident(table)),
            None => self.quote_ident(table),
        }
    }

    pub fn supports_advisory_locks(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}
